pub mod agent;
pub mod chain;
pub mod errors;
pub mod events;
pub mod history;
pub mod instrumentation;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod tools;
