use crate::error::{to_env_var, ConfigError};
use chainstream::agent::AgentConfig;
use chainstream::prompt_template::{load_prompt_file, SYSTEM_INSTRUCTION};
use chainstream::providers::configs::OpenAiProviderConfig;
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Dotted keys without a default, reported by their environment variable
const REQUIRED_KEYS: &[&str] = &["provider.api_key"];

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default)]
    pub pre_retrieve: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// JSON array of documents served by the in-memory retriever
    #[serde(default)]
    pub documents_path: Option<PathBuf>,
    /// Template replacing the built-in system instruction
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            pre_retrieve: false,
            top_k: default_top_k(),
            documents_path: None,
            system_prompt_path: None,
        }
    }
}

impl AgentSettings {
    pub fn agent_config(&self) -> anyhow::Result<AgentConfig> {
        let system_prompt = match &self.system_prompt_path {
            Some(path) => load_prompt_file(path, &HashMap::<String, String>::new())?,
            None => SYSTEM_INSTRUCTION.to_string(),
        };

        Ok(AgentConfig {
            max_turns: self.max_turns,
            pre_retrieve: self.pre_retrieve,
            system_prompt,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TracingSettings {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CHAINSTREAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        for key in REQUIRED_KEYS {
            if config.get_string(key).is_err() {
                return Err(ConfigError::MissingEnvVar {
                    env_var: to_env_var(key),
                });
            }
        }

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let Some(field) = missing_field(&err.to_string()) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Dotted key of a "missing field `api_key` for key `provider`" message
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    match rest
        .strip_prefix(" for key `")
        .and_then(|key| key.split_once('`'))
    {
        Some((key, _)) => Some(format!("{}.{}", key, field)),
        None => Some(field.to_string()),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_turns() -> usize {
    10
}

fn default_top_k() -> usize {
    4
}
