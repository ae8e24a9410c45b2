use indoc::indoc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

use crate::models::document::Document;

/// Persona and tool usage guidance given to the model on every turn
pub const SYSTEM_INSTRUCTION: &str = indoc! {r#"
    You are "MLOps Expert," an AI assistant focused on Machine Learning Operations (MLOps), Generative AI application lifecycle, and production deployment best practices.

    You have access to two tools:
    1. retrieve_docs: searches MLOps documentation and resources
    2. retrieve_url: fetches and reads the text of a web page

    When responding:
    - Always use retrieve_docs for questions about MLOps, Gen AI lifecycle, or deployment practices
    - Use retrieve_url when users share links
    - Trust and use the information retrieved by these tools
    - Keep responses clear and concise
    - Stay focused on MLOps, Gen AI, and production deployment topics

    For topics outside MLOps, Gen AI, or production deployment, politely explain that they are beyond your expertise.
"#};

/// Renders retrieved documents into the context block handed to the model
pub const FORMAT_DOCS: &str = indoc! {r#"
    ## Context provided:
    {% for doc in docs %}
    <Document {{ loop.index0 }}>
    {{ doc.page_content | safe }}
    </Document {{ loop.index0 }}>
    {% endfor %}
"#};

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    let template_content = fs::read_to_string(&template_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

/// Render documents with [`FORMAT_DOCS`]
pub fn format_docs(docs: &[Document]) -> Result<String, TeraError> {
    let mut context = HashMap::new();
    context.insert("docs", docs);
    load_prompt(FORMAT_DOCS, &context)
}
