//! Retrieval collaborators and the tools that expose them to the model
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::{ToolError, ToolResult};
use crate::models::document::Document;
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::format_docs;

pub const RETRIEVE_DOCS: &str = "retrieve_docs";
pub const RETRIEVE_URL: &str = "retrieve_url";

/// Looks up documents relevant to a query
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;
}

/// Fetches a web page and reduces it to readable text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Ranks an in-memory corpus by how many distinct query terms each document
/// contains
pub struct InMemoryRetriever {
    documents: Vec<Document>,
    top_k: usize,
}

impl InMemoryRetriever {
    pub fn new(documents: Vec<Document>, top_k: usize) -> Self {
        Self { documents, top_k }
    }

    /// Load documents from a JSON array of `{page_content, metadata?, id?}`
    pub fn from_json_file(path: impl AsRef<Path>, top_k: usize) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read documents from {}", path.display()))?;
        let documents: Vec<Document> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid documents file {}", path.display()))?;

        tracing::info!(count = documents.len(), "loaded retrieval corpus");
        Ok(Self::new(documents, top_k))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let mut query_terms = terms(query);
        query_terms.sort();
        query_terms.dedup();

        let mut scored: Vec<(usize, &Document)> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(&doc.page_content);
                let score = query_terms
                    .iter()
                    .filter(|term| doc_terms.contains(term))
                    .count();
                (score > 0).then_some((score, doc))
            })
            .collect();

        // Stable sort keeps corpus order between equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(html_to_text(&body))
    }
}

/// Strip markup from an HTML page, keeping block boundaries as line breaks
pub fn html_to_text(html: &str) -> String {
    let hidden = Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->",
    )
    .unwrap();
    let breaks = Regex::new(r"(?i)<(?:br|/?p|/?div|/?h[1-6]|/?li|/?tr)\b[^>]*>").unwrap();
    let tags = Regex::new(r"(?s)<[^>]*>").unwrap();
    let numeric = Regex::new(r"&#(\d{1,7});").unwrap();

    let text = hidden.replace_all(html, "");
    let text = breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    let text = numeric.replace_all(&text, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

/// The tools offered to the model, dispatched to the retrieval collaborators
pub struct Toolbox {
    retriever: Arc<dyn Retriever>,
    fetcher: Arc<dyn PageFetcher>,
    tools: Vec<Tool>,
}

impl Toolbox {
    pub fn new(retriever: Arc<dyn Retriever>, fetcher: Arc<dyn PageFetcher>) -> Self {
        let retrieve_docs = Tool::new(
            RETRIEVE_DOCS,
            "Retrieves pre-formatted documents about MLOps (Machine Learning Operations), \
            Gen AI lifecycle, and production deployment best practices.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query related to MLOps, Gen AI, or production deployment."
                    }
                }
            }),
        );

        let retrieve_url = Tool::new(
            RETRIEVE_URL,
            "Retrieves and extracts the text content of the webpage at the given URL.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The complete HTTP or HTTPS URL of the page to fetch."
                    }
                }
            }),
        );

        Self {
            retriever,
            fetcher,
            tools: vec![retrieve_docs, retrieve_url],
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Raw retrieval, for callers that inject documents outside a tool call
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        self.retriever.retrieve(query).await
    }

    /// Execute a tool call, returning `{"output": ...}`
    pub async fn call(&self, tool_call: &ToolCall) -> ToolResult<Value> {
        match tool_call.name.as_str() {
            RETRIEVE_DOCS => self.retrieve_docs(&tool_call.args).await,
            RETRIEVE_URL => self.retrieve_url(&tool_call.args).await,
            _ => Err(ToolError::ToolNotFound(tool_call.name.clone())),
        }
    }

    async fn retrieve_docs(&self, args: &Value) -> ToolResult<Value> {
        let query = string_arg(args, "query")?;
        let docs = self
            .retriever
            .retrieve(query)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        let output = format_docs(&docs).map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        Ok(json!({ "output": output }))
    }

    async fn retrieve_url(&self, args: &Value) -> ToolResult<Value> {
        let url = string_arg(args, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidParameters(format!(
                "'{}' is not an HTTP or HTTPS URL",
                url
            )));
        }
        let output = self
            .fetcher
            .fetch_text(url)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        Ok(json!({ "output": output }))
    }
}

fn string_arg<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("Missing '{}' parameter", key)))
}
