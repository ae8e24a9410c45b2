use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn document_type() -> String {
    "Document".to_string()
}

/// A retrieved document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub page_content: String,
    #[serde(rename = "type", default = "document_type")]
    pub kind: String,
}

impl Document {
    pub fn new<S: Into<String>>(page_content: S) -> Self {
        Self {
            id: None,
            metadata: Map::new(),
            page_content: page_content.into(),
            kind: document_type(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Structural mapping of the document, as forwarded inside tool results
    pub fn to_mapping(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "metadata": self.metadata,
            "page_content": self.page_content,
            "type": self.kind,
        })
    }
}
