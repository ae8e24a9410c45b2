use std::sync::Arc;

use anyhow::Result;
use chainstream::agent::RagAgent;
use chainstream::chain::CustomChain;
use chainstream::instrumentation;
use chainstream::providers::openai::OpenAiChatModel;
use chainstream::tools::{HttpPageFetcher, InMemoryRetriever, Retriever, Toolbox};

use crate::configuration::Settings;

pub type Chain = CustomChain<RagAgent>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<Chain>,
}

impl AppState {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Wire the OpenAI model, the retrieval tools and the agent from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let model = Arc::new(OpenAiChatModel::new(settings.provider.clone().into_config())?);

        let top_k = settings.agent.top_k;
        let retriever: Arc<dyn Retriever> = match &settings.agent.documents_path {
            Some(path) => Arc::new(InMemoryRetriever::from_json_file(path, top_k)?),
            None => {
                tracing::warn!("No documents configured, retrieve_docs will find nothing");
                Arc::new(InMemoryRetriever::new(Vec::new(), top_k))
            }
        };
        let toolbox = Arc::new(Toolbox::new(retriever, Arc::new(HttpPageFetcher::new()?)));

        let agent = RagAgent::new(model, toolbox).with_config(settings.agent.agent_config()?);
        let chain = CustomChain::new(agent)
            .with_name("chainstream")
            .with_instrumentation(instrumentation::from_flag(settings.tracing.enabled));

        Ok(Self::new(chain))
    }
}
