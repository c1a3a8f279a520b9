use std::sync::Arc;

use crate::{
    config::Config,
    db::ProfileStore,
    error::AppResult,
    services::{CandidateSource, LlmClient, OpenAiClient, Recommender, StaticCatalog},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub default_top_k: usize,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(recommender: Arc<Recommender>, default_top_k: usize) -> Self {
        Self {
            recommender,
            default_top_k,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Wires the production collaborators from configuration
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let store = ProfileStore::open(&config.data_dir, config.profile_cache_capacity).await?;

        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_api_base.clone(),
            config.openai_model.clone(),
            config.llm_timeout(),
        )?);
        let source: Arc<dyn CandidateSource> = Arc::new(StaticCatalog::new());

        let recommender = Recommender::new(
            Arc::new(store),
            llm,
            source,
            config.retrieval_timeout(),
        );

        Ok(Self::new(Arc::new(recommender), config.default_top_k)
            .with_cors_origins(config.cors_origins.clone()))
    }
}
