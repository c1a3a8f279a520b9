/// Candidate retrieval abstraction
///
/// Sources turn a free-text query into unranked books and articles. The orchestrator
/// treats them as opaque: no ordering is assumed and an empty list simply means
/// nothing matched.
use crate::{
    error::AppResult,
    models::{CandidateItem, ContentType, Language},
};

pub mod static_catalog;

pub use static_catalog::StaticCatalog;

/// Trait for candidate retrieval backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch candidates for `query`, restricted to `content_type` and preferring `language`
    async fn fetch(
        &self,
        query: &str,
        content_type: ContentType,
        language: Language,
    ) -> AppResult<Vec<CandidateItem>>;

    /// Source name for logging and debugging
    fn name(&self) -> &'static str;
}
