use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::instrument;

use crate::{
    db::ProfileStore,
    error::{AppError, AppResult},
    models::{
        CandidateItem, IntentAnalysis, Preferences, ProfileView, RecommendationResult,
    },
    services::{
        intent::IntentAnalyzer,
        llm::LlmClient,
        messages,
        ranker::{Ranker, MAX_PRESENTED_CANDIDATES},
        sources::CandidateSource,
    },
};

/// Largest number of recommendations a caller may ask for
pub const MAX_TOP_K: usize = MAX_PRESENTED_CANDIDATES;

/// Runs the per-request recommendation pipeline and owns the caller-facing operations
///
/// A request moves through: count the interaction, onboard new users by extracting
/// preferences from their text, classify the intent, then either refuse, report that
/// nothing was found, or rank the retrieved candidates. Model failures degrade the
/// result instead of failing it; only storage errors and invalid input abort.
pub struct Recommender {
    store: Arc<ProfileStore>,
    analyzer: IntentAnalyzer,
    ranker: Ranker,
    source: Arc<dyn CandidateSource>,
    retrieval_timeout: Duration,
}

impl Recommender {
    pub fn new(
        store: Arc<ProfileStore>,
        llm: Arc<dyn LlmClient>,
        source: Arc<dyn CandidateSource>,
        retrieval_timeout: Duration,
    ) -> Self {
        Self {
            store,
            analyzer: IntentAnalyzer::new(llm.clone()),
            ranker: Ranker::new(llm),
            source,
            retrieval_timeout,
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    #[instrument(skip(self, utterance))]
    pub async fn recommend(
        &self,
        user_id: &str,
        utterance: &str,
        top_k: usize,
    ) -> AppResult<RecommendationResult> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(AppError::Validation("消息不能为空".to_string()));
        }
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(AppError::Validation(format!(
                "top_k 必须在 1 到 {} 之间",
                MAX_TOP_K
            )));
        }

        let profile = self.store.increment_interaction(user_id).await?;
        let summary = profile.summary();

        if profile.is_new_user() {
            let extracted = self.analyzer.extract_preferences(utterance).await;
            if !extracted.is_empty() {
                self.store.merge_extracted(user_id, &extracted).await?;
                tracing::info!(
                    genres = extracted.genres.len(),
                    topics = extracted.topics.len(),
                    authors = extracted.authors.len(),
                    "Merged onboarding preferences"
                );
            }
        }

        let analysis = self.analyzer.analyze(utterance, &summary).await;

        if !analysis.is_related {
            let message = analysis
                .refusal_message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| messages::REFUSAL_FALLBACK.to_string());
            tracing::info!("Request refused as unrelated to reading");
            return Ok(RecommendationResult::refused(message));
        }

        let query = analysis.search_query(utterance);
        let candidates = self.fetch_candidates(&query, &analysis).await;

        if candidates.is_empty() {
            tracing::info!(query = %query, "No candidates found");
            return Ok(RecommendationResult::no_results(
                messages::NO_RESULTS.to_string(),
                analysis,
            ));
        }

        let summary = self.store.summarize(user_id).await?;
        let recommendations = self
            .ranker
            .select(&summary, &analysis, &candidates, top_k)
            .await;

        tracing::info!(
            candidates = candidates.len(),
            recommendations = recommendations.len(),
            "Recommendation request completed"
        );

        Ok(RecommendationResult::ranked(
            messages::ranked_message(recommendations.len()),
            recommendations,
            analysis,
        ))
    }

    /// Retrieval failures and timeouts count as "nothing found"
    async fn fetch_candidates(&self, query: &str, analysis: &IntentAnalysis) -> Vec<CandidateItem> {
        let fetch = self
            .source
            .fetch(query, analysis.content_type, analysis.language);

        match tokio::time::timeout(self.retrieval_timeout, fetch).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, query = %query, "Candidate retrieval failed");
                Vec::new()
            }
            Err(_) => {
                let e = AppError::Timeout(self.retrieval_timeout.as_secs());
                tracing::warn!(error = %e, query = %query, "Candidate retrieval timed out");
                Vec::new()
            }
        }
    }

    pub async fn feedback(
        &self,
        user_id: &str,
        item_id: &str,
        liked: bool,
        item_info: Option<Map<String, Value>>,
    ) -> AppResult<()> {
        self.store
            .add_feedback(user_id, item_id, liked, item_info)
            .await
    }

    pub async fn profile(&self, user_id: &str) -> AppResult<ProfileView> {
        self.store.profile_view(user_id).await
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        fields: Map<String, Value>,
    ) -> AppResult<Preferences> {
        self.store.update_preferences(user_id, fields).await
    }

    pub async fn summary(&self, user_id: &str) -> AppResult<String> {
        self.store.summarize(user_id).await
    }

    pub async fn add_reading_history(
        &self,
        user_id: &str,
        item: Map<String, Value>,
    ) -> AppResult<()> {
        self.store.add_reading_history(user_id, item).await
    }

    pub async fn welcome(&self, user_id: &str) -> AppResult<String> {
        let profile = self.store.load(user_id).await?;
        Ok(messages::welcome(&profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, ItemType, Language, Outcome};
    use crate::services::llm::{ChatMessage, MockLlmClient};
    use crate::services::sources::MockCandidateSource;
    use tempfile::TempDir;

    const RELATED: &str = r#"{"is_related": true, "topics": ["机器学习"], "content_type": "book", "language": "zh"}"#;
    const UNRELATED: &str = r#"{"is_related": false, "refusal_message": "抱歉，我只聊阅读。"}"#;
    const EXTRACTED: &str = r#"{"genres": ["科普"], "topics": ["机器学习"], "authors": [], "reading_level": "beginner"}"#;
    const RANKED: &str = r#"[{"index": 2, "reason": "入门友好", "highlights": "实践", "scenario": "晚上", "score": 9}, {"index": 9}]"#;

    fn is_intent(messages: &[ChatMessage]) -> bool {
        messages[0].content.contains("灵魂伴侣")
    }

    fn is_extraction(messages: &[ChatMessage]) -> bool {
        messages[0].content.starts_with("分析对话历史")
    }

    /// LLM double answering each of the three prompts with a fixed reply
    fn scripted_llm(intent: &'static str, extraction: &'static str, ranking: &'static str) -> MockLlmClient {
        let mut llm = MockLlmClient::new();
        llm.expect_complete().returning(move |messages, _| {
            let reply = if is_intent(&messages) {
                intent
            } else if is_extraction(&messages) {
                extraction
            } else {
                ranking
            };
            Ok(reply.to_string())
        });
        llm
    }

    fn candidates() -> Vec<CandidateItem> {
        ["机器学习", "Python机器学习", "统计学习方法"]
            .iter()
            .map(|title| CandidateItem {
                title: title.to_string(),
                author: "作者".to_string(),
                description: "描述".to_string(),
                url: "https://book.douban.com/".to_string(),
                source: "豆瓣读书".to_string(),
                item_type: ItemType::Book,
            })
            .collect()
    }

    async fn create_recommender(
        llm: MockLlmClient,
        source: MockCandidateSource,
    ) -> (Recommender, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::open(dir.path(), 16).await.unwrap();
        let recommender = Recommender::new(
            Arc::new(store),
            Arc::new(llm),
            Arc::new(source),
            Duration::from_secs(5),
        );
        (recommender, dir)
    }

    fn source_returning(items: Vec<CandidateItem>) -> MockCandidateSource {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch()
            .times(1)
            .returning(move |_, _, _| Ok(items.clone()));
        source
    }

    #[tokio::test]
    async fn test_ranked_flow() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch()
            .withf(|query, content_type, language| {
                query.to_string() == "机器学习" && *content_type == ContentType::Book && *language == Language::Zh
            })
            .times(1)
            .returning(|_, _, _| Ok(candidates()));

        let (recommender, _dir) =
            create_recommender(scripted_llm(RELATED, EXTRACTED, RANKED), source).await;

        let result = recommender
            .recommend("alice", "我想学习机器学习，有什么适合初学者的书？", 5)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.outcome, Outcome::Ranked);
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].item.title, "Python机器学习");
        assert_eq!(result.message, "根据你的需求，我为你精心挑选了1个推荐：");
        assert!(result.request_analysis.is_some());

        let profile = recommender.store().load("alice").await.unwrap();
        assert_eq!(profile.interaction_count, 1);
        assert_eq!(profile.preferences.genres, vec!["科普"]);
    }

    #[tokio::test]
    async fn test_unrelated_request_never_retrieves() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch().never();

        let mut llm = MockLlmClient::new();
        llm.expect_complete().returning(|messages, _| {
            assert!(
                !messages[0].content.contains("专业的阅读推荐专家"),
                "ranker must not be called"
            );
            let reply = if is_intent(&messages) { UNRELATED } else { "{}" };
            Ok(reply.to_string())
        });

        let (recommender, _dir) = create_recommender(llm, source).await;
        let result = recommender
            .recommend("alice", "今天天气怎么样？", 5)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(!result.is_related);
        assert_eq!(result.outcome, Outcome::Refused);
        assert_eq!(result.message, "抱歉，我只聊阅读。");
        assert!(result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_refusal_fallback_message() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch().never();

        let (recommender, _dir) = create_recommender(
            scripted_llm(r#"{"is_related": false}"#, "{}", "[]"),
            source,
        )
        .await;

        let result = recommender.recommend("alice", "写首诗", 5).await.unwrap();
        assert_eq!(result.message, messages::REFUSAL_FALLBACK);
    }

    #[tokio::test]
    async fn test_empty_candidates_is_no_results() {
        let (recommender, _dir) = create_recommender(
            scripted_llm(RELATED, EXTRACTED, RANKED),
            source_returning(Vec::new()),
        )
        .await;

        let result = recommender
            .recommend("alice", "机器学习", 5)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.is_related);
        assert_eq!(result.outcome, Outcome::NoResults);
        assert_eq!(result.message, messages::NO_RESULTS);
        assert!(result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_error_degrades_to_no_results() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch()
            .returning(|_, _, _| Err(AppError::Collaborator("search down".to_string())));

        let (recommender, _dir) =
            create_recommender(scripted_llm(RELATED, EXTRACTED, RANKED), source).await;

        let result = recommender.recommend("alice", "机器学习", 5).await.unwrap();
        assert_eq!(result.outcome, Outcome::NoResults);
    }

    #[tokio::test]
    async fn test_malformed_intent_fails_open_with_raw_query() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch()
            .withf(|query, content_type, _| {
                query.to_string() == "随便推荐点什么" && *content_type == ContentType::Book
            })
            .times(1)
            .returning(|_, _, _| Ok(candidates()));

        let (recommender, _dir) = create_recommender(
            scripted_llm("我不确定", "也不是JSON", "还不是JSON"),
            source,
        )
        .await;

        let result = recommender
            .recommend("alice", "随便推荐点什么", 2)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.recommendations.len(), 2);
        assert!(result.recommendations[0].reason.is_none());
    }

    #[tokio::test]
    async fn test_extraction_stops_after_third_interaction() {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .withf(|messages, _| is_extraction(messages))
            .times(2)
            .returning(|_, _| Ok(EXTRACTED.to_string()));
        llm.expect_complete()
            .withf(|messages, _| !is_extraction(messages))
            .returning(|messages, _| {
                let reply = if is_intent(&messages) { RELATED } else { RANKED };
                Ok(reply.to_string())
            });

        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch()
            .times(4)
            .returning(|_, _, _| Ok(candidates()));

        let (recommender, _dir) = create_recommender(llm, source).await;
        for _ in 0..4 {
            recommender.recommend("alice", "机器学习", 3).await.unwrap();
        }

        let profile = recommender.store().load("alice").await.unwrap();
        assert_eq!(profile.interaction_count, 4);
    }

    #[tokio::test]
    async fn test_intent_sees_summary_from_before_onboarding() {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .withf(|messages, _| is_extraction(messages))
            .returning(|_, _| Ok(EXTRACTED.to_string()));
        llm.expect_complete()
            .withf(|messages, _| is_intent(messages))
            .times(1)
            .returning(|messages, _| {
                assert!(messages[1].content.contains("新用户，暂无偏好信息"));
                Ok(UNRELATED.to_string())
            });

        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");

        let (recommender, _dir) = create_recommender(llm, source).await;
        recommender.recommend("alice", "我喜欢科普", 5).await.unwrap();

        let summary = recommender.summary("alice").await.unwrap();
        assert!(summary.contains("喜欢的类型: 科普"));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_counting() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch().never();
        let mut llm = MockLlmClient::new();
        llm.expect_complete().never();

        let (recommender, _dir) = create_recommender(llm, source).await;

        let result = recommender.recommend("alice", "   ", 5).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        let result = recommender.recommend("alice", "小说", 0).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let profile = recommender.store().load("alice").await.unwrap();
        assert_eq!(profile.interaction_count, 0);
    }

    #[tokio::test]
    async fn test_feedback_independent_of_requests() {
        let mut source = MockCandidateSource::new();
        source.expect_name().return_const("mock");
        let (recommender, _dir) = create_recommender(MockLlmClient::new(), source).await;

        let info = serde_json::json!({ "title": "三体" }).as_object().cloned();
        recommender.feedback("bob", "book_1", true, info).await.unwrap();
        recommender.feedback("bob", "book_1", false, None).await.unwrap();

        let view = recommender.profile("bob").await.unwrap();
        assert!(view.liked_items.is_empty());
        assert_eq!(view.disliked_items.len(), 1);
        assert_eq!(view.interaction_count, 0);
    }
}
