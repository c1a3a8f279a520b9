use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{ExtractedPreferences, IntentAnalysis},
    services::{
        llm::{ChatMessage, LlmClient},
        reply::parse_reply,
    },
};

const INTENT_TEMPERATURE: f32 = 0.3;
const EXTRACTION_TEMPERATURE: f32 = 0.3;

const INTENT_SYSTEM_PROMPT: &str = r#"你是一个名为"灵魂伴侣"的专业阅读推荐Agent。你的核心职责是根据用户的需求和喜好推荐好书和好文章。

你的角色属性：
1. 专注性：你只回答与书籍、文章、阅读、文学、学术资料和知识探索相关的问题。
2. 引导性：如果用户的问题与阅读无关，你应该礼貌地拒绝，并引导用户回到阅读话题上。
3. 深度：你对书籍和文章有深刻的见解，推荐理由应体现出对内容的理解。

任务：
请分析用户的需求，首先判断该需求是否与阅读/书籍/文章相关。
如果相关，提取以下信息并返回JSON。
如果不相关，请在JSON中将 "is_related" 设为 false，并提供一段礼貌的拒绝话术。

返回JSON格式：
{
  "is_related": true,
  "topics": ["关键词"],
  "content_type": "book/article/both",
  "purpose": "learning/entertainment/etc",
  "level": "beginner/intermediate/advanced",
  "mood": "情感倾向",
  "language": "zh/en",
  "refusal_message": null
}

如果不相关：
{
  "is_related": false,
  "refusal_message": "抱歉，作为您的'灵魂伴侣'阅读助手，我专注于为您发现好书和好文章。关于[用户话题]的问题，我可能无法为您提供专业的建议。不如我们聊聊您最近想读什么类型的书？"
}"#;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"分析对话历史，提取用户的阅读偏好信息。

请提取：
1. genres: 喜欢的类型列表
2. topics: 感兴趣的主题列表
3. authors: 喜欢的作者列表
4. reading_level: 阅读水平（beginner/intermediate/advanced）

返回JSON格式：
{
  "genres": ["科幻", "推理"],
  "topics": ["人工智能", "心理学"],
  "authors": ["刘慈欣"],
  "reading_level": "intermediate"
}"#;

/// Classifies utterances and pulls preferences out of free text via the LLM
#[derive(Clone)]
pub struct IntentAnalyzer {
    llm: Arc<dyn LlmClient>,
}

impl IntentAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classifies the utterance, falling back to [`IntentAnalysis::fail_open`]
    /// when the model can't be reached or its reply can't be parsed.
    pub async fn analyze(&self, utterance: &str, profile_summary: &str) -> IntentAnalysis {
        match self.try_analyze(utterance, profile_summary).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "Intent analysis failed, treating request as on-topic");
                IntentAnalysis::fail_open()
            }
        }
    }

    pub async fn try_analyze(
        &self,
        utterance: &str,
        profile_summary: &str,
    ) -> AppResult<IntentAnalysis> {
        let user_message = format!(
            "用户画像：\n{}\n\n用户请求：\n{}\n\n请分析并返回JSON格式的结果。",
            profile_summary, utterance
        );

        let messages = vec![
            ChatMessage::system(INTENT_SYSTEM_PROMPT),
            ChatMessage::user(user_message),
        ];

        let reply = self.llm.complete(messages, INTENT_TEMPERATURE).await?;
        let analysis: IntentAnalysis = parse_reply(&reply)?;

        tracing::debug!(
            is_related = analysis.is_related,
            topics = ?analysis.topics,
            content_type = %analysis.content_type,
            language = %analysis.language,
            "Intent classified"
        );

        Ok(analysis)
    }

    /// Best-effort preference extraction; any failure yields empty preferences
    pub async fn extract_preferences(&self, text: &str) -> ExtractedPreferences {
        match self.try_extract_preferences(text).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(error = %e, "Preference extraction failed");
                ExtractedPreferences::default()
            }
        }
    }

    pub async fn try_extract_preferences(&self, text: &str) -> AppResult<ExtractedPreferences> {
        let messages = vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(format!("对话历史：\n{}", text)),
        ];

        let reply = self.llm.complete(messages, EXTRACTION_TEMPERATURE).await?;
        parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{ContentType, Language, ReadingLevel};
    use crate::services::llm::MockLlmClient;

    fn analyzer_replying(reply: &'static str) -> IntentAnalyzer {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .times(1)
            .returning(move |_, _| Ok(reply.to_string()));
        IntentAnalyzer::new(Arc::new(llm))
    }

    #[tokio::test]
    async fn test_analyze_fenced_reply() {
        let analyzer = analyzer_replying(
            "```json\n{\"is_related\": true, \"topics\": [\"心理学\"], \"content_type\": \"article\", \"language\": \"en\"}\n```",
        );

        let analysis = analyzer.analyze("有关于心理学的好文章吗？", "新用户，暂无偏好信息").await;
        assert!(analysis.is_related);
        assert_eq!(analysis.topics, vec!["心理学"]);
        assert_eq!(analysis.content_type, ContentType::Article);
        assert_eq!(analysis.language, Language::En);
    }

    #[tokio::test]
    async fn test_analyze_sends_profile_and_utterance() {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .withf(|messages, temperature| {
                messages.len() == 2
                    && messages[0].role == "system"
                    && messages[0].content.contains("灵魂伴侣")
                    && messages[1].content.contains("喜欢的类型: 科幻")
                    && messages[1].content.contains("推荐一些小说")
                    && (*temperature - 0.3).abs() < f32::EPSILON
            })
            .times(1)
            .returning(|_, _| Ok(r#"{"is_related": true}"#.to_string()));

        let analyzer = IntentAnalyzer::new(Arc::new(llm));
        analyzer
            .try_analyze("推荐一些小说", "喜欢的类型: 科幻")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_analyze_fails_open_on_garbage() {
        let analyzer = analyzer_replying("我觉得你应该读点书。");
        let analysis = analyzer.analyze("随便", "").await;
        assert_eq!(analysis, IntentAnalysis::fail_open());
        assert_eq!(analysis.content_type, ContentType::Book);
        assert_eq!(analysis.language, Language::Zh);
    }

    #[tokio::test]
    async fn test_analyze_fails_open_on_collaborator_error() {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .returning(|_, _| Err(AppError::Timeout(60)));

        let analyzer = IntentAnalyzer::new(Arc::new(llm));
        let analysis = analyzer.analyze("推荐书", "").await;
        assert!(analysis.is_related);
        assert!(analysis.topics.is_empty());
    }

    #[tokio::test]
    async fn test_extract_preferences() {
        let analyzer = analyzer_replying(
            r#"{"genres": ["科幻"], "topics": ["人工智能"], "authors": ["刘慈欣"], "reading_level": "beginner"}"#,
        );

        let prefs = analyzer.extract_preferences("我喜欢刘慈欣的科幻小说").await;
        assert_eq!(prefs.genres, vec!["科幻"]);
        assert_eq!(prefs.authors, vec!["刘慈欣"]);
        assert_eq!(prefs.reading_level, Some(ReadingLevel::Beginner));
    }

    #[tokio::test]
    async fn test_extract_preferences_fails_soft() {
        let analyzer = analyzer_replying("not json");
        assert!(analyzer.extract_preferences("hello").await.is_empty());
    }
}
