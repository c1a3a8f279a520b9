use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{CandidateItem, IntentAnalysis, Recommendation},
    services::{
        llm::{ChatMessage, LlmClient},
        reply::parse_reply,
    },
};

const RANKING_TEMPERATURE: f32 = 0.5;
/// Only this many candidates are shown to the model
pub const MAX_PRESENTED_CANDIDATES: usize = 20;
const DEFAULT_SCORE: u8 = 7;

fn system_prompt(top_k: usize) -> String {
    format!(
        r#"你是一个专业的阅读推荐专家。请根据用户画像和需求，从候选项中选择最合适的{top_k}个推荐。

对每个推荐，请提供：
1. 推荐理由（为什么适合这个用户）
2. 内容亮点（这本书/文章的特色）
3. 适合场景（什么时候读）
4. 评分（1-10分）

请以JSON数组格式返回，每个推荐包含：
- index: 候选项序号（从1开始）
- title: 标题
- reason: 推荐理由
- highlights: 内容亮点
- scenario: 适合场景
- score: 评分（1-10）

例如：
[
  {{
    "index": 1,
    "title": "书名",
    "reason": "推荐理由...",
    "highlights": "内容亮点...",
    "scenario": "适合场景...",
    "score": 9
  }}
]"#
    )
}

fn describe_candidates(candidates: &[CandidateItem]) -> String {
    candidates
        .iter()
        .take(MAX_PRESENTED_CANDIDATES)
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[{}] 标题: {}\n作者: {}\n描述: {}\n来源: {}",
                i + 1,
                item.title,
                item.author,
                item.description,
                item.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One selection in the model's reply
#[derive(Debug, Deserialize)]
struct RankedPick {
    #[serde(default, deserialize_with = "lenient_integer")]
    index: Option<i64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    highlights: Option<String>,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default, deserialize_with = "lenient_integer")]
    score: Option<i64>,
}

fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts a bare array or an object wrapping one under `recommendations`
fn picks_from_reply(reply: &str) -> AppResult<Vec<RankedPick>> {
    let value: Value = parse_reply(reply)?;
    let array = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("recommendations")
            .filter(Value::is_array)
            .ok_or_else(|| AppError::Parse("expected a JSON array of picks".to_string()))?,
        _ => return Err(AppError::Parse("expected a JSON array of picks".to_string())),
    };

    serde_json::from_value(array).map_err(|e| AppError::Parse(e.to_string()))
}

/// Maps 1-based picks back onto candidates.
///
/// Out-of-range, missing and repeated indices are dropped.
fn merge_picks(
    picks: Vec<RankedPick>,
    candidates: &[CandidateItem],
    top_k: usize,
) -> Vec<Recommendation> {
    let mut seen = HashSet::new();

    picks
        .into_iter()
        .filter_map(|pick| {
            let position = usize::try_from(pick.index?).ok()?.checked_sub(1)?;
            let item = candidates.get(position)?;
            seen.insert(position).then(|| Recommendation {
                item: item.clone(),
                reason: Some(pick.reason.unwrap_or_default()),
                highlights: Some(pick.highlights.unwrap_or_default()),
                scenario: Some(pick.scenario.unwrap_or_default()),
                score: Some(
                    pick.score
                        .map(|s| s.clamp(1, 10) as u8)
                        .unwrap_or(DEFAULT_SCORE),
                ),
            })
        })
        .take(top_k)
        .collect()
}

fn unannotated(candidates: &[CandidateItem], top_k: usize) -> Vec<Recommendation> {
    candidates
        .iter()
        .take(top_k)
        .cloned()
        .map(Recommendation::from)
        .collect()
}

/// Selects and annotates the best candidates with the LLM
#[derive(Clone)]
pub struct Ranker {
    llm: Arc<dyn LlmClient>,
}

impl Ranker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Picks up to `top_k` candidates.
    ///
    /// When the model fails or its reply is unusable, the first `top_k` candidates
    /// are returned without annotations.
    pub async fn select(
        &self,
        profile_summary: &str,
        analysis: &IntentAnalysis,
        candidates: &[CandidateItem],
        top_k: usize,
    ) -> Vec<Recommendation> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        match self
            .try_select(profile_summary, analysis, candidates, top_k)
            .await
        {
            Ok(recommendations) => recommendations,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    candidates = candidates.len(),
                    "Ranking failed, returning candidates in retrieval order"
                );
                unannotated(candidates, top_k)
            }
        }
    }

    pub async fn try_select(
        &self,
        profile_summary: &str,
        analysis: &IntentAnalysis,
        candidates: &[CandidateItem],
        top_k: usize,
    ) -> AppResult<Vec<Recommendation>> {
        let analysis_json = serde_json::to_string_pretty(analysis)?;
        let user_message = format!(
            "用户画像：\n{}\n\n用户需求分析：\n{}\n\n候选项列表：\n{}\n\n请选择最合适的{}个推荐并返回JSON格式结果。",
            profile_summary,
            analysis_json,
            describe_candidates(candidates),
            top_k
        );

        let messages = vec![
            ChatMessage::system(system_prompt(top_k)),
            ChatMessage::user(user_message),
        ];

        let reply = self.llm.complete(messages, RANKING_TEMPERATURE).await?;
        let picks = picks_from_reply(&reply)?;
        let pick_count = picks.len();
        let recommendations = merge_picks(picks, candidates, top_k);

        if recommendations.len() < pick_count.min(top_k) {
            tracing::debug!(
                picks = pick_count,
                kept = recommendations.len(),
                "Dropped picks with unusable indices"
            );
        }

        Ok(recommendations)
    }
}
