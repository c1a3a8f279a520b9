use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use super::{ContentType, Language, ReadingLevel};

/// Structured reading of one user utterance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentAnalysis {
    #[serde(default = "default_true", deserialize_with = "lenient_flag")]
    pub is_related: bool,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub topics: Vec<String>,
    #[serde(default = "default_content_type", deserialize_with = "lenient_content_type")]
    pub content_type: ContentType,
    #[serde(default, deserialize_with = "lenient_option")]
    pub purpose: Option<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub level: Option<ReadingLevel>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub mood: Option<String>,
    #[serde(default = "default_language", deserialize_with = "lenient_language")]
    pub language: Language,
    #[serde(default, deserialize_with = "lenient_option")]
    pub refusal_message: Option<String>,
}

impl IntentAnalysis {
    /// Analysis used when the model reply can't be understood.
    ///
    /// Treats the request as on-topic so the user still gets a recommendation pass.
    pub fn fail_open() -> Self {
        Self {
            is_related: true,
            topics: Vec::new(),
            content_type: ContentType::Book,
            purpose: Some("general".to_string()),
            level: Some(ReadingLevel::Intermediate),
            mood: Some("neutral".to_string()),
            language: Language::Zh,
            refusal_message: None,
        }
    }

    /// Retrieval query: extracted topics, or the raw utterance when none were found
    pub fn search_query(&self, utterance: &str) -> String {
        let joined = self
            .topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            utterance.to_string()
        } else {
            joined
        }
    }
}

/// Preferences the model pulled out of a new user's free text
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedPreferences {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub topics: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub reading_level: Option<ReadingLevel>,
}

impl ExtractedPreferences {
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
            && self.topics.is_empty()
            && self.authors.is_empty()
            && self.reading_level.is_none()
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> ContentType {
    ContentType::Both
}

fn default_language() -> Language {
    Language::Zh
}

// Model replies are loosely typed: nulls, unknown enum spellings and stray
// non-string list members fall back to defaults instead of failing the parse.

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(values) => values,
        single @ serde_json::Value::String(_) => vec![single],
        _ => Vec::new(),
    };

    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect())
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_str().and_then(|s| s.parse().ok()))
}

/// `true`/`false` as booleans or strings; anything else counts as related
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(flag) => flag,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_else(|_| default_true()),
        _ => default_true(),
    })
}

fn lenient_content_type<'de, D>(deserializer: D) -> Result<ContentType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_option(deserializer)?.unwrap_or_else(default_content_type))
}

fn lenient_language<'de, D>(deserializer: D) -> Result<Language, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_option(deserializer)?.unwrap_or_else(default_language))
}
