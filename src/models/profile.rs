use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt::Display, str::FromStr};

use super::{ContentType, Language};

/// Users with fewer interactions than this still get onboarding extraction
pub const NEW_USER_THRESHOLD: u64 = 3;

/// Summary returned when nothing is known about the user yet
pub const NEW_USER_SUMMARY: &str = "新用户，暂无偏好信息";

const SUMMARY_LIKED_TITLES: usize = 5;
const VIEW_FEEDBACK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Display for ReadingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            ReadingLevel::Beginner => "beginner",
            ReadingLevel::Intermediate => "intermediate",
            ReadingLevel::Advanced => "advanced",
        };
        write!(f, "{}", level)
    }
}

impl FromStr for ReadingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(ReadingLevel::Beginner),
            "intermediate" => Ok(ReadingLevel::Intermediate),
            "advanced" => Ok(ReadingLevel::Advanced),
            other => Err(format!("unknown reading level: {}", other)),
        }
    }
}

/// Reading preferences of a single user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    pub genres: Vec<String>,
    pub topics: Vec<String>,
    pub authors: Vec<String>,
    pub reading_level: ReadingLevel,
    pub content_types: Vec<ContentType>,
    pub languages: Vec<Language>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            genres: Vec::new(),
            topics: Vec::new(),
            authors: Vec::new(),
            reading_level: ReadingLevel::Intermediate,
            content_types: vec![ContentType::Book, ContentType::Article],
            languages: vec![Language::Zh, Language::En],
        }
    }
}

/// Outcome of applying one field of a partial preference update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Applied,
    Unrecognized,
    Malformed,
}

impl Preferences {
    /// Overwrites the preference named `key` with `value`.
    ///
    /// Unknown keys and values of the wrong shape leave the preferences untouched.
    pub fn apply_field(&mut self, key: &str, value: Value) -> FieldUpdate {
        fn set<T: serde::de::DeserializeOwned>(slot: &mut T, value: Value) -> FieldUpdate {
            match serde_json::from_value(value) {
                Ok(parsed) => {
                    *slot = parsed;
                    FieldUpdate::Applied
                }
                Err(_) => FieldUpdate::Malformed,
            }
        }

        match key {
            "genres" => set(&mut self.genres, value),
            "topics" => set(&mut self.topics, value),
            "authors" => set(&mut self.authors, value),
            "content_types" => set(&mut self.content_types, value),
            "languages" => set(&mut self.languages, value),
            "reading_level" => match value.as_str().map(ReadingLevel::from_str) {
                Some(Ok(level)) => {
                    self.reading_level = level;
                    FieldUpdate::Applied
                }
                _ => FieldUpdate::Malformed,
            },
            _ => FieldUpdate::Unrecognized,
        }
    }
}

/// Stored timestamps: RFC 3339, or offset-less ISO 8601 read as UTC
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

/// A like/dislike record for one recommended item
///
/// Arbitrary item metadata (title, author, type...) is flattened next to the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
    pub item_id: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub item_info: Map<String, Value>,
}

impl FeedbackEntry {
    pub fn new(item_id: impl Into<String>, item_info: Option<Map<String, Value>>) -> Self {
        let mut item_info = item_info.unwrap_or_default();
        // The entry's own fields win over caller metadata
        item_info.remove("item_id");
        item_info.remove("timestamp");

        Self {
            item_id: item_id.into(),
            timestamp: Utc::now(),
            item_info,
        }
    }

    /// Title from the item metadata, falling back to the item id
    pub fn title(&self) -> &str {
        self.item_info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.item_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub liked: Vec<FeedbackEntry>,
    pub disliked: Vec<FeedbackEntry>,
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.disliked.is_empty()
    }
}

/// Durable per-user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    pub preferences: Preferences,
    #[serde(default)]
    pub reading_history: Vec<Map<String, Value>>,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub interaction_count: u64,
}

impl UserProfile {
    /// Creates the default profile for a user seen for the first time
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            preferences: Preferences::default(),
            reading_history: Vec::new(),
            feedback: Feedback::default(),
            interaction_count: 0,
        }
    }

    /// Refreshes `updated_at`, never moving it backwards
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    pub fn add_genre(&mut self, genre: &str) -> bool {
        insert_unique(&mut self.preferences.genres, genre)
    }

    pub fn add_topic(&mut self, topic: &str) -> bool {
        insert_unique(&mut self.preferences.topics, topic)
    }

    pub fn add_author(&mut self, author: &str) -> bool {
        insert_unique(&mut self.preferences.authors, author)
    }

    /// Records feedback, keeping an item id in at most one entry across liked/disliked.
    ///
    /// Repeating feedback for an item replaces the earlier entry and moves it to the end.
    pub fn add_feedback(&mut self, entry: FeedbackEntry, liked: bool) {
        let (target, other) = if liked {
            (&mut self.feedback.liked, &mut self.feedback.disliked)
        } else {
            (&mut self.feedback.disliked, &mut self.feedback.liked)
        };

        other.retain(|existing| existing.item_id != entry.item_id);
        target.retain(|existing| existing.item_id != entry.item_id);
        target.push(entry);
    }

    pub fn increment_interaction(&mut self) {
        self.interaction_count += 1;
    }

    pub fn add_reading_history(&mut self, mut item: Map<String, Value>) {
        item.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.reading_history.push(item);
    }

    pub fn is_new_user(&self) -> bool {
        self.interaction_count < NEW_USER_THRESHOLD
    }

    /// Deterministic digest of the profile handed to the model as context
    pub fn summary(&self) -> String {
        let prefs = &self.preferences;

        if prefs.genres.is_empty()
            && prefs.topics.is_empty()
            && prefs.authors.is_empty()
            && self.feedback.is_empty()
        {
            return NEW_USER_SUMMARY.to_string();
        }

        let mut parts = Vec::new();

        if !prefs.genres.is_empty() {
            parts.push(format!("喜欢的类型: {}", prefs.genres.join(", ")));
        }
        if !prefs.topics.is_empty() {
            parts.push(format!("感兴趣的主题: {}", prefs.topics.join(", ")));
        }
        if !prefs.authors.is_empty() {
            parts.push(format!("喜欢的作者: {}", prefs.authors.join(", ")));
        }

        parts.push(format!("阅读水平: {}", prefs.reading_level));

        if !self.feedback.liked.is_empty() {
            let skip = self
                .feedback
                .liked
                .len()
                .saturating_sub(SUMMARY_LIKED_TITLES);
            let titles: Vec<&str> = self.feedback.liked[skip..]
                .iter()
                .map(FeedbackEntry::title)
                .collect();
            parts.push(format!("最近喜欢的内容: {}", titles.join(", ")));
        }

        parts.join("\n")
    }
}

fn insert_unique(values: &mut Vec<String>, value: &str) -> bool {
    if values.iter().any(|existing| existing == value) {
        false
    } else {
        values.push(value.to_string());
        true
    }
}

/// What callers get back from a profile lookup
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileView {
    pub user_id: String,
    pub preferences: Preferences,
    pub interaction_count: u64,
    pub liked_items: Vec<FeedbackEntry>,
    pub disliked_items: Vec<FeedbackEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserProfile> for ProfileView {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            preferences: profile.preferences.clone(),
            interaction_count: profile.interaction_count,
            liked_items: most_recent(&profile.feedback.liked, VIEW_FEEDBACK_LIMIT),
            disliked_items: most_recent(&profile.feedback.disliked, VIEW_FEEDBACK_LIMIT),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

fn most_recent(entries: &[FeedbackEntry], limit: usize) -> Vec<FeedbackEntry> {
    entries[entries.len().saturating_sub(limit)..].to_vec()
}
