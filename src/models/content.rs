use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::IntentAnalysis;

/// Kind of content a request asks for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Book,
    Article,
    Both,
}

impl ContentType {
    pub fn includes_books(self) -> bool {
        matches!(self, ContentType::Book | ContentType::Both)
    }

    pub fn includes_articles(self) -> bool {
        matches!(self, ContentType::Article | ContentType::Both)
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "book" => Ok(ContentType::Book),
            "article" => Ok(ContentType::Article),
            "both" => Ok(ContentType::Both),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Book => write!(f, "book"),
            ContentType::Article => write!(f, "article"),
            ContentType::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" => Ok(Language::Zh),
            "en" => Ok(Language::En),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Zh => write!(f, "zh"),
            Language::En => write!(f, "en"),
        }
    }
}

/// Kind of a single retrieved item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Book,
    Article,
}

/// Unranked record produced by a candidate source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub title: String,
    pub author: String,
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

/// A candidate annotated by the ranker
///
/// Annotations are absent when ranking fell back to the raw candidate order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    #[serde(flatten)]
    pub item: CandidateItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

impl From<CandidateItem> for Recommendation {
    fn from(item: CandidateItem) -> Self {
        Self {
            item,
            reason: None,
            highlights: None,
            scenario: None,
            score: None,
        }
    }
}

/// Terminal state reached by one recommendation request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Refused,
    NoResults,
    Ranked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub success: bool,
    pub is_related: bool,
    pub outcome: Outcome,
    pub message: String,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_analysis: Option<IntentAnalysis>,
}

impl RecommendationResult {
    pub fn refused(message: String) -> Self {
        Self {
            success: false,
            is_related: false,
            outcome: Outcome::Refused,
            message,
            recommendations: Vec::new(),
            request_analysis: None,
        }
    }

    pub fn no_results(message: String, analysis: IntentAnalysis) -> Self {
        Self {
            success: false,
            is_related: true,
            outcome: Outcome::NoResults,
            message,
            recommendations: Vec::new(),
            request_analysis: Some(analysis),
        }
    }

    pub fn ranked(
        message: String,
        recommendations: Vec<Recommendation>,
        analysis: IntentAnalysis,
    ) -> Self {
        Self {
            success: true,
            is_related: true,
            outcome: Outcome::Ranked,
            message,
            recommendations,
            request_analysis: Some(analysis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> CandidateItem {
        CandidateItem {
            title: "三体".to_string(),
            author: "刘慈欣".to_string(),
            description: "科幻".to_string(),
            url: "https://book.douban.com/subject/2567698/".to_string(),
            source: "豆瓣读书".to_string(),
            item_type: ItemType::Book,
        }
    }

    #[test]
    fn test_content_type_parsing() {
        assert_eq!("Book".parse::<ContentType>().unwrap(), ContentType::Book);
        assert_eq!(" both ".parse::<ContentType>().unwrap(), ContentType::Both);
        assert!("video".parse::<ContentType>().is_err());
        assert!(ContentType::Both.includes_books());
        assert!(!ContentType::Article.includes_books());
    }

    #[test]
    fn test_unannotated_recommendation_serializes_flat() {
        let rec = Recommendation::from(sample_item());
        let value = serde_json::to_value(&rec).unwrap();

        assert_eq!(value["title"], "三体");
        assert_eq!(value["type"], "book");
        assert!(value.get("reason").is_none());
        assert!(value.get("score").is_none());
    }

    #[test]
    fn test_refused_result_shape() {
        let result = RecommendationResult::refused("抱歉".to_string());
        assert!(!result.success);
        assert!(!result.is_related);
        assert_eq!(result.outcome, Outcome::Refused);
        assert!(result.recommendations.is_empty());
    }
}
