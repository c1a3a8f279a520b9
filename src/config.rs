use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// API key for the OpenAI-compatible completion endpoint
    pub openai_api_key: String,

    /// Base URL of the completion API (without `/chat/completions`)
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,

    /// Model name sent with every completion request
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Directory holding one JSON document per user
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Deadline for a single completion call
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Deadline for a single candidate retrieval
    #[serde(default = "default_retrieval_timeout_secs")]
    pub retrieval_timeout_secs: u64,

    /// Maximum number of profiles kept in memory
    #[serde(default = "default_profile_cache_capacity")]
    pub profile_cache_capacity: usize,

    /// Number of recommendations when the caller doesn't ask for a specific count
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/user_profiles")
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_retrieval_timeout_secs() -> u64 {
    30
}

fn default_profile_cache_capacity() -> usize {
    1024
}

fn default_top_k() -> usize {
    5
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8010
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3008".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3008".to_string(),
    ]
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Load configuration from an explicit set of key/value pairs
    pub fn from_iter<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        if config.openai_api_key.trim().is_empty() {
            anyhow::bail!("Failed to load config: OPENAI_API_KEY is empty");
        }

        Ok(config)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_iter(vars(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.openai_api_base, "https://api.openai.com/v1");
        assert_eq!(config.openai_model, "gpt-4.1-mini");
        assert_eq!(config.data_dir, PathBuf::from("data/user_profiles"));
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.bind_address(), "0.0.0.0:8010");
        assert_eq!(config.cors_origins.len(), 3);
        assert_eq!(config.llm_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_iter(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "kimi-k2"),
            ("PORT", "9000"),
            ("CORS_ORIGINS", "http://a.test,http://b.test"),
            ("PROFILE_CACHE_CAPACITY", "8"),
        ]))
        .unwrap();

        assert_eq!(config.openai_model, "kimi-k2");
        assert_eq!(config.port, 9000);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.profile_cache_capacity, 8);
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        assert!(Config::from_iter(vars(&[("PORT", "9000")])).is_err());
        assert!(Config::from_iter(vars(&[("OPENAI_API_KEY", "  ")])).is_err());
    }
}
