//! Configuration for the detection engine, its clients and the binaries

use crate::p2p::{DEFAULT_P2P_SERVICES, DEFAULT_P2P_THRESHOLD};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub detectors: DetectorConfig,
    /// SQLite file backing the account store
    pub database_path: PathBuf,
    /// Listen address for the HTTP server
    pub bind_addr: String,
    /// Serve bank data from this JSON file instead of the aggregator
    pub fixture_path: Option<PathBuf>,
}

/// Remote completion endpoint used by the suspicious payee classifier
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Bearer token; without one the rule-based classifier is used
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Extra attempts after a failed request (0 = single shot)
    pub max_retries: u32,
    /// First retry delay; doubles on every attempt
    pub retry_backoff_ms: u64,
}

/// Thresholds for the local detectors
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub p2p_threshold: f64,
    pub p2p_services: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            detectors: DetectorConfig::default(),
            database_path: PathBuf::from("fraud_scan.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            fixture_path: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "Meta-Llama-3.1-405B-Instruct".to_string(),
            timeout_secs: 30,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            p2p_threshold: DEFAULT_P2P_THRESHOLD,
            p2p_services: DEFAULT_P2P_SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

impl EngineConfig {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from JSON; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Build from defaults overridden by whatever `lookup` returns
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("LLM_API_KEY") {
            config.classifier.api_key = Some(key);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            config.classifier.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("LLM_MODEL") {
            config.classifier.model = model;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECS") {
            config.classifier.timeout_secs = parse_var("LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("LLM_MAX_RETRIES") {
            config.classifier.max_retries = parse_var("LLM_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("LLM_RETRY_BACKOFF_MS") {
            config.classifier.retry_backoff_ms = parse_var("LLM_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("P2P_THRESHOLD") {
            config.detectors.p2p_threshold = parse_var("P2P_THRESHOLD", &v)?;
        }
        if let Some(v) = get("P2P_SERVICES") {
            config.detectors.p2p_services = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(path) = get("FRAUD_SCAN_DB") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(addr) = get("FRAUD_SCAN_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(path) = get("FRAUD_SCAN_FIXTURE") {
            config.fixture_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.detectors.p2p_threshold, 100.0);
        assert_eq!(config.detectors.p2p_services.len(), 5);
        assert_eq!(config.classifier.timeout_secs, 30);
        assert_eq!(config.classifier.max_retries, 0);
        assert!(config.classifier.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("LLM_API_KEY", "secret"),
            ("LLM_BASE_URL", "http://localhost:8080/v1/"),
            ("LLM_TIMEOUT_SECS", "5"),
            ("P2P_THRESHOLD", "250.5"),
            ("P2P_SERVICES", "venmo, wise ,"),
            ("FRAUD_SCAN_FIXTURE", "mock/fraud.json"),
        ]))
        .unwrap();

        assert_eq!(config.classifier.api_key.as_deref(), Some("secret"));
        assert_eq!(config.classifier.base_url, "http://localhost:8080/v1");
        assert_eq!(config.classifier.timeout(), Duration::from_secs(5));
        assert_eq!(config.detectors.p2p_threshold, 250.5);
        assert_eq!(config.detectors.p2p_services, vec!["venmo", "wise"]);
        assert_eq!(config.fixture_path, Some(PathBuf::from("mock/fraud.json")));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = EngineConfig::from_lookup(lookup_from(&[("LLM_API_KEY", "  ")])).unwrap();
        assert!(config.classifier.api_key.is_none());
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = EngineConfig::from_lookup(lookup_from(&[("LLM_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_RETRIES"));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ClassifierConfig {
            retry_backoff_ms: 100,
            ..ClassifierConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_from_file_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"detectors": {"p2p_threshold": 42.0}, "bind_addr": "127.0.0.1:9000"}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.detectors.p2p_threshold, 42.0);
        assert_eq!(config.detectors.p2p_services.len(), 5);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.classifier.model, "Meta-Llama-3.1-405B-Instruct");
    }
}
