// ⚙️ Configuration - TOML file, then environment, then CLI flags
//
// Every field has a default, so an empty (or absent) file is valid.
// validate() runs before the first entry is processed; a failure there is
// the only way a run aborts.

use crate::error::ConfigError;
use crate::graph::Namespaces;
use crate::matcher::{LexicalMatcher, Matcher, MAX_CANDIDATES};
use crate::taxonomy::DEFAULT_MAX_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_LLM_ENDPOINT: &str = "LLM_ENDPOINT";
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";
pub const ENV_LLM_DEPLOYMENT: &str = "LLM_DEPLOYMENT";
pub const ENV_LLM_API_VERSION: &str = "LLM_API_VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Lexical,
    Llm,
}

impl std::str::FromStr for MatcherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lexical" => Ok(MatcherKind::Lexical),
            "llm" => Ok(MatcherKind::Llm),
            other => Err(ConfigError::Invalid {
                field: "matcher",
                message: format!("unknown matcher '{}' (expected lexical or llm)", other),
            }),
        }
    }
}

// ============================================================================
// LLM SETTINGS
// ============================================================================

/// Chat-completions deployment. Secrets come from the environment only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub max_completion_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            endpoint: None,
            api_key: None,
            deployment: "gpt-5-mini".to_string(),
            api_version: "2025-04-01-preview".to_string(),
            max_completion_tokens: 500,
        }
    }
}

// ============================================================================
// ALIGN CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub matcher: MatcherKind,
    /// Candidates per entry (at most MAX_CANDIDATES)
    pub top_k: usize,
    /// Delay between matcher calls
    pub throttle_ms: u64,
    /// Per-call timeout
    pub timeout_secs: u64,
    pub workers: usize,
    pub max_depth: usize,
    /// Code prefix for the external classification ("EC00")
    pub filter: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
    pub namespaces: Namespaces,
    pub llm: LlmConfig,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            matcher: MatcherKind::Lexical,
            top_k: MAX_CANDIDATES,
            throttle_ms: 500,
            timeout_secs: 30,
            workers: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            filter: None,
            cache_path: None,
            rules_path: None,
            namespaces: Namespaces::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AlignConfig {
    /// Defaults, overlaid by the TOML file (when given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).with_context(|| format!("Failed to read config: {:?}", p))?;
                let config = Self::from_toml_str(&content).with_context(|| format!("Invalid config file: {:?}", p))?;
                info!("loaded configuration from {:?}", p);
                config
            }
            None => AlignConfig::default(),
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay LLM settings from a variable lookup (empty values are ignored)
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_LLM_ENDPOINT) {
            self.llm.endpoint = Some(v);
        }
        if let Some(v) = get(ENV_LLM_API_KEY) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get(ENV_LLM_DEPLOYMENT) {
            self.llm.deployment = v;
        }
        if let Some(v) = get(ENV_LLM_API_VERSION) {
            self.llm.api_version = v;
        }
    }

    /// Requested top-k, capped at MAX_CANDIDATES
    pub fn effective_top_k(&self) -> usize {
        if self.top_k > MAX_CANDIDATES {
            warn!(requested = self.top_k, "top_k capped at {}", MAX_CANDIDATES);
        }
        self.top_k.min(MAX_CANDIDATES)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "top_k",
                message: "must be at least 1".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_depth",
                message: "must be at least 1".to_string(),
            });
        }

        if self.matcher == MatcherKind::Llm {
            if self.llm.endpoint.is_none() {
                return Err(ConfigError::MissingCredential(ENV_LLM_ENDPOINT));
            }
            if self.llm.api_key.is_none() {
                return Err(ConfigError::MissingCredential(ENV_LLM_API_KEY));
            }
            if cfg!(not(feature = "remote")) {
                return Err(ConfigError::Unavailable("llm".to_string()));
            }
        }

        Ok(())
    }

    /// Construct the configured matcher (validates first)
    pub fn build_matcher(&self) -> Result<Box<dyn Matcher>> {
        self.validate()?;

        match self.matcher {
            MatcherKind::Lexical => {
                let matcher = match &self.rules_path {
                    Some(path) => LexicalMatcher::from_file(path)?,
                    None => LexicalMatcher::new(),
                };
                info!(rules = matcher.rule_count(), "using lexical matcher");
                Ok(Box::new(matcher))
            }
            #[cfg(feature = "remote")]
            MatcherKind::Llm => {
                let matcher = crate::matcher::LlmMatcher::new(&self.llm, self.timeout())?;
                info!(deployment = %self.llm.deployment, "using LLM matcher");
                Ok(Box::new(matcher))
            }
            #[cfg(not(feature = "remote"))]
            MatcherKind::Llm => Err(ConfigError::Unavailable("llm".to_string()).into()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AlignConfig::default();
        assert_eq!(config.matcher, MatcherKind::Lexical);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.throttle(), Duration::from_millis(500));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.workers, 1);
        assert_eq!(config.llm.deployment, "gpt-5-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AlignConfig::from_toml_str(
            r#"
            matcher = "llm"
            top_k = 25
            workers = 4

            [namespaces]
            category_ns = "https://example.org/cat/"

            [llm]
            deployment = "my-deployment"
            "#,
        )
        .unwrap();

        assert_eq!(config.matcher, MatcherKind::Llm);
        assert_eq!(config.effective_top_k(), 10);
        assert_eq!(config.workers, 4);
        assert_eq!(config.throttle_ms, 500);
        assert_eq!(config.namespaces.category_ns, "https://example.org/cat/");
        assert_eq!(config.namespaces.class_ns, "https://oekobaudat.de/class/");
        assert_eq!(config.llm.deployment, "my-deployment");
        assert_eq!(config.llm.api_version, "2025-04-01-preview");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_LLM_ENDPOINT, "https://llm.example.org"),
            (ENV_LLM_API_KEY, "secret"),
            (ENV_LLM_DEPLOYMENT, ""),
        ]
        .into_iter()
        .collect();

        let mut config = AlignConfig::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.endpoint.as_deref(), Some("https://llm.example.org"));
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        // Empty value ignored
        assert_eq!(config.llm.deployment, "gpt-5-mini");
    }

    #[test]
    fn test_llm_requires_credentials() {
        let mut config = AlignConfig {
            matcher: MatcherKind::Llm,
            ..AlignConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingCredential(ENV_LLM_ENDPOINT)));

        config.llm.endpoint = Some("https://llm.example.org".to_string());
        assert_eq!(config.validate(), Err(ConfigError::MissingCredential(ENV_LLM_API_KEY)));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let zero_workers = AlignConfig { workers: 0, ..AlignConfig::default() };
        assert!(matches!(zero_workers.validate(), Err(ConfigError::Invalid { field: "workers", .. })));

        let zero_timeout = AlignConfig { timeout_secs: 0, ..AlignConfig::default() };
        assert!(matches!(zero_timeout.validate(), Err(ConfigError::Invalid { field: "timeout_secs", .. })));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = AlignConfig::default();
        config.llm.api_key = Some("secret".to_string());
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_matcher_kind_from_str() {
        assert_eq!("LLM".parse::<MatcherKind>(), Ok(MatcherKind::Llm));
        assert!("fuzzy".parse::<MatcherKind>().is_err());
    }

    #[test]
    fn test_build_lexical_matcher() {
        let matcher = AlignConfig::default().build_matcher().unwrap();
        assert_eq!(matcher.method(), "lexical");
    }
}
