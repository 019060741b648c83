// src/config/mod.rs
//! Typed application configuration.
//!
//! Resolution order for the file: explicit path, then `$NOVELTY_CONFIG_PATH`,
//! then `config/novelty.toml`. A missing default file means built-in defaults.
//! Environment overrides are applied after the file and validation runs last.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{AnalysisDepth, ScoreRange};
use crate::keywords::KeywordSet;
use crate::retry::RetrySpec;

pub const ENV_PATH: &str = "NOVELTY_CONFIG_PATH";
pub const DEFAULT_PATH: &str = "config/novelty.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("NOVELTY_CONFIG_PATH points to non-existent path {}", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache/novelty"),
            ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordsConfig {
    /// Candidates requested from the extractor.
    pub request_count: usize,
    /// Terms handed to the search providers.
    pub max_terms: usize,
    /// Used when extraction fails.
    pub fallback: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            request_count: 20,
            max_terms: 5,
            fallback: ["smart", "device", "technology", "innovation", "system"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base API url, e.g. `http://localhost:11434/api`. Empty = offline extractor.
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api".into(),
            model: "llama2".into(),
            temperature: 0.1,
            max_tokens: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatentsConfig {
    pub api_key: Option<String>,
    pub engine: String,
    /// Two-letter jurisdiction; empty = worldwide.
    pub country: String,
    /// Publication window in years; 0 = unbounded.
    pub years: u32,
    pub results_limit: usize,
    pub timeout_secs: u64,
}

impl Default for PatentsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine: "google_patents".into(),
            country: String::new(),
            years: 5,
            results_limit: 2,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub api_key: Option<String>,
    /// `products_services` or `general`.
    pub search_focus: String,
    pub results_limit: usize,
    pub timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            search_focus: "products_services".into(),
            results_limit: 2,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub score_min: u8,
    pub score_max: u8,
    /// Depth used when a request does not name one.
    pub depth: AnalysisDepth,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-haiku-20240307".into(),
            temperature: 0.2,
            max_tokens: 1500,
            timeout_secs: 60,
            score_min: 1,
            score_max: 10,
            depth: AnalysisDepth::Simple,
        }
    }
}

impl AnalysisConfig {
    pub fn score_range(&self) -> ScoreRange {
        ScoreRange {
            min: self.score_min,
            max: self.score_max,
        }
    }
}

/// One `[retry.<service>]` table per wrapped service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub keywords: RetrySpec,
    pub patents: RetrySpec,
    pub web: RetrySpec,
    pub analysis: RetrySpec,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            keywords: RetrySpec::new(2, 1_000, 2.0),
            patents: RetrySpec::new(3, 2_000, 2.0).with_max_delay_ms(10_000),
            web: RetrySpec::new(3, 2_000, 2.0).with_max_delay_ms(10_000),
            analysis: RetrySpec::new(2, 5_000, 2.0).with_max_delay_ms(20_000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall budget for keywords + searches. `None` = unbounded.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub keywords: KeywordsConfig,
    pub ollama: OllamaConfig,
    pub patents: PatentsConfig,
    pub web: WebConfig,
    pub analysis: AnalysisConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read the file (see module docs), apply env overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match resolve_path(explicit)? {
            Some(path) => {
                let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&data)?
            }
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment overrides. Empty values are ignored.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_str("SERPAPI_API_KEY") {
            self.patents.api_key = Some(v);
        }
        if let Some(v) = env_str("BRAVE_API_KEY") {
            self.web.api_key = Some(v);
        }
        if let Some(v) = env_str("ANTHROPIC_API_KEY") {
            self.analysis.api_key = Some(v);
        }
        if let Some(v) = env_str("OLLAMA_MODEL") {
            self.ollama.model = v;
        }
        if let Some(v) = env_str("OLLAMA_API_URL") {
            self.ollama.api_url = v;
        }
        if let Some(v) = env_parse::<u64>("CACHE_DURATION_DAYS")? {
            self.cache.ttl_days = v;
        }
        if let Some(v) = env_parse::<u32>("PATENT_SEARCH_YEARS")? {
            self.patents.years = v;
        }
        if let Some(v) = env_parse::<usize>("RESULTS_LIMIT")? {
            self.patents.results_limit = v;
            self.web.results_limit = v;
        }
        if let Some(v) = env_parse::<u64>("PIPELINE_TIMEOUT_SECS")? {
            self.pipeline.timeout_secs = (v > 0).then_some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.cache.ttl_days == 0 {
            return invalid("cache.ttl_days must be greater than zero".into());
        }
        if self.keywords.max_terms == 0 || self.keywords.request_count == 0 {
            return invalid("keywords.max_terms and keywords.request_count must be greater than zero".into());
        }
        if self.fallback_keywords().is_none() {
            return invalid("keywords.fallback must contain at least one usable term".into());
        }
        if self.patents.results_limit == 0 {
            return invalid("patents.results_limit must be greater than zero".into());
        }
        if self.web.results_limit == 0 {
            return invalid("web.results_limit must be greater than zero".into());
        }
        if self.analysis.score_min >= self.analysis.score_max {
            return invalid(format!(
                "analysis.score_min ({}) must be less than analysis.score_max ({})",
                self.analysis.score_min, self.analysis.score_max
            ));
        }
        for (name, spec) in [
            ("keywords", &self.retry.keywords),
            ("patents", &self.retry.patents),
            ("web", &self.retry.web),
            ("analysis", &self.retry.analysis),
        ] {
            if spec.max_attempts == 0 {
                return invalid(format!("retry.{name}.max_attempts must be at least 1"));
            }
            if spec.backoff_multiplier < 1.0 {
                return invalid(format!("retry.{name}.backoff_multiplier must be >= 1.0"));
            }
            if !(0.0..=1.0).contains(&spec.jitter) {
                return invalid(format!("retry.{name}.jitter must be within [0, 1]"));
            }
        }
        Ok(())
    }

    /// Names of API keys that are not set. Searches and analysis fail with
    /// `AuthFailed` at call time without them.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let absent = |k: &Option<String>| k.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut out = Vec::new();
        if absent(&self.patents.api_key) {
            out.push("SERPAPI_API_KEY");
        }
        if absent(&self.web.api_key) {
            out.push("BRAVE_API_KEY");
        }
        if absent(&self.analysis.api_key) {
            out.push("ANTHROPIC_API_KEY");
        }
        out
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_days.saturating_mul(24 * 60 * 60))
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline.timeout_secs.map(Duration::from_secs)
    }

    pub fn fallback_keywords(&self) -> Option<KeywordSet> {
        KeywordSet::from_terms(&self.keywords.fallback, self.keywords.max_terms.max(1))
    }
}

fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        return Ok(Some(p.to_path_buf()));
    }
    if let Some(p) = env_str(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(ConfigError::MissingFile(pb));
        }
        return Ok(Some(pb));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    Ok(default.exists().then_some(default))
}

fn env_str(var: &str) -> Option<String> {
    env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env_str(var) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRIDE_VARS: &[&str] = &[
        ENV_PATH,
        "SERPAPI_API_KEY",
        "BRAVE_API_KEY",
        "ANTHROPIC_API_KEY",
        "OLLAMA_MODEL",
        "OLLAMA_API_URL",
        "CACHE_DURATION_DAYS",
        "PATENT_SEARCH_YEARS",
        "RESULTS_LIMIT",
        "PIPELINE_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for v in OVERRIDE_VARS {
            env::remove_var(v);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(cfg.retry.patents.max_attempts, 3);
        assert_eq!(cfg.retry.analysis.max_delay_ms, Some(20_000));
        assert!(cfg.pipeline_timeout().is_none());
        assert_eq!(cfg.fallback_keywords().unwrap().len(), 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [patents]
            country = "US"

            [retry.web]
            max_attempts = 5
            initial_delay_ms = 100
            backoff_multiplier = 3.0

            [pipeline]
            timeout_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(cfg.patents.country, "US");
        assert_eq!(cfg.patents.results_limit, 2);
        assert_eq!(cfg.retry.web.max_attempts, 5);
        assert_eq!(cfg.retry.web.jitter, 0.1);
        assert_eq!(cfg.retry.keywords.max_attempts, 2);
        assert_eq!(cfg.pipeline_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.analysis.score_min = 10;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = AppConfig::default();
        cfg.retry.web.backoff_multiplier = 0.5;
        assert!(cfg.validate().unwrap_err().to_string().contains("retry.web"));

        let mut cfg = AppConfig::default();
        cfg.keywords.fallback = vec!["a".into(), "the".into()];
        assert!(cfg.validate().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply_after_file() {
        clear_env();
        env::set_var("RESULTS_LIMIT", "4");
        env::set_var("BRAVE_API_KEY", "  brave-key ");
        env::set_var("PIPELINE_TIMEOUT_SECS", "0");

        let mut cfg = AppConfig::from_toml_str("[web]\nresults_limit = 9\n").unwrap();
        cfg.apply_env().unwrap();
        assert_eq!(cfg.web.results_limit, 4);
        assert_eq!(cfg.patents.results_limit, 4);
        assert_eq!(cfg.web.api_key.as_deref(), Some("brave-key"));
        assert!(cfg.pipeline_timeout().is_none());
        assert_eq!(cfg.missing_credentials(), vec!["SERPAPI_API_KEY", "ANTHROPIC_API_KEY"]);

        env::set_var("CACHE_DURATION_DAYS", "soon");
        assert!(matches!(cfg.apply_env(), Err(ConfigError::Env { var: "CACHE_DURATION_DAYS", .. })));
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn load_resolves_env_path_then_default() {
        clear_env();
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        // no file anywhere: defaults
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg, AppConfig::default());

        fs::create_dir_all("config").unwrap();
        fs::write(DEFAULT_PATH, "[cache]\nttl_days = 3\n").unwrap();
        assert_eq!(AppConfig::load(None).unwrap().cache.ttl_days, 3);

        env::set_var(ENV_PATH, "missing.toml");
        assert!(matches!(AppConfig::load(None), Err(ConfigError::MissingFile(_))));

        fs::write("alt.toml", "[cache]\nttl_days = 11\n").unwrap();
        env::set_var(ENV_PATH, "alt.toml");
        assert_eq!(AppConfig::load(None).unwrap().cache.ttl_days, 11);

        clear_env();
        env::set_current_dir(old).unwrap();
    }
}
