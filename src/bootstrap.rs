// src/bootstrap.rs
//! Wire real providers and the cache from an `AppConfig`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::analysis::ClaudeAnalysis;
use crate::cache::{CacheStore, FileCache, NullCache};
use crate::config::AppConfig;
use crate::keywords::{FrequencyExtractor, KeywordExtractor, OllamaExtractor};
use crate::pipeline::{NoveltyPipeline, Services};
use crate::search::{BraveWebSearch, SerpApiPatents};

/// Cache selected by `[cache] enabled`.
pub fn build_cache(cfg: &AppConfig) -> Arc<dyn CacheStore> {
    if !cfg.cache.enabled {
        info!(target: "cache", "cache disabled");
        return Arc::new(NullCache);
    }
    let cache = FileCache::new(cfg.cache.dir.clone());
    info!(target: "cache", dir = %cfg.cache.dir.display(), ttl_days = cfg.cache.ttl_days, "file cache ready");
    Arc::new(cache)
}

pub fn build_services(cfg: &AppConfig) -> anyhow::Result<Services> {
    let extractor: Arc<dyn KeywordExtractor> = if cfg.ollama.api_url.trim().is_empty() {
        info!(target: "keywords", "no Ollama url configured, using frequency extractor");
        Arc::new(FrequencyExtractor)
    } else {
        Arc::new(OllamaExtractor::new(&cfg.ollama).context("building Ollama client")?)
    };

    let missing = cfg.missing_credentials();
    if !missing.is_empty() {
        warn!(missing = ?missing, "API keys not configured; affected services will fail authentication");
    }
    // Diagnostics only: never log key material
    info!(
        patents_key = cfg.patents.api_key.is_some(),
        web_key = cfg.web.api_key.is_some(),
        analysis_key = cfg.analysis.api_key.is_some(),
        ollama_model = %cfg.ollama.model,
        analysis_model = %cfg.analysis.model,
        "services configured"
    );

    Ok(Services {
        extractor,
        patents: Arc::new(SerpApiPatents::new(&cfg.patents).context("building SerpApi client")?),
        web: Arc::new(BraveWebSearch::new(&cfg.web).context("building Brave client")?),
        analysis: Arc::new(ClaudeAnalysis::new(&cfg.analysis).context("building Anthropic client")?),
        cache: build_cache(cfg),
    })
}

/// Full pipeline from a loaded config.
pub fn build_pipeline(cfg: AppConfig) -> anyhow::Result<NoveltyPipeline> {
    let services = build_services(&cfg)?;
    NoveltyPipeline::new(services, Arc::new(cfg)).context("invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_is_null() {
        let mut cfg = AppConfig::default();
        cfg.cache.enabled = false;
        let cache = build_cache(&cfg);
        cache
            .set("k", serde_json::json!(1), std::time::Duration::from_secs(60))
            .unwrap();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn pipeline_builds_without_network() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.cache.dir = tmp.path().join("cache");
        cfg.ollama.api_url.clear();
        let p = build_pipeline(cfg).unwrap();
        assert!(p.cache().get("missing").is_none());
    }
}
