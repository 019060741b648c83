// src/search/mod.rs
pub mod patents;
pub mod web;

pub use patents::{PatentFilters, SerpApiPatents};
pub use web::{BraveWebSearch, WebFilters};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::EvidenceSource;
use crate::cache::{self, CacheStore};
use crate::error::{SearchFailure, ServiceError};
use crate::keywords::KeywordSet;
use crate::retry::{RetryError, RetryPolicy};

/// Provider-specific fields of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemMetadata {
    Patent {
        #[serde(default)]
        publication_number: Option<String>,
        #[serde(default)]
        filing_date: Option<String>,
        #[serde(default)]
        inventors: Vec<String>,
        #[serde(default)]
        assignee: Option<String>,
    },
    Web {
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        published: Option<String>,
        #[serde(default)]
        price: Option<String>,
    },
}

/// One piece of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    /// Patent link or page URL.
    pub url: String,
    /// Abstract (patents) or description (web). May be empty.
    #[serde(default)]
    pub snippet: String,
    pub metadata: ItemMetadata,
}

impl ResultItem {
    pub fn is_patent(&self) -> bool {
        matches!(self.metadata, ItemMetadata::Patent { .. })
    }
}

/// Terminal result of one search slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum SearchOutcome {
    Success(Vec<ResultItem>),
    Failure(SearchFailure),
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success(_))
    }

    pub fn items(&self) -> Option<&[ResultItem]> {
        match self {
            SearchOutcome::Success(items) => Some(items),
            SearchOutcome::Failure(_) => None,
        }
    }
}

/// Raw search backend: one network attempt, parsed and capped.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, keywords: &KeywordSet) -> Result<Vec<ResultItem>, ServiceError>;
    fn name(&self) -> &'static str;
    /// Stable description of the active filters; part of the cache key.
    fn fingerprint(&self) -> String {
        String::new()
    }
}

/// Cache lookup → retry-wrapped provider call → cap → cache write.
#[derive(Clone)]
pub struct SearchService {
    source: EvidenceSource,
    provider: Arc<dyn SearchProvider>,
    cache: Arc<dyn CacheStore>,
    retry: RetryPolicy,
    ttl: Duration,
    limit: usize,
}

impl SearchService {
    pub fn new(
        source: EvidenceSource,
        provider: Arc<dyn SearchProvider>,
        cache: Arc<dyn CacheStore>,
        retry: RetryPolicy,
        ttl: Duration,
        limit: usize,
    ) -> Self {
        Self {
            source,
            provider,
            cache,
            retry,
            ttl,
            limit: limit.max(1),
        }
    }

    pub fn source(&self) -> EvidenceSource {
        self.source
    }

    pub fn cache_key(&self, keywords: &KeywordSet) -> String {
        let identity = format!(
            "{}:{}:{}",
            self.source.as_str(),
            self.provider.name(),
            self.provider.fingerprint()
        );
        cache::cache_key(&identity, keywords.terms())
    }

    /// Run to a terminal outcome. `Err` only for fatal (auth/validation) errors;
    /// the last error is re-tagged with this slot's service name.
    pub async fn search(&self, keywords: &KeywordSet) -> Result<SearchOutcome, RetryError> {
        let slot = self.source.as_str();
        let key = self.cache_key(keywords);

        if let Some(items) = cache::get_typed::<Vec<ResultItem>>(self.cache.as_ref(), &key) {
            counter!("cache_hits_total", "provider" => slot).increment(1);
            debug!(target: "cache", provider = slot, items = items.len(), "cache hit");
            return Ok(SearchOutcome::Success(items));
        }
        counter!("cache_misses_total", "provider" => slot).increment(1);

        let provider = self.provider.clone();
        let result = self
            .retry
            .execute(|_| {
                let provider = provider.clone();
                async move { provider.search(keywords).await }
            })
            .await;

        match result {
            Ok(mut items) => {
                items.truncate(self.limit);
                if let Err(e) = cache::set_typed(self.cache.as_ref(), &key, &items, self.ttl) {
                    warn!(target: "cache", provider = slot, error = %e, "cache write failed");
                }
                info!(target: "search", provider = slot, items = items.len(), "search succeeded");
                Ok(SearchOutcome::Success(items))
            }
            Err(e) if e.kind().is_fatal() => Err(RetryError {
                last: ServiceError {
                    service: slot,
                    ..e.last
                },
                ..e
            }),
            Err(e) => {
                warn!(
                    target: "search",
                    provider = slot,
                    attempts = e.attempts,
                    exhausted = e.exhausted,
                    kind = %e.kind(),
                    "search failed"
                );
                Ok(SearchOutcome::Failure(SearchFailure {
                    kind: e.kind(),
                    retry_count_exhausted: e.exhausted,
                    attempts: e.attempts,
                    message: e.last.message,
                }))
            }
        }
    }
}

/// Decode entities, strip tags, collapse whitespace. Upstream snippets carry
/// `<strong>` highlights and `&amp;`-style entities.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    let out = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// Truncate to `max` chars, appending "..." when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
