//! Keyword extraction: normalized keyword sets, completion parsing, and the
//! cache + retry + fallback wrapper used by the pipeline.

pub mod ollama;

pub use ollama::OllamaExtractor;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::{self, CacheStore};
use crate::error::{ErrorKind, ServiceError};
use crate::retry::RetryPolicy;

/// Generic words that never make useful search terms.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "or", "the", "a", "an", "in", "on", "at", "to", "for", "with", "by", "of", "is",
        "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
        "will", "would", "shall", "should", "may", "might", "must", "can", "could", "that",
        "which", "who", "whom", "this", "these", "those", "am", "i", "you", "he", "she", "it",
        "we", "they", "their", "our", "my", "your", "its", "his", "her", "from", "into", "using",
        "use", "uses",
    ]
    .into_iter()
    .collect()
});

/// LLM chatter that sometimes leaks into keyword lists.
const CONVERSATIONAL: &[&str] = &[
    "sure", "okay", "alright", "first", "next", "here", "think", "would", "could", "should",
    "able", "please", "thanks",
];

const CONVERSATIONAL_PREFIXES: &[&str] = &[
    "Here are",
    "I've extracted",
    "Based on",
    "These are",
    "The following",
    "Sure",
    "Okay",
    "Alright",
    "Here is",
    "Looking at",
];

pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(term)
}

/// Lower-case, keep alphanumerics / hyphens / inner spaces, collapse whitespace.
/// Returns `None` for stop words and terms shorter than 3 chars.
pub fn normalize_term(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let term = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let term = term.trim_matches('-').to_string();
    if term.chars().count() < 3 || is_stop_word(&term) {
        return None;
    }
    Some(term)
}

/// Ordered, normalized, deduplicated, never-empty list of search terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Normalize `terms` and keep at most `max`. `None` if nothing survives.
    pub fn from_terms<I, S>(terms: I, max: usize) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for t in terms {
            if out.len() >= max {
                break;
            }
            if let Some(term) = normalize_term(t.as_ref()) {
                if seen.insert(term.clone()) {
                    out.push(term);
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Self(out))
        }
    }

    /// Parse a user-supplied comma-separated list (`--keywords "a, b"`).
    pub fn parse_list(list: &str, max: usize) -> Option<Self> {
        Self::from_terms(list.split(','), max)
    }

    pub fn terms(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep the first `max` terms (never below one).
    pub fn truncated(mut self, max: usize) -> Self {
        self.0.truncate(max.max(1));
        self
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl TryFrom<Vec<String>> for KeywordSet {
    type Error = String;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        let max = v.len();
        KeywordSet::from_terms(v, max).ok_or_else(|| "keyword set must not be empty".to_string())
    }
}

impl From<KeywordSet> for Vec<String> {
    fn from(k: KeywordSet) -> Self {
        k.0
    }
}

/// Pull a keyword list out of a free-form LLM completion.
pub fn parse_completion(completion: &str) -> Vec<String> {
    static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s+(.+)$").expect("numbered regex"));

    let mut body = completion.trim();
    if let Some(idx) = body.rfind("Keywords:") {
        body = body[idx + "Keywords:".len()..].trim();
    }
    for prefix in CONVERSATIONAL_PREFIXES {
        if let Some(rest) = body.strip_prefix(prefix) {
            body = rest.trim_start_matches([':', ',', '.', ' ']).trim();
        }
    }

    let mut items: Vec<String> = Vec::new();
    if body.contains(',') {
        items.extend(
            body.split(',')
                .map(|p| p.trim().trim_matches('"').trim().to_string())
                .filter(|p| !p.is_empty() && p.len() < 50),
        );
    }
    if items.is_empty() {
        for line in body.lines() {
            if let Some(caps) = NUMBERED.captures(line.trim()) {
                let kw = caps[1].trim().trim_matches('"').to_string();
                if !kw.is_empty() && kw.len() < 50 {
                    items.push(kw);
                }
            }
        }
    }
    if items.is_empty() {
        items.extend(
            body.split_whitespace()
                .map(|w| w.to_lowercase())
                .filter(|w| w.len() > 3 && !is_stop_word(w))
                .filter(|w| !w.chars().any(|c| ",.;:!?()[]{}\"'".contains(c))),
        );
    }

    items
        .into_iter()
        .filter(|k| {
            let lower = k.to_lowercase();
            k.len() > 2 && !CONVERSATIONAL.iter().any(|c| lower.starts_with(c))
        })
        .collect()
}

/// Remote or local service turning idea text into a keyword set.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Single attempt. `count` is how many candidates to ask for.
    async fn extract(&self, text: &str, count: usize) -> Result<KeywordSet, ServiceError>;
    fn name(&self) -> &'static str;
}

/// Offline extractor: most frequent meaningful words of the idea text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrequencyExtractor;

impl FrequencyExtractor {
    pub fn rank(text: &str, count: usize) -> Vec<String> {
        static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));
        let lower = text.to_lowercase();
        let mut freq: HashMap<&str, (usize, usize)> = HashMap::new();
        for (pos, m) in WORD.find_iter(&lower).enumerate() {
            let w = m.as_str();
            if w.chars().count() <= 3 || is_stop_word(w) || w.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            freq.entry(w).or_insert((0, pos)).0 += 1;
        }
        let mut ranked: Vec<(&str, (usize, usize))> = freq.into_iter().collect();
        // by frequency, then first occurrence for a stable order
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked.into_iter().take(count).map(|(w, _)| w.to_string()).collect()
    }
}

#[async_trait]
impl KeywordExtractor for FrequencyExtractor {
    async fn extract(&self, text: &str, count: usize) -> Result<KeywordSet, ServiceError> {
        KeywordSet::from_terms(Self::rank(text, count), count)
            .ok_or_else(|| ServiceError::malformed("frequency", "no usable words in idea text"))
    }

    fn name(&self) -> &'static str {
        "frequency"
    }
}

/// Keywords handed to the search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeywords {
    pub keywords: KeywordSet,
    /// Extraction failed and the fallback list was used.
    pub degraded: bool,
}

/// Extraction wrapped in cache, a small retry budget, and the static fallback list.
pub struct KeywordService {
    extractor: Arc<dyn KeywordExtractor>,
    cache: Arc<dyn CacheStore>,
    retry: RetryPolicy,
    ttl: Duration,
    request_count: usize,
    max_terms: usize,
    fallback: KeywordSet,
}

impl KeywordService {
    pub fn new(
        extractor: Arc<dyn KeywordExtractor>,
        cache: Arc<dyn CacheStore>,
        retry: RetryPolicy,
        ttl: Duration,
        request_count: usize,
        max_terms: usize,
        fallback: KeywordSet,
    ) -> Self {
        Self {
            extractor,
            cache,
            retry,
            ttl,
            request_count,
            max_terms,
            fallback,
        }
    }

    fn key_for(&self, text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        cache::cache_key(&format!("keywords:{}", self.extractor.name()), &[normalized])
    }

    /// Extract keywords for `text`. Never fails: any extractor error, fatal
    /// kinds included, yields the fallback list with `degraded = true`.
    pub async fn resolve(&self, text: &str) -> ResolvedKeywords {
        let key = self.key_for(text);
        if let Some(hit) = cache::get_typed::<KeywordSet>(self.cache.as_ref(), &key) {
            counter!("cache_hits_total", "provider" => "keywords").increment(1);
            return ResolvedKeywords {
                keywords: hit.truncated(self.max_terms),
                degraded: false,
            };
        }
        counter!("cache_misses_total", "provider" => "keywords").increment(1);

        let extractor = self.extractor.clone();
        let count = self.request_count;
        let result = self
            .retry
            .execute(|_| {
                let extractor = extractor.clone();
                async move { extractor.extract(text, count).await }
            })
            .await;

        match result {
            Ok(keywords) => {
                if let Err(e) = cache::set_typed(self.cache.as_ref(), &key, &keywords, self.ttl) {
                    warn!(target: "cache", error = %e, "keyword cache write failed");
                }
                let keywords = keywords.truncated(self.max_terms);
                info!(target: "keywords", extractor = self.extractor.name(), terms = ?keywords.terms(), "keywords extracted");
                ResolvedKeywords {
                    keywords,
                    degraded: false,
                }
            }
            Err(e) => {
                counter!("keyword_fallback_total").increment(1);
                let service = e.last.service;
                if e.kind().is_fatal() {
                    error!(
                        target: "keywords",
                        service,
                        attempts = e.attempts,
                        kind = %e.kind(),
                        error = %e.last.message,
                        "keyword extractor rejected the request, using fallback list"
                    );
                } else {
                    warn!(
                        target: "keywords",
                        service,
                        attempts = e.attempts,
                        kind = %e.kind(),
                        error = %e.last.message,
                        "keyword extraction failed, using fallback list"
                    );
                }
                ResolvedKeywords {
                    keywords: self.fallback(),
                    degraded: true,
                }
            }
        }
    }

    /// The static list, capped at `max_terms`.
    pub fn fallback(&self) -> KeywordSet {
        self.fallback.clone().truncated(self.max_terms)
    }
}

/// Kind used when extraction output cannot be turned into terms.
pub(crate) fn empty_completion(service: &'static str) -> ServiceError {
    ServiceError::new(service, ErrorKind::Malformed, "completion contained no usable keywords")
}
