// src/search/web.rs
//! Product / service search through the Brave Search API.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{normalize_text, ItemMetadata, ResultItem, SearchProvider};
use crate::config::WebConfig;
use crate::error::ServiceError;
use crate::keywords::KeywordSet;

const SERVICE: &str = "brave";
const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_QUERY_TERMS: usize = 5;
const MAX_QUERY_CHARS: usize = 380;

/// Query modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebFilters {
    /// `"products_services"` appends commercial modifiers; anything else searches as-is.
    pub search_focus: String,
}

impl WebFilters {
    pub fn build_query(&self, keywords: &KeywordSet) -> String {
        let terms: Vec<&str> = keywords
            .terms()
            .iter()
            .take(MAX_QUERY_TERMS)
            .map(String::as_str)
            .collect();
        let mut q = terms.join(", ");
        if self.search_focus == "products_services" {
            q.push_str(" product service available");
        }
        if q.chars().count() > MAX_QUERY_CHARS {
            q = q.chars().take(MAX_QUERY_CHARS).collect();
        }
        q
    }
}

pub struct BraveWebSearch {
    http: reqwest::Client,
    api_key: String,
    limit: usize,
    filters: WebFilters,
}

impl BraveWebSearch {
    pub fn new(cfg: &WebConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("novelty-assessor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone().unwrap_or_default(),
            limit: cfg.results_limit,
            filters: WebFilters {
                search_focus: cfg.search_focus.clone(),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    extra_snippets: Vec<String>,
}

/// Host of `url` without scheme, `www.` or path.
pub fn domain_of(url: &str) -> Option<String> {
    let rest = url.split_once("//").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// First `$12` / `$12.99` style price in `text`.
pub fn extract_price(text: &str) -> Option<String> {
    static PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d[\d,]*(?:\.\d+)?").expect("price regex"));
    PRICE.find(text).map(|m| m.as_str().to_string())
}

fn to_item(raw: RawResult) -> Option<ResultItem> {
    let title = raw.title.map(|t| normalize_text(&t)).filter(|t| !t.is_empty())?;
    let url = raw.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
    let snippet = raw.description.map(|d| normalize_text(&d)).unwrap_or_default();
    let source = raw
        .extra_snippets
        .iter()
        .find(|s| s.to_lowercase().contains("source"))
        .map(|s| normalize_text(s))
        .or_else(|| domain_of(&url));
    let price = extract_price(&snippet);
    Some(ResultItem {
        title,
        url,
        snippet,
        metadata: ItemMetadata::Web {
            source,
            published: raw.age.filter(|a| !a.trim().is_empty()),
            price,
        },
    })
}

/// Parse a Brave response body, dropping unusable records.
pub fn parse_response(body: &str, limit: usize) -> Result<Vec<ResultItem>, ServiceError> {
    let resp: BraveResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(SERVICE, format!("invalid json: {e}")))?;
    let raw = resp.web.map(|w| w.results).unwrap_or_default();

    let mut out = Vec::with_capacity(limit);
    for value in raw {
        if out.len() >= limit {
            break;
        }
        match serde_json::from_value::<RawResult>(value).ok().and_then(to_item) {
            Some(item) => out.push(item),
            None => debug!(target: "search", provider = SERVICE, "dropping incomplete web record"),
        }
    }
    Ok(out)
}

#[async_trait]
impl SearchProvider for BraveWebSearch {
    async fn search(&self, keywords: &KeywordSet) -> Result<Vec<ResultItem>, ServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::auth(SERVICE, "Brave Search API key not configured"));
        }

        let query = self.filters.build_query(keywords);
        let resp = self
            .http
            .get(ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query.as_str()), ("count", &self.limit.to_string())])
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;
        if !status.is_success() {
            return Err(ServiceError::from_status(SERVICE, status.as_u16(), &body));
        }
        parse_response(&body, self.limit)
    }

    fn name(&self) -> &'static str {
        SERVICE
    }

    fn fingerprint(&self) -> String {
        format!("{}:{}", self.filters.search_focus, self.limit)
    }
}
