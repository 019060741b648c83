// src/search/patents.rs
//! Google Patents search through SerpApi.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{normalize_text, ItemMetadata, ResultItem, SearchProvider};
use crate::config::PatentsConfig;
use crate::error::{ErrorKind, ServiceError};
use crate::keywords::KeywordSet;

const SERVICE: &str = "serpapi";
const ENDPOINT: &str = "https://serpapi.com/search.json";

/// Jurisdiction and publication window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatentFilters {
    /// Two-letter country code, e.g. "US". Empty = worldwide.
    pub country: String,
    /// Only patents published within the last `years` years. 0 = no limit.
    pub years: u32,
}

impl PatentFilters {
    /// `after=publication:YYYYMMDD` lower bound relative to `today`.
    pub fn after_param(&self, today: NaiveDate) -> Option<String> {
        if self.years == 0 {
            return None;
        }
        let year = today.year() - self.years as i32;
        let start = today
            .with_year(year)
            .or_else(|| NaiveDate::from_ymd_opt(year, today.month(), 28))?;
        Some(format!("publication:{}", start.format("%Y%m%d")))
    }
}

pub struct SerpApiPatents {
    http: reqwest::Client,
    api_key: String,
    engine: String,
    limit: usize,
    filters: PatentFilters,
}

impl SerpApiPatents {
    pub fn new(cfg: &PatentsConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("novelty-assessor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone().unwrap_or_default(),
            engine: cfg.engine.clone(),
            limit: cfg.results_limit,
            filters: PatentFilters {
                country: cfg.country.clone(),
                years: cfg.years,
            },
        })
    }

    /// Query parameters (api key excluded).
    pub fn query_params(&self, keywords: &KeywordSet, today: NaiveDate) -> Vec<(&'static str, String)> {
        // SerpApi rejects num outside 10..=100; the cap is applied after parsing
        let num = self.limit.clamp(10, 100);
        let mut params = vec![
            ("engine", self.engine.clone()),
            ("q", keywords.join(", ")),
            ("num", num.to_string()),
        ];
        if !self.filters.country.is_empty() {
            params.push(("country", self.filters.country.clone()));
        }
        if let Some(after) = self.filters.after_param(today) {
            params.push(("after", after));
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPatent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    patent_link: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    publication_number: Option<String>,
    #[serde(default)]
    filing_date: Option<String>,
    #[serde(default)]
    inventor: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn to_item(raw: RawPatent) -> Option<ResultItem> {
    let title = non_empty(raw.title.map(|t| normalize_text(&t)))?;
    let url = non_empty(raw.patent_link).or_else(|| non_empty(raw.link))?;
    let inventors = raw
        .inventor
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(ResultItem {
        title,
        url,
        snippet: raw.snippet.map(|s| normalize_text(&s)).unwrap_or_default(),
        metadata: ItemMetadata::Patent {
            publication_number: non_empty(raw.publication_number),
            filing_date: non_empty(raw.filing_date),
            inventors,
            assignee: non_empty(raw.assignee),
        },
    })
}

/// Parse a SerpApi body. Individual records that do not decode or lack a title
/// or link are dropped.
pub fn parse_response(body: &str, limit: usize) -> Result<Vec<ResultItem>, ServiceError> {
    let resp: SerpResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(SERVICE, format!("invalid json: {e}")))?;

    if let Some(msg) = resp.error {
        let lower = msg.to_lowercase();
        // "Google hasn't returned any results" is an empty result, not an error
        if lower.contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        let kind = if lower.contains("invalid api key") {
            ErrorKind::AuthFailed
        } else if lower.contains("run out of searches") {
            ErrorKind::RateLimited
        } else {
            ErrorKind::ConnectionFailed
        };
        return Err(ServiceError::new(SERVICE, kind, msg));
    }

    let mut out = Vec::with_capacity(limit);
    for value in resp.organic_results {
        if out.len() >= limit {
            break;
        }
        match serde_json::from_value::<RawPatent>(value).ok().and_then(to_item) {
            Some(item) => out.push(item),
            None => debug!(target: "search", provider = SERVICE, "dropping incomplete patent record"),
        }
    }
    Ok(out)
}

#[async_trait]
impl SearchProvider for SerpApiPatents {
    async fn search(&self, keywords: &KeywordSet) -> Result<Vec<ResultItem>, ServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::auth(SERVICE, "SerpApi API key not configured"));
        }

        let mut params = self.query_params(keywords, Utc::now().date_naive());
        params.push(("api_key", self.api_key.clone()));

        let resp = self
            .http
            .get(ENDPOINT)
            .query(&params)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;

        // SerpApi reports most problems as JSON with an `error` field, so try that first
        match parse_response(&body, self.limit) {
            Ok(items) if status.is_success() => Ok(items),
            Err(e) if e.kind != ErrorKind::Malformed => Err(e),
            _ if !status.is_success() => Err(ServiceError::from_status(SERVICE, status.as_u16(), &body)),
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        SERVICE
    }

    fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}y:{}",
            self.engine, self.filters.country, self.filters.years, self.limit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
      "organic_results": [
        {"title": "Inductive <b>charging</b> pad", "patent_link": "https://patents.google.com/patent/US1",
         "snippet": "A pad for vehicles", "publication_number": "US1", "filing_date": "2019-03-12",
         "inventor": "Ada Lovelace, Alan Turing", "assignee": "Acme"},
        {"title": "", "patent_link": "https://patents.google.com/patent/US2"},
        {"title": 42, "patent_link": "https://patents.google.com/patent/US3"},
        {"title": "Parking alignment", "patent_link": "https://patents.google.com/patent/US4"},
        {"title": "Third valid", "patent_link": "https://patents.google.com/patent/US5"}
      ]
    }"#;

    #[test]
    fn incomplete_records_are_dropped_and_cap_applies() {
        let items = parse_response(FIXTURE, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Inductive charging pad");
        assert_eq!(items[1].title, "Parking alignment");
        match &items[0].metadata {
            ItemMetadata::Patent { inventors, filing_date, .. } => {
                assert_eq!(inventors, &vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()]);
                assert_eq!(filing_date.as_deref(), Some("2019-03-12"));
            }
            other => panic!("unexpected metadata {other:?}"),
        }
        match &items[1].metadata {
            ItemMetadata::Patent { filing_date, inventors, .. } => {
                assert!(filing_date.is_none());
                assert!(inventors.is_empty());
            }
            other => panic!("unexpected metadata {other:?}"),
        }
    }

    #[test]
    fn invalid_key_is_auth_failure() {
        let err = parse_response(r#"{"error": "Invalid API key. Your API key should be here"}"#, 2)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
    }

    #[test]
    fn no_results_is_empty_success() {
        let items =
            parse_response(r#"{"error": "Google hasn't returned any results for this query."}"#, 2)
                .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn after_param_uses_year_window() {
        let f = PatentFilters {
            country: "US".into(),
            years: 5,
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(f.after_param(today).as_deref(), Some("publication:20211019"));
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            PatentFilters { years: 1, ..f }.after_param(leap).as_deref(),
            Some("publication:20230228")
        );
    }
}
