// src/analysis/claude.rs
//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    parse_verdict, system_prompt, user_prompt, AnalysisDepth, AnalysisService, AnalysisVerdict,
    EvidenceBundle, ScoreRange,
};
use crate::config::AnalysisConfig;
use crate::error::{ErrorKind, ServiceError};

const SERVICE: &str = "anthropic";
const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeAnalysis {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    range: ScoreRange,
}

impl ClaudeAnalysis {
    pub fn new(cfg: &AnalysisConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("novelty-assessor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone().unwrap_or_default(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            range: cfg.score_range(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Concatenated text blocks of a Messages response.
pub fn response_text(body: &str) -> Result<String, ServiceError> {
    let resp: Resp = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(SERVICE, format!("invalid json: {e}")))?;
    let text: String = resp
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .map(|b| b.text)
        .collect();
    if text.trim().is_empty() {
        return Err(ServiceError::malformed(SERVICE, "response contained no text"));
    }
    Ok(text)
}

/// Map an error response. The typed `error.type` wins over the status code.
pub fn classify_error(status: u16, body: &str) -> ServiceError {
    let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) else {
        return ServiceError::from_status(SERVICE, status, body);
    };
    let kind = match parsed.error.kind.as_str() {
        "authentication_error" | "permission_error" => ErrorKind::AuthFailed,
        "invalid_request_error" | "not_found_error" => ErrorKind::Validation,
        "rate_limit_error" => ErrorKind::RateLimited,
        "overloaded_error" | "api_error" => ErrorKind::Unavailable,
        _ => crate::error::classify_status(status),
    };
    ServiceError::new(
        SERVICE,
        kind,
        format!("HTTP {status} {}: {}", parsed.error.kind, parsed.error.message),
    )
}

#[async_trait]
impl AnalysisService for ClaudeAnalysis {
    async fn analyze(
        &self,
        idea: &str,
        evidence: &EvidenceBundle,
        depth: AnalysisDepth,
    ) -> Result<AnalysisVerdict, ServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::auth(SERVICE, "Anthropic API key not configured"));
        }

        let system = system_prompt(self.range, depth);
        let user = user_prompt(idea, evidence);
        let req = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &system,
            messages: vec![Msg {
                role: "user",
                content: &user,
            }],
        };

        let resp = self
            .http
            .post(ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, &e))?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        let text = response_text(&body)?;
        debug!(target: "analysis", model = %self.model, chars = text.len(), "analysis completion received");
        parse_verdict(SERVICE, &text, depth, self.range)
    }

    fn name(&self) -> &'static str {
        SERVICE
    }
}
