// src/keywords/ollama.rs
//! Keyword extraction through a local Ollama server (`/api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{empty_completion, parse_completion, KeywordExtractor, KeywordSet};
use crate::config::OllamaConfig;
use crate::error::{ErrorKind, ServiceError};

const SERVICE: &str = "ollama";

const PROMPT_TEMPLATE: &str = r#"Extract STRICTLY SEARCH KEYWORDS from the idea description below.
Return up to {count} specific keywords or short phrases that work well for searching existing patents and products.

Rules:
- Return ONLY a comma-separated list, nothing else
- Each keyword is 1-4 words
- No explanations, confirmations or conversation
- Prefer technical terms: functions, technologies, components
- Wrap multi-word keywords in double quotes

Example: "AI translation", "dog collar", "bark recognition", "pet wearable"

Idea: {idea}

Keywords:"#;

pub fn build_prompt(idea: &str, count: usize) -> String {
    PROMPT_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{idea}", idea.trim())
}

pub struct OllamaExtractor {
    http: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaExtractor {
    pub fn new(cfg: &OllamaConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("novelty-assessor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct GenerateReq<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
}

/// Accept either one JSON object or an NDJSON stream and join the `response` parts.
pub fn collect_response(body: &str) -> Result<String, ServiceError> {
    let mut out = String::new();
    let mut parsed_any = false;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk: GenerateChunk = serde_json::from_str(line)
            .map_err(|e| ServiceError::malformed(SERVICE, format!("bad generate chunk: {e}")))?;
        out.push_str(&chunk.response);
        parsed_any = true;
    }
    if !parsed_any {
        return Err(ServiceError::malformed(SERVICE, "empty generate response"));
    }
    Ok(out)
}

#[async_trait]
impl KeywordExtractor for OllamaExtractor {
    async fn extract(&self, text: &str, count: usize) -> Result<KeywordSet, ServiceError> {
        let prompt = build_prompt(text, count);
        let req = GenerateReq {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let resp = self
            .http
            .post(format!("{}/generate", self.api_url))
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
            return Err(status_error(status.as_u16(), &body));
        }

        let completion = collect_response(&body)?;
        KeywordSet::from_terms(parse_completion(&completion), count)
            .ok_or_else(|| empty_completion(SERVICE))
    }

    fn name(&self) -> &'static str {
        SERVICE
    }
}

/// Any non-success answer means the extractor is unavailable for this run,
/// including 404 for a model that was never pulled.
fn status_error(status: u16, body: &str) -> ServiceError {
    let snippet: String = body.chars().take(200).collect();
    ServiceError::new(
        SERVICE,
        ErrorKind::Unavailable,
        format!("HTTP {status}: {}", snippet.trim()),
    )
}
