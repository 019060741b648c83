//! Evidence bundling, prompt construction and verdict parsing for the
//! reasoning service. The HTTP client lives in [`claude`].

pub mod claude;

pub use claude::ClaudeAnalysis;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::search::{truncate_chars, ItemMetadata, ResultItem, SearchOutcome};

const SNIPPET_CHARS: usize = 500;

/// One of the two evidence sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Patents,
    Web,
}

impl EvidenceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceSource::Patents => "patents",
            EvidenceSource::Web => "web",
        }
    }

    /// Slot named by a re-tagged service error.
    pub fn from_service(service: &str) -> Option<Self> {
        match service {
            "patents" => Some(EvidenceSource::Patents),
            "web" => Some(EvidenceSource::Web),
            _ => None,
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    /// Score plus a short explanation.
    #[default]
    Simple,
    /// Full report with summary, unique points, challenges and recommendations.
    Complex,
}

impl AnalysisDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisDepth::Simple => "simple",
            AnalysisDepth::Complex => "complex",
        }
    }
}

impl fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(AnalysisDepth::Simple),
            "complex" => Ok(AnalysisDepth::Complex),
            other => Err(format!("unknown analysis depth '{other}' (expected simple|complex)")),
        }
    }
}

/// Inclusive bounds for the novelty score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: u8,
    pub max: u8,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

impl ScoreRange {
    pub fn clamp(&self, score: f64) -> u8 {
        let rounded = score.round();
        if rounded.is_nan() || rounded <= self.min as f64 {
            self.min
        } else if rounded >= self.max as f64 {
            self.max
        } else {
            rounded as u8
        }
    }

    pub fn contains(&self, score: u8) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// Whatever the barrier collected. `None` = that search failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub patents: Option<Vec<ResultItem>>,
    pub web: Option<Vec<ResultItem>>,
}

impl EvidenceBundle {
    pub fn from_outcomes(patents: SearchOutcome, web: SearchOutcome) -> Self {
        let keep = |o: SearchOutcome| match o {
            SearchOutcome::Success(items) => Some(items),
            SearchOutcome::Failure(_) => None,
        };
        Self {
            patents: keep(patents),
            web: keep(web),
        }
    }

    pub fn available_sources(&self) -> Vec<EvidenceSource> {
        let mut out = Vec::with_capacity(2);
        if self.patents.is_some() {
            out.push(EvidenceSource::Patents);
        }
        if self.web.is_some() {
            out.push(EvidenceSource::Web);
        }
        out
    }

    pub fn missing_sources(&self) -> Vec<EvidenceSource> {
        let mut out = Vec::with_capacity(2);
        if self.patents.is_none() {
            out.push(EvidenceSource::Patents);
        }
        if self.web.is_none() {
            out.push(EvidenceSource::Web);
        }
        out
    }

    pub fn item_count(&self) -> usize {
        self.patents.as_ref().map_or(0, Vec::len) + self.web.as_ref().map_or(0, Vec::len)
    }

    /// Numbered patent list for the prompt.
    pub fn format_patents(&self) -> String {
        let items = match &self.patents {
            None => return "No patents found. Patent search was unavailable for this run.".into(),
            Some(items) if items.is_empty() => return "No patents found.".into(),
            Some(items) => items,
        };
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, item.title));
            if let ItemMetadata::Patent {
                publication_number,
                filing_date,
                inventors,
                ..
            } = &item.metadata
            {
                out.push_str(&format!(
                    "   Patent Number: {}\n",
                    publication_number.as_deref().unwrap_or("N/A")
                ));
                out.push_str(&format!(
                    "   Filing Date: {}\n",
                    filing_date.as_deref().unwrap_or("N/A")
                ));
                if !inventors.is_empty() {
                    out.push_str(&format!("   Inventors: {}\n", inventors.join(", ")));
                }
            }
            out.push_str(&format!(
                "   Abstract: {}\n",
                truncate_chars(&item.snippet, SNIPPET_CHARS)
            ));
            out.push_str(&format!("   Link: {}\n\n", item.url));
        }
        out.trim_end().to_string()
    }

    /// Numbered product / service list for the prompt.
    pub fn format_web(&self) -> String {
        let items = match &self.web {
            None => {
                return "No relevant products or services found. Web search was unavailable for this run."
                    .into()
            }
            Some(items) if items.is_empty() => return "No relevant products or services found.".into(),
            Some(items) => items,
        };
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, item.title));
            if let ItemMetadata::Web {
                source,
                published,
                price,
            } = &item.metadata
            {
                out.push_str(&format!("   Source: {}\n", source.as_deref().unwrap_or("Unknown")));
                if let Some(date) = published {
                    out.push_str(&format!("   Date: {date}\n"));
                }
                if let Some(price) = price {
                    out.push_str(&format!("   Price: {price}\n"));
                }
            }
            out.push_str(&format!(
                "   Description: {}\n",
                truncate_chars(&item.snippet, SNIPPET_CHARS)
            ));
            out.push_str(&format!("   URL: {}\n\n", item.url));
        }
        out.trim_end().to_string()
    }
}

/// Sections of a complex-depth analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedReport {
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub unique_points: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl DetailedReport {
    pub fn is_empty(&self) -> bool {
        self.executive_summary.trim().is_empty()
            && self.unique_points.is_empty()
            && self.challenges.is_empty()
            && self.recommendations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub score: u8,
    pub rationale: String,
    pub sources_available: Vec<EvidenceSource>,
    #[serde(default)]
    pub sources_missing: Vec<EvidenceSource>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub keywords_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DetailedReport>,
}

impl AnalysisVerdict {
    /// Bare verdict; the pipeline fills in sources and keywords.
    pub fn new(score: u8, rationale: impl Into<String>) -> Self {
        Self {
            score,
            rationale: rationale.into(),
            sources_available: Vec::new(),
            sources_missing: Vec::new(),
            keywords: Vec::new(),
            keywords_degraded: false,
            report: None,
        }
    }

    pub fn with_report(mut self, report: DetailedReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Produced from one source only.
    pub fn is_degraded(&self) -> bool {
        !self.sources_missing.is_empty()
    }
}

/// Reasoning backend producing the verdict. One call per attempt.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        idea: &str,
        evidence: &EvidenceBundle,
        depth: AnalysisDepth,
    ) -> Result<AnalysisVerdict, ServiceError>;

    fn name(&self) -> &'static str;
}

pub fn system_prompt(range: ScoreRange, depth: AnalysisDepth) -> String {
    let (min, max) = (range.min, range.max);
    let mut p = format!(
        "You are a patent and product novelty analyzer. Your task is to analyze a user's idea \
and compare it against existing patents and products to determine novelty.

Analyze the following:
1. How similar is the user's idea to the existing patents/products?
2. What unique aspects does the user's idea have?
3. What common elements exist between the idea and existing items?
4. How technically feasible is the user's idea?
5. Assign a novelty score from {min} to {max}, where {min} means \"already exists\" and {max} means \"completely novel\".
"
    );
    match depth {
        AnalysisDepth::Simple => p.push_str(
            "\nFocus on providing a simple analysis with a novelty score and brief explanation (max 150 words).\n\
Respond with a JSON object: {\"score\": <integer>, \"rationale\": \"<explanation>\"}.",
        ),
        AnalysisDepth::Complex => p.push_str(
            "\nProvide a comprehensive analysis with:
1. Executive summary
2. Detailed comparison with the listed items
3. Novelty score with justification
4. Unique selling points
5. Potential challenges
6. Recommendations for differentiation

Respond with a JSON object: {\"score\": <integer>, \"rationale\": \"<comparison and justification>\", \
\"executive_summary\": \"...\", \"unique_points\": [\"...\"], \"challenges\": [\"...\"], \"recommendations\": [\"...\"]}.",
        ),
    }
    p
}

pub fn user_prompt(idea: &str, evidence: &EvidenceBundle) -> String {
    format!(
        "# Idea Description\n{}\n\n# Existing Patents\n{}\n\n# Existing Products/Services\n{}\n\n\
Analyze this idea for novelty compared to the existing patents and products/services listed above.",
        idea.trim(),
        evidence.format_patents(),
        evidence.format_web()
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default, alias = "novelty_score")]
    score: Option<serde_json::Value>,
    #[serde(default, alias = "analysis", alias = "explanation", alias = "full_analysis")]
    rationale: Option<String>,
    #[serde(default)]
    executive_summary: Option<String>,
    #[serde(default)]
    unique_points: Vec<String>,
    #[serde(default)]
    challenges: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

fn leading_number(s: &str) -> Option<f64> {
    static NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\**\s*(\d+(?:\.\d+)?)").expect("number regex"));
    NUM.captures(s).and_then(|c| c[1].parse().ok())
}

fn json_score(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => leading_number(s),
        _ => None,
    }
}

/// Outermost `{...}` span, tolerating code fences and chatter around it.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// First `score: N` / `Novelty Score: N/10` line.
fn text_score(text: &str) -> Option<f64> {
    text.lines()
        .filter(|l| l.to_lowercase().contains("score"))
        .filter_map(|l| l.split_once(':').map(|(_, rest)| rest))
        .find_map(leading_number)
}

/// Pull report sections out of a heading-structured answer.
pub fn extract_report(text: &str) -> DetailedReport {
    #[derive(Clone, Copy, PartialEq)]
    enum Section {
        None,
        Summary,
        Score,
        Unique,
        Challenges,
        Recommendations,
    }

    let mut report = DetailedReport::default();
    let mut current = Section::None;
    for line in text.lines() {
        let lower = line.to_lowercase();
        let trimmed = line.trim();
        let is_heading = trimmed.starts_with('#') || trimmed.ends_with(':') || trimmed.starts_with("**");

        if is_heading {
            let next = if lower.contains("summary") {
                Section::Summary
            } else if lower.contains("score") {
                Section::Score
            } else if lower.contains("unique") && (lower.contains("point") || lower.contains("selling")) {
                Section::Unique
            } else if lower.contains("challenge") || lower.contains("limitation") {
                Section::Challenges
            } else if lower.contains("recommendation") || lower.contains("suggestion") {
                Section::Recommendations
            } else {
                Section::None
            };
            current = next;
            continue;
        }

        let bullet = trimmed
            .strip_prefix(['-', '*', '\u{2022}'])
            .map(str::trim)
            .filter(|b| !b.is_empty());
        match current {
            Section::Summary if !trimmed.is_empty() => {
                if !report.executive_summary.is_empty() {
                    report.executive_summary.push(' ');
                }
                report.executive_summary.push_str(trimmed);
            }
            Section::Unique => report.unique_points.extend(bullet.map(str::to_string)),
            Section::Challenges => report.challenges.extend(bullet.map(str::to_string)),
            Section::Recommendations => report.recommendations.extend(bullet.map(str::to_string)),
            _ => {}
        }
    }
    report
}

/// Turn a completion into a verdict. JSON is tried first, then a `score:` line.
/// The score is clamped into `range`; a completion without one is `Malformed`.
pub fn parse_verdict(
    service: &'static str,
    text: &str,
    depth: AnalysisDepth,
    range: ScoreRange,
) -> Result<AnalysisVerdict, ServiceError> {
    if let Some(raw) = json_object(text).and_then(|j| serde_json::from_str::<RawVerdict>(j).ok()) {
        if let Some(score) = raw.score.as_ref().and_then(json_score) {
            let rationale = raw
                .rationale
                .filter(|r| !r.trim().is_empty())
                .or_else(|| raw.executive_summary.clone())
                .unwrap_or_default();
            let mut verdict = AnalysisVerdict::new(range.clamp(score), rationale.trim());
            if depth == AnalysisDepth::Complex {
                let report = DetailedReport {
                    executive_summary: raw.executive_summary.unwrap_or_default(),
                    unique_points: raw.unique_points,
                    challenges: raw.challenges,
                    recommendations: raw.recommendations,
                };
                verdict = verdict.with_report(report);
            }
            return Ok(verdict);
        }
    }

    let score = text_score(text)
        .ok_or_else(|| ServiceError::malformed(service, "no novelty score found in analysis"))?;
    let mut verdict = AnalysisVerdict::new(range.clamp(score), text.trim());
    if depth == AnalysisDepth::Complex {
        let report = extract_report(text);
        if !report.is_empty() {
            verdict = verdict.with_report(report);
        }
    }
    Ok(verdict)
}
