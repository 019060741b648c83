// src/report.rs
//! Rendering of verdicts and pipeline errors for the CLI and HTTP surfaces.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use crate::analysis::{AnalysisVerdict, DetailedReport, EvidenceSource, ScoreRange};
use crate::error::PipelineError;
use crate::pipeline::Stage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{other}' (expected text|markdown|json)")),
        }
    }
}

/// Error payload shared by the CLI's JSON output and the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub stage: Stage,
    pub unavailable_sources: Vec<EvidenceSource>,
}

impl From<&PipelineError> for ErrorBody {
    fn from(e: &PipelineError) -> Self {
        Self {
            error: e.to_string(),
            code: e.code(),
            stage: e.stage(),
            unavailable_sources: e.unavailable_sources(),
        }
    }
}

fn source_list(sources: &[EvidenceSource]) -> String {
    if sources.is_empty() {
        return "none".into();
    }
    sources.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

fn push_list(out: &mut String, heading: &str, items: &[String], markdown: bool) {
    if items.is_empty() {
        return;
    }
    if markdown {
        let _ = writeln!(out, "\n### {heading}");
    } else {
        let _ = writeln!(out, "\n{heading}:");
    }
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

fn push_report(out: &mut String, report: &DetailedReport, markdown: bool) {
    if !report.executive_summary.trim().is_empty() {
        if markdown {
            let _ = writeln!(out, "\n### Executive Summary\n{}", report.executive_summary.trim());
        } else {
            let _ = writeln!(out, "\nSummary: {}", report.executive_summary.trim());
        }
    }
    push_list(out, "Unique Points", &report.unique_points, markdown);
    push_list(out, "Challenges", &report.challenges, markdown);
    push_list(out, "Recommendations", &report.recommendations, markdown);
}

pub fn render_verdict(v: &AnalysisVerdict, range: ScoreRange, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(v).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "Novelty score: {}/{}", v.score, range.max);
            let _ = writeln!(out, "Keywords: {}", v.keywords.join(", "));
            if v.keywords_degraded {
                let _ = writeln!(out, "  (keyword extraction failed; fallback list used)");
            }
            let _ = writeln!(out, "Sources: {}", source_list(&v.sources_available));
            if v.is_degraded() {
                let _ = writeln!(out, "Unavailable: {}", source_list(&v.sources_missing));
            }
            let _ = writeln!(out, "\n{}", v.rationale.trim());
            if let Some(report) = &v.report {
                push_report(&mut out, report, false);
            }
            out
        }
        OutputFormat::Markdown => {
            let mut out = String::from("# Novelty Assessment\n\n");
            let _ = writeln!(out, "**Novelty score:** {}/{}\n", v.score, range.max);
            let _ = writeln!(out, "**Keywords:** {}\n", v.keywords.join(", "));
            let _ = writeln!(out, "**Sources:** {}\n", source_list(&v.sources_available));
            if v.is_degraded() {
                let _ = writeln!(
                    out,
                    "> Partial evidence: {} unavailable.\n",
                    source_list(&v.sources_missing)
                );
            }
            let _ = writeln!(out, "## Analysis\n\n{}", v.rationale.trim());
            if let Some(report) = &v.report {
                push_report(&mut out, report, true);
            }
            out
        }
    }
}

pub fn render_error(e: &PipelineError, format: OutputFormat) -> String {
    let body = ErrorBody::from(e);
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.error.clone())
        }
        OutputFormat::Text | OutputFormat::Markdown => {
            let mut out = format!("Error ({}) while {}: {}", body.code, body.stage, body.error);
            if !body.unavailable_sources.is_empty() {
                let _ = write!(out, "\nUnavailable sources: {}", source_list(&body.unavailable_sources));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SearchFailure};

    fn verdict() -> AnalysisVerdict {
        let mut v = AnalysisVerdict::new(6, "Two similar pads exist.");
        v.sources_available = vec![EvidenceSource::Patents];
        v.sources_missing = vec![EvidenceSource::Web];
        v.keywords = vec!["wireless charging".into(), "parking pad".into()];
        v
    }

    #[test]
    fn text_mentions_missing_source() {
        let out = render_verdict(&verdict(), ScoreRange::default(), OutputFormat::Text);
        assert!(out.starts_with("Novelty score: 6/10\n"));
        assert!(out.contains("Unavailable: web"));
        assert!(out.contains("Two similar pads exist."));
    }

    #[test]
    fn markdown_includes_report_sections() {
        let v = verdict().with_report(DetailedReport {
            executive_summary: "Summary here".into(),
            unique_points: vec!["auto alignment".into()],
            challenges: vec![],
            recommendations: vec!["partner".into()],
        });
        let out = render_verdict(&v, ScoreRange::default(), OutputFormat::Markdown);
        assert!(out.contains("### Executive Summary\nSummary here"));
        assert!(out.contains("### Unique Points\n- auto alignment"));
        assert!(!out.contains("### Challenges"));
    }

    #[test]
    fn error_body_names_stage_and_sources() {
        let f = SearchFailure {
            kind: ErrorKind::ConnectionFailed,
            retry_count_exhausted: true,
            attempts: 3,
            message: "down".into(),
        };
        let e = PipelineError::NoEvidence {
            patents: f.clone(),
            web: f,
        };
        let json: serde_json::Value = serde_json::from_str(&render_error(&e, OutputFormat::Json)).unwrap();
        assert_eq!(json["stage"], "awaiting_barrier");
        assert_eq!(json["code"], "no_evidence");
        assert_eq!(json["unavailable_sources"], serde_json::json!(["patents", "web"]));
        let text = render_error(&e, OutputFormat::Text);
        assert!(text.contains("Unavailable sources: patents, web"));
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("MD".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
