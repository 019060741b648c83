//! Error taxonomy shared by every external collaborator and the pipeline.
//!
//! `ErrorKind` decides retry eligibility. `ServiceError` is what a single
//! attempt against a remote service returns. `PipelineError` is the only error a
//! caller of [`crate::pipeline::Orchestrator::run`] ever sees.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::EvidenceSource;
use crate::pipeline::Stage;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionFailed,
    Timeout,
    RateLimited,
    /// Service answered but is temporarily not serving (5xx, model loading).
    Unavailable,
    AuthFailed,
    Validation,
    /// Response arrived but could not be interpreted.
    Malformed,
}

impl ErrorKind {
    /// Retryable kinds. Everything else stops the retry loop on first sight.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionFailed
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::Unavailable
        )
    }

    /// Kinds that short-circuit the whole pipeline.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::AuthFailed | ErrorKind::Validation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::Validation => "validation",
            ErrorKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt against a named service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} {kind}: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            service,
            kind,
            message: message.into(),
        }
    }

    pub fn auth(service: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, ErrorKind::AuthFailed, message)
    }

    pub fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, ErrorKind::Malformed, message)
    }

    /// Map a transport-level reqwest failure.
    pub fn from_reqwest(service: &'static str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::Malformed
        } else if let Some(status) = err.status() {
            classify_status(status.as_u16())
        } else {
            ErrorKind::ConnectionFailed
        };
        Self::new(service, kind, err.to_string())
    }

    /// Map a non-success HTTP status. The body is kept (truncated) for diagnostics.
    pub fn from_status(service: &'static str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        Self::new(
            service,
            classify_status(status),
            format!("HTTP {status}: {}", snippet.trim()),
        )
    }
}

/// HTTP status → `ErrorKind`.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthFailed,
        429 => ErrorKind::RateLimited,
        408 | 504 => ErrorKind::Timeout,
        400 | 404 | 422 => ErrorKind::Validation,
        s if s >= 500 => ErrorKind::Unavailable,
        _ => ErrorKind::Malformed,
    }
}

/// Terminal failure of one search source, as recorded in its outcome slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub kind: ErrorKind,
    pub retry_count_exhausted: bool,
    pub attempts: u32,
    pub message: String,
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s)", self.kind, self.attempts)?;
        if self.retry_count_exhausted {
            f.write_str(", retries exhausted")?;
        }
        Ok(())
    }
}

/// Errors surfaced by a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request itself is unusable (e.g. empty idea text). Nothing was called.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed while {stage}: {source}")]
    Authentication { stage: Stage, source: ServiceError },

    #[error("request rejected while {stage}: {source}")]
    Validation { stage: Stage, source: ServiceError },

    /// Both search sources failed definitively; the analysis service was not called.
    #[error("no evidence available (patents: {patents}; web: {web})")]
    NoEvidence {
        patents: SearchFailure,
        web: SearchFailure,
    },

    #[error("analysis service unavailable after {attempts} attempt(s): {source}")]
    AnalysisUnavailable { attempts: u32, source: ServiceError },
}

impl PipelineError {
    /// Wrap a fatal service error raised during `stage`.
    pub(crate) fn fatal(stage: Stage, source: ServiceError) -> Self {
        match source.kind {
            ErrorKind::AuthFailed => PipelineError::Authentication { stage, source },
            _ => PipelineError::Validation { stage, source },
        }
    }

    /// Stage in which the run stopped.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidRequest(_) => Stage::Idle,
            PipelineError::Authentication { stage, .. } | PipelineError::Validation { stage, .. } => {
                *stage
            }
            PipelineError::NoEvidence { .. } => Stage::AwaitingBarrier,
            PipelineError::AnalysisUnavailable { .. } => Stage::Analyzing,
        }
    }

    /// Evidence sources known to be unavailable when the run stopped.
    pub fn unavailable_sources(&self) -> Vec<EvidenceSource> {
        match self {
            PipelineError::NoEvidence { .. } => vec![EvidenceSource::Patents, EvidenceSource::Web],
            PipelineError::Authentication { stage, source }
            | PipelineError::Validation { stage, source }
                if *stage == Stage::Searching =>
            {
                EvidenceSource::from_service(source.service).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Short machine-readable code for renderers.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Authentication { .. } => "authentication",
            PipelineError::Validation { .. } => "validation",
            PipelineError::NoEvidence { .. } => "no_evidence",
            PipelineError::AnalysisUnavailable { .. } => "analysis_unavailable",
        }
    }
}
