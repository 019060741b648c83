// src/lib.rs
//! Idea novelty assessment: keyword extraction, concurrent patent and web
//! search behind a barrier, and a reasoning-service verdict.

pub mod analysis;
pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod keywords;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod search;

// ---- Re-exports for the stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::error::{ErrorKind, PipelineError, ServiceError};
pub use crate::pipeline::{IdeaRequest, NoveltyPipeline, Orchestrator, Services, Stage};

use sha2::{Digest, Sha256};

/// Short stable id for log lines; the idea text itself is never logged.
pub fn anon_id(text: &str) -> String {
    let digest = Sha256::digest(text.trim().as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}
