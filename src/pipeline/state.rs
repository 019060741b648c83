// src/pipeline/state.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisDepth, EvidenceSource};
use crate::error::ErrorKind;
use crate::keywords::KeywordSet;

/// Orchestrator lifecycle. `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ExtractingKeywords,
    Searching,
    AwaitingBarrier,
    Analyzing,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::ExtractingKeywords => "extracting_keywords",
            Stage::Searching => "searching",
            Stage::AwaitingBarrier => "awaiting_barrier",
            Stage::Analyzing => "analyzing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "validating the request",
            Stage::ExtractingKeywords => "extracting keywords",
            Stage::Searching => "searching",
            Stage::AwaitingBarrier => "awaiting search results",
            Stage::Analyzing => "analyzing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        })
    }
}

/// Progress of one search slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    InFlight,
    /// Terminal: number of items collected.
    Succeeded(usize),
    /// Terminal.
    Failed(ErrorKind),
}

impl SlotStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SlotStatus::Succeeded(_) | SlotStatus::Failed(_))
    }
}

/// Snapshot published on the orchestrator's watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub stage: Stage,
    pub patents: SlotStatus,
    pub web: SlotStatus,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            patents: SlotStatus::Idle,
            web: SlotStatus::Idle,
        }
    }
}

impl PipelineState {
    pub fn slot(&self, source: EvidenceSource) -> SlotStatus {
        match source {
            EvidenceSource::Patents => self.patents,
            EvidenceSource::Web => self.web,
        }
    }

    pub(crate) fn slot_mut(&mut self, source: EvidenceSource) -> &mut SlotStatus {
        match source {
            EvidenceSource::Patents => &mut self.patents,
            EvidenceSource::Web => &mut self.web,
        }
    }

    /// Both slots hold a terminal outcome.
    pub fn barrier_released(&self) -> bool {
        self.patents.is_terminal() && self.web.is_terminal()
    }
}

/// One analysis request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaRequest {
    text: String,
    keywords: Option<KeywordSet>,
    depth: Option<AnalysisDepth>,
}

impl IdeaRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keywords: None,
            depth: None,
        }
    }

    /// Caller-supplied terms; keyword extraction is skipped.
    pub fn with_keywords(mut self, keywords: KeywordSet) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn keywords(&self) -> Option<&KeywordSet> {
        self.keywords.as_ref()
    }

    /// `None` = the configured default.
    pub fn depth(&self) -> Option<AnalysisDepth> {
        self.depth
    }
}
