// src/pipeline/mod.rs
//! Orchestration: keywords, then both searches concurrently, a barrier that
//! waits for two terminal outcomes, then a single retry-wrapped analysis call.

mod state;

pub use state::{IdeaRequest, PipelineState, SlotStatus, Stage};

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use crate::analysis::{
    AnalysisDepth, AnalysisService, AnalysisVerdict, EvidenceBundle, EvidenceSource, ScoreRange,
};
use crate::anon_id;
use crate::cache::CacheStore;
use crate::config::{AppConfig, ConfigError};
use crate::error::{ErrorKind, PipelineError, SearchFailure};
use crate::keywords::{KeywordExtractor, KeywordService, KeywordSet, ResolvedKeywords};
use crate::retry::{RetryError, RetryPolicy};
use crate::search::{SearchOutcome, SearchProvider, SearchService};

/// External collaborators. The cache instance is shared by every stage.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn KeywordExtractor>,
    pub patents: Arc<dyn SearchProvider>,
    pub web: Arc<dyn SearchProvider>,
    pub analysis: Arc<dyn AnalysisService>,
    pub cache: Arc<dyn CacheStore>,
}

/// Long-lived entry point. Each [`run`](Self::run) gets a fresh orchestrator.
#[derive(Clone)]
pub struct NoveltyPipeline {
    services: Services,
    config: Arc<AppConfig>,
    fallback: KeywordSet,
}

impl NoveltyPipeline {
    /// Validates `config` once; runs never re-check it.
    pub fn new(services: Services, config: Arc<AppConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        let fallback = config
            .fallback_keywords()
            .ok_or_else(|| ConfigError::Invalid("keywords.fallback is empty".into()))?;
        Ok(Self {
            services,
            config,
            fallback,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.services.cache
    }

    /// Single-use orchestrator; subscribe before calling `run` to observe stages.
    pub fn orchestrator(&self) -> Orchestrator {
        let cfg = &self.config;
        let s = &self.services;
        let ttl = cfg.cache_ttl();
        let (state, _) = watch::channel(PipelineState::default());

        Orchestrator {
            keywords: KeywordService::new(
                s.extractor.clone(),
                s.cache.clone(),
                cfg.retry.keywords.policy("keywords"),
                ttl,
                cfg.keywords.request_count,
                cfg.keywords.max_terms,
                self.fallback.clone(),
            ),
            patents: SearchService::new(
                EvidenceSource::Patents,
                s.patents.clone(),
                s.cache.clone(),
                cfg.retry.patents.policy("patents"),
                ttl,
                cfg.patents.results_limit,
            ),
            web: SearchService::new(
                EvidenceSource::Web,
                s.web.clone(),
                s.cache.clone(),
                cfg.retry.web.policy("web"),
                ttl,
                cfg.web.results_limit,
            ),
            analysis: s.analysis.clone(),
            analysis_retry: cfg.retry.analysis.policy("analysis"),
            range: cfg.analysis.score_range(),
            default_depth: cfg.analysis.depth,
            max_terms: cfg.keywords.max_terms,
            timeout: cfg.pipeline_timeout(),
            state,
        }
    }

    pub async fn run(&self, req: IdeaRequest) -> Result<AnalysisVerdict, PipelineError> {
        self.orchestrator().run(req).await
    }
}

pub struct Orchestrator {
    keywords: KeywordService,
    patents: SearchService,
    web: SearchService,
    analysis: Arc<dyn AnalysisService>,
    analysis_retry: RetryPolicy,
    range: ScoreRange,
    default_depth: AnalysisDepth,
    max_terms: usize,
    timeout: Option<Duration>,
    state: watch::Sender<PipelineState>,
}

impl Orchestrator {
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn set_stage(&self, stage: Stage) {
        self.state.send_modify(|s| s.stage = stage);
    }

    /// Drive the request to `Completed` or `Failed`. Consumes the orchestrator.
    pub async fn run(self, req: IdeaRequest) -> Result<AnalysisVerdict, PipelineError> {
        let started = Instant::now();
        let run_id = anon_id(req.text());
        let span = info_span!("pipeline", run = %run_id);

        let result = self.execute(&req, started).instrument(span).await;

        let outcome = match &result {
            Ok(v) if v.is_degraded() => "degraded",
            Ok(_) => "completed",
            Err(e) => e.code(),
        };
        counter!("pipeline_runs_total", "outcome" => outcome).increment(1);
        histogram!("pipeline_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(v) => {
                self.set_stage(Stage::Completed);
                info!(
                    target: "pipeline",
                    run = %run_id,
                    score = v.score,
                    degraded = v.is_degraded(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pipeline completed"
                );
            }
            Err(e) => {
                self.set_stage(Stage::Failed);
                warn!(
                    target: "pipeline",
                    run = %run_id,
                    stage = e.stage().as_str(),
                    code = e.code(),
                    error = %e,
                    "pipeline failed"
                );
            }
        }
        result
    }

    async fn execute(
        &self,
        req: &IdeaRequest,
        started: Instant,
    ) -> Result<AnalysisVerdict, PipelineError> {
        if req.text().trim().is_empty() {
            return Err(PipelineError::InvalidRequest("idea text is empty".into()));
        }
        let deadline = self.timeout.map(|t| started + t);

        let ResolvedKeywords {
            keywords,
            degraded: keywords_degraded,
        } = self.resolve_keywords(req, deadline).await;

        let evidence = self.search(&keywords, deadline).await?;

        self.set_stage(Stage::Analyzing);
        let depth = req.depth().unwrap_or(self.default_depth);
        let mut verdict = self.analyze(req.text(), &evidence, depth).await?;

        verdict.score = self.range.clamp(f64::from(verdict.score));
        verdict.sources_available = evidence.available_sources();
        verdict.sources_missing = evidence.missing_sources();
        verdict.keywords = keywords.terms().to_vec();
        verdict.keywords_degraded = keywords_degraded;
        Ok(verdict)
    }

    /// Caller keywords, else extraction bounded by the deadline. Extraction
    /// problems degrade to the fallback list and never stop the run.
    async fn resolve_keywords(&self, req: &IdeaRequest, deadline: Option<Instant>) -> ResolvedKeywords {
        if let Some(user) = req.keywords() {
            info!(target: "pipeline", terms = user.len(), "using caller-supplied keywords");
            return ResolvedKeywords {
                keywords: user.clone().truncated(self.max_terms),
                degraded: false,
            };
        }

        self.set_stage(Stage::ExtractingKeywords);
        let extraction = self.keywords.resolve(req.text());
        match deadline {
            Some(d) => match timeout_at(d, extraction).await {
                Ok(r) => r,
                Err(_) => {
                    warn!(target: "pipeline", "pipeline timeout during keyword extraction, using fallback list");
                    counter!("keyword_fallback_total").increment(1);
                    ResolvedKeywords {
                        keywords: self.keywords.fallback(),
                        degraded: true,
                    }
                }
            },
            None => extraction.await,
        }
    }

    /// Launch both searches and hold until each one is terminal.
    async fn search(
        &self,
        keywords: &KeywordSet,
        deadline: Option<Instant>,
    ) -> Result<EvidenceBundle, PipelineError> {
        self.state.send_modify(|s| {
            s.stage = Stage::Searching;
            s.patents = SlotStatus::InFlight;
            s.web = SlotStatus::InFlight;
        });
        info!(target: "pipeline", terms = ?keywords.terms(), "searching patents and web");

        let (patents, web) = tokio::try_join!(
            self.search_slot(&self.patents, keywords, deadline),
            self.search_slot(&self.web, keywords, deadline)
        )
        .map_err(|e| {
            error!(
                target: "pipeline",
                service = e.last.service,
                attempts = e.attempts,
                kind = %e.kind(),
                error = %e.last.message,
                "fatal search error, cancelling the other search"
            );
            PipelineError::fatal(Stage::Searching, e.last)
        })?;

        match (patents, web) {
            (SearchOutcome::Failure(patents), SearchOutcome::Failure(web)) => {
                Err(PipelineError::NoEvidence { patents, web })
            }
            (patents, web) => {
                let evidence = EvidenceBundle::from_outcomes(patents, web);
                let missing = evidence.missing_sources();
                if !missing.is_empty() {
                    counter!("pipeline_degraded_total").increment(1);
                    warn!(
                        target: "pipeline",
                        missing = ?missing,
                        items = evidence.item_count(),
                        "continuing with partial evidence"
                    );
                }
                Ok(evidence)
            }
        }
    }

    /// One slot: the search itself bounded by the pipeline deadline, then a
    /// state update. The first slot to settle moves the stage to the barrier.
    async fn search_slot(
        &self,
        service: &SearchService,
        keywords: &KeywordSet,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome, RetryError> {
        let source = service.source();
        let search = service.search(keywords);
        let result = match deadline {
            Some(d) => match timeout_at(d, search).await {
                Ok(r) => r,
                Err(_) => {
                    warn!(target: "pipeline", source = source.as_str(), "pipeline timeout, search cancelled");
                    Ok(SearchOutcome::Failure(SearchFailure {
                        kind: ErrorKind::Timeout,
                        retry_count_exhausted: false,
                        attempts: 0,
                        message: "cancelled by pipeline timeout".into(),
                    }))
                }
            },
            None => search.await,
        };

        let status = match &result {
            Ok(SearchOutcome::Success(items)) => SlotStatus::Succeeded(items.len()),
            Ok(SearchOutcome::Failure(f)) => SlotStatus::Failed(f.kind),
            Err(e) => SlotStatus::Failed(e.kind()),
        };
        self.state.send_modify(|s| {
            *s.slot_mut(source) = status;
            if s.stage == Stage::Searching {
                s.stage = Stage::AwaitingBarrier;
            }
        });
        result
    }

    async fn analyze(
        &self,
        idea: &str,
        evidence: &EvidenceBundle,
        depth: AnalysisDepth,
    ) -> Result<AnalysisVerdict, PipelineError> {
        info!(
            target: "analysis",
            service = self.analysis.name(),
            depth = depth.as_str(),
            items = evidence.item_count(),
            "requesting verdict"
        );
        let analysis = self.analysis.clone();
        let result = self
            .analysis_retry
            .execute(|_| {
                let analysis = analysis.clone();
                async move { analysis.analyze(idea, evidence, depth).await }
            })
            .await;

        result.map_err(|e| {
            error!(
                target: "analysis",
                service = e.last.service,
                attempts = e.attempts,
                kind = %e.kind(),
                error = %e.last.message,
                "analysis failed"
            );
            if e.kind().is_fatal() {
                PipelineError::fatal(Stage::Analyzing, e.last)
            } else {
                PipelineError::AnalysisUnavailable {
                    attempts: e.attempts,
                    source: e.last,
                }
            }
        })
    }
}
