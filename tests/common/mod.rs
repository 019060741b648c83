// tests/common/mod.rs
//
// Scripted stand-ins for the external services plus a harness that wires
// them into a pipeline. Every stub counts its calls so tests can assert
// "never called" / "called once" properties.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use novelty_assessor::analysis::{
    AnalysisDepth, AnalysisService, AnalysisVerdict, EvidenceBundle, EvidenceSource,
};
use novelty_assessor::cache::{CacheStore, MemoryCache};
use novelty_assessor::config::AppConfig;
use novelty_assessor::error::{ErrorKind, ServiceError};
use novelty_assessor::keywords::{KeywordExtractor, KeywordSet};
use novelty_assessor::pipeline::{NoveltyPipeline, Services};
use novelty_assessor::retry::RetrySpec;
use novelty_assessor::search::{ItemMetadata, ResultItem, SearchProvider};

pub const WIRELESS_IDEA: &str = "wireless charging pad for electric vehicles";

pub fn patent_items(n: usize) -> Vec<ResultItem> {
    (1..=n)
        .map(|i| ResultItem {
            title: format!("Inductive charging patent {i}"),
            url: format!("https://patents.google.com/patent/US{i}"),
            snippet: "A ground pad transfers power to a vehicle coil.".into(),
            metadata: ItemMetadata::Patent {
                publication_number: Some(format!("US{i}")),
                filing_date: Some("2020-01-01".into()),
                inventors: vec!["A. Inventor".into()],
                assignee: None,
            },
        })
        .collect()
}

pub fn web_items(n: usize) -> Vec<ResultItem> {
    (1..=n)
        .map(|i| ResultItem {
            title: format!("EV charging mat {i}"),
            url: format!("https://shop{i}.test/mat"),
            snippet: "Park over the mat to charge, $499".into(),
            metadata: ItemMetadata::Web {
                source: Some(format!("shop{i}.test")),
                published: None,
                price: Some("$499".into()),
            },
        })
        .collect()
}

/// Defaults with short, jitter-free retry schedules.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.retry.keywords = RetrySpec::new(2, 100, 2.0).with_jitter(0.0);
    cfg.retry.patents = RetrySpec::new(3, 100, 2.0).with_jitter(0.0);
    cfg.retry.web = RetrySpec::new(3, 100, 2.0).with_jitter(0.0);
    cfg.retry.analysis = RetrySpec::new(2, 100, 2.0).with_jitter(0.0);
    cfg
}

pub fn err(service: &'static str, kind: ErrorKind) -> ServiceError {
    ServiceError::new(service, kind, format!("scripted {kind}"))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

pub struct StubSearch {
    name: &'static str,
    delay: Duration,
    script: Mutex<VecDeque<Result<Vec<ResultItem>, ServiceError>>>,
    otherwise: Result<Vec<ResultItem>, ServiceError>,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl StubSearch {
    pub fn ok(name: &'static str, items: Vec<ResultItem>) -> Self {
        Self::with_result(name, Ok(items))
    }

    pub fn failing(name: &'static str, kind: ErrorKind) -> Self {
        Self::with_result(name, Err(err(name, kind)))
    }

    fn with_result(name: &'static str, otherwise: Result<Vec<ResultItem>, ServiceError>) -> Self {
        Self {
            name,
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            otherwise,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answers consumed in order before falling back to the default result.
    pub fn first(self, answer: Result<Vec<ResultItem>, ServiceError>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, keywords: &KeywordSet) -> Result<Vec<ResultItem>, ServiceError> {
        assert!(!keywords.is_empty(), "provider received an empty keyword set");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.otherwise.clone())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

pub struct StubExtractor {
    result: Result<Vec<String>, ServiceError>,
    calls: AtomicU32,
}

impl StubExtractor {
    pub fn ok(terms: &[&str]) -> Self {
        Self {
            result: Ok(terms.iter().map(|t| t.to_string()).collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self::answering(err("stub-keywords", kind))
    }

    /// Every call fails with exactly `error`.
    pub fn answering(error: ServiceError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordExtractor for StubExtractor {
    async fn extract(&self, _text: &str, count: usize) -> Result<KeywordSet, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(terms) => KeywordSet::from_terms(terms, count)
                .ok_or_else(|| ServiceError::malformed("stub-keywords", "no terms")),
            Err(e) => Err(e.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "stub-keywords"
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// What the analysis stub was handed on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisCall {
    pub items: usize,
    pub sources: Vec<EvidenceSource>,
    pub depth: AnalysisDepth,
}

pub struct StubAnalysis {
    result: Result<u8, ErrorKind>,
    calls: Mutex<Vec<AnalysisCall>>,
}

impl StubAnalysis {
    pub fn scoring(score: u8) -> Self {
        Self {
            result: Ok(score),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            result: Err(kind),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AnalysisCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for StubAnalysis {
    async fn analyze(
        &self,
        _idea: &str,
        evidence: &EvidenceBundle,
        depth: AnalysisDepth,
    ) -> Result<AnalysisVerdict, ServiceError> {
        self.calls.lock().unwrap().push(AnalysisCall {
            items: evidence.item_count(),
            sources: evidence.available_sources(),
            depth,
        });
        match self.result {
            Ok(score) => Ok(AnalysisVerdict::new(score, "stub rationale")),
            Err(kind) => Err(err("stub-analysis", kind)),
        }
    }

    fn name(&self) -> &'static str {
        "stub-analysis"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub extractor: Arc<StubExtractor>,
    pub patents: Arc<StubSearch>,
    pub web: Arc<StubSearch>,
    pub analysis: Arc<StubAnalysis>,
    pub cache: Arc<MemoryCache>,
}

impl Harness {
    pub fn new(patents: StubSearch, web: StubSearch) -> Self {
        Self {
            extractor: Arc::new(StubExtractor::ok(&["wireless charging", "electric vehicle", "parking pad"])),
            patents: Arc::new(patents),
            web: Arc::new(web),
            analysis: Arc::new(StubAnalysis::scoring(7)),
            cache: Arc::new(MemoryCache::new()),
        }
    }

    /// Two patents and two web items, no delays.
    pub fn happy() -> Self {
        Self::new(
            StubSearch::ok("patents-stub", patent_items(2)),
            StubSearch::ok("web-stub", web_items(2)),
        )
    }

    pub fn with_extractor(mut self, extractor: StubExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_analysis(mut self, analysis: StubAnalysis) -> Self {
        self.analysis = Arc::new(analysis);
        self
    }

    pub fn services(&self) -> Services {
        let cache: Arc<dyn CacheStore> = self.cache.clone();
        Services {
            extractor: self.extractor.clone(),
            patents: self.patents.clone(),
            web: self.web.clone(),
            analysis: self.analysis.clone(),
            cache,
        }
    }

    pub fn pipeline(&self, cfg: AppConfig) -> NoveltyPipeline {
        NoveltyPipeline::new(self.services(), Arc::new(cfg)).expect("valid test config")
    }
}
