// src/api.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analysis::{AnalysisDepth, AnalysisVerdict};
use crate::anon_id;
use crate::error::PipelineError;
use crate::keywords::KeywordSet;
use crate::pipeline::{IdeaRequest, NoveltyPipeline};
use crate::report::ErrorBody;

#[derive(Clone)]
pub struct AppState {
    pipeline: NoveltyPipeline,
}

impl AppState {
    pub fn new(pipeline: NoveltyPipeline) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/analyze", post(analyze))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalyzeReq {
    idea: String,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    depth: Option<AnalysisDepth>,
}

/// `PipelineError` as an HTTP response.
pub struct ApiError(pub PipelineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::InvalidRequest(_) | PipelineError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            PipelineError::NoEvidence { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::AnalysisUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::from(&self.0))).into_response()
    }
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> Result<Json<AnalysisVerdict>, ApiError> {
    info!(target: "api", idea = %anon_id(&body.idea), "POST /analyze");

    let mut req = IdeaRequest::new(body.idea);
    if let Some(terms) = body.keywords.filter(|t| !t.is_empty()) {
        let max = state.pipeline.config().keywords.max_terms;
        let keywords = KeywordSet::from_terms(terms, max).ok_or_else(|| {
            ApiError(PipelineError::InvalidRequest(
                "keywords contained no usable terms".into(),
            ))
        })?;
        req = req.with_keywords(keywords);
    }
    if let Some(depth) = body.depth {
        req = req.with_depth(depth);
    }

    state.pipeline.run(req).await.map(Json).map_err(ApiError)
}
