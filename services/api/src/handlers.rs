//! Axum Handlers for the REST API
//!
//! Agent catalog, API key status, objective progress and conversation analysis.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use skylos_core::analyzer::{GenerationError, ObjectiveProgress, ProgressSource};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    models::{AgentsResponse, AnalysisResponse, ApiKeyStatus, ErrorResponse, ProgressResponse},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
    TooManyRequests(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::TooManyRequests(message) => {
                (StatusCode::TOO_MANY_REQUESTS, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn generation_error(err: GenerationError) -> ApiError {
    match err {
        GenerationError::RateLimited(_) => {
            ApiError::TooManyRequests("Rate limit exceeded".to_string())
        }
        other => ApiError::InternalServerError(other.into()),
    }
}

/// List the available agents.
#[utoipa::path(
    get,
    path = "/api/agents",
    responses(
        (status = 200, description = "Agent catalog in display order", body = AgentsResponse)
    )
)]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.registry.agents().to_vec(),
    })
}

/// Report whether a Gemini API key is configured.
#[utoipa::path(
    get,
    path = "/api/api_key_status",
    responses(
        (status = 200, description = "API key status", body = ApiKeyStatus)
    )
)]
pub async fn api_key_status(State(state): State<Arc<AppState>>) -> Json<ApiKeyStatus> {
    Json(ApiKeyStatus {
        configured: state.config.gemini_api_key.is_some(),
    })
}

/// Classify each objective of an agent from its conversation notes.
#[utoipa::path(
    get,
    path = "/api/objectives_progress/{agent_id}",
    responses(
        (status = 200, description = "Objective statuses; empty for unknown agents", body = ProgressResponse),
        (status = 429, description = "Upstream rate limit", body = ErrorResponse)
    ),
    params(
        ("agent_id" = String, Path, description = "Agent ID")
    )
)]
pub async fn objectives_progress(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let Some(agent) = state.registry.get(&agent_id) else {
        return Ok(Json(ProgressResponse {
            statuses: BTreeMap::new(),
        }));
    };

    let context = match state.store.load_agent_context(&state.registry, &agent.id).await {
        Ok(context) => context,
        Err(e) => {
            warn!(agent_id = %agent.id, error = %e, "Could not load agent context; reporting all pending");
            return Ok(Json(ProgressResponse {
                statuses: ObjectiveProgress::all_pending(&agent.objectives, ProgressSource::Fallback)
                    .statuses,
            }));
        }
    };

    let progress = state
        .analyzer
        .objectives_progress(agent, &context)
        .await
        .map_err(generation_error)?;
    info!(agent_id = %agent.id, source = ?progress.source, "Objective progress computed");

    Ok(Json(ProgressResponse {
        statuses: progress.statuses,
    }))
}

/// Analyse an agent's conversation and store the report.
#[utoipa::path(
    post,
    path = "/api/analyse/{agent_id}",
    responses(
        (status = 200, description = "Analysis written to the data directory", body = AnalysisResponse),
        (status = 404, description = "Agent not found", body = ErrorResponse),
        (status = 429, description = "Upstream rate limit", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("agent_id" = String, Path, description = "Agent ID")
    )
)]
pub async fn analyse_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let agent = state
        .registry
        .get(&agent_id)
        .ok_or_else(|| ApiError::NotFound("Agent not found".to_string()))?;

    let context = state.store.load_agent_context(&state.registry, &agent.id).await?;
    let analysis = state
        .analyzer
        .analyse_conversation(agent, &context)
        .await
        .map_err(generation_error)?;
    let path = state.store.save_analysis(&agent.id, &analysis).await?;
    info!(agent_id = %agent.id, path = %path.display(), "Conversation analysis saved");

    Ok(Json(AnalysisResponse {
        message: "Analysis complete".to_string(),
        analysis,
    }))
}

/// Analyse the legacy interview and store the report.
#[utoipa::path(
    post,
    path = "/api/analyse",
    responses(
        (status = 200, description = "Interview analysis written to the data directory", body = AnalysisResponse),
        (status = 429, description = "Upstream rate limit", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn analyse_interview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let context = state.store.load_interviewer_context().await?;
    let analysis = state
        .analyzer
        .analyse_interview(&context)
        .await
        .map_err(generation_error)?;
    let path = state.store.save_interview_analysis(&analysis).await?;
    info!(path = %path.display(), "Interview analysis saved");

    Ok(Json(AnalysisResponse {
        message: "Analysis complete".to_string(),
        analysis,
    }))
}
