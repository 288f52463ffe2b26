use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dub_core::AlignError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Alignment(#[from] AlignError),

    #[error("Synthesis backend error: {0}")]
    Synthesis(anyhow::Error),

    #[error("Translation error: {0:#}")]
    Translation(anyhow::Error),

    #[error("Service not configured: {0}")]
    Configuration(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job {0} is already running")]
    Conflict(String),

    /// An error from a dub job, reported with the job id so the caller can resume it.
    #[error("{source}")]
    Job {
        job_id: String,
        source: Box<ApiError>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn for_job(job_id: &str, error: ApiError) -> Self {
        ApiError::Job {
            job_id: job_id.to_string(),
            source: Box::new(error),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Job { source, .. } => source.status(),
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Alignment(e) => match e {
                AlignError::TimingInconsistency { .. }
                | AlignError::Overrun { .. }
                | AlignError::SynthesisFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Translation(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Synthesis(_) | ApiError::Configuration(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (job_id, inner) = match &self {
            ApiError::Job { job_id, source } => (Some(job_id.clone()), source.as_ref()),
            other => (None, other),
        };
        let chunk_index = match inner {
            ApiError::Alignment(e) => e.chunk_index(),
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(?chunk_index, ?job_id, "{self:#}");
        } else {
            tracing::warn!(?chunk_index, ?job_id, "{self}");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
            chunk_index,
            job_id,
        });

        (status, body).into_response()
    }
}
