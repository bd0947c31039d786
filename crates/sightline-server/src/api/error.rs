//! API error taxonomy and HTTP translation.
//!
//! Every failure leaves the server as a structured JSON body carrying a
//! machine-readable error class plus the human-readable diagnostic, so a
//! client can tell "solver crashed" from "solver timed out" from "solver
//! produced garbage".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use sightline_core::{FeatureSetError, IngestError};

use crate::dispatch::DispatchError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    KindMismatch(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Solver(String),

    #[error("{0}")]
    SolverProtocol(String),

    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    pub fn class(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::KindMismatch(_) => "kind_mismatch",
            ApiError::Timeout(_) => "timeout",
            ApiError::Solver(_) => "solver_error",
            ApiError::SolverProtocol(_) => "solver_protocol_error",
            ApiError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::KindMismatch(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_)
            | ApiError::Solver(_)
            | ApiError::SolverProtocol(_)
            | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.class(), self);
        }
        let body = Json(json!({
            "error": self.class(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnsupportedType(_) => ApiError::Validation(err.to_string()),
            RegistryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RegistryError::KindMismatch { .. } => ApiError::KindMismatch(err.to_string()),
            RegistryError::Storage(_) => ApiError::Storage(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Registry(inner) => inner.into(),
            DispatchError::Timeout(_) => ApiError::Timeout(err.to_string()),
            DispatchError::Spawn { .. } | DispatchError::Io(_) => ApiError::Solver(err.to_string()),
            DispatchError::ExecutionFailed { .. } => ApiError::Solver(err.to_string()),
            DispatchError::Protocol { .. } => ApiError::SolverProtocol(err.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MalformedInput(_) | IngestError::EmptyRegion => {
                ApiError::Validation(err.to_string())
            }
            IngestError::Storage(_) => ApiError::Storage(err.to_string()),
        }
    }
}

impl From<FeatureSetError> for ApiError {
    fn from(err: FeatureSetError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
