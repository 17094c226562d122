use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use velora_core::EngineError;

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    Internal(anyhow::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, retryable, message) = match &self {
            AppError::Engine(err) => {
                let status = match err {
                    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                    EngineError::Authorization { .. } => StatusCode::FORBIDDEN,
                    EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
                    EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                    EngineError::FraudBlocked { .. } => StatusCode::PAYMENT_REQUIRED,
                    EngineError::DuplicateSubmission(_) => StatusCode::CONFLICT,
                    EngineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                    EngineError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
                    EngineError::MissingProof => StatusCode::BAD_REQUEST,
                    EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let kind = match err {
                    EngineError::Validation(_) => "validation",
                    EngineError::Authorization { .. } => "authorization",
                    EngineError::InvalidTransition { .. } => "invalid_transition",
                    EngineError::NotFound { .. } => "not_found",
                    EngineError::FraudBlocked { .. } => "fraud_blocked",
                    EngineError::DuplicateSubmission(_) => "duplicate_submission",
                    EngineError::RateLimited(_) => "rate_limited",
                    EngineError::ConcurrencyConflict(_) => "concurrency_conflict",
                    EngineError::MissingProof => "missing_proof",
                    EngineError::Persistence(_) => "persistence",
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    "Internal Server Error".to_string()
                } else {
                    err.to_string()
                };
                (status, kind, err.is_retryable(), message)
            }
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    false,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}
