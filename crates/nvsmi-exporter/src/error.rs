use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::exposition::ExpositionError;

#[derive(Debug)]
pub enum AppError {
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, message).into_response()
    }
}

impl From<ExpositionError> for AppError {
    fn from(e: ExpositionError) -> Self {
        error!("Failed to encode metrics: {}", e);
        AppError::Internal(e.to_string())
    }
}
