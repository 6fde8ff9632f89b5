use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse};
use tracing::debug;

use crate::error::AppError;
use crate::exposition;
use crate::state::AppState;

/// Runs one collection cycle and encodes whatever it produced. Collection
/// failures never turn into an error response.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let samples = state.collector.collect().await;
    debug!(samples = samples.len(), "Collected GPU samples");

    let body = exposition::render(state.collector.schema(), &samples, &state.registry)?;
    Ok(([(header::CONTENT_TYPE, exposition::content_type())], body))
}
