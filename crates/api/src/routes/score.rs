//! Scoring Route
//!
//! `POST /score` accepts any of the payload shapes the classifier
//! understands and always answers 200 with either
//! `{"predicted_class", "confidence"}` or `{"Error"}`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    Json,
};
use classifier::{try_predict, ErrorKind, PredictError, PredictionResponse, RequestPayload, Stage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

use crate::telemetry::record_prediction;
use crate::AppState;

/// Score one image
pub async fn score(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Json<PredictionResponse> {
    let result = match body {
        Ok(bytes) => try_predict(&state.context, into_payload(bytes)).await,
        Err(rejection) => {
            warn!("Rejected scoring body: {}", rejection.body_text());
            Err(PredictError::new(
                ErrorKind::DecodeFailure,
                Stage::Payload,
                rejection.body_text(),
            ))
        }
    };

    record_prediction(&result);
    let counter = if result.is_ok() {
        &state.predictions_served
    } else {
        &state.predictions_failed
    };
    counter.fetch_add(1, Ordering::Relaxed);

    Json(PredictionResponse::from(&result))
}

/// UTF-8 bodies are handled as text (bare base64 or JSON), anything else
/// as raw bytes
fn into_payload(bytes: Bytes) -> RequestPayload {
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => RequestPayload::Text(text),
        Err(e) => RequestPayload::Bytes(e.into_bytes()),
    }
}
