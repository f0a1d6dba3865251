//! Request boundary: runs the full per-request chain

use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::payload::{normalize, RequestPayload};
use crate::{InferenceResult, PredictError, Prediction, PredictionResponse, ServiceContext};

/// Serve one prediction request.
///
/// Always returns a well-formed response; every failure becomes an
/// `{"Error": ...}` object.
pub async fn predict(context: &Arc<ServiceContext>, payload: RequestPayload) -> PredictionResponse {
    PredictionResponse::from(&try_predict(context, payload).await)
}

/// Like [`predict`], keeping the typed result
pub async fn try_predict(
    context: &Arc<ServiceContext>,
    payload: RequestPayload,
) -> Result<InferenceResult, PredictError> {
    let start = Instant::now();
    info!("Received inference request");

    let result = run_chain(context, payload).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(prediction) => {
            info!(
                "Prediction result: {} (conf={:.4}, latency={}ms)",
                prediction.predicted_class, prediction.confidence, latency_ms
            );
            Ok(InferenceResult {
                prediction,
                latency_ms,
            })
        }
        Err(e) => {
            warn!(
                stage = e.stage.as_str(),
                kind = ?e.kind,
                "Prediction failed after {}ms: {}",
                latency_ms,
                e.message
            );
            Err(e)
        }
    }
}

async fn run_chain(
    context: &Arc<ServiceContext>,
    payload: RequestPayload,
) -> Result<Prediction, PredictError> {
    let encoded = normalize(&payload)?;
    debug!("Extracted base64 data of length: {}", encoded.len());

    let bytes = encoded.decode()?;
    debug!("Decoded image bytes of length: {}", bytes.len());

    let deadline = Instant::now() + context.deadline();
    let work = async {
        // Preprocessing and the forward pass are CPU bound; keep them off the
        // async workers. The permit moves into the blocking task so it is only
        // released once that task finishes, even after the caller gave up.
        let permit = match Arc::clone(context.workers()).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(PredictError::inference("Worker pool closed")),
        };
        let worker = Arc::clone(context);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            classify(&worker, &bytes, deadline)
        })
        .await
        .unwrap_or_else(|join_error| {
            Err(PredictError::inference(format!(
                "Inference task aborted: {}",
                join_error
            )))
        })
    };

    match timeout(context.deadline(), work).await {
        Ok(result) => result,
        Err(_) => Err(deadline_exceeded(context)),
    }
}

fn deadline_exceeded(context: &ServiceContext) -> PredictError {
    PredictError::inference(format!(
        "Deadline of {}ms exceeded",
        context.deadline().as_millis()
    ))
}

/// Preprocess, run the forward pass and look up the label (blocking).
///
/// The forward pass is skipped once `deadline` has passed.
pub(crate) fn classify(
    context: &ServiceContext,
    bytes: &[u8],
    deadline: Instant,
) -> Result<Prediction, PredictError> {
    let tensor = context.preprocessor().run(bytes)?;
    if Instant::now() >= deadline {
        debug!("Deadline passed during preprocessing, skipping forward pass");
        return Err(deadline_exceeded(context));
    }
    let distribution = context.executor().execute(&tensor)?;

    let predicted_class = context
        .labels()
        .get(distribution.index)
        .ok_or_else(|| {
            PredictError::inference(format!(
                "Class index {} outside label table of {}",
                distribution.index,
                context.labels().len()
            ))
        })?
        .to_string();

    Ok(Prediction {
        predicted_class,
        class_index: distribution.index,
        confidence: distribution.confidence,
        probabilities: distribution.probabilities,
    })
}
