//! Prometheus metrics for the scoring endpoint

use classifier::{InferenceResult, PredictError};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ApiError;

const PREDICTIONS_TOTAL: &str = "nutriscan_predictions_total";
const PREDICTION_LATENCY: &str = "nutriscan_prediction_latency_ms";

/// Millisecond buckets, sized for CPU inference on a single image
const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Install the global Prometheus recorder and describe our metrics
pub fn init_metrics() -> Result<PrometheusHandle, ApiError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(PREDICTION_LATENCY.to_string()),
            LATENCY_BUCKETS_MS,
        )
        .map_err(|e| ApiError::Metrics(e.to_string()))?
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))?;

    describe_counter!(
        PREDICTIONS_TOTAL,
        "Scoring requests by outcome and failing stage"
    );
    describe_histogram!(
        PREDICTION_LATENCY,
        "End-to-end latency of successful predictions in milliseconds"
    );

    Ok(handle)
}

/// Record one scoring request.
///
/// Without an installed recorder the macros are no-ops.
pub fn record_prediction(result: &Result<InferenceResult, PredictError>) {
    match result {
        Ok(result) => {
            counter!(PREDICTIONS_TOTAL,
                "outcome" => "success",
                "stage" => "none"
            )
            .increment(1);
            histogram!(PREDICTION_LATENCY).record(result.latency_ms as f64);
        }
        Err(e) => {
            counter!(PREDICTIONS_TOTAL,
                "outcome" => "error",
                "stage" => e.stage.as_str()
            )
            .increment(1);
        }
    }
}
