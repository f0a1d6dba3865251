//! Router tests driven through `tower::ServiceExt::oneshot`

use api::rate_limit::RateLimitConfig;
use api::{create_router, AppState, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use classifier::{ClassifierConfig, ForwardPass, PredictError, ServiceContext};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use nutrition_store::NutritionRepository;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

struct FixedScores(Vec<f32>);

impl ForwardPass for FixedScores {
    fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, PredictError> {
        Ok(self.0.clone())
    }
}

fn app() -> Router {
    let context = ServiceContext::with_model(
        FixedScores(vec![1.0, 1.0, 1.0, 5.0, 1.0, 1.0]),
        &ClassifierConfig::default(),
    )
    .unwrap();

    let nutrition = NutritionRepository::new();
    for (name, calories) in [("Masala Dosa", 387), ("Plain Dosa", 168), ("Samosa", 308)] {
        let record = json!({"_id": name, "name": name, "calories": calories});
        if let Value::Object(map) = record {
            nutrition.insert(map).unwrap();
        }
    }

    let state = AppState::new(Arc::new(context), Arc::new(nutrition), 2);
    let server = ServerConfig {
        rate_limit: RateLimitConfig::disabled(),
        ..Default::default()
    };
    create_router(Arc::new(state), &server).unwrap()
}

fn png_base64() -> String {
    let img = RgbImage::from_pixel(300, 260, Rgb([200, 120, 60]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    BASE64_STANDARD.encode(buf.into_inner())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_score(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/score")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_score_wrapped_json() {
    let body = json!({"input_data": {"data": png_base64()}}).to_string();
    let (status, value) = send(app(), post_score(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["predicted_class"], "Chicken tikka");
    let confidence = value["confidence"].as_f64().unwrap();
    assert!((confidence - 0.9161).abs() < 1e-3);
    assert!(value.get("Error").is_none());
}

#[tokio::test]
async fn test_score_bare_base64() {
    let (status, value) = send(app(), post_score(png_base64())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["predicted_class"], "Chicken tikka");
}

#[tokio::test]
async fn test_score_errors_are_200_with_error_key() {
    let (status, value) = send(app(), post_score(Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({"Error": "payload error: Input data is empty"}));

    let (status, value) = send(app(), post_score("not_base64!!")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(value["Error"].as_str().unwrap().starts_with("decode error"));
    assert!(value.get("predicted_class").is_none());

    // Invalid UTF-8 goes down the raw-bytes path and fails base64 decoding
    let (status, value) = send(app(), post_score(vec![0xffu8, 0xfe, 0x00])).await;
    assert_eq!(status, StatusCode::OK);
    assert!(value["Error"].is_string());
}

#[tokio::test]
async fn test_health_counts_requests() {
    let app = app();
    let _ = send(app.clone(), post_score(png_base64())).await;
    let _ = send(app.clone(), post_score("")).await;

    let (status, value) = send(app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["model"]["device"], "cpu");
    assert_eq!(value["model"]["label_count"], 6);
    assert_eq!(value["metrics"]["predictions_served"], 1);
    assert_eq!(value["metrics"]["predictions_failed"], 1);
}

#[tokio::test]
async fn test_labels() {
    let (status, value) = send(app(), get("/api/v1/labels")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["count"], 6);
    assert_eq!(value["labels"][3], "Chicken tikka");
}

#[tokio::test]
async fn test_nutrition_lookup() {
    let (status, value) = send(app(), get("/api/v1/nutrition?label=Dosa")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["label"], "Dosa");
    assert_eq!(value["count"], 2);
    assert!(value["data"][0]["match_score"].as_f64().unwrap() > 0.0);
    assert!(value["data"][0].get("_id").is_none());

    // Capped at the configured maximum of 2
    let (_, value) = send(app(), get("/api/v1/nutrition?label=Dosa%20Samosa&limit=50")).await;
    assert_eq!(value["count"], 2);

    let (_, value) = send(app(), get("/api/v1/nutrition?label=Dosa&limit=1")).await;
    assert_eq!(value["count"], 1);
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let response = app().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
