//! Request payload normalization
//!
//! Callers send the encoded image either as a bare base64 string or wrapped in
//! a JSON object. Keys are searched in a fixed order: `input_data.data`, then
//! `data`, then `image`.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde_json::{Map, Value};
use tracing::debug;

use crate::PredictError;

/// Untrusted wire input
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    /// Opaque text: JSON or a bare base64 string
    Text(String),
    /// Already-parsed key-value document
    Structured(Value),
    /// Raw body bytes holding base64 text
    Bytes(Vec<u8>),
}

impl From<String> for RequestPayload {
    fn from(text: String) -> Self {
        RequestPayload::Text(text)
    }
}

impl From<&str> for RequestPayload {
    fn from(text: &str) -> Self {
        RequestPayload::Text(text.to_string())
    }
}

impl From<Value> for RequestPayload {
    fn from(value: Value) -> Self {
        RequestPayload::Structured(value)
    }
}

impl From<Vec<u8>> for RequestPayload {
    fn from(bytes: Vec<u8>) -> Self {
        RequestPayload::Bytes(bytes)
    }
}

/// Base64 text extracted from a payload, not yet validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into raw image bytes.
    ///
    /// ASCII whitespace (line wrapping) and a leading `data:<mime>;base64,`
    /// prefix are ignored; everything else must be standard padded base64.
    pub fn decode(&self) -> Result<Vec<u8>, PredictError> {
        let body = strip_data_url(self.0.trim());
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.is_empty() {
            return Err(PredictError::decode("No image data found in payload"));
        }

        BASE64_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| PredictError::decode(format!("Invalid base64 image data: {}", e)))
    }
}

fn strip_data_url(text: &str) -> &str {
    if !text.starts_with("data:") {
        return text;
    }
    match text.split_once(',') {
        Some((meta, body)) if meta.ends_with(";base64") => body,
        _ => text,
    }
}

/// Extract the encoded image string from a payload
pub fn normalize(payload: &RequestPayload) -> Result<EncodedImage, PredictError> {
    match payload {
        RequestPayload::Text(text) => {
            if text.trim().is_empty() {
                return Err(PredictError::empty_input());
            }
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => extract_from_object(&map),
                Ok(_) => Ok(EncodedImage::new(text.as_str())),
                Err(_) => {
                    debug!("Input is not JSON, treating as direct base64");
                    Ok(EncodedImage::new(text.as_str()))
                }
            }
        }
        RequestPayload::Structured(Value::Object(map)) => extract_from_object(map),
        RequestPayload::Structured(Value::String(text)) => Ok(EncodedImage::new(text.as_str())),
        RequestPayload::Structured(other) => Err(PredictError::decode(format!(
            "Unsupported payload: expected an object or string, got {}",
            json_type(other)
        ))),
        RequestPayload::Bytes(bytes) => {
            if bytes.is_empty() {
                return Err(PredictError::empty_input());
            }
            std::str::from_utf8(bytes)
                .map(EncodedImage::new)
                .map_err(|_| PredictError::decode("Raw payload is not base64 text"))
        }
    }
}

fn extract_from_object(map: &Map<String, Value>) -> Result<EncodedImage, PredictError> {
    let nested = map
        .get("input_data")
        .and_then(Value::as_object)
        .and_then(|inner| inner.get("data"));

    match nested.or_else(|| map.get("data")).or_else(|| map.get("image")) {
        Some(Value::String(text)) => Ok(EncodedImage::new(text.as_str())),
        Some(other) => Err(PredictError::decode(format!(
            "Image field must be a base64 string, got {}",
            json_type(other)
        ))),
        None => Ok(EncodedImage::default()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
