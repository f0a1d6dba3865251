//! Repository Implementation

use crate::StoreError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

/// Fields never returned to callers
const INTERNAL_FIELDS: [&str; 2] = ["_id", "__v"];

/// Free-form nutrition-facts document
pub type NutritionRecord = Map<String, Value>;

/// Search hit with internal identifiers removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub fields: NutritionRecord,
    pub match_score: f64,
}

/// Ranked text lookup keyed by a predicted label
pub trait RelevanceSearch: Send + Sync {
    /// Up to `limit` records, most relevant first
    fn search(&self, label: &str, limit: usize) -> Result<Vec<ScoredRecord>, StoreError>;
}

/// In-memory nutrition record store
pub struct NutritionRepository {
    records: RwLock<Vec<NutritionRecord>>,
}

impl NutritionRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        info!("Creating in-memory nutrition repository");
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Create a repository holding `records`
    pub fn with_records(records: Vec<NutritionRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load records from a JSON array file
    pub async fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read(path).await?;
        let values: Vec<Value> = serde_json::from_slice(&raw)?;

        let records = values
            .into_iter()
            .map(|value| match value {
                Value::Object(map) => Ok(map),
                _ => Err(StoreError::NotAnObject),
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Loaded {} nutrition records from {}", records.len(), path.display());
        Ok(Self::with_records(records))
    }

    /// Insert a record
    pub fn insert(&self, record: NutritionRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        records.push(record);
        Ok(())
    }

    /// Get total record count
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NutritionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceSearch for NutritionRepository {
    fn search(&self, label: &str, limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let terms = tokenize(label);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let mut hits: Vec<(f64, &NutritionRecord)> = records
            .iter()
            .map(|record| (relevance(record, &terms), record))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        debug!("Search for '{}' matched {} records", label, hits.len());

        Ok(hits
            .into_iter()
            .map(|(score, record)| {
                let mut fields = record.clone();
                for key in INTERNAL_FIELDS {
                    fields.remove(key);
                }
                ScoredRecord {
                    fields,
                    match_score: score,
                }
            })
            .collect())
    }
}

/// Lowercased alphanumeric words
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Sum of per-field scores over every string in the record.
///
/// A field scores its number of term occurrences, weighted towards fields
/// that consist mostly of query terms: an exact "Samosa" beats a long
/// description that mentions samosa once.
fn relevance(record: &NutritionRecord, terms: &[String]) -> f64 {
    record
        .iter()
        .filter(|(key, _)| !INTERNAL_FIELDS.contains(&key.as_str()))
        .map(|(_, value)| value_score(value, terms))
        .sum()
}

fn value_score(value: &Value, terms: &[String]) -> f64 {
    match value {
        Value::String(text) => field_score(text, terms),
        Value::Array(items) => items.iter().map(|item| value_score(item, terms)).sum(),
        Value::Object(map) => map.values().map(|item| value_score(item, terms)).sum(),
        _ => 0.0,
    }
}

fn field_score(text: &str, terms: &[String]) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let matches = tokens.iter().filter(|token| terms.contains(token)).count();
    if matches == 0 {
        return 0.0;
    }

    let coverage = matches as f64 / tokens.len() as f64;
    matches as f64 * (0.5 + 0.5 * coverage)
}
