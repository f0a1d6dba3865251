//! Nutrition Store
//!
//! Nutrition-facts records looked up by predicted dish label, ranked by text
//! relevance.

mod repository;

pub use repository::{NutritionRecord, NutritionRepository, RelevanceSearch, ScoredRecord};

use thiserror::Error;

/// Default number of records returned by a search
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store lock poisoned: {0}")]
    Lock(String),
    #[error("Failed to read records: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid record data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Record must be a JSON object")]
    NotAnObject,
}
