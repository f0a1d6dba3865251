//! Nutrition Routes

use axum::{
    extract::{Query, State},
    Json,
};
use nutrition_store::ScoredRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Query parameters for the nutrition endpoint
#[derive(Debug, Deserialize)]
pub struct NutritionQuery {
    /// Dish label, usually a `predicted_class`
    pub label: String,
    /// Maximum number of records, capped by configuration
    pub limit: Option<usize>,
}

/// Response for the nutrition endpoint
#[derive(Debug, Serialize)]
pub struct NutritionResponse {
    pub label: String,
    pub data: Vec<ScoredRecord>,
    pub count: usize,
}

/// Look up nutrition facts for a dish
pub async fn get_nutrition(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NutritionQuery>,
) -> Result<Json<NutritionResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(state.max_results)
        .min(state.max_results);

    let data = state.nutrition.search(&params.label, limit)?;

    Ok(Json(NutritionResponse {
        label: params.label,
        count: data.len(),
        data,
    }))
}
