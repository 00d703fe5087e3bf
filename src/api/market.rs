use std::collections::HashMap;

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::Quote;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Price push from the market-data collaborator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateRequest {
    pub prices: HashMap<String, f64>,
    /// Mark portfolios now instead of waiting for the next poll.
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateResponse {
    pub accepted: usize,
    pub marked: usize,
    pub closed: usize,
}

/// POST /api/market/prices
async fn update_prices(
    State(state): State<AppState>,
    Json(request): Json<PriceUpdateRequest>,
) -> Result<Json<ApiResponse<PriceUpdateResponse>>> {
    if request.prices.is_empty() {
        return Err(AppError::BadRequest("prices must not be empty".to_string()));
    }

    let accepted = state.prices.update_many(&request.prices);
    let summary = if request.apply {
        let snapshot = state.prices.snapshot();
        let trading = state.trading.clone();
        tokio::task::spawn_blocking(move || trading.update_market_data(&snapshot))
            .await
            .map_err(|e| AppError::Internal(format!("marking failed: {}", e)))?
    } else {
        Default::default()
    };

    Ok(Json(ApiResponse::new(PriceUpdateResponse {
        accepted,
        marked: summary.marked,
        closed: summary.closed,
    })))
}

/// GET /api/market/prices/:symbol
async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Quote>>> {
    let quote = state
        .prices
        .get(&symbol)
        .ok_or_else(|| AppError::NotFound(format!("No price for {}", symbol)))?;
    Ok(Json(ApiResponse::new(quote)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prices", post(update_prices))
        .route("/prices/:symbol", get(get_price))
}
