use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    portfolios: usize,
    quotes: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        portfolios: state.trading.portfolio_count(),
        quotes: state.prices.len(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
