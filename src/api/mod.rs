pub mod health;
pub mod market;
pub mod trading;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/market", market::router())
        .nest("/api/trading", trading::router())
}
