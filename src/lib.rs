//! paperdesk - risk-bounded paper trading ledger for index options

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use services::{PaperTradingService, PriceBoard};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub trading: PaperTradingService,
    pub prices: Arc<PriceBoard>,
}

/// Build the HTTP application with CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Re-export commonly used types
pub use types::*;
pub use services::{LedgerConfig, RiskConfig, TradingError};
