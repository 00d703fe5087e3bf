//! Trading API
//!
//! Endpoints for the paper trading ledger:
//!
//! Portfolios:
//! - GET /api/trading/portfolios - List user ids with a portfolio
//! - POST /api/trading/portfolios - Create a portfolio (idempotent)
//! - GET /api/trading/portfolios/:user_id - Portfolio snapshot
//! - GET /api/trading/portfolios/:user_id/stats - Performance stats
//! - GET /api/trading/portfolios/:user_id/risk - Risk metrics
//!
//! Orders and positions:
//! - POST /api/trading/orders - Place a BUY/SELL order
//! - POST /api/trading/signals - Enter a trade from a signal
//! - GET /api/trading/positions?userId= - Open positions
//! - POST /api/trading/positions/:trade_id/close - Close a position
//!
//! History:
//! - GET /api/trading/history?userId=&limit= - Trade history
//! - GET /api/trading/executions?userId=&limit= - Order executions
//! - GET /api/trading/leaderboard?period=&limit= - Ranked portfolios

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::services::{PerformanceStats, RiskMetrics, TradingError};
use crate::types::{
    CloseResult, CloseTradeRequest, CreatePortfolioRequest, EnterTradeRequest, Execution,
    LeaderboardEntry, LeaderboardPeriod, OrderResult, PaperTrade, PlaceOrderRequest, Portfolio,
};
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Leaderboard
        .route("/leaderboard", get(get_leaderboard))
        // Portfolio routes
        .route("/portfolios", get(list_portfolios).post(create_portfolio))
        .route("/portfolios/:user_id", get(get_portfolio))
        .route("/portfolios/:user_id/stats", get(get_stats))
        .route("/portfolios/:user_id/risk", get(get_risk))
        // Order routes
        .route("/orders", post(place_order))
        .route("/signals", post(enter_trade))
        // Position routes
        .route("/positions", get(list_positions))
        .route("/positions/:trade_id/close", post(close_position))
        // History routes
        .route("/history", get(get_history))
        .route("/executions", get(get_executions))
}

// =============================================================================
// Error Mapping
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// Convert TradingError to HTTP response.
impl IntoResponse for TradingError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            TradingError::PortfolioNotFound(_) => (StatusCode::NOT_FOUND, "PORTFOLIO_NOT_FOUND"),
            TradingError::TradeNotFound(_) => (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND"),
            TradingError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            TradingError::InsufficientQuantity { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_QUANTITY")
            }
            TradingError::RiskRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, "RISK_REJECTED"),
            TradingError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
            TradingError::InvalidSignal(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_SIGNAL"),
            TradingError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub period: Option<String>,
    pub limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

// =============================================================================
// Portfolio Handlers
// =============================================================================

/// GET /api/trading/portfolios
async fn list_portfolios(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::new(state.trading.list_users()))
}

/// POST /api/trading/portfolios
async fn create_portfolio(
    State(state): State<AppState>,
    Json(request): Json<CreatePortfolioRequest>,
) -> Result<Json<ApiResponse<Portfolio>>, TradingError> {
    let portfolio = state
        .trading
        .create_portfolio(&request.user_id, request.initial_balance)?;
    Ok(Json(ApiResponse::new(portfolio)))
}

/// GET /api/trading/portfolios/:user_id
async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Portfolio>>, TradingError> {
    let portfolio = state
        .trading
        .get_portfolio(&user_id)
        .ok_or(TradingError::PortfolioNotFound(user_id))?;
    Ok(Json(ApiResponse::new(portfolio)))
}

/// GET /api/trading/portfolios/:user_id/stats
async fn get_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<PerformanceStats>>, TradingError> {
    let stats = state.trading.get_stats(&user_id)?;
    Ok(Json(ApiResponse::new(stats)))
}

/// GET /api/trading/portfolios/:user_id/risk
async fn get_risk(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<RiskMetrics>>, TradingError> {
    let metrics = state.trading.get_risk_metrics(&user_id)?;
    Ok(Json(ApiResponse::new(metrics)))
}

/// GET /api/trading/leaderboard
async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, TradingError> {
    let period = match query.period.as_deref() {
        None => LeaderboardPeriod::default(),
        Some(p) => LeaderboardPeriod::parse(p)
            .ok_or_else(|| TradingError::InvalidOrder(format!("unknown period '{}'", p)))?,
    };
    let entries = state
        .trading
        .get_leaderboard(period, query.limit.unwrap_or(10).min(MAX_LIMIT));
    Ok(Json(ApiResponse::new(entries)))
}

// =============================================================================
// Order Handlers
// =============================================================================

/// POST /api/trading/orders
async fn place_order(
    State(state): State<AppState>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<OrderResult>, TradingError> {
    let result = state.trading.place_order(
        &request.user_id,
        &request.symbol,
        request.quantity,
        request.price,
        &request.order_type,
    )?;
    Ok(Json(result))
}

/// POST /api/trading/signals
async fn enter_trade(
    State(state): State<AppState>,
    Json(request): Json<EnterTradeRequest>,
) -> Result<Json<ApiResponse<PaperTrade>>, TradingError> {
    let trade = state.trading.enter_trade(&request.user_id, &request.signal)?;
    Ok(Json(ApiResponse::new(trade)))
}

// =============================================================================
// Position Handlers
// =============================================================================

/// GET /api/trading/positions
async fn list_positions(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<PaperTrade>>>, TradingError> {
    let trades = state.trading.get_active_trades(&query.user_id)?;
    Ok(Json(ApiResponse::new(trades)))
}

/// POST /api/trading/positions/:trade_id/close
async fn close_position(
    State(state): State<AppState>,
    Path(trade_id): Path<String>,
    Json(request): Json<CloseTradeRequest>,
) -> Result<Json<CloseResult>, TradingError> {
    let result = state.trading.close_trade(
        &request.user_id,
        &trade_id,
        request.exit_price,
        request.reason.unwrap_or_default(),
    )?;
    Ok(Json(result))
}

// =============================================================================
// History Handlers
// =============================================================================

/// GET /api/trading/history
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<PaperTrade>>>, TradingError> {
    let trades = state
        .trading
        .get_trade_history(&query.user_id, clamp_limit(query.limit))?;
    Ok(Json(ApiResponse::new(trades)))
}

/// GET /api/trading/executions
async fn get_executions(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Execution>>>, TradingError> {
    let executions = state
        .trading
        .get_executions(&query.user_id, clamp_limit(query.limit))?;
    Ok(Json(ApiResponse::new(executions)))
}
