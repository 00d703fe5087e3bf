//! Trading Types
//!
//! Types for the paper trading ledger: portfolios, paper trades (positions),
//! order executions and the request/response shapes used by the API.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    /// Parse "BUY"/"SELL" case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(TransactionType::Buy),
            "SELL" => Some(TransactionType::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// Kind of contract being traded. Drives the brokerage model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    /// Call option
    Ce,
    /// Put option
    Pe,
    Future,
    Equity,
}

impl InstrumentType {
    /// Infer the contract type from a trading symbol.
    ///
    /// Option symbols end in CE/PE after a strike or separator
    /// (`NIFTY24JAN22000CE`, `NIFTY_CE`); futures carry `FUT`.
    pub fn from_symbol(symbol: &str) -> Self {
        let upper = symbol.trim().to_uppercase();
        let option_suffix = |suffix: &str| {
            upper.len() > suffix.len()
                && upper.ends_with(suffix)
                && upper[..upper.len() - suffix.len()]
                    .chars()
                    .last()
                    .map(|c| c.is_ascii_digit() || c == '_' || c == ' ' || c == '-')
                    .unwrap_or(false)
        };

        if option_suffix("CE") {
            InstrumentType::Ce
        } else if option_suffix("PE") {
            InstrumentType::Pe
        } else if upper.contains("FUT") {
            InstrumentType::Future
        } else {
            InstrumentType::Equity
        }
    }

    /// Brokerage charged for one order of the given value.
    ///
    /// Options pay a flat 20 per order, futures 0.02% capped at 20,
    /// equity 0.1% capped at 20.
    pub fn brokerage(&self, trade_value: f64) -> f64 {
        match self {
            InstrumentType::Ce | InstrumentType::Pe => 20.0,
            InstrumentType::Future => (trade_value * 0.0002).min(20.0),
            InstrumentType::Equity => (trade_value * 0.001).min(20.0),
        }
    }
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentType::Ce => write!(f, "CE"),
            InstrumentType::Pe => write!(f, "PE"),
            InstrumentType::Future => write!(f, "FUTURE"),
            InstrumentType::Equity => write!(f, "EQUITY"),
        }
    }
}

/// Lifecycle of a paper trade. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TargetHit,
    StopLoss,
    Manual,
}

impl ExitReason {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TARGET_HIT" => Some(ExitReason::TargetHit),
            "STOP_LOSS" => Some(ExitReason::StopLoss),
            "MANUAL" => Some(ExitReason::Manual),
            _ => None,
        }
    }
}

impl Default for ExitReason {
    fn default() -> Self {
        ExitReason::Manual
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TargetHit => write!(f, "TARGET_HIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Leaderboard ranking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardPeriod {
    AllTime,
    Day,
}

impl LeaderboardPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all_time" | "all" | "alltime" => Some(LeaderboardPeriod::AllTime),
            "day" | "daily" | "today" => Some(LeaderboardPeriod::Day),
            _ => None,
        }
    }
}

impl Default for LeaderboardPeriod {
    fn default() -> Self {
        LeaderboardPeriod::AllTime
    }
}

// =============================================================================
// Portfolio Types
// =============================================================================

/// A user's virtual trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// Owner (unique key)
    pub user_id: String,
    /// Capital the account started with
    pub total_capital: f64,
    /// Cash not blocked in positions
    pub available_capital: f64,
    /// Cost basis of open positions
    pub invested_capital: f64,
    /// Mark-to-market P&L of open positions
    pub unrealized_pnl: f64,
    /// Net P&L already booked (after brokerage)
    pub realized_pnl: f64,
    /// available + invested + unrealized
    pub current_value: f64,
    pub total_pnl: f64,
    pub total_pnl_percentage: f64,
    /// Trailing 24h closed net P&L plus current unrealized
    pub day_pnl: f64,
    pub day_pnl_percentage: f64,
    /// Positions opened
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub avg_winning_trade: f64,
    pub avg_losing_trade: f64,
    /// stddev / mean of closed-trade net P&L
    pub dispersion_ratio: f64,
    /// Largest peak-to-current decline seen, as a fraction of the peak
    pub max_drawdown: f64,
    /// Running maximum of current_value
    pub peak_balance: f64,
    #[serde(default)]
    pub badges: Vec<String>,
    /// When portfolio was created (ms)
    pub created_at: i64,
    /// When portfolio was last updated (ms)
    pub updated_at: i64,
}

impl Portfolio {
    /// Create a fresh portfolio funded with `initial_capital`.
    pub fn new(user_id: String, initial_capital: f64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            user_id,
            total_capital: initial_capital,
            available_capital: initial_capital,
            invested_capital: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            current_value: initial_capital,
            total_pnl: 0.0,
            total_pnl_percentage: 0.0,
            day_pnl: 0.0,
            day_pnl_percentage: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            avg_winning_trade: 0.0,
            avg_losing_trade: 0.0,
            dispersion_ratio: 0.0,
            max_drawdown: 0.0,
            peak_balance: initial_capital,
            badges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current drawdown from the peak as a fraction.
    pub fn drawdown(&self) -> f64 {
        if self.peak_balance > 0.0 {
            ((self.peak_balance - self.current_value) / self.peak_balance).max(0.0)
        } else {
            0.0
        }
    }

    /// Closed trades counted in the win/loss tally.
    pub fn closed_trades(&self) -> u64 {
        self.winning_trades + self.losing_trades
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }

    /// Refresh value, P&L, peak and drawdown. Call after any position change.
    pub fn recalculate(&mut self, unrealized_pnl: f64, day_closed_pnl: f64) {
        self.unrealized_pnl = unrealized_pnl;
        self.current_value = self.available_capital + self.invested_capital + unrealized_pnl;
        self.total_pnl = self.current_value - self.total_capital;
        self.total_pnl_percentage = if self.total_capital > 0.0 {
            (self.total_pnl / self.total_capital) * 100.0
        } else {
            0.0
        };
        self.day_pnl = day_closed_pnl + unrealized_pnl;
        self.day_pnl_percentage = if self.total_capital > 0.0 {
            (self.day_pnl / self.total_capital) * 100.0
        } else {
            0.0
        };

        self.peak_balance = self.peak_balance.max(self.current_value);
        self.max_drawdown = self.max_drawdown.max(self.drawdown());
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

// =============================================================================
// Paper Trade Types
// =============================================================================

/// A simulated position, open or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperTrade {
    /// Monotonic ID, e.g. "PT-000042"
    pub trade_id: String,
    pub user_id: String,
    /// Underlying (NIFTY, BANKNIFTY, ...)
    pub instrument: String,
    /// Traded contract symbol; price updates are keyed by it
    pub symbol: String,
    pub instrument_type: InstrumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    pub transaction_type: TransactionType,
    /// Contracts currently held
    pub quantity: u32,
    pub lots: u32,
    pub lot_size: u32,
    /// Volume-weighted average entry
    pub entry_price: f64,
    pub current_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    pub status: TradeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    /// Unrealized while open, total gross P&L once closed
    pub pnl: f64,
    /// Gross P&L booked by partial sells so far
    pub realized_pnl: f64,
    pub pnl_percentage: f64,
    pub brokerage: f64,
    pub net_pnl: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    #[serde(default)]
    pub confidence: u8,
    /// When opened (ms)
    pub entry_time: i64,
    /// When closed (ms), set iff status is Closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<i64>,
}

impl PaperTrade {
    /// Open a new position at `entry_price`.
    pub fn open(
        trade_id: String,
        user_id: String,
        symbol: String,
        transaction_type: TransactionType,
        quantity: u32,
        entry_price: f64,
    ) -> Self {
        let instrument_type = InstrumentType::from_symbol(&symbol);
        Self {
            trade_id,
            user_id,
            instrument: symbol.clone(),
            symbol,
            instrument_type,
            strike_price: None,
            expiry_date: None,
            transaction_type,
            quantity,
            lots: 1,
            lot_size: quantity,
            entry_price,
            current_price: entry_price,
            target_price: None,
            stop_loss: None,
            exit_price: None,
            status: TradeStatus::Open,
            exit_reason: None,
            pnl: 0.0,
            realized_pnl: 0.0,
            pnl_percentage: 0.0,
            brokerage: 0.0,
            net_pnl: 0.0,
            signal_type: None,
            signal_id: None,
            confidence: 0,
            entry_time: chrono::Utc::now().timestamp_millis(),
            exit_time: None,
        }
    }

    pub fn with_instrument(mut self, instrument: String) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn with_lots(mut self, lots: u32, lot_size: u32) -> Self {
        self.lots = lots;
        self.lot_size = lot_size;
        self
    }

    pub fn with_exits(mut self, target_price: Option<f64>, stop_loss: Option<f64>) -> Self {
        self.target_price = target_price;
        self.stop_loss = stop_loss;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Capital blocked by the remaining quantity.
    pub fn cost_basis(&self) -> f64 {
        self.entry_price * self.quantity as f64
    }

    /// Direction-adjusted P&L of `quantity` contracts at `price`.
    pub fn pnl_for(&self, price: f64, quantity: u32) -> f64 {
        let q = quantity as f64;
        match self.transaction_type {
            TransactionType::Buy => (price - self.entry_price) * q,
            TransactionType::Sell => (self.entry_price - price) * q,
        }
    }

    /// Unrealized P&L of the full remaining quantity at `price`.
    pub fn unrealized_at(&self, price: f64) -> f64 {
        self.pnl_for(price, self.quantity)
    }

    /// Mark to `price` without closing.
    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
        self.pnl = self.unrealized_at(price);
        let basis = self.cost_basis();
        self.pnl_percentage = if basis > 0.0 { self.pnl / basis * 100.0 } else { 0.0 };
    }

    /// Target reached or crossed in the favorable direction.
    pub fn target_hit(&self, price: f64) -> bool {
        match (self.target_price, self.transaction_type) {
            (Some(target), TransactionType::Buy) => price >= target,
            (Some(target), TransactionType::Sell) => price <= target,
            (None, _) => false,
        }
    }

    /// Stop reached or crossed in the adverse direction.
    pub fn stop_hit(&self, price: f64) -> bool {
        match (self.stop_loss, self.transaction_type) {
            (Some(stop), TransactionType::Buy) => price <= stop,
            (Some(stop), TransactionType::Sell) => price >= stop,
            (None, _) => false,
        }
    }

    /// Automatic exit triggered by `price`, if any. Target is checked first.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        if self.target_hit(price) {
            Some(ExitReason::TargetHit)
        } else if self.stop_hit(price) {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}

/// Immutable record of one executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub order_id: String,
    pub user_id: String,
    /// Position the order opened, added to, or reduced
    pub trade_id: String,
    pub symbol: String,
    pub side: TransactionType,
    pub quantity: u32,
    pub price: f64,
    pub brokerage: f64,
    /// Gross P&L realized by a SELL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<f64>,
    pub executed_at: i64,
}

impl Execution {
    pub fn new(
        user_id: String,
        trade_id: String,
        symbol: String,
        side: TransactionType,
        quantity: u32,
        price: f64,
    ) -> Self {
        Self {
            order_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            trade_id,
            symbol,
            side,
            quantity,
            price,
            brokerage: 0.0,
            realized_pnl: None,
            executed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of a successful `place_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub success: bool,
    pub message: String,
    pub order_id: String,
    /// Position after the order was applied
    pub trade: PaperTrade,
    pub portfolio: Portfolio,
}

/// Outcome of a successful `close_trade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResult {
    pub success: bool,
    pub message: String,
    pub trade: PaperTrade,
    pub portfolio: Portfolio,
}

/// Counts from one mark-to-market pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSummary {
    /// Positions repriced and left open
    pub marked: usize,
    /// Positions closed by target or stop
    pub closed: usize,
}

impl MarkSummary {
    pub fn merge(&mut self, other: MarkSummary) {
        self.marked += other.marked;
        self.closed += other.closed;
    }
}

/// Leaderboard entry for portfolio rankings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub total_capital: f64,
    pub current_value: f64,
    pub total_pnl: f64,
    pub total_pnl_percentage: f64,
    pub day_pnl_percentage: f64,
    pub total_trades: u64,
    pub win_rate: f64,
    pub badges: Vec<String>,
    pub updated_at: i64,
}

// =============================================================================
// Request Types for API
// =============================================================================

/// Request to create a new portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortfolioRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_balance: Option<f64>,
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub user_id: String,
    pub symbol: String,
    pub quantity: u32,
    pub price: f64,
    pub order_type: String,
}

/// Request to close an open trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTradeRequest {
    pub user_id: String,
    pub exit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExitReason>,
}

/// Request to enter a signal-driven trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterTradeRequest {
    pub user_id: String,
    pub signal: crate::types::TradeSignal,
}
