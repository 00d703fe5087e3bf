//! Trading Service
//!
//! The paper trading ledger:
//! - Portfolio management (create, restore, snapshot)
//! - Manual orders (BUY averages in, SELL consumes oldest first)
//! - Signal-driven entries gated by the risk manager
//! - Mark-to-market with automatic target/stop exits
//! - Stats, badges and the leaderboard
//!
//! Each portfolio lives in its own `PortfolioBook` behind a mutex; every
//! mutation runs to completion under that lock. Persistence goes through the
//! ledger writer thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ledger_writer::LedgerWriter;
use super::risk_manager::{RiskConfig, RiskManager, RiskMetrics};
use super::sqlite_store::SqliteStore;
use super::stats::{evaluate_badges, rank_leaderboard, PerformanceStats};
use crate::types::{
    Bias, CloseResult, Execution, ExitReason, LeaderboardEntry, LeaderboardPeriod, MarkSummary,
    OrderResult, PaperTrade, Portfolio, TradeSignal, TransactionType,
};

/// Trading service errors.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Portfolio not found: {0}")]
    PortfolioNotFound(String),

    #[error("Trade not found or already closed: {0}")]
    TradeNotFound(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient quantity: requested {requested}, have {available}")]
    InsufficientQuantity { requested: u64, available: u64 },

    #[error("Risk check failed: {0}")]
    RiskRejected(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for TradingError {
    fn from(e: rusqlite::Error) -> Self {
        TradingError::Database(e.to_string())
    }
}

/// Starting capital for portfolios created implicitly by an order.
pub const DEFAULT_CAPITAL: f64 = 100_000.0;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub default_capital: f64,
    pub risk: RiskConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_capital: DEFAULT_CAPITAL,
            risk: RiskConfig::default(),
        }
    }
}

// =============================================================================
// Portfolio Book
// =============================================================================

/// One user's ledger: the portfolio, its open positions, closed history,
/// executions and risk state.
struct PortfolioBook {
    portfolio: Portfolio,
    /// Open positions, oldest first
    open: Vec<PaperTrade>,
    /// Closed positions in close order
    history: Vec<PaperTrade>,
    executions: Vec<Execution>,
    risk: RiskManager,
    dirty_trades: Vec<PaperTrade>,
    new_executions: Vec<Execution>,
}

impl PortfolioBook {
    fn new(portfolio: Portfolio, risk_config: RiskConfig) -> Self {
        Self {
            portfolio,
            open: Vec::new(),
            history: Vec::new(),
            executions: Vec::new(),
            risk: RiskManager::new(risk_config),
            dirty_trades: Vec::new(),
            new_executions: Vec::new(),
        }
    }

    /// Rebuild a book from persisted rows.
    fn restore(
        portfolio: Portfolio,
        trades: Vec<PaperTrade>,
        executions: Vec<Execution>,
        risk_config: RiskConfig,
    ) -> Self {
        let mut book = Self::new(portfolio, risk_config);
        let (open, mut history): (Vec<_>, Vec<_>) = trades.into_iter().partition(|t| t.is_open());
        history.sort_by_key(|t| t.exit_time.unwrap_or(t.entry_time));

        for trade in &open {
            if let Some(signal) = signal_of(trade) {
                book.risk.add_position(&trade.trade_id, &signal, trade.quantity);
                book.risk.update_position(&trade.trade_id, trade.current_price);
            }
        }
        for trade in &history {
            if let Some(exit_time) = trade.exit_time.and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
                book.risk.record_realized(trade.net_pnl, exit_time);
            }
        }

        book.open = open;
        book.history = history;
        book.executions = executions;
        book
    }

    fn unrealized(&self) -> f64 {
        self.open.iter().map(|t| t.pnl).sum()
    }

    /// Net P&L of trades closed in the trailing 24 hours.
    fn day_closed_pnl(&self, now_ms: i64) -> f64 {
        self.history
            .iter()
            .filter(|t| t.exit_time.map(|x| x >= now_ms - DAY_MS).unwrap_or(false))
            .map(|t| t.net_pnl)
            .sum()
    }

    /// Recompute invested capital, value, P&L, peak and drawdown.
    fn refresh(&mut self) {
        let now_ms = Utc::now().timestamp_millis();
        self.portfolio.invested_capital = self.open.iter().map(PaperTrade::cost_basis).sum();
        let unrealized = self.unrealized();
        let day_closed = self.day_closed_pnl(now_ms);
        self.portfolio.recalculate(unrealized, day_closed);
    }

    fn record_execution(&mut self, execution: Execution) {
        self.executions.push(execution.clone());
        self.new_executions.push(execution);
    }

    fn take_changes(&mut self) -> (Vec<PaperTrade>, Vec<Execution>) {
        (
            std::mem::take(&mut self.dirty_trades),
            std::mem::take(&mut self.new_executions),
        )
    }

    /// Keep the risk manager's copy of a signal-driven position in step with
    /// a manual order that changed its size or average entry.
    fn track_resize(&mut self, trade: &PaperTrade) {
        if self.risk.is_tracking(&trade.trade_id) {
            self.risk.resize_position(
                &trade.trade_id,
                trade.entry_price,
                trade.quantity,
                trade.current_price,
            );
        }
    }

    /// Debit the cost basis and add the position.
    fn open_position(&mut self, trade: PaperTrade) {
        self.portfolio.available_capital -= trade.cost_basis();
        self.portfolio.total_trades += 1;
        self.dirty_trades.push(trade.clone());
        self.open.push(trade);
    }

    fn open_buy_index(&self, symbol: &str) -> Option<usize> {
        self.open
            .iter()
            .position(|t| t.symbol == symbol && t.transaction_type == TransactionType::Buy)
    }

    fn open_buy_quantity(&self, symbol: &str) -> u64 {
        self.open
            .iter()
            .filter(|t| t.symbol == symbol && t.transaction_type == TransactionType::Buy)
            .map(|t| t.quantity as u64)
            .sum()
    }

    /// BUY: average into the oldest open BUY position on `symbol`, or open a new one.
    fn buy(
        &mut self,
        symbol: &str,
        quantity: u32,
        price: f64,
        next_id: impl FnOnce() -> String,
    ) -> Result<(PaperTrade, Execution), TradingError> {
        let cost = quantity as f64 * price;
        if cost > self.portfolio.available_capital {
            return Err(TradingError::InsufficientFunds {
                needed: cost,
                available: self.portfolio.available_capital,
            });
        }

        let trade = match self.open_buy_index(symbol) {
            Some(idx) => {
                let trade = &mut self.open[idx];
                let total = trade
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| TradingError::InvalidOrder("position quantity overflow".into()))?;
                trade.entry_price =
                    (trade.quantity as f64 * trade.entry_price + cost) / total as f64;
                trade.quantity = total;
                trade.lots = total.div_ceil(trade.lot_size.max(1));
                trade.mark(price);
                self.portfolio.available_capital -= cost;
                let snapshot = trade.clone();
                self.track_resize(&snapshot);
                self.dirty_trades.push(snapshot.clone());
                snapshot
            }
            None => {
                let trade = PaperTrade::open(
                    next_id(),
                    self.portfolio.user_id.clone(),
                    symbol.to_string(),
                    TransactionType::Buy,
                    quantity,
                    price,
                );
                self.open_position(trade.clone());
                trade
            }
        };

        let execution = Execution::new(
            self.portfolio.user_id.clone(),
            trade.trade_id.clone(),
            symbol.to_string(),
            TransactionType::Buy,
            quantity,
            price,
        );
        self.record_execution(execution.clone());
        Ok((trade, execution))
    }

    /// SELL: reduce open BUY positions on `symbol`, oldest first.
    fn sell(
        &mut self,
        symbol: &str,
        quantity: u32,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<(PaperTrade, Execution), TradingError> {
        let held = self.open_buy_quantity(symbol);
        if quantity as u64 > held {
            return Err(TradingError::InsufficientQuantity {
                requested: quantity as u64,
                available: held,
            });
        }

        let order_value = quantity as f64 * price;
        let mut brokerage_due = self.open_buy_index(symbol).map(|idx| {
            self.open[idx].instrument_type.brokerage(order_value)
        });
        let order_brokerage = brokerage_due.unwrap_or(0.0);
        let mut remaining = quantity;
        let mut realized = 0.0;
        let mut last_trade = None;

        while remaining > 0 {
            let Some(idx) = self.open_buy_index(symbol) else {
                break;
            };
            let brokerage = brokerage_due.take().unwrap_or(0.0);
            let slice = remaining.min(self.open[idx].quantity);

            if slice == self.open[idx].quantity {
                let (closed, gross) = self.close_at(idx, price, ExitReason::Manual, brokerage, now);
                realized += gross;
                last_trade = Some(closed);
            } else {
                let trade = &mut self.open[idx];
                let gross = trade.pnl_for(price, slice);
                let basis = trade.entry_price * slice as f64;
                trade.quantity -= slice;
                trade.realized_pnl += gross;
                trade.brokerage += brokerage;
                trade.mark(price);
                let snapshot = trade.clone();

                self.portfolio.available_capital += basis + gross - brokerage;
                self.portfolio.realized_pnl += gross - brokerage;
                self.risk.record_realized(gross - brokerage, now);
                self.track_resize(&snapshot);
                self.dirty_trades.push(snapshot.clone());
                realized += gross;
                last_trade = Some(snapshot);
            }
            remaining -= slice;
        }

        let trade = last_trade.ok_or_else(|| TradingError::InsufficientQuantity {
            requested: quantity as u64,
            available: held,
        })?;

        let mut execution = Execution::new(
            self.portfolio.user_id.clone(),
            trade.trade_id.clone(),
            symbol.to_string(),
            TransactionType::Sell,
            quantity,
            price,
        );
        execution.brokerage = order_brokerage;
        execution.realized_pnl = Some(realized);
        self.record_execution(execution.clone());
        Ok((trade, execution))
    }

    /// Close the open position at `idx`. Returns the closed trade and the gross
    /// P&L realized by this close.
    fn close_at(
        &mut self,
        idx: usize,
        exit_price: f64,
        reason: ExitReason,
        brokerage: f64,
        now: DateTime<Utc>,
    ) -> (PaperTrade, f64) {
        let mut trade = self.open.remove(idx);
        let gross = trade.unrealized_at(exit_price);
        let basis = trade.cost_basis();

        self.portfolio.available_capital += basis + gross - brokerage;
        self.portfolio.realized_pnl += gross - brokerage;

        trade.realized_pnl += gross;
        trade.brokerage += brokerage;
        trade.pnl = trade.realized_pnl;
        trade.net_pnl = trade.pnl - trade.brokerage;
        trade.pnl_percentage = if basis > 0.0 { trade.net_pnl / basis * 100.0 } else { 0.0 };
        trade.current_price = exit_price;
        trade.exit_price = Some(exit_price);
        trade.status = crate::types::TradeStatus::Closed;
        trade.exit_reason = Some(reason);
        trade.exit_time = Some(now.timestamp_millis());

        if trade.net_pnl > 0.0 {
            self.portfolio.winning_trades += 1;
        } else {
            self.portfolio.losing_trades += 1;
        }

        self.risk.remove_position(&trade.trade_id);
        self.risk.record_realized(gross - brokerage, now);

        self.history.push(trade.clone());
        self.dirty_trades.push(trade.clone());
        PerformanceStats::from_history(&self.history).apply_to(&mut self.portfolio);

        info!(
            "Closed {} {} x{} @ {:.2} ({}) net {:.2}",
            trade.trade_id, trade.symbol, trade.quantity, exit_price, reason, trade.net_pnl
        );
        (trade, gross)
    }

    /// Close an open position by id, charging exit brokerage on the exit value.
    fn close_trade(
        &mut self,
        trade_id: &str,
        exit_price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<PaperTrade, TradingError> {
        let idx = self
            .open
            .iter()
            .position(|t| t.trade_id == trade_id)
            .ok_or_else(|| TradingError::TradeNotFound(trade_id.to_string()))?;

        let open = &self.open[idx];
        let brokerage = open.instrument_type.brokerage(exit_price * open.quantity as f64);
        let side = match open.transaction_type {
            TransactionType::Buy => TransactionType::Sell,
            TransactionType::Sell => TransactionType::Buy,
        };

        let (trade, gross) = self.close_at(idx, exit_price, reason, brokerage, now);

        let mut execution = Execution::new(
            trade.user_id.clone(),
            trade.trade_id.clone(),
            trade.symbol.clone(),
            side,
            trade.quantity,
            exit_price,
        );
        execution.brokerage = brokerage;
        execution.realized_pnl = Some(gross);
        self.record_execution(execution);
        Ok(trade)
    }

    /// Reprice positions present in `prices`, then close those whose target or
    /// stop was reached. The target is checked first.
    fn mark(&mut self, prices: &HashMap<String, f64>, now: DateTime<Utc>) -> MarkSummary {
        let mut summary = MarkSummary::default();
        let mut triggered = Vec::new();

        for trade in self.open.iter_mut() {
            let Some(&price) = prices.get(&trade.symbol) else {
                continue;
            };
            if !price.is_finite() || price < 0.0 {
                continue;
            }

            trade.mark(price);
            self.risk.update_position(&trade.trade_id, price);
            match trade.exit_trigger(price) {
                Some(reason) => triggered.push((trade.trade_id.clone(), price, reason)),
                None => {
                    self.dirty_trades.push(trade.clone());
                    summary.marked += 1;
                }
            }
        }

        for (trade_id, price, reason) in triggered {
            if self.close_trade(&trade_id, price, reason, now).is_ok() {
                summary.closed += 1;
            }
        }

        if summary.marked > 0 || summary.closed > 0 {
            debug!(
                "Marked {} positions for {}, closed {}",
                summary.marked, self.portfolio.user_id, summary.closed
            );
        }
        summary
    }
}

/// Rebuild the signal behind a restored signal-driven position.
fn signal_of(trade: &PaperTrade) -> Option<TradeSignal> {
    let signal_type = trade.signal_type.clone()?;
    Some(
        TradeSignal::new(
            trade.instrument.clone(),
            trade.symbol.clone(),
            signal_type,
            trade.entry_price,
            trade.target_price.unwrap_or(trade.entry_price),
            trade.stop_loss.unwrap_or(trade.entry_price),
        )
        .with_lot_size(trade.lot_size.max(1)),
    )
}

// =============================================================================
// Paper Trading Service
// =============================================================================

/// Paper trading service.
#[derive(Clone)]
pub struct PaperTradingService {
    /// Books by user id
    books: Arc<DashMap<String, Arc<Mutex<PortfolioBook>>>>,
    /// Last issued trade sequence number
    trade_seq: Arc<AtomicU64>,
    config: LedgerConfig,
    writer: Option<Arc<LedgerWriter>>,
}

impl PaperTradingService {
    /// Create an in-memory ledger with no persistence.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            books: Arc::new(DashMap::new()),
            trade_seq: Arc::new(AtomicU64::new(0)),
            config,
            writer: None,
        }
    }

    /// Create a ledger that persists through `writer`.
    pub fn with_writer(config: LedgerConfig, writer: Arc<LedgerWriter>) -> Self {
        Self {
            writer: Some(writer),
            ..Self::new(config)
        }
    }

    /// Load every portfolio with its trades and executions from the store.
    pub fn restore(&self, store: &SqliteStore) -> Result<usize, TradingError> {
        self.trade_seq
            .fetch_max(store.max_trade_seq()?, Ordering::SeqCst);

        let portfolios = store.load_portfolios()?;
        let count = portfolios.len();
        for portfolio in portfolios {
            let trades = store.load_trades(&portfolio.user_id)?;
            let executions = store.load_executions(&portfolio.user_id)?;
            let user_id = portfolio.user_id.clone();
            let book = PortfolioBook::restore(portfolio, trades, executions, self.config.risk.clone());
            self.books.insert(user_id, Arc::new(Mutex::new(book)));
        }

        info!("Restored {} portfolios", count);
        Ok(count)
    }

    fn next_trade_id(&self) -> String {
        format!("PT-{:06}", self.trade_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn book(&self, user_id: &str) -> Result<Arc<Mutex<PortfolioBook>>, TradingError> {
        self.books
            .get(user_id)
            .map(|b| b.value().clone())
            .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))
    }

    fn all_books(&self) -> Vec<Arc<Mutex<PortfolioBook>>> {
        self.books.iter().map(|b| b.value().clone()).collect()
    }

    /// Recompute derived state, award badges and queue the changed rows.
    fn commit(&self, book: &mut PortfolioBook) {
        book.refresh();
        let earned = evaluate_badges(&mut book.portfolio);
        if !earned.is_empty() {
            info!("{} earned badges: {}", book.portfolio.user_id, earned.join(", "));
        }

        let (trades, executions) = book.take_changes();
        if let Some(writer) = &self.writer {
            for trade in &trades {
                writer.save_trade(trade);
            }
            for execution in &executions {
                writer.save_execution(execution);
            }
            writer.save_portfolio(&book.portfolio);
        }
    }

    // ========== Portfolio Management ==========

    /// Create a portfolio, or return the existing one for `user_id`.
    pub fn create_portfolio(
        &self,
        user_id: &str,
        initial_balance: Option<f64>,
    ) -> Result<Portfolio, TradingError> {
        if user_id.trim().is_empty() {
            return Err(TradingError::InvalidOrder("user_id is required".into()));
        }
        let balance = initial_balance.unwrap_or(self.config.default_capital);
        if !balance.is_finite() || balance <= 0.0 {
            return Err(TradingError::InvalidOrder(
                "initial balance must be a positive number".into(),
            ));
        }

        let book = match self.books.entry(user_id.to_string()) {
            Entry::Occupied(entry) => {
                let book = entry.get().clone();
                drop(entry);
                let portfolio = book.lock().portfolio.clone();
                return Ok(portfolio);
            }
            Entry::Vacant(entry) => {
                let portfolio = Portfolio::new(user_id.to_string(), balance);
                let book = Arc::new(Mutex::new(PortfolioBook::new(
                    portfolio,
                    self.config.risk.clone(),
                )));
                entry.insert(book.clone());
                book
            }
        };

        let mut book = book.lock();
        self.commit(&mut book);
        info!("Created portfolio for {} with {:.2}", user_id, balance);
        Ok(book.portfolio.clone())
    }

    fn book_or_create(&self, user_id: &str) -> Result<Arc<Mutex<PortfolioBook>>, TradingError> {
        if let Ok(book) = self.book(user_id) {
            return Ok(book);
        }
        self.create_portfolio(user_id, None)?;
        self.book(user_id)
    }

    pub fn get_portfolio(&self, user_id: &str) -> Option<Portfolio> {
        self.book(user_id).ok().map(|b| b.lock().portfolio.clone())
    }

    pub fn list_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.books.iter().map(|b| b.key().clone()).collect();
        users.sort();
        users
    }

    pub fn portfolio_count(&self) -> usize {
        self.books.len()
    }

    // ========== Orders ==========

    /// Execute a manual order immediately at `price`.
    ///
    /// The portfolio is created with the default capital if missing.
    pub fn place_order(
        &self,
        user_id: &str,
        symbol: &str,
        quantity: u32,
        price: f64,
        order_type: &str,
    ) -> Result<OrderResult, TradingError> {
        let side = TransactionType::parse(order_type)
            .ok_or_else(|| TradingError::InvalidOrder(format!("unknown order type '{}'", order_type)))?;
        if symbol.trim().is_empty() {
            return Err(TradingError::InvalidOrder("symbol is required".into()));
        }
        if quantity == 0 {
            return Err(TradingError::InvalidOrder("quantity must be positive".into()));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(TradingError::InvalidOrder("price must be a non-negative number".into()));
        }

        let book = self.book_or_create(user_id)?;
        let mut book = book.lock();

        let result = match side {
            TransactionType::Buy => book.buy(symbol, quantity, price, || self.next_trade_id()),
            TransactionType::Sell => book.sell(symbol, quantity, price, Utc::now()),
        };
        let (trade, execution) = match result {
            Ok(done) => done,
            Err(e) => {
                warn!("Order rejected for {}: {}", user_id, e);
                return Err(e);
            }
        };

        self.commit(&mut book);
        info!(
            "Executed {} {} x{} @ {:.2} for {}",
            side, symbol, quantity, price, user_id
        );

        Ok(OrderResult {
            success: true,
            message: format!("{} {} {} @ {:.2}", side, quantity, symbol, price),
            order_id: execution.order_id,
            trade,
            portfolio: book.portfolio.clone(),
        })
    }

    // ========== Signal-Driven Trades ==========

    /// Enter a trade from a signal using the current time for risk checks.
    pub fn enter_trade(&self, user_id: &str, signal: &TradeSignal) -> Result<PaperTrade, TradingError> {
        self.enter_trade_at(user_id, signal, Utc::now())
    }

    /// Enter a trade from a signal: risk admission, sizing, capital check, open.
    pub fn enter_trade_at(
        &self,
        user_id: &str,
        signal: &TradeSignal,
        now: DateTime<Utc>,
    ) -> Result<PaperTrade, TradingError> {
        signal.validate().map_err(TradingError::InvalidSignal)?;

        let book = self.book(user_id)?;
        let mut book = book.lock();
        let balance = book.portfolio.available_capital;

        let decision = book.risk.can_take_trade_at(signal, balance, now);
        if !decision.allowed {
            warn!(
                "Signal {} rejected for {}: {}",
                signal.option_symbol, user_id, decision.reason
            );
            return Err(TradingError::RiskRejected(decision.reason));
        }

        let lots = book.risk.calculate_position_size(signal, balance);
        let quantity = lots
            .checked_mul(signal.lot_size)
            .ok_or_else(|| TradingError::InvalidSignal("position quantity overflow".into()))?;
        let cost = signal.option_entry_price * quantity as f64;
        if cost > balance {
            warn!(
                "Insufficient capital for {} ({}): need {:.2}, have {:.2}",
                signal.option_symbol, user_id, cost, balance
            );
            return Err(TradingError::InsufficientFunds {
                needed: cost,
                available: balance,
            });
        }

        let direction = if signal.bias() == Bias::Bullish {
            TransactionType::Buy
        } else {
            TransactionType::Sell
        };

        let mut trade = PaperTrade::open(
            self.next_trade_id(),
            user_id.to_string(),
            signal.option_symbol.clone(),
            direction,
            quantity,
            signal.option_entry_price,
        )
        .with_instrument(signal.instrument.clone())
        .with_lots(lots, signal.lot_size)
        .with_exits(Some(signal.option_target_price), Some(signal.option_stop_loss));
        trade.strike_price = signal.strike_price;
        trade.expiry_date = signal.expiry_date.clone();
        trade.signal_type = Some(signal.signal_type.clone());
        trade.signal_id = signal.id.clone();
        trade.confidence = signal.confidence;
        trade.entry_time = now.timestamp_millis();

        book.open_position(trade.clone());
        book.risk.add_position(&trade.trade_id, signal, quantity);

        let mut execution = Execution::new(
            user_id.to_string(),
            trade.trade_id.clone(),
            trade.symbol.clone(),
            direction,
            quantity,
            trade.entry_price,
        );
        execution.executed_at = trade.entry_time;
        book.record_execution(execution);

        self.commit(&mut book);
        info!(
            "Opened {} {} {} x{} ({} lots) @ {:.2} for {}",
            trade.trade_id, direction, trade.symbol, quantity, lots, trade.entry_price, user_id
        );
        Ok(trade)
    }

    // ========== Exits and Marking ==========

    /// Close an open trade. A missing or already closed trade is an error and
    /// leaves the ledger untouched.
    pub fn close_trade(
        &self,
        user_id: &str,
        trade_id: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<CloseResult, TradingError> {
        if !exit_price.is_finite() || exit_price < 0.0 {
            return Err(TradingError::InvalidOrder("exit price must be a non-negative number".into()));
        }

        let book = self.book(user_id)?;
        let mut book = book.lock();
        let trade = book.close_trade(trade_id, exit_price, reason, Utc::now())?;
        self.commit(&mut book);

        Ok(CloseResult {
            success: true,
            message: format!("Closed {} at {:.2} ({})", trade.trade_id, exit_price, reason),
            trade,
            portfolio: book.portfolio.clone(),
        })
    }

    /// Mark one portfolio's positions against `prices`.
    pub fn update_trade_prices(
        &self,
        user_id: &str,
        prices: &HashMap<String, f64>,
    ) -> Result<MarkSummary, TradingError> {
        let book = self.book(user_id)?;
        let mut book = book.lock();
        let summary = book.mark(prices, Utc::now());
        self.commit(&mut book);
        Ok(summary)
    }

    /// Mark every portfolio against `prices`, one portfolio lock at a time.
    pub fn update_market_data(&self, prices: &HashMap<String, f64>) -> MarkSummary {
        let mut total = MarkSummary::default();
        if prices.is_empty() {
            return total;
        }

        for book in self.all_books() {
            let mut book = book.lock();
            if book.open.is_empty() {
                continue;
            }
            let summary = book.mark(prices, Utc::now());
            self.commit(&mut book);
            total.merge(summary);
        }
        total
    }

    // ========== Queries ==========

    /// Open positions, newest first.
    pub fn get_active_trades(&self, user_id: &str) -> Result<Vec<PaperTrade>, TradingError> {
        let book = self.book(user_id)?;
        let book = book.lock();
        Ok(book.open.iter().rev().cloned().collect())
    }

    /// Open and closed trades, newest entry first.
    pub fn get_trade_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<PaperTrade>, TradingError> {
        let book = self.book(user_id)?;
        let book = book.lock();
        let mut trades: Vec<PaperTrade> =
            book.history.iter().chain(book.open.iter()).cloned().collect();
        trades.sort_by(|a, b| {
            b.entry_time
                .cmp(&a.entry_time)
                .then_with(|| b.trade_id.cmp(&a.trade_id))
        });
        trades.truncate(limit);
        Ok(trades)
    }

    /// Executions, newest first.
    pub fn get_executions(&self, user_id: &str, limit: usize) -> Result<Vec<Execution>, TradingError> {
        let book = self.book(user_id)?;
        let book = book.lock();
        Ok(book.executions.iter().rev().take(limit).cloned().collect())
    }

    pub fn get_stats(&self, user_id: &str) -> Result<PerformanceStats, TradingError> {
        let book = self.book(user_id)?;
        let book = book.lock();
        Ok(PerformanceStats::from_history(&book.history))
    }

    pub fn get_risk_metrics(&self, user_id: &str) -> Result<RiskMetrics, TradingError> {
        let book = self.book(user_id)?;
        let book = book.lock();
        Ok(book.risk.metrics())
    }

    /// Ranked portfolios that have traded at least once.
    pub fn get_leaderboard(&self, period: LeaderboardPeriod, limit: usize) -> Vec<LeaderboardEntry> {
        let portfolios = self
            .all_books()
            .into_iter()
            .map(|b| b.lock().portfolio.clone())
            .collect();
        rank_leaderboard(portfolios, period, limit)
    }
}
