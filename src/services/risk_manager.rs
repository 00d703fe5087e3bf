//! Risk Manager
//!
//! Admission control and position sizing for signal-driven trades:
//! - Market-hours window
//! - Daily loss limit
//! - Open position and correlated position caps
//! - Sector exposure limit
//! - Minimum risk:reward
//!
//! One `RiskManager` is kept per portfolio and mutated only under that
//! portfolio's lock.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Bias, TradeSignal, TransactionType};

// =============================================================================
// Configuration
// =============================================================================

fn default_market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}

fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN)
}

/// Risk limits. Immutable for the lifetime of a `RiskManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskConfig {
    /// Max risk per trade as a fraction of the account
    pub max_account_risk: f64,
    /// Max daily loss as a fraction of the account
    pub max_daily_loss: f64,
    /// Max notional per trade as a fraction of the account
    pub max_position_size: f64,
    /// Max notional per sector as a fraction of portfolio value
    pub max_sector_exposure: f64,
    pub min_risk_reward: f64,
    pub max_open_positions: usize,
    pub max_correlated_positions: usize,
    /// Upper clamp on lots per trade
    pub max_lots_per_trade: u32,
    #[serde(default = "default_market_open")]
    pub market_open: NaiveTime,
    #[serde(default = "default_market_close")]
    pub market_close: NaiveTime,
    /// Exchange timezone offset from UTC in minutes (IST = 330)
    pub utc_offset_minutes: i32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_account_risk: 0.02,
            max_daily_loss: 0.05,
            max_position_size: 0.15,
            max_sector_exposure: 0.30,
            min_risk_reward: 1.5,
            max_open_positions: 5,
            max_correlated_positions: 2,
            max_lots_per_trade: 5,
            market_open: default_market_open(),
            market_close: default_market_close(),
            utc_offset_minutes: 330,
        }
    }
}

impl RiskConfig {
    /// Wall-clock time at the exchange.
    pub fn exchange_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        let offset =
            FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset).naive_local()
    }

    pub fn within_market_hours(&self, now: DateTime<Utc>) -> bool {
        let time = self.exchange_time(now).time();
        self.market_open <= time && time <= self.market_close
    }
}

// =============================================================================
// Sectors
// =============================================================================

/// Exposure bucket for an underlying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sector {
    Index,
    Banking,
    Financial,
    Other,
}

impl Sector {
    /// Static underlying-to-sector table.
    pub fn from_instrument(instrument: &str) -> Self {
        match instrument.trim().to_uppercase().as_str() {
            "NIFTY" => Sector::Index,
            "BANKNIFTY" => Sector::Banking,
            "FINNIFTY" => Sector::Financial,
            _ => Sector::Other,
        }
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sector::Index => write!(f, "INDEX"),
            Sector::Banking => write!(f, "BANKING"),
            Sector::Financial => write!(f, "FINANCIAL"),
            Sector::Other => write!(f, "OTHER"),
        }
    }
}

// =============================================================================
// Decisions and Metrics
// =============================================================================

/// Verdict of `can_take_trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: String,
}

impl RiskDecision {
    fn approved() -> Self {
        Self {
            allowed: true,
            reason: "Trade approved".to_string(),
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Point-in-time view of the tracked risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub open_positions: usize,
    pub daily_pnl: f64,
    pub sector_exposure: BTreeMap<Sector, f64>,
    pub total_exposure: f64,
}

#[derive(Debug, Clone)]
struct TrackedPosition {
    instrument: String,
    sector: Sector,
    bias: Bias,
    direction: TransactionType,
    entry_price: f64,
    quantity: u32,
    current_pnl: f64,
}

impl TrackedPosition {
    fn notional(&self) -> f64 {
        self.entry_price * self.quantity as f64
    }
}

// =============================================================================
// Risk Manager
// =============================================================================

/// Per-portfolio risk state.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    open_positions: HashMap<String, TrackedPosition>,
    sector_exposure: HashMap<Sector, f64>,
    /// Net P&L realized on `trading_day`
    realized_today: f64,
    trading_day: Option<NaiveDate>,
    daily_pnl: f64,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            open_positions: HashMap::new(),
            sector_exposure: HashMap::new(),
            realized_today: 0.0,
            trading_day: None,
            daily_pnl: 0.0,
        }
    }

    pub fn is_tracking(&self, trade_id: &str) -> bool {
        self.open_positions.contains_key(trade_id)
    }

    /// Realized-today plus open unrealized, as of the last update.
    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    fn unrealized_total(&self) -> f64 {
        self.open_positions.values().map(|p| p.current_pnl).sum()
    }

    /// Daily P&L seen from `now`; realized amounts from an earlier day no longer count.
    fn daily_pnl_at(&self, now: DateTime<Utc>) -> f64 {
        let today = self.config.exchange_time(now).date();
        let realized = match self.trading_day {
            Some(day) if day == today => self.realized_today,
            _ => 0.0,
        };
        realized + self.unrealized_total()
    }

    pub fn sector_exposure(&self, sector: Sector) -> f64 {
        self.sector_exposure.get(&sector).copied().unwrap_or(0.0)
    }

    /// Notional of every tracked open position.
    pub fn total_exposure(&self) -> f64 {
        self.open_positions.values().map(TrackedPosition::notional).sum()
    }

    fn correlated_count(&self, bias: Bias) -> usize {
        if bias == Bias::Neutral {
            return 0;
        }
        self.open_positions.values().filter(|p| p.bias == bias).count()
    }

    /// Check a signal against every limit using the current time.
    pub fn can_take_trade(&self, signal: &TradeSignal, account_balance: f64) -> RiskDecision {
        self.can_take_trade_at(signal, account_balance, Utc::now())
    }

    /// Check a signal against every limit. The first failing check wins.
    pub fn can_take_trade_at(
        &self,
        signal: &TradeSignal,
        account_balance: f64,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        if !self.config.within_market_hours(now) {
            return RiskDecision::rejected("Outside market hours");
        }

        if self.daily_pnl_at(now) < -(account_balance * self.config.max_daily_loss) {
            return RiskDecision::rejected("Daily loss limit reached");
        }

        if self.open_positions.len() >= self.config.max_open_positions {
            return RiskDecision::rejected("Maximum open positions reached");
        }

        if self.correlated_count(signal.bias()) >= self.config.max_correlated_positions {
            return RiskDecision::rejected("Too many correlated positions");
        }

        let sector = Sector::from_instrument(&signal.instrument);
        let projected = self.sector_exposure(sector) + signal.lot_notional();
        let portfolio_value = account_balance + self.total_exposure();
        if projected > portfolio_value * self.config.max_sector_exposure {
            debug!(
                "Sector {} exposure {:.2} would exceed {:.2}",
                sector,
                projected,
                portfolio_value * self.config.max_sector_exposure
            );
            return RiskDecision::rejected("Sector exposure limit reached");
        }

        let rr_ratio = signal.risk_reward_ratio();
        if rr_ratio < self.config.min_risk_reward {
            return RiskDecision::rejected(format!(
                "Risk-reward ratio {:.2} below minimum {}",
                rr_ratio, self.config.min_risk_reward
            ));
        }

        RiskDecision::approved()
    }

    /// Lots to trade for a signal.
    ///
    /// The smaller of the risk-budget and notional-budget capacities, clamped
    /// to `1..=max_lots_per_trade`. The floor of one lot applies even when the
    /// budgets compute to zero.
    pub fn calculate_position_size(&self, signal: &TradeSignal, account_balance: f64) -> u32 {
        let lot_size = signal.lot_size.max(1) as f64;
        let entry = signal.option_entry_price;

        let max_risk_amount = account_balance * self.config.max_account_risk;
        let risk_per_lot = (entry - signal.option_stop_loss).abs() * lot_size;
        let by_risk = if risk_per_lot > 0.0 {
            (max_risk_amount / risk_per_lot).floor()
        } else {
            f64::INFINITY
        };

        let lot_value = entry * lot_size;
        let by_notional = if lot_value > 0.0 {
            ((account_balance * self.config.max_position_size) / lot_value).floor()
        } else {
            f64::INFINITY
        };

        let recommended = by_risk.min(by_notional);
        let max_lots = self.config.max_lots_per_trade.max(1) as f64;
        recommended.min(max_lots).max(1.0) as u32
    }

    /// Start tracking an opened position.
    pub fn add_position(&mut self, trade_id: &str, signal: &TradeSignal, quantity: u32) {
        let bias = signal.bias();
        let position = TrackedPosition {
            instrument: signal.instrument.clone(),
            sector: Sector::from_instrument(&signal.instrument),
            bias,
            direction: if bias == Bias::Bullish {
                TransactionType::Buy
            } else {
                TransactionType::Sell
            },
            entry_price: signal.option_entry_price,
            quantity,
            current_pnl: 0.0,
        };

        *self.sector_exposure.entry(position.sector).or_insert(0.0) += position.notional();
        self.open_positions.insert(trade_id.to_string(), position);
    }

    /// Stop tracking a closed position.
    pub fn remove_position(&mut self, trade_id: &str) {
        if let Some(position) = self.open_positions.remove(trade_id) {
            let notional = position.notional();
            if let Some(exposure) = self.sector_exposure.get_mut(&position.sector) {
                *exposure -= notional;
                if *exposure <= 1e-9 {
                    self.sector_exposure.remove(&position.sector);
                }
            }
            debug!("Released {} exposure for {}", position.instrument, trade_id);
        }
        self.daily_pnl = self.realized_today + self.unrealized_total();
    }

    /// Follow a manual order that averaged into or reduced a tracked position.
    /// Sector exposure moves by the change in notional.
    pub fn resize_position(
        &mut self,
        trade_id: &str,
        entry_price: f64,
        quantity: u32,
        current_price: f64,
    ) {
        let Some(position) = self.open_positions.get_mut(trade_id) else {
            return;
        };

        let before = position.notional();
        position.entry_price = entry_price;
        position.quantity = quantity;
        let delta = position.notional() - before;
        let sector = position.sector;

        let exposure = self.sector_exposure.entry(sector).or_insert(0.0);
        *exposure += delta;
        if *exposure <= 1e-9 {
            self.sector_exposure.remove(&sector);
        }
        debug!(
            "Resized {} to {} @ {:.2} ({:+.2} exposure)",
            trade_id, quantity, entry_price, delta
        );
        self.update_position(trade_id, current_price);
    }

    /// Reprice one position and refresh the aggregate daily P&L.
    pub fn update_position(&mut self, trade_id: &str, current_price: f64) {
        let Some(position) = self.open_positions.get_mut(trade_id) else {
            return;
        };

        let q = position.quantity as f64;
        position.current_pnl = match position.direction {
            TransactionType::Buy => (current_price - position.entry_price) * q,
            TransactionType::Sell => (position.entry_price - current_price) * q,
        };

        self.daily_pnl = self.realized_today + self.unrealized_total();
    }

    /// Book realized net P&L, resetting the tally when the exchange day changes.
    pub fn record_realized(&mut self, net_pnl: f64, now: DateTime<Utc>) {
        let today = self.config.exchange_time(now).date();
        if self.trading_day != Some(today) {
            self.trading_day = Some(today);
            self.realized_today = 0.0;
        }
        self.realized_today += net_pnl;
        self.daily_pnl = self.realized_today + self.unrealized_total();
    }

    pub fn metrics(&self) -> RiskMetrics {
        RiskMetrics {
            open_positions: self.open_positions.len(),
            daily_pnl: self.daily_pnl,
            sector_exposure: self
                .sector_exposure
                .iter()
                .map(|(sector, exposure)| (*sector, *exposure))
                .collect(),
            total_exposure: self.total_exposure(),
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}
