use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;

use crate::services::{LedgerConfig, RiskConfig, DEFAULT_CAPITAL};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file.
    pub database_path: String,
    /// Capital for portfolios created without an explicit balance.
    pub default_capital: f64,
    /// Interval between mark-to-market polls.
    pub price_poll_interval: Duration,
    /// Risk limits applied to every portfolio.
    pub risk: RiskConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: "data/paper_trading.db".to_string(),
            default_capital: DEFAULT_CAPITAL,
            price_poll_interval: Duration::from_secs(5),
            risk: RiskConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup. Missing or unparseable values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let time = |key: &str| {
            lookup(key).and_then(|v| NaiveTime::parse_from_str(v.trim(), "%H:%M").ok())
        };

        let risk_defaults = defaults.risk.clone();
        let risk = RiskConfig {
            max_account_risk: parse(lookup("RISK_MAX_ACCOUNT_RISK"))
                .unwrap_or(risk_defaults.max_account_risk),
            max_daily_loss: parse(lookup("RISK_MAX_DAILY_LOSS"))
                .unwrap_or(risk_defaults.max_daily_loss),
            max_position_size: parse(lookup("RISK_MAX_POSITION_SIZE"))
                .unwrap_or(risk_defaults.max_position_size),
            max_sector_exposure: parse(lookup("RISK_MAX_SECTOR_EXPOSURE"))
                .unwrap_or(risk_defaults.max_sector_exposure),
            min_risk_reward: parse(lookup("RISK_MIN_RISK_REWARD"))
                .unwrap_or(risk_defaults.min_risk_reward),
            max_open_positions: parse(lookup("RISK_MAX_OPEN_POSITIONS"))
                .unwrap_or(risk_defaults.max_open_positions),
            max_correlated_positions: parse(lookup("RISK_MAX_CORRELATED"))
                .unwrap_or(risk_defaults.max_correlated_positions),
            max_lots_per_trade: parse(lookup("RISK_MAX_LOTS"))
                .unwrap_or(risk_defaults.max_lots_per_trade),
            market_open: time("MARKET_OPEN").unwrap_or(risk_defaults.market_open),
            market_close: time("MARKET_CLOSE").unwrap_or(risk_defaults.market_close),
            utc_offset_minutes: parse(lookup("MARKET_UTC_OFFSET_MINUTES"))
                .unwrap_or(risk_defaults.utc_offset_minutes),
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(lookup("PORT")).unwrap_or(defaults.port),
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            default_capital: parse(lookup("DEFAULT_CAPITAL"))
                .filter(|c: &f64| c.is_finite() && *c > 0.0)
                .unwrap_or(defaults.default_capital),
            price_poll_interval: parse(lookup("PRICE_POLL_SECS"))
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.price_poll_interval),
            risk,
        }
    }

    /// Ledger settings derived from this configuration.
    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            default_capital: self.default_capital,
            risk: self.risk.clone(),
        }
    }

    /// Address to bind the HTTP server to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
