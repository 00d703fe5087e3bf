//! Signal Types
//!
//! Trade signals arrive from the signal-generation collaborator. They are
//! validated once at the boundary and treated as immutable afterwards.

use serde::{Deserialize, Serialize};

fn default_lot_size() -> u32 {
    50
}

/// Directional bias inferred from a signal's free-text type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    /// Infer bias by substring match on the signal type.
    pub fn from_signal_type(signal_type: &str) -> Self {
        let upper = signal_type.to_uppercase();
        if upper.contains("BULLISH") {
            Bias::Bullish
        } else if upper.contains("BEARISH") {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

/// An options trade recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Signal identifier from the generator
    #[serde(default)]
    pub id: Option<String>,
    /// Underlying instrument (NIFTY, BANKNIFTY, ...)
    pub instrument: String,
    /// Tradable option contract symbol
    pub option_symbol: String,
    /// Free-text type, e.g. "BULLISH_BREAKOUT"
    pub signal_type: String,
    pub option_entry_price: f64,
    pub option_target_price: f64,
    pub option_stop_loss: f64,
    /// Contracts per lot
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    /// Generator confidence (0-100)
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl TradeSignal {
    /// Create a signal with the default NIFTY lot size.
    pub fn new(
        instrument: impl Into<String>,
        option_symbol: impl Into<String>,
        signal_type: impl Into<String>,
        entry: f64,
        target: f64,
        stop_loss: f64,
    ) -> Self {
        Self {
            id: None,
            instrument: instrument.into(),
            option_symbol: option_symbol.into(),
            signal_type: signal_type.into(),
            option_entry_price: entry,
            option_target_price: target,
            option_stop_loss: stop_loss,
            lot_size: default_lot_size(),
            confidence: 0,
            strike_price: None,
            expiry_date: None,
        }
    }

    pub fn with_lot_size(mut self, lot_size: u32) -> Self {
        self.lot_size = lot_size;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn bias(&self) -> Bias {
        Bias::from_signal_type(&self.signal_type)
    }

    /// Reward over risk, `|target - entry| / |entry - stop|`. Zero when there is no risk.
    pub fn risk_reward_ratio(&self) -> f64 {
        let risk = (self.option_entry_price - self.option_stop_loss).abs();
        let reward = (self.option_target_price - self.option_entry_price).abs();
        if risk > 0.0 {
            reward / risk
        } else {
            0.0
        }
    }

    /// Notional of a single lot at the entry price.
    pub fn lot_notional(&self) -> f64 {
        self.option_entry_price * self.lot_size as f64
    }

    /// Check the fields a ledger relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.instrument.trim().is_empty() {
            return Err("instrument is required".to_string());
        }
        if self.option_symbol.trim().is_empty() {
            return Err("option_symbol is required".to_string());
        }
        if self.lot_size == 0 {
            return Err("lot_size must be positive".to_string());
        }
        for (name, value) in [
            ("option_entry_price", self.option_entry_price),
            ("option_target_price", self.option_target_price),
            ("option_stop_loss", self.option_stop_loss),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        Ok(())
    }
}
