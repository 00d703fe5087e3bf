//! Latest-quote cache fed by the market-data collaborator, and the poller
//! that marks every portfolio against it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::trading::PaperTradingService;

/// Last observed price for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    pub updated_at: i64,
}

/// Symbol -> latest quote.
#[derive(Default)]
pub struct PriceBoard {
    quotes: DashMap<String, Quote>,
    /// Bumped on every accepted update
    version: AtomicU64,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price. Non-finite or negative prices are ignored.
    pub fn update(&self, symbol: &str, price: f64) -> bool {
        if !price.is_finite() || price < 0.0 || symbol.is_empty() {
            warn!("Ignoring bad quote {} = {}", symbol, price);
            return false;
        }
        self.quotes.insert(
            symbol.to_string(),
            Quote {
                price,
                updated_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.version.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Record a batch of prices. Returns how many were accepted.
    pub fn update_many(&self, prices: &HashMap<String, f64>) -> usize {
        prices
            .iter()
            .filter(|(symbol, price)| self.update(symbol, **price))
            .count()
    }

    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).map(|q| *q)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Current prices keyed by symbol.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.quotes
            .iter()
            .map(|q| (q.key().clone(), q.value().price))
            .collect()
    }
}

/// Periodically mark every portfolio against the board on the blocking pool.
/// Ticks where the board has not changed are skipped.
pub fn spawn_price_poller(
    board: Arc<PriceBoard>,
    service: PaperTradingService,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Price poller running every {:?}", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut seen_version = 0;

        loop {
            ticker.tick().await;

            let version = board.version();
            if version == seen_version {
                continue;
            }
            seen_version = version;

            // Marking takes every book lock in turn, so keep it off the runtime threads
            let snapshot = board.snapshot();
            let marker = service.clone();
            let summary =
                match tokio::task::spawn_blocking(move || marker.update_market_data(&snapshot))
                    .await
                {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!("Price poll failed: {}", e);
                        continue;
                    }
                };
            debug!(
                "Poll marked {} positions, closed {}",
                summary.marked, summary.closed
            );
            if summary.closed > 0 {
                info!("Price poll closed {} positions", summary.closed);
            }
        }
    })
}
