//! Performance Statistics
//!
//! Derived metrics over closed trades, the badge table and leaderboard
//! ranking. Everything here is a pure function of portfolio/trade data.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{LeaderboardEntry, LeaderboardPeriod, PaperTrade, Portfolio};

// =============================================================================
// Performance
// =============================================================================

/// Aggregate statistics for a set of closed trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Percentage in [0, 100]
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_net_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    /// Population std-dev of net P&L over its mean
    pub dispersion_ratio: f64,
}

impl PerformanceStats {
    /// Compute stats over the closed trades in `history`. Open trades are ignored.
    pub fn from_history(history: &[PaperTrade]) -> Self {
        let net: Vec<f64> = history
            .iter()
            .filter(|t| !t.is_open())
            .map(|t| t.net_pnl)
            .collect();

        if net.is_empty() {
            return Self::default();
        }

        let wins: Vec<f64> = net.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = net.iter().copied().filter(|p| *p <= 0.0).collect();
        let total = net.len() as f64;
        let total_net_pnl: f64 = net.iter().sum();

        Self {
            total_trades: net.len() as u64,
            winning_trades: wins.len() as u64,
            losing_trades: losses.len() as u64,
            win_rate: wins.len() as f64 / total * 100.0,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            total_net_pnl,
            best_trade: net.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_trade: net.iter().copied().fold(f64::INFINITY, f64::min),
            dispersion_ratio: dispersion_ratio(&net),
        }
    }

    /// Copy the cached derived fields onto a portfolio.
    pub fn apply_to(&self, portfolio: &mut Portfolio) {
        portfolio.win_rate = self.win_rate;
        portfolio.avg_winning_trade = self.avg_win;
        portfolio.avg_losing_trade = self.avg_loss;
        portfolio.dispersion_ratio = self.dispersion_ratio;
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation over mean; 0 below two samples or at zero mean.
fn dispersion_ratio(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / m
}

// =============================================================================
// Badges
// =============================================================================

/// An achievement unlocked by portfolio state.
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    earned: fn(&Portfolio) -> bool,
}

impl Badge {
    pub fn is_earned(&self, portfolio: &Portfolio) -> bool {
        (self.earned)(portfolio)
    }
}

pub const BADGES: &[Badge] = &[
    Badge {
        id: "first_trade",
        name: "First Trade",
        description: "Completed your first paper trade",
        earned: |p| p.total_trades >= 1,
    },
    Badge {
        id: "trader_10",
        name: "Active Trader",
        description: "Completed 10 trades",
        earned: |p| p.total_trades >= 10,
    },
    Badge {
        id: "trader_50",
        name: "Seasoned Trader",
        description: "Completed 50 trades",
        earned: |p| p.total_trades >= 50,
    },
    Badge {
        id: "trader_100",
        name: "Veteran Trader",
        description: "Completed 100 trades",
        earned: |p| p.total_trades >= 100,
    },
    Badge {
        id: "consistent_winner",
        name: "Consistent Winner",
        description: "Win rate of 60% or more over at least 10 trades",
        earned: |p| p.win_rate >= 60.0 && p.total_trades >= 10,
    },
    Badge {
        id: "expert_trader",
        name: "Expert Trader",
        description: "Win rate of 80% or more over at least 20 trades",
        earned: |p| p.win_rate >= 80.0 && p.total_trades >= 20,
    },
    Badge {
        id: "profit_10",
        name: "In The Green",
        description: "Total return of 10%",
        earned: |p| p.total_pnl_percentage >= 10.0,
    },
    Badge {
        id: "profit_25",
        name: "Strong Returns",
        description: "Total return of 25%",
        earned: |p| p.total_pnl_percentage >= 25.0,
    },
    Badge {
        id: "profit_50",
        name: "Market Master",
        description: "Total return of 50%",
        earned: |p| p.total_pnl_percentage >= 50.0,
    },
    Badge {
        id: "winner_5",
        name: "Winning Streak",
        description: "Won 5 trades",
        earned: |p| p.winning_trades >= 5,
    },
    Badge {
        id: "winner_20",
        name: "Profit Machine",
        description: "Won 20 trades",
        earned: |p| p.winning_trades >= 20,
    },
];

/// Award every badge the portfolio now qualifies for. Returns the newly added ids.
///
/// Badges are never revoked, so calling this repeatedly is idempotent.
pub fn evaluate_badges(portfolio: &mut Portfolio) -> Vec<String> {
    let newly_earned: Vec<String> = BADGES
        .iter()
        .filter(|b| !portfolio.has_badge(b.id) && b.is_earned(portfolio))
        .map(|b| b.id.to_string())
        .collect();

    portfolio.badges.extend(newly_earned.iter().cloned());
    newly_earned
}

// =============================================================================
// Leaderboard
// =============================================================================

fn score(portfolio: &Portfolio, period: LeaderboardPeriod) -> f64 {
    match period {
        LeaderboardPeriod::AllTime => portfolio.total_pnl_percentage,
        LeaderboardPeriod::Day => portfolio.day_pnl_percentage,
    }
}

/// Rank portfolios that have traded at least once.
///
/// Sorted by return for the period, descending. Ties go to the older
/// portfolio, then to the lexically smaller user id.
pub fn rank_leaderboard(
    portfolios: Vec<Portfolio>,
    period: LeaderboardPeriod,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<Portfolio> = portfolios
        .into_iter()
        .filter(|p| p.total_trades > 0)
        .collect();

    ranked.sort_by(|a, b| {
        score(b, period)
            .partial_cmp(&score(a, period))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: (i + 1) as u32,
            user_id: p.user_id,
            total_capital: p.total_capital,
            current_value: p.current_value,
            total_pnl: p.total_pnl,
            total_pnl_percentage: p.total_pnl_percentage,
            day_pnl_percentage: p.day_pnl_percentage,
            total_trades: p.total_trades,
            win_rate: p.win_rate,
            badges: p.badges,
            updated_at: p.updated_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, TradeStatus, TransactionType};

    fn closed(id: u32, net: f64) -> PaperTrade {
        let mut trade = PaperTrade::open(
            format!("PT-{:06}", id),
            "alice".to_string(),
            "NIFTY24JAN22000CE".to_string(),
            TransactionType::Buy,
            50,
            100.0,
        );
        trade.status = TradeStatus::Closed;
        trade.exit_reason = Some(ExitReason::Manual);
        trade.net_pnl = net;
        trade
    }

    fn portfolio(user: &str, pct: f64, trades: u64, created_at: i64) -> Portfolio {
        let mut p = Portfolio::new(user.to_string(), 100_000.0);
        p.total_pnl_percentage = pct;
        p.total_trades = trades;
        p.created_at = created_at;
        p
    }

    #[test]
    fn test_stats_empty_history() {
        let stats = PerformanceStats::from_history(&[]);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.dispersion_ratio, 0.0);
    }

    #[test]
    fn test_stats_counts_and_extremes() {
        let history = vec![closed(1, 500.0), closed(2, -200.0), closed(3, 100.0), closed(4, 0.0)];
        let stats = PerformanceStats::from_history(&history);

        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 2);
        assert!((stats.win_rate - 50.0).abs() < 1e-9);
        assert!((stats.avg_win - 300.0).abs() < 1e-9);
        assert!((stats.avg_loss + 100.0).abs() < 1e-9);
        assert!((stats.total_net_pnl - 400.0).abs() < 1e-9);
        assert_eq!(stats.best_trade, 500.0);
        assert_eq!(stats.worst_trade, -200.0);
    }

    #[test]
    fn test_stats_ignore_open_trades() {
        let mut open = closed(2, 999.0);
        open.status = TradeStatus::Open;
        let stats = PerformanceStats::from_history(&[closed(1, 100.0), open]);
        assert_eq!(stats.total_trades, 1);
    }

    #[test]
    fn test_dispersion_ratio() {
        // mean 200, population std 100
        let stats = PerformanceStats::from_history(&[closed(1, 100.0), closed(2, 300.0)]);
        assert!((stats.dispersion_ratio - 0.5).abs() < 1e-9);

        let zero_mean = PerformanceStats::from_history(&[closed(1, 100.0), closed(2, -100.0)]);
        assert_eq!(zero_mean.dispersion_ratio, 0.0);
    }

    #[test]
    fn test_badges_awarded_once() {
        let mut p = Portfolio::new("alice".to_string(), 100_000.0);
        assert!(evaluate_badges(&mut p).is_empty());

        p.total_trades = 10;
        p.winning_trades = 7;
        p.win_rate = 70.0;
        let earned = evaluate_badges(&mut p);
        assert_eq!(earned, vec!["first_trade", "trader_10", "consistent_winner", "winner_5"]);

        assert!(evaluate_badges(&mut p).is_empty());
        assert_eq!(p.badges.len(), 4);
    }

    #[test]
    fn test_badges_never_revoked() {
        let mut p = Portfolio::new("alice".to_string(), 100_000.0);
        p.total_pnl_percentage = 12.0;
        evaluate_badges(&mut p);
        assert!(p.has_badge("profit_10"));

        p.total_pnl_percentage = -5.0;
        evaluate_badges(&mut p);
        assert!(p.has_badge("profit_10"));
    }

    #[test]
    fn test_leaderboard_ranking() {
        let entries = rank_leaderboard(
            vec![
                portfolio("carol", 5.0, 3, 3),
                portfolio("idle", 50.0, 0, 1),
                portfolio("alice", 12.0, 4, 2),
                portfolio("bob", 5.0, 1, 1),
            ],
            LeaderboardPeriod::AllTime,
            10,
        );

        let order: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
        assert_eq!(entries.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_leaderboard_day_period_and_limit() {
        let mut a = portfolio("alice", 20.0, 2, 1);
        a.day_pnl_percentage = -1.0;
        let mut b = portfolio("bob", 1.0, 2, 2);
        b.day_pnl_percentage = 3.0;

        let entries = rank_leaderboard(vec![a, b], LeaderboardPeriod::Day, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, "bob");
    }
}
