//! Integration tests for the paper trading ledger
//!
//! Exercises the ledger through its public service API: manual orders,
//! signal entries, automatic exits, statistics and persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use paperdesk::services::{LedgerWriter, PaperTradingService, SqliteStore};
use paperdesk::*;

fn service() -> PaperTradingService {
    PaperTradingService::new(LedgerConfig::default())
}

/// Monday 11:00 at the exchange (UTC+05:30).
fn in_session() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 5, 30, 0).unwrap()
}

fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn bullish_signal() -> TradeSignal {
    TradeSignal::new(
        "NIFTY",
        "NIFTY24JAN22000CE",
        "BULLISH_BREAKOUT",
        100.0,
        130.0,
        90.0,
    )
}

// =============================================================================
// Manual Orders
// =============================================================================

mod order_tests {
    use super::*;

    #[test]
    fn test_buy_mark_and_close_round_trip() {
        let ledger = service();
        ledger.create_portfolio("alice", Some(100_000.0)).unwrap();

        let order = ledger
            .place_order("alice", "NIFTY_CE", 50, 150.50, "BUY")
            .unwrap();
        assert!(order.success);
        assert_eq!(order.trade.trade_id, "PT-000001");
        assert_close(order.portfolio.available_capital, 92_475.0);
        assert_close(order.portfolio.invested_capital, 7_525.0);

        let summary = ledger
            .update_trade_prices("alice", &prices(&[("NIFTY_CE", 200.0)]))
            .unwrap();
        assert_eq!(summary.marked, 1);
        assert_eq!(summary.closed, 0);
        let portfolio = ledger.get_portfolio("alice").unwrap();
        assert_close(portfolio.unrealized_pnl, 2_475.0);
        assert_close(portfolio.current_value, 102_475.0);

        let closed = ledger
            .close_trade("alice", &order.trade.trade_id, 200.0, ExitReason::Manual)
            .unwrap();
        assert_eq!(closed.trade.status, TradeStatus::Closed);
        assert_eq!(closed.trade.exit_reason, Some(ExitReason::Manual));
        assert_close(closed.trade.pnl, 2_475.0);
        assert_close(closed.trade.brokerage, 20.0);
        assert_close(closed.trade.net_pnl, 2_455.0);

        let portfolio = closed.portfolio;
        assert_eq!(portfolio.winning_trades, 1);
        assert_eq!(portfolio.losing_trades, 0);
        assert_close(portfolio.win_rate, 100.0);
        assert_close(portfolio.available_capital, 102_455.0);
        assert_close(portfolio.invested_capital, 0.0);
        assert_close(portfolio.unrealized_pnl, 0.0);
        assert_close(portfolio.realized_pnl, 2_455.0);
    }

    #[test]
    fn test_repeat_buy_averages_entry() {
        let ledger = service();
        let first = ledger
            .place_order("bob", "RELIANCE", 10, 100.0, "BUY")
            .unwrap();
        let second = ledger
            .place_order("bob", "RELIANCE", 10, 120.0, "buy")
            .unwrap();
        assert_eq!(second.trade.trade_id, first.trade.trade_id);
        assert_eq!(second.trade.quantity, 20);
        assert_close(second.trade.entry_price, 110.0);

        let open = ledger.get_active_trades("bob").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(ledger.get_portfolio("bob").unwrap().total_trades, 1);
    }

    #[test]
    fn test_buy_beyond_capital_is_rejected() {
        let ledger = service();
        ledger.create_portfolio("carol", Some(10_000.0)).unwrap();

        let err = ledger
            .place_order("carol", "NIFTY_CE", 1_000, 200.0, "BUY")
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient"));

        let portfolio = ledger.get_portfolio("carol").unwrap();
        assert_close(portfolio.available_capital, 10_000.0);
        assert_eq!(portfolio.total_trades, 0);
        assert!(ledger.get_active_trades("carol").unwrap().is_empty());
        assert!(ledger.get_executions("carol", 10).unwrap().is_empty());
    }

    #[test]
    fn test_sell_without_position_is_rejected() {
        let ledger = service();
        let err = ledger
            .place_order("dave", "NIFTY_PE", 10, 50.0, "SELL")
            .unwrap_err();
        assert!(matches!(
            err,
            TradingError::InsufficientQuantity {
                requested: 10,
                available: 0
            }
        ));
    }

    #[test]
    fn test_partial_sell_keeps_position_open() {
        let ledger = service();
        let buy = ledger
            .place_order("erin", "NIFTY_CE", 100, 100.0, "BUY")
            .unwrap();

        let sell = ledger
            .place_order("erin", "NIFTY_CE", 40, 110.0, "SELL")
            .unwrap();
        assert_eq!(sell.trade.trade_id, buy.trade.trade_id);
        assert_eq!(sell.trade.status, TradeStatus::Open);
        assert_eq!(sell.trade.quantity, 60);

        // 40 x 10 gross, 20 brokerage
        let portfolio = sell.portfolio;
        assert_close(portfolio.realized_pnl, 380.0);
        assert_close(portfolio.invested_capital, 6_000.0);
        assert_close(portfolio.available_capital, 100_000.0 - 10_000.0 + 4_000.0 + 380.0);
        // Win/loss is tallied when the position fully closes
        assert_eq!(portfolio.winning_trades + portfolio.losing_trades, 0);

        let executions = ledger.get_executions("erin", 10).unwrap();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].side, TransactionType::Sell);
        assert_close(executions[0].brokerage, 20.0);
        assert_close(executions[0].realized_pnl.unwrap(), 400.0);
    }

    #[test]
    fn test_position_reopens_after_full_sell() {
        let ledger = service();
        ledger
            .place_order("frank", "NIFTY24JANFUT", 10, 100.0, "BUY")
            .unwrap();

        // Close out, then build a second position on the same symbol
        ledger
            .place_order("frank", "NIFTY24JANFUT", 10, 100.0, "SELL")
            .unwrap();
        let second = ledger
            .place_order("frank", "NIFTY24JANFUT", 5, 100.0, "BUY")
            .unwrap();
        assert_eq!(second.trade.trade_id, "PT-000002");

        let sold = ledger
            .place_order("frank", "NIFTY24JANFUT", 5, 100.0, "SELL")
            .unwrap();
        assert_eq!(sold.trade.status, TradeStatus::Closed);
        assert!(ledger.get_active_trades("frank").unwrap().is_empty());
        assert_eq!(ledger.get_trade_history("frank", 10).unwrap().len(), 2);
    }
}

// =============================================================================
// Closing Trades
// =============================================================================

mod close_tests {
    use super::*;

    #[test]
    fn test_double_close_is_rejected_without_side_effects() {
        let ledger = service();
        let order = ledger
            .place_order("alice", "NIFTY_CE", 50, 100.0, "BUY")
            .unwrap();

        ledger
            .close_trade("alice", &order.trade.trade_id, 110.0, ExitReason::Manual)
            .unwrap();
        let before = ledger.get_portfolio("alice").unwrap();

        let err = ledger
            .close_trade("alice", &order.trade.trade_id, 150.0, ExitReason::Manual)
            .unwrap_err();
        assert!(matches!(err, TradingError::TradeNotFound(_)));

        let after = ledger.get_portfolio("alice").unwrap();
        assert_close(after.available_capital, before.available_capital);
        assert_close(after.realized_pnl, before.realized_pnl);
        assert_eq!(after.winning_trades, 1);
        assert_eq!(after.closed_trades(), 1);
    }

    #[test]
    fn test_close_unknown_user() {
        let ledger = service();
        let err = ledger
            .close_trade("ghost", "PT-000001", 100.0, ExitReason::Manual)
            .unwrap_err();
        assert!(matches!(err, TradingError::PortfolioNotFound(_)));
    }

    #[test]
    fn test_break_even_close_counts_as_loss() {
        let ledger = service();
        let order = ledger
            .place_order("bob", "NIFTY_PE", 50, 100.0, "BUY")
            .unwrap();

        // Gross zero, net is minus brokerage
        let closed = ledger
            .close_trade("bob", &order.trade.trade_id, 100.0, ExitReason::Manual)
            .unwrap();
        assert_close(closed.trade.net_pnl, -20.0);
        assert_eq!(closed.portfolio.losing_trades, 1);
        assert_eq!(closed.portfolio.winning_trades, 0);
    }
}

// =============================================================================
// Signal Entries and Automatic Exits
// =============================================================================

mod signal_tests {
    use super::*;

    #[test]
    fn test_enter_trade_sizes_and_debits() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();

        let trade = ledger
            .enter_trade_at("alice", &bullish_signal(), in_session())
            .unwrap();
        // 2% risk allows 4 lots, 15% notional allows 3
        assert_eq!(trade.lots, 3);
        assert_eq!(trade.quantity, 150);
        assert_eq!(trade.transaction_type, TransactionType::Buy);
        assert_eq!(trade.target_price, Some(130.0));
        assert_eq!(trade.stop_loss, Some(90.0));

        let portfolio = ledger.get_portfolio("alice").unwrap();
        assert_close(portfolio.available_capital, 85_000.0);
        assert_eq!(portfolio.total_trades, 1);

        let metrics = ledger.get_risk_metrics("alice").unwrap();
        assert_eq!(metrics.open_positions, 1);
        assert_close(metrics.total_exposure, 15_000.0);
    }

    #[test]
    fn test_enter_trade_requires_portfolio() {
        let ledger = service();
        let err = ledger
            .enter_trade_at("nobody", &bullish_signal(), in_session())
            .unwrap_err();
        assert!(matches!(err, TradingError::PortfolioNotFound(_)));
    }

    #[test]
    fn test_enter_trade_outside_hours_is_rejected() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        // 20:00 at the exchange
        let evening = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();

        let err = ledger
            .enter_trade_at("alice", &bullish_signal(), evening)
            .unwrap_err();
        match err {
            TradingError::RiskRejected(reason) => assert_eq!(reason, "Outside market hours"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(ledger.get_active_trades("alice").unwrap().is_empty());
    }

    #[test]
    fn test_poor_risk_reward_is_rejected() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        let signal = TradeSignal::new("NIFTY", "NIFTY24JAN22000CE", "BULLISH", 100.0, 105.0, 90.0);

        let err = ledger
            .enter_trade_at("alice", &signal, in_session())
            .unwrap_err();
        assert!(err.to_string().contains("Risk-reward ratio"));
    }

    #[test]
    fn test_target_hit_closes_once() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        let trade = ledger
            .enter_trade_at("alice", &bullish_signal(), in_session())
            .unwrap();

        let summary = ledger
            .update_trade_prices("alice", &prices(&[(trade.symbol.as_str(), 135.0)]))
            .unwrap();
        assert_eq!(summary.closed, 1);
        assert_eq!(summary.marked, 0);

        // A later adverse price finds nothing open
        let summary = ledger
            .update_trade_prices("alice", &prices(&[(trade.symbol.as_str(), 80.0)]))
            .unwrap();
        assert_eq!(summary, MarkSummary::default());

        let history = ledger.get_trade_history("alice", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].exit_reason, Some(ExitReason::TargetHit));
        // 35 x 150 gross, 20 brokerage
        assert_close(history[0].net_pnl, 5_230.0);

        let portfolio = ledger.get_portfolio("alice").unwrap();
        assert_eq!(portfolio.winning_trades, 1);
        assert_eq!(portfolio.closed_trades(), 1);
        assert_eq!(ledger.get_risk_metrics("alice").unwrap().open_positions, 0);
    }

    #[test]
    fn test_stop_loss_closes_losing_trade() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        let trade = ledger
            .enter_trade_at("alice", &bullish_signal(), in_session())
            .unwrap();

        let summary = ledger.update_market_data(&prices(&[(trade.symbol.as_str(), 85.0)]));
        assert_eq!(summary.closed, 1);

        let history = ledger.get_trade_history("alice", 10).unwrap();
        assert_eq!(history[0].exit_reason, Some(ExitReason::StopLoss));
        assert_close(history[0].net_pnl, -2_270.0);

        let portfolio = ledger.get_portfolio("alice").unwrap();
        assert_eq!(portfolio.losing_trades, 1);
        assert_close(portfolio.available_capital, 100_000.0 - 2_270.0);
    }

    #[test]
    fn test_bearish_signal_opens_short() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        let signal = TradeSignal::new("BANKNIFTY", "BANKNIFTY24JAN48000PE", "BEARISH", 100.0, 70.0, 110.0)
            .with_lot_size(15);

        let trade = ledger
            .enter_trade_at("alice", &signal, in_session())
            .unwrap();
        assert_eq!(trade.transaction_type, TransactionType::Sell);

        let summary = ledger.update_market_data(&prices(&[(trade.symbol.as_str(), 69.0)]));
        assert_eq!(summary.closed, 1);
        let history = ledger.get_trade_history("alice", 10).unwrap();
        assert_eq!(history[0].exit_reason, Some(ExitReason::TargetHit));
        assert!(history[0].net_pnl > 0.0);
    }

    #[test]
    fn test_manual_sell_shrinks_tracked_risk() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        // Wide stop: the 2% risk budget rounds to zero, so the one-lot floor applies
        let signal = TradeSignal::new("NIFTY", "NIFTY24JAN22000CE", "BULLISH", 100.0, 250.0, 10.0)
            .with_lot_size(100);
        let trade = ledger
            .enter_trade_at("alice", &signal, in_session())
            .unwrap();
        assert_eq!(trade.quantity, 100);

        ledger
            .place_order("alice", "NIFTY24JAN22000CE", 99, 100.0, "SELL")
            .unwrap();
        let summary = ledger
            .update_trade_prices("alice", &prices(&[("NIFTY24JAN22000CE", 11.0)]))
            .unwrap();
        assert_eq!(summary.closed, 0);

        // One contract left: 89 unrealized plus 20 brokerage on the sell
        let metrics = ledger.get_risk_metrics("alice").unwrap();
        assert_eq!(metrics.open_positions, 1);
        assert_close(metrics.total_exposure, 100.0);
        assert_close(metrics.daily_pnl, -109.0);

        let bearish = TradeSignal::new("BANKNIFTY", "BANKNIFTY24JAN48000PE", "BEARISH", 100.0, 70.0, 110.0)
            .with_lot_size(15);
        let short = ledger
            .enter_trade_at("alice", &bearish, in_session())
            .unwrap();
        assert_eq!(short.transaction_type, TransactionType::Sell);
        assert_eq!(ledger.get_risk_metrics("alice").unwrap().open_positions, 2);
    }

    #[test]
    fn test_manual_buy_grows_tracked_risk() {
        let ledger = service();
        ledger.create_portfolio("alice", None).unwrap();
        let trade = ledger
            .enter_trade_at("alice", &bullish_signal(), in_session())
            .unwrap();

        // Averages into the signal position: 150 @ 100 plus 50 @ 120
        let order = ledger
            .place_order("alice", "NIFTY24JAN22000CE", 50, 120.0, "BUY")
            .unwrap();
        assert_eq!(order.trade.trade_id, trade.trade_id);
        assert_eq!(order.trade.quantity, 200);
        assert_close(order.trade.entry_price, 105.0);

        let metrics = ledger.get_risk_metrics("alice").unwrap();
        assert_close(metrics.total_exposure, 21_000.0);
        assert_close(metrics.daily_pnl, 3_000.0);
    }
}

// =============================================================================
// Accounting Invariants
// =============================================================================

mod accounting_tests {
    use super::*;

    #[test]
    fn test_capital_is_conserved_across_mixed_activity() {
        let ledger = service();
        ledger.create_portfolio("alice", Some(200_000.0)).unwrap();

        ledger.place_order("alice", "NIFTY_CE", 75, 120.0, "BUY").unwrap();
        ledger.place_order("alice", "NIFTY_CE", 25, 140.0, "BUY").unwrap();
        ledger.place_order("alice", "RELIANCE", 10, 2_500.0, "BUY").unwrap();
        ledger.place_order("alice", "NIFTY_CE", 30, 150.0, "SELL").unwrap();
        ledger
            .update_trade_prices("alice", &prices(&[("NIFTY_CE", 90.0), ("RELIANCE", 2_650.0)]))
            .unwrap();
        ledger.place_order("alice", "RELIANCE", 10, 2_400.0, "SELL").unwrap();

        let p = ledger.get_portfolio("alice").unwrap();
        assert_close(p.available_capital + p.invested_capital, p.total_capital + p.realized_pnl);
        assert_close(p.current_value, p.available_capital + p.invested_capital + p.unrealized_pnl);
        assert_close(p.total_pnl, p.current_value - p.total_capital);

        let trades = ledger.get_active_trades("alice").unwrap();
        let invested: f64 = trades.iter().map(|t| t.entry_price * t.quantity as f64).sum();
        assert_close(p.invested_capital, invested);
    }

    #[test]
    fn test_trade_ids_are_unique_across_users() {
        let ledger = service();
        let a = ledger.place_order("a", "NIFTY_CE", 1, 10.0, "BUY").unwrap();
        let b = ledger.place_order("b", "NIFTY_CE", 1, 10.0, "BUY").unwrap();
        let c = ledger.place_order("a", "NIFTY_PE", 1, 10.0, "BUY").unwrap();

        assert_eq!(a.trade.trade_id, "PT-000001");
        assert_eq!(b.trade.trade_id, "PT-000002");
        assert_eq!(c.trade.trade_id, "PT-000003");
    }

    #[test]
    fn test_stats_match_portfolio() {
        let ledger = service();
        for (price, exit) in [(100.0, 120.0), (100.0, 90.0), (100.0, 130.0)] {
            let order = ledger
                .place_order("alice", "NIFTY_CE", 10, price, "BUY")
                .unwrap();
            ledger
                .close_trade("alice", &order.trade.trade_id, exit, ExitReason::Manual)
                .unwrap();
        }

        let stats = ledger.get_stats("alice").unwrap();
        let portfolio = ledger.get_portfolio("alice").unwrap();
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.winning_trades, portfolio.winning_trades);
        assert_eq!(stats.losing_trades, portfolio.losing_trades);
        assert_close(stats.win_rate, portfolio.win_rate);
        assert!(portfolio.has_badge("first_trade"));
    }
}

// =============================================================================
// Leaderboard
// =============================================================================

mod leaderboard_tests {
    use super::*;

    #[test]
    fn test_leaderboard_ranks_by_return() {
        let ledger = service();
        for (user, exit) in [("loser", 90.0), ("winner", 150.0), ("middle", 110.0)] {
            let order = ledger.place_order(user, "NIFTY_CE", 100, 100.0, "BUY").unwrap();
            ledger
                .close_trade(user, &order.trade.trade_id, exit, ExitReason::Manual)
                .unwrap();
        }
        ledger.create_portfolio("idle", None).unwrap();

        let board = ledger.get_leaderboard(LeaderboardPeriod::AllTime, 10);
        let users: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, vec!["winner", "middle", "loser"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[2].rank, 3);

        let top = ledger.get_leaderboard(LeaderboardPeriod::AllTime, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, "winner");
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence_tests {
    use super::*;

    #[test]
    fn test_restore_rebuilds_ledger() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let writer = Arc::new(LedgerWriter::spawn(store.clone()).unwrap());
        let ledger = PaperTradingService::with_writer(LedgerConfig::default(), writer.clone());

        let first = ledger.place_order("alice", "NIFTY_CE", 50, 100.0, "BUY").unwrap();
        ledger
            .close_trade("alice", &first.trade.trade_id, 120.0, ExitReason::Manual)
            .unwrap();
        ledger.place_order("alice", "NIFTY_PE", 20, 80.0, "BUY").unwrap();
        writer.flush();

        assert_eq!(store.portfolio_count(), 1);
        assert_eq!(store.trade_count(), 2);
        assert_eq!(writer.failed_writes(), 0);

        let restored = PaperTradingService::new(LedgerConfig::default());
        assert_eq!(restored.restore(&store).unwrap(), 1);

        let before = ledger.get_portfolio("alice").unwrap();
        let portfolio = restored.get_portfolio("alice").unwrap();
        assert_close(portfolio.available_capital, before.available_capital);
        assert_close(portfolio.realized_pnl, before.realized_pnl);
        assert_eq!(portfolio.winning_trades, 1);
        assert_eq!(restored.get_active_trades("alice").unwrap().len(), 1);
        assert_eq!(restored.get_trade_history("alice", 10).unwrap().len(), 2);
        assert_eq!(restored.get_executions("alice", 10).unwrap().len(), 3);

        // New ids continue after the stored ones
        let next = restored.place_order("bob", "NIFTY_CE", 1, 10.0, "BUY").unwrap();
        assert_eq!(next.trade.trade_id, "PT-000003");

        writer.shutdown();
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency_tests {
    use super::*;
    use std::collections::HashSet;

    const THREADS: usize = 8;
    const ROUNDS: usize = 50;
    const SYMBOLS: [&str; 3] = ["NIFTY_CE", "NIFTY_PE", "BANKNIFTY_CE"];

    fn trade_number(trade_id: &str) -> u64 {
        trade_id.trim_start_matches("PT-").parse().unwrap()
    }

    #[test]
    fn test_one_user_under_contention() {
        let ledger = service();
        ledger.create_portfolio("alice", Some(10_000_000.0)).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..THREADS {
                let ledger = &ledger;
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let symbol = SYMBOLS[(worker + round) % SYMBOLS.len()];
                        let price = 100.0 + ((worker * ROUNDS + round) % 40) as f64;
                        ledger.place_order("alice", symbol, 10, price, "BUY").unwrap();

                        // Other workers may have emptied the symbol or closed the trade
                        if round % 3 == 0 {
                            let _ = ledger.place_order("alice", symbol, 5, price + 5.0, "SELL");
                        }
                        if round % 5 == 0 {
                            if let Some(open) = ledger.get_active_trades("alice").unwrap().first() {
                                let _ = ledger.close_trade(
                                    "alice",
                                    &open.trade_id,
                                    price - 3.0,
                                    ExitReason::Manual,
                                );
                            }
                        }
                        if round % 7 == 0 {
                            ledger.update_market_data(&prices(&[(symbol, price + 1.0)]));
                        }
                    }
                });
            }
        });

        let p = ledger.get_portfolio("alice").unwrap();
        assert_close(p.available_capital + p.invested_capital, p.total_capital + p.realized_pnl);
        assert_close(p.current_value, p.available_capital + p.invested_capital + p.unrealized_pnl);

        let trades = ledger.get_trade_history("alice", usize::MAX).unwrap();
        let ids: HashSet<u64> = trades.iter().map(|t| trade_number(&t.trade_id)).collect();
        assert_eq!(ids.len(), trades.len());

        // Trade ids are handed out in the order positions open
        let mut executions = ledger.get_executions("alice", usize::MAX).unwrap();
        executions.reverse();
        let mut seen = HashSet::new();
        let mut last_opened = 0;
        for execution in &executions {
            let number = trade_number(&execution.trade_id);
            if seen.insert(number) {
                assert!(number > last_opened, "{} opened after {}", number, last_opened);
                last_opened = number;
            }
        }
        assert_eq!(seen, ids);

        let closed = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .count() as u64;
        assert_eq!(p.winning_trades + p.losing_trades, closed);
        assert_eq!(p.closed_trades(), closed);
    }
}
