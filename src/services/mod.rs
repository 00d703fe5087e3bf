pub mod ledger_writer;
pub mod price_board;
pub mod risk_manager;
pub mod sqlite_store;
pub mod stats;
pub mod trading;

pub use ledger_writer::{LedgerWriter, WriteOp};
pub use price_board::{spawn_price_poller, PriceBoard, Quote};
pub use risk_manager::{RiskConfig, RiskDecision, RiskManager, RiskMetrics, Sector};
pub use sqlite_store::SqliteStore;
pub use stats::{evaluate_badges, rank_leaderboard, Badge, PerformanceStats, BADGES};
pub use trading::{LedgerConfig, PaperTradingService, TradingError, DEFAULT_CAPITAL};
