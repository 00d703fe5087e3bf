//! SQLite persistence layer for the paper trading ledger.
//!
//! Three tables:
//! - `portfolios` (one row per user, badges as JSON text)
//! - `paper_trades` (one row per position, open or closed)
//! - `order_executions` (append-only order log)
//!
//! Writes arrive through the ledger writer thread; reads happen at startup
//! (restore) and from tests.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info, warn};

use crate::types::{
    ExitReason, Execution, InstrumentType, PaperTrade, Portfolio, TradeStatus, TransactionType,
};

/// SQLite store for portfolios, trades and executions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const PORTFOLIO_COLUMNS: &str = "user_id, total_capital, available_capital, invested_capital,
    unrealized_pnl, realized_pnl, current_value, total_pnl, total_pnl_percentage,
    day_pnl, day_pnl_percentage, total_trades, winning_trades, losing_trades,
    win_rate, avg_winning_trade, avg_losing_trade, dispersion_ratio,
    max_drawdown, peak_balance, badges_json, created_at, updated_at";

const TRADE_COLUMNS: &str = "trade_id, user_id, instrument, symbol, instrument_type,
    strike_price, expiry_date, transaction_type, quantity, lots, lot_size,
    entry_price, current_price, target_price, stop_loss, exit_price, status,
    exit_reason, pnl, realized_pnl, pnl_percentage, brokerage, net_pnl,
    signal_type, signal_id, confidence, entry_time, exit_time";

const EXECUTION_COLUMNS: &str =
    "order_id, user_id, trade_id, symbol, side, quantity, price, brokerage, realized_pnl, executed_at";

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolios (
                user_id TEXT PRIMARY KEY,
                total_capital REAL NOT NULL,
                available_capital REAL NOT NULL,
                invested_capital REAL NOT NULL,
                unrealized_pnl REAL NOT NULL DEFAULT 0,
                realized_pnl REAL NOT NULL DEFAULT 0,
                current_value REAL NOT NULL,
                total_pnl REAL NOT NULL DEFAULT 0,
                total_pnl_percentage REAL NOT NULL DEFAULT 0,
                day_pnl REAL NOT NULL DEFAULT 0,
                day_pnl_percentage REAL NOT NULL DEFAULT 0,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                losing_trades INTEGER NOT NULL DEFAULT 0,
                win_rate REAL NOT NULL DEFAULT 0,
                avg_winning_trade REAL NOT NULL DEFAULT 0,
                avg_losing_trade REAL NOT NULL DEFAULT 0,
                dispersion_ratio REAL NOT NULL DEFAULT 0,
                max_drawdown REAL NOT NULL DEFAULT 0,
                peak_balance REAL NOT NULL,
                badges_json TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS paper_trades (
                trade_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                instrument TEXT NOT NULL,
                symbol TEXT NOT NULL,
                instrument_type TEXT NOT NULL,
                strike_price REAL,
                expiry_date TEXT,
                transaction_type TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                lots INTEGER NOT NULL,
                lot_size INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                current_price REAL NOT NULL,
                target_price REAL,
                stop_loss REAL,
                exit_price REAL,
                status TEXT NOT NULL,
                exit_reason TEXT,
                pnl REAL NOT NULL DEFAULT 0,
                realized_pnl REAL NOT NULL DEFAULT 0,
                pnl_percentage REAL NOT NULL DEFAULT 0,
                brokerage REAL NOT NULL DEFAULT 0,
                net_pnl REAL NOT NULL DEFAULT 0,
                signal_type TEXT,
                signal_id TEXT,
                confidence INTEGER NOT NULL DEFAULT 0,
                entry_time INTEGER NOT NULL,
                exit_time INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_status ON paper_trades(user_id, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_entry_time ON paper_trades(entry_time DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS order_executions (
                order_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                trade_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                brokerage REAL NOT NULL DEFAULT 0,
                realized_pnl REAL,
                executed_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_user_time
             ON order_executions(user_id, executed_at DESC)",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Portfolio Methods ==========

    /// Insert or replace a portfolio row.
    pub fn upsert_portfolio(&self, portfolio: &Portfolio) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        let badges_json = serde_json::to_string(&portfolio.badges).unwrap_or_else(|_| "[]".into());

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO portfolios ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?23)",
                PORTFOLIO_COLUMNS
            ),
            params![
                portfolio.user_id,
                portfolio.total_capital,
                portfolio.available_capital,
                portfolio.invested_capital,
                portfolio.unrealized_pnl,
                portfolio.realized_pnl,
                portfolio.current_value,
                portfolio.total_pnl,
                portfolio.total_pnl_percentage,
                portfolio.day_pnl,
                portfolio.day_pnl_percentage,
                portfolio.total_trades as i64,
                portfolio.winning_trades as i64,
                portfolio.losing_trades as i64,
                portfolio.win_rate,
                portfolio.avg_winning_trade,
                portfolio.avg_losing_trade,
                portfolio.dispersion_ratio,
                portfolio.max_drawdown,
                portfolio.peak_balance,
                badges_json,
                portfolio.created_at,
                portfolio.updated_at,
            ],
        )?;

        debug!("Saved portfolio {}", portfolio.user_id);
        Ok(())
    }

    /// All portfolios in creation order.
    pub fn load_portfolios(&self) -> Result<Vec<Portfolio>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM portfolios ORDER BY created_at ASC, user_id ASC",
            PORTFOLIO_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_portfolio)?;
        rows.collect()
    }

    pub fn portfolio_count(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM portfolios", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    // ========== Trade Methods ==========

    /// Insert or replace a trade row.
    pub fn upsert_trade(&self, trade: &PaperTrade) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO paper_trades ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
                TRADE_COLUMNS
            ),
            params![
                trade.trade_id,
                trade.user_id,
                trade.instrument,
                trade.symbol,
                trade.instrument_type.to_string(),
                trade.strike_price,
                trade.expiry_date,
                trade.transaction_type.to_string(),
                trade.quantity as i64,
                trade.lots as i64,
                trade.lot_size as i64,
                trade.entry_price,
                trade.current_price,
                trade.target_price,
                trade.stop_loss,
                trade.exit_price,
                trade.status.to_string(),
                trade.exit_reason.map(|r| r.to_string()),
                trade.pnl,
                trade.realized_pnl,
                trade.pnl_percentage,
                trade.brokerage,
                trade.net_pnl,
                trade.signal_type,
                trade.signal_id,
                trade.confidence as i64,
                trade.entry_time,
                trade.exit_time,
            ],
        )?;

        debug!("Saved trade {} ({})", trade.trade_id, trade.status);
        Ok(())
    }

    /// Trades for one user in entry order.
    pub fn load_trades(&self, user_id: &str) -> Result<Vec<PaperTrade>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM paper_trades WHERE user_id = ?1
             ORDER BY entry_time ASC, trade_id ASC",
            TRADE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_trade)?;
        rows.collect()
    }

    /// Highest numeric suffix among stored `PT-` trade ids, 0 when empty.
    pub fn max_trade_seq(&self) -> Result<u64, rusqlite::Error> {
        let conn = self.conn.lock();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(CAST(SUBSTR(trade_id, 4) AS INTEGER)) FROM paper_trades
             WHERE trade_id LIKE 'PT-%'",
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }

    pub fn trade_count(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM paper_trades", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    // ========== Execution Methods ==========

    /// Append an execution. Re-inserting the same order id is a no-op.
    pub fn insert_execution(&self, execution: &Execution) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO order_executions ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                EXECUTION_COLUMNS
            ),
            params![
                execution.order_id,
                execution.user_id,
                execution.trade_id,
                execution.symbol,
                execution.side.to_string(),
                execution.quantity as i64,
                execution.price,
                execution.brokerage,
                execution.realized_pnl,
                execution.executed_at,
            ],
        )?;
        Ok(())
    }

    /// Executions for a user in the order they happened.
    pub fn load_executions(&self, user_id: &str) -> Result<Vec<Execution>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM order_executions WHERE user_id = ?1
             ORDER BY executed_at ASC, rowid ASC",
            EXECUTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_execution)?;
        rows.collect()
    }
}

// ========== Row Mapping ==========

fn row_to_portfolio(row: &Row<'_>) -> Result<Portfolio, rusqlite::Error> {
    let user_id: String = row.get(0)?;
    let badges_json: String = row.get(20)?;
    let badges = serde_json::from_str(&badges_json).unwrap_or_else(|e| {
        warn!("Bad badges JSON for {}: {}", user_id, e);
        Vec::new()
    });

    Ok(Portfolio {
        user_id,
        total_capital: row.get(1)?,
        available_capital: row.get(2)?,
        invested_capital: row.get(3)?,
        unrealized_pnl: row.get(4)?,
        realized_pnl: row.get(5)?,
        current_value: row.get(6)?,
        total_pnl: row.get(7)?,
        total_pnl_percentage: row.get(8)?,
        day_pnl: row.get(9)?,
        day_pnl_percentage: row.get(10)?,
        total_trades: row.get::<_, i64>(11)?.max(0) as u64,
        winning_trades: row.get::<_, i64>(12)?.max(0) as u64,
        losing_trades: row.get::<_, i64>(13)?.max(0) as u64,
        win_rate: row.get(14)?,
        avg_winning_trade: row.get(15)?,
        avg_losing_trade: row.get(16)?,
        dispersion_ratio: row.get(17)?,
        max_drawdown: row.get(18)?,
        peak_balance: row.get(19)?,
        badges,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn row_to_trade(row: &Row<'_>) -> Result<PaperTrade, rusqlite::Error> {
    Ok(PaperTrade {
        trade_id: row.get(0)?,
        user_id: row.get(1)?,
        instrument: row.get(2)?,
        symbol: row.get(3)?,
        instrument_type: parse_instrument_type(&row.get::<_, String>(4)?),
        strike_price: row.get(5)?,
        expiry_date: row.get(6)?,
        transaction_type: TransactionType::parse(&row.get::<_, String>(7)?)
            .unwrap_or(TransactionType::Buy),
        quantity: row.get::<_, i64>(8)?.max(0) as u32,
        lots: row.get::<_, i64>(9)?.max(0) as u32,
        lot_size: row.get::<_, i64>(10)?.max(0) as u32,
        entry_price: row.get(11)?,
        current_price: row.get(12)?,
        target_price: row.get(13)?,
        stop_loss: row.get(14)?,
        exit_price: row.get(15)?,
        status: parse_status(&row.get::<_, String>(16)?),
        exit_reason: row
            .get::<_, Option<String>>(17)?
            .and_then(|s| ExitReason::parse(&s)),
        pnl: row.get(18)?,
        realized_pnl: row.get(19)?,
        pnl_percentage: row.get(20)?,
        brokerage: row.get(21)?,
        net_pnl: row.get(22)?,
        signal_type: row.get(23)?,
        signal_id: row.get(24)?,
        confidence: row.get::<_, i64>(25)?.clamp(0, 100) as u8,
        entry_time: row.get(26)?,
        exit_time: row.get(27)?,
    })
}

fn row_to_execution(row: &Row<'_>) -> Result<Execution, rusqlite::Error> {
    Ok(Execution {
        order_id: row.get(0)?,
        user_id: row.get(1)?,
        trade_id: row.get(2)?,
        symbol: row.get(3)?,
        side: TransactionType::parse(&row.get::<_, String>(4)?).unwrap_or(TransactionType::Buy),
        quantity: row.get::<_, i64>(5)?.max(0) as u32,
        price: row.get(6)?,
        brokerage: row.get(7)?,
        realized_pnl: row.get(8)?,
        executed_at: row.get(9)?,
    })
}

fn parse_instrument_type(s: &str) -> InstrumentType {
    match s {
        "CE" => InstrumentType::Ce,
        "PE" => InstrumentType::Pe,
        "FUTURE" => InstrumentType::Future,
        _ => InstrumentType::Equity,
    }
}

fn parse_status(s: &str) -> TradeStatus {
    match s {
        "CLOSED" => TradeStatus::Closed,
        _ => TradeStatus::Open,
    }
}
