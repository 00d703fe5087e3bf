//! Ledger Writer
//!
//! A single background thread owns every SQLite write. Ledger mutations
//! enqueue snapshots on an unbounded channel and never wait on disk.
//! Write failures are logged and counted, never surfaced to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::sqlite_store::SqliteStore;
use crate::types::{Execution, PaperTrade, Portfolio};

/// A queued persistence operation.
#[derive(Debug)]
pub enum WriteOp {
    Portfolio(Portfolio),
    Trade(PaperTrade),
    Execution(Execution),
    /// Acknowledged once everything queued before it has been written
    Flush(std_mpsc::Sender<()>),
    Shutdown,
}

/// Handle to the writer thread.
pub struct LedgerWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
    handle: Mutex<Option<JoinHandle<()>>>,
    failed_writes: Arc<AtomicU64>,
}

impl LedgerWriter {
    /// Start the writer thread over `store`.
    pub fn spawn(store: Arc<SqliteStore>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let failed_writes = Arc::new(AtomicU64::new(0));
        let failures = failed_writes.clone();

        let handle = std::thread::Builder::new()
            .name("ledger-writer".to_string())
            .spawn(move || run(store, rx, failures))?;

        info!("Ledger writer started");
        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
            failed_writes,
        })
    }

    fn enqueue(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            error!("Ledger writer is stopped; dropping write");
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn save_portfolio(&self, portfolio: &Portfolio) {
        self.enqueue(WriteOp::Portfolio(portfolio.clone()));
    }

    pub fn save_trade(&self, trade: &PaperTrade) {
        self.enqueue(WriteOp::Trade(trade.clone()));
    }

    pub fn save_execution(&self, execution: &Execution) {
        self.enqueue(WriteOp::Execution(execution.clone()));
    }

    /// Block until every write queued so far has been applied.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        if self.tx.send(WriteOp::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Number of writes that failed or were dropped.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Drain the queue and join the thread. Safe to call more than once.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.tx.send(WriteOp::Shutdown);
        if handle.join().is_err() {
            error!("Ledger writer thread panicked");
        }
        info!("Ledger writer stopped");
    }
}

impl Drop for LedgerWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(store: Arc<SqliteStore>, mut rx: mpsc::UnboundedReceiver<WriteOp>, failures: Arc<AtomicU64>) {
    while let Some(op) = rx.blocking_recv() {
        let result = match op {
            WriteOp::Portfolio(portfolio) => store.upsert_portfolio(&portfolio),
            WriteOp::Trade(trade) => store.upsert_trade(&trade),
            WriteOp::Execution(execution) => store.insert_execution(&execution),
            WriteOp::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
            WriteOp::Shutdown => break,
        };

        if let Err(e) = result {
            error!("Ledger write failed: {}", e);
            failures.fetch_add(1, Ordering::Relaxed);
        }
    }
    debug!("Ledger writer loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;

    #[test]
    fn test_flush_applies_queued_writes() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let writer = LedgerWriter::spawn(store.clone()).unwrap();

        writer.save_portfolio(&Portfolio::new("alice".to_string(), 50_000.0));
        writer.save_trade(&PaperTrade::open(
            "PT-000001".to_string(),
            "alice".to_string(),
            "NIFTY24JAN22000CE".to_string(),
            TransactionType::Buy,
            50,
            100.0,
        ));
        writer.flush();

        assert_eq!(store.portfolio_count(), 1);
        assert_eq!(store.trade_count(), 1);
        assert_eq!(writer.failed_writes(), 0);
    }

    #[test]
    fn test_writes_after_shutdown_are_counted() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let writer = LedgerWriter::spawn(store.clone()).unwrap();

        writer.save_portfolio(&Portfolio::new("alice".to_string(), 50_000.0));
        writer.shutdown();
        writer.shutdown();
        assert_eq!(store.portfolio_count(), 1);

        writer.save_portfolio(&Portfolio::new("bob".to_string(), 50_000.0));
        writer.flush();
        assert_eq!(writer.failed_writes(), 1);
        assert_eq!(store.portfolio_count(), 1);
    }
}
