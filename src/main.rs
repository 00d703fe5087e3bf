use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use paperdesk::config::Config;
use paperdesk::services::{
    spawn_price_poller, LedgerWriter, PaperTradingService, PriceBoard, SqliteStore,
};
use paperdesk::{app, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Starting paperdesk on {}", config.bind_addr());

    // Persistence: store plus the single writer thread
    if let Some(dir) = Path::new(&config.database_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }
    }
    let store = Arc::new(
        SqliteStore::new(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path))?,
    );
    let writer = Arc::new(LedgerWriter::spawn(store.clone()).context("starting ledger writer")?);

    // Ledger, restored from disk
    let trading = PaperTradingService::with_writer(config.ledger(), writer.clone());
    let restored = trading.restore(&store)?;
    info!("Ledger ready with {} portfolios", restored);

    // Market data cache and the mark-to-market poller
    let prices = Arc::new(PriceBoard::new());
    let poller = spawn_price_poller(prices.clone(), trading.clone(), config.price_poll_interval);

    let state = AppState { trading, prices };

    // Start the server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("paperdesk listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    // Drain pending writes before exit
    poller.abort();
    tokio::task::spawn_blocking(move || writer.shutdown()).await?;
    info!("paperdesk stopped");

    Ok(())
}
