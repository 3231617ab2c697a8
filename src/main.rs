use std::sync::Arc;

use coinbridge::api::router::create_router;
use coinbridge::config::AppConfig;
use coinbridge::engine::OrderEngine;
use coinbridge::pricing::{HttpRateFeed, PricingEngine};
use coinbridge::retry::RetryPolicy;
use coinbridge::services::Notifier;
use coinbridge::store::{MemStore, SheetStore, Store};
use coinbridge::tron::TronClient;
use coinbridge::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    let metrics_handle = coinbridge::metrics::init_metrics();

    // --- Store: spreadsheet-backed when configured, in-memory otherwise ---
    let store: Arc<dyn Store> = if config.has_sheet_store() {
        let sheet = SheetStore::new(
            reqwest::Client::new(),
            config.sheets_spreadsheet_id.clone().unwrap(),
            config.sheets_access_token.clone().unwrap(),
            config.sheets_worksheet.clone(),
        );
        sheet.ensure_header().await?;
        tracing::info!(worksheet = %config.sheets_worksheet, "Using spreadsheet order store");
        Arc::new(sheet)
    } else {
        tracing::warn!("No spreadsheet configured — orders are stored in memory only");
        Arc::new(MemStore::new())
    };

    // --- Ledger client with shared retry policy ---
    let retry = RetryPolicy::from_config(&config);
    tracing::info!(
        max_attempts = retry.max_attempts,
        base_delay_secs = retry.base_delay.as_secs(),
        enabled = retry.enabled,
        "Upstream retry policy configured"
    );
    let ledger = Arc::new(TronClient::new(&config, retry));

    // --- Pricing ---
    let feed = Arc::new(HttpRateFeed::new(&config));
    let pricing = Arc::new(PricingEngine::from_config(feed, &config));

    // --- Notifier ---
    let notifier = if config.has_telegram() {
        Some(Arc::new(Notifier::new(
            config.telegram_bot_token.clone().unwrap(),
            config.telegram_chat_id.clone().unwrap(),
        )))
    } else {
        tracing::info!("Telegram notifications disabled (no credentials)");
        None
    };

    let engine = Arc::new(OrderEngine::new(
        store.clone(),
        ledger,
        pricing.clone(),
        notifier,
    ));

    let state = AppState {
        config,
        store,
        engine,
        pricing,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
