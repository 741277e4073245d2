use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use transfer_watcher::{
    Config, LedgerClient, LogNotifier, NotificationSink, SubscriptionKey, TelegramNotifier,
    WatcherRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.print_startup_info();

    let ledger = Arc::new(LedgerClient::new(config.rpc.url.clone(), config.rpc_timeout())?);

    let sink: Arc<dyn NotificationSink> = if config.telegram.bot_token.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(TelegramNotifier::with_api_url(
            config.telegram.bot_token.clone(),
            config.telegram.api_url.clone(),
        )?)
    };

    let registry = WatcherRegistry::new(ledger, sink, config.watcher_settings()?);

    for address in config.watch_addresses()? {
        let key = SubscriptionKey::new(config.telegram.chat_id.clone(), address);
        if let Err(e) = registry.start_watching(key) {
            error!("❌ Failed to start watcher for {}: {}", address, e);
        }
    }

    if registry.active_count() == 0 {
        warn!("⚠️  No addresses to watch, set WATCH_ADDRESSES");
    } else {
        info!("🚀 {} watcher(s) running, press Ctrl+C to stop", registry.active_count());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("🛑 Shutdown signal received");
    registry.shutdown().await;
    info!("✅ All watchers stopped");

    Ok(())
}
