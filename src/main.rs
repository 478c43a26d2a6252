//! Application entry point for herald-bot.
//!
//! Wires config, logging, the subscription store and the poll timers, then
//! runs until Ctrl+C and flushes the store on the way out.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dotenv::dotenv;
use log::debug;
use log::info;

use herald_bot::config::Config;
use herald_bot::feed::rss_fetcher::RssFetcher;
use herald_bot::logging::setup_logging;
use herald_bot::notify::webhook_notifier::WebhookNotifier;
use herald_bot::service::SubscriptionService;
use herald_bot::store::SubscriptionStore;
use herald_bot::task::poll_scheduler::PollScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = load_config()?;
    let store = setup_store(&config, init_start)?;
    let scheduler = setup_engine(&config, store.clone());

    let armed = scheduler.start().await;
    info!(
        "herald-bot is up in {:.2}s with {armed} armed timer(s). Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    store.save_all().await;
    info!("Subscription state flushed.");
    Ok(())
}

fn load_config() -> Result<Arc<Config>> {
    debug!("Loading configuration...");
    let mut config = Config::new();
    config.load()?;
    let config = Arc::new(config);
    setup_logging(&config)?;
    info!("Starting herald-bot...");
    Ok(config)
}

fn setup_store(config: &Config, init_start: Instant) -> Result<Arc<SubscriptionStore>> {
    debug!("Loading subscription store...");
    // A load failure is fatal here: better to stop than to run with a
    // partial view and re-deliver or forget subscriptions.
    let store = Arc::new(SubscriptionStore::load(&config.data_path)?);
    info!(
        "Store setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(store)
}

fn setup_engine(config: &Config, store: Arc<SubscriptionStore>) -> Arc<PollScheduler> {
    debug!("Setting up services...");
    let fetcher = Arc::new(RssFetcher::new());
    let notifier = Arc::new(WebhookNotifier::new(config.webhook_url.clone()));
    let service = Arc::new(SubscriptionService::new(store.clone(), fetcher, notifier));
    PollScheduler::new(service, store, config.stagger_step)
}
