//! Process entry point: wires Config, Store, the VenueRegistry with every
//! adapter, CredentialVault, Aggregator, HistoryService, ArbitrageEngine,
//! Scheduler, and Alerts, then runs until a shutdown signal.

use chrono::Duration as ChronoDuration;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use venue_core::aggregator::Aggregator;
use venue_core::alerts::Alerts;
use venue_core::arbitrage::ArbitrageEngine;
use venue_core::config::Config;
use venue_core::history::HistoryService;
use venue_core::hooks::NullTransport;
use venue_core::scheduler::Scheduler;
use venue_core::store::Store;
use venue_core::vault::CredentialVault;
use venue_core::venue::binance_futures::BinanceFuturesAdapter;
use venue_core::venue::bybit::BybitAdapter;
use venue_core::venue::drift::DriftAdapter;
use venue_core::venue::evm_dex::EvmDexAdapter;
use venue_core::venue::hyperliquid::HyperliquidAdapter;
use venue_core::venue::jupiter::JupiterAdapter;
use venue_core::venue::kalshi::KalshiAdapter;
use venue_core::venue::manifold::ManifoldAdapter;
use venue_core::venue::meteora::MeteoraAdapter;
use venue_core::venue::mexc::MexcAdapter;
use venue_core::venue::orca::OrcaAdapter;
use venue_core::venue::polymarket::PolymarketAdapter;
use venue_core::venue::pump_fun::PumpFunAdapter;
use venue_core::venue::raydium::RaydiumAdapter;
use venue_core::venue::VenueRegistry;

#[derive(Parser, Debug)]
#[command(name = "venue-core", about = "Multi-venue trading aggregation core")]
struct Cli {
    /// Run a single aggregation/arbitrage tick then exit, instead of serving.
    #[arg(long)]
    once: bool,
}

fn build_registry() -> VenueRegistry {
    let mut registry = VenueRegistry::new();
    registry.register(Arc::new(PolymarketAdapter::new()));
    registry.register(Arc::new(KalshiAdapter::new()));
    registry.register(Arc::new(HyperliquidAdapter::new()));
    registry.register(Arc::new(BinanceFuturesAdapter::new()));
    registry.register(Arc::new(BybitAdapter::new()));
    registry.register(Arc::new(MexcAdapter::new()));
    registry.register(Arc::new(DriftAdapter::new()));
    registry.register(Arc::new(ManifoldAdapter::new()));
    registry.register(Arc::new(JupiterAdapter::new()));
    registry.register(Arc::new(PumpFunAdapter::new()));
    registry.register(Arc::new(RaydiumAdapter::new()));
    registry.register(Arc::new(OrcaAdapter::new()));
    registry.register(Arc::new(MeteoraAdapter::new()));
    let evm_rpc_url = std::env::var("EVM_RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".to_string());
    registry.register(Arc::new(EvmDexAdapter::new(evm_rpc_url)));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(state_dir = %config.state_dir.display(), dry_run = config.dry_run, "starting venue-core");

    let store = Store::new(&config.database_path)?;
    let registry = Arc::new(build_registry());
    let vault = Arc::new(CredentialVault::new(
        store.clone(),
        &config.vault_passphrase,
        config.credential_failure_threshold,
        config.credential_backoff_base_ms,
    ));
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&registry),
        Arc::clone(&vault),
        config.aggregator_fetch_timeout_secs,
        config.aggregator_cache_ttl_secs,
    ));
    let history = Arc::new(HistoryService::new(store.clone(), Arc::clone(&registry), Arc::clone(&vault)));
    let arbitrage = Arc::new(ArbitrageEngine::new(
        store.clone(),
        Arc::clone(&registry),
        config.arbitrage_min_spread,
        config.arbitrage_opportunity_ttl_ms,
    ));
    let alerts = Arc::new(Alerts::new(store.clone(), Arc::new(NullTransport)));

    if cli.once {
        arbitrage.tick().await?;
        info!("completed single tick, exiting");
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new(config.scheduler_job_deadline_secs));

    {
        let arbitrage = Arc::clone(&arbitrage);
        scheduler
            .register("arbitrage.tick", ChronoDuration::milliseconds(config.arbitrage_poll_interval_ms as i64), move || {
                let arbitrage = Arc::clone(&arbitrage);
                async move { Ok(arbitrage.tick().await?) }
            })
            .await;
    }
    {
        let store = store.clone();
        let backup_dir = config.state_dir.join("backups");
        let retention = config.backup_retention_count;
        scheduler
            .register("db.backup", ChronoDuration::minutes(config.backup_interval_mins as i64), move || {
                let store = store.clone();
                let backup_dir = backup_dir.clone();
                async move {
                    store.backup_now(&backup_dir, retention).await?;
                    Ok(())
                }
            })
            .await;
    }
    {
        let store = store.clone();
        scheduler
            .register("market.index.prune", ChronoDuration::hours(1), move || {
                let store = store.clone();
                async move {
                    store.evict_stale_markets(chrono::Utc::now() - chrono::Duration::days(7)).await?;
                    Ok(())
                }
            })
            .await;
    }
    {
        let store = store.clone();
        let history = Arc::clone(&history);
        scheduler
            .register("history.sync", ChronoDuration::minutes(5), move || {
                let store = store.clone();
                let history = Arc::clone(&history);
                async move {
                    for user in store.list_users().await? {
                        if let Err(e) = history.sync_trades(&user.id).await {
                            tracing::warn!(user_id = %user.id, error = %e, "history sync failed");
                        }
                    }
                    Ok(())
                }
            })
            .await;
    }
    {
        let store = store.clone();
        let aggregator = Arc::clone(&aggregator);
        let alerts = Arc::clone(&alerts);
        scheduler
            .register("portfolio.snapshot", ChronoDuration::minutes(15), move || {
                let store = store.clone();
                let aggregator = Arc::clone(&aggregator);
                let alerts = Arc::clone(&alerts);
                async move {
                    for user in store.list_users().await? {
                        aggregator.invalidate(&user.id).await;
                        let summary = aggregator.get_summary(&user.id).await?;
                        let snapshot = venue_core::models::PortfolioSnapshot {
                            id: uuid::Uuid::new_v4().to_string(),
                            user_id: user.id.clone(),
                            total_value: summary.total_value,
                            total_pnl: summary.total_pnl,
                            total_pnl_pct: summary.total_pnl_pct,
                            total_cost_basis: summary.total_cost_basis,
                            positions_count: summary.positions.len() as u32,
                            per_venue_breakdown: std::collections::HashMap::new(),
                            created_at: chrono::Utc::now(),
                        };
                        store.insert_snapshot(&snapshot).await?;
                        let concentration = venue_core::risk::concentration(&summary.positions);
                        alerts.evaluate_portfolio(&user.id, &summary, concentration.hhi).await?;
                    }
                    Ok(())
                }
            })
            .await;
    }
    {
        // Pairing-session storage belongs to an external PairingService this
        // core doesn't own; this slot lets that service plug a prune handler
        // in without touching the Scheduler's job set.
        scheduler
            .register("sessions.prune", ChronoDuration::hours(6), || async { Ok(()) })
            .await;
    }
    if !config.arbitrage_match_terms.is_empty() {
        let arbitrage = Arc::clone(&arbitrage);
        let terms = config.arbitrage_match_terms.clone();
        let min_confidence = config.arbitrage_min_match_confidence;
        scheduler
            .register(
                "arbitrage.auto_match",
                ChronoDuration::minutes(config.arbitrage_match_interval_mins as i64),
                move || {
                    let arbitrage = Arc::clone(&arbitrage);
                    let terms = terms.clone();
                    async move {
                        let created = arbitrage.auto_match(&terms, min_confidence).await?;
                        if created > 0 {
                            info!(created, "auto-match created new cross-venue matches");
                        }
                        Ok(())
                    }
                },
            )
            .await;
    }

    scheduler.start().await;
    info!("venue-core running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let shutdown_deadline = std::time::Duration::from_secs(config.shutdown_deadline_secs);
    tokio::time::timeout(shutdown_deadline, scheduler.stop()).await.ok();

    info!("venue-core stopped");
    Ok(())
}
