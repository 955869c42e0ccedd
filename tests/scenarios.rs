//! End-to-end coverage of the concrete worked scenarios: real `Store`,
//! real `CredentialVault`/`Aggregator`/`ArbitrageEngine`, a mock
//! `VenueAdapter` standing in for network calls.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use venue_core::aggregator::Aggregator;
use venue_core::error::{AdapterError, AppError};
use venue_core::history::{HistoryService, Period};
use venue_core::models::{ArbMatch, MatchMember, MatchedBy, PortfolioSnapshot, Position, Side, Venue};
use venue_core::risk;
use venue_core::store::Store;
use venue_core::vault::{CredentialVault, DecryptedCredential};
use venue_core::venue::{
    AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter, VenueRegistry,
};

struct FixedQuoteAdapter {
    venue: Venue,
    price: f64,
}

#[async_trait]
impl VenueAdapter for FixedQuoteAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: false,
            supports_funding: false,
            supports_stream: false,
            price_unit: PriceUnit::Probability,
        }
    }

    async fn fetch_positions(&self, _cred: &Credential) -> AdapterResult<Vec<venue_core::models::Position>> {
        Ok(Vec::new())
    }

    async fn fetch_balances(&self, _cred: &Credential) -> AdapterResult<Vec<venue_core::models::Balance>> {
        Ok(Vec::new())
    }

    async fn fetch_trades(
        &self,
        _cred: &Credential,
        _query: TradeQuery,
    ) -> AdapterResult<Vec<venue_core::models::Trade>> {
        Ok(Vec::new())
    }

    async fn fetch_funding(
        &self,
        _cred: &Credential,
        _query: TradeQuery,
    ) -> AdapterResult<Vec<venue_core::models::FundingPayment>> {
        Err(AdapterError::NotSupported)
    }

    async fn quote(&self, _market_id: &str, _side: venue_core::models::Side, _size: f64) -> AdapterResult<Quote> {
        Ok(Quote {
            price: self.price,
            fee: 0.0,
            price_impact: 0.0,
        })
    }
}

/// Adapter whose `fetch_positions` always fails, for the cooldown scenario.
struct AlwaysAuthFailsAdapter {
    venue: Venue,
}

#[async_trait]
impl VenueAdapter for AlwaysAuthFailsAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: false,
            supports_funding: false,
            supports_stream: false,
            price_unit: PriceUnit::Usd,
        }
    }

    async fn fetch_positions(&self, _cred: &Credential) -> AdapterResult<Vec<venue_core::models::Position>> {
        Err(AdapterError::AuthError)
    }

    async fn fetch_balances(&self, _cred: &Credential) -> AdapterResult<Vec<venue_core::models::Balance>> {
        Err(AdapterError::AuthError)
    }

    async fn fetch_trades(
        &self,
        _cred: &Credential,
        _query: TradeQuery,
    ) -> AdapterResult<Vec<venue_core::models::Trade>> {
        Err(AdapterError::AuthError)
    }

    async fn fetch_funding(
        &self,
        _cred: &Credential,
        _query: TradeQuery,
    ) -> AdapterResult<Vec<venue_core::models::FundingPayment>> {
        Err(AdapterError::NotSupported)
    }

    async fn quote(&self, _market_id: &str, _side: venue_core::models::Side, _size: f64) -> AdapterResult<Quote> {
        Err(AdapterError::AuthError)
    }
}

fn temp_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().join("scenarios.db")).unwrap();
    (store, dir)
}

/// Scenario 1: cross-venue arbitrage detection.
#[tokio::test]
async fn scenario_1_cross_venue_arbitrage_detection() {
    let (store, _dir) = temp_store();
    let mut registry = VenueRegistry::new();
    registry.register(Arc::new(FixedQuoteAdapter { venue: Venue::Polymarket, price: 0.62 }));
    registry.register(Arc::new(FixedQuoteAdapter { venue: Venue::Kalshi, price: 0.70 }));
    let registry = Arc::new(registry);

    let engine = venue_core::arbitrage::ArbitrageEngine::new(store.clone(), registry, 0.02, 60_000);
    let m = ArbMatch {
        id: "match-1".into(),
        markets: vec![
            MatchMember { venue: Venue::Polymarket, market_id: "trump-2024-yes".into(), outcome_id: "YES".into() },
            MatchMember { venue: Venue::Kalshi, market_id: "PRES-2024-DJT-YES".into(), outcome_id: "YES".into() },
        ],
        matched_by: MatchedBy::Manual,
        similarity: 0.92,
        created_at: Utc::now(),
    };
    engine.add_match(m).await.unwrap();
    engine.tick().await.unwrap();

    let opportunities = store.list_active_opportunities().await.unwrap();
    assert_eq!(opportunities.len(), 1);
    let opp = &opportunities[0];
    assert_eq!(opp.buy.venue, Venue::Polymarket);
    assert!((opp.buy.price - 0.62).abs() < 1e-9);
    assert_eq!(opp.sell.venue, Venue::Kalshi);
    assert!((opp.sell.price - 0.70).abs() < 1e-9);
    assert!((opp.spread - 0.08).abs() < 1e-9);
    assert!((opp.spread_pct - 12.903225806451612).abs() < 1e-6);
    assert!((opp.profit_per_100 - 12.903225806451612).abs() < 1e-6);
    assert!((opp.confidence - 0.92).abs() < 1e-9);
    assert!(opp.is_active);
    assert!(opp.expires_at > opp.detected_at);
}

/// Scenario 5: credential cooldown short-circuits the Aggregator.
#[tokio::test]
async fn scenario_5_credential_cooldown_short_circuits_aggregator() {
    let (store, _dir) = temp_store();
    let vault = Arc::new(CredentialVault::new(store.clone(), "pass", 3, 60_000));
    vault
        .store_credential(
            "u1",
            Venue::BinanceFutures,
            venue_core::models::CredentialMode::Live,
            &DecryptedCredential { api_key: "k".into(), api_secret: "s".into(), wallet_secret: None },
        )
        .await
        .unwrap();

    let mut registry = VenueRegistry::new();
    registry.register(Arc::new(AlwaysAuthFailsAdapter { venue: Venue::BinanceFutures }));
    let registry = Arc::new(registry);

    let aggregator = Aggregator::new(Arc::clone(&registry), Arc::clone(&vault), 5, 0);

    // Three calls to get_summary each attempt a fetch that fails with
    // AuthError, driving the failure counter to the threshold.
    for _ in 0..3 {
        let summary = aggregator.get_summary("u1").await.unwrap();
        assert!(summary.positions.is_empty());
    }

    // The vault itself should now be in cooldown.
    let err = vault.get("u1", Venue::BinanceFutures).await.unwrap_err();
    assert!(matches!(err, AppError::CooldownError(_)));

    // A 4th aggregator call short-circuits before ever reaching the
    // adapter: the venue is silently excluded (settled semantics), with
    // no positions and no crash.
    let summary = aggregator.get_summary("u1").await.unwrap();
    assert!(summary.positions.is_empty());
    assert!(summary.venue_errors.contains_key("binance_futures"));
}

/// Scenario 6: snapshot + prune.
#[tokio::test]
async fn scenario_6_snapshot_prune_keeps_only_newer() {
    let (store, _dir) = temp_store();
    let t = Utc::now() - ChronoDuration::hours(2);
    let snap_early = PortfolioSnapshot {
        id: "s1".into(),
        user_id: "u1".into(),
        total_value: 100.0,
        total_pnl: 0.0,
        total_pnl_pct: 0.0,
        total_cost_basis: 100.0,
        positions_count: 1,
        per_venue_breakdown: Default::default(),
        created_at: t,
    };
    let snap_later = PortfolioSnapshot {
        id: "s2".into(),
        created_at: t + ChronoDuration::hours(1),
        ..snap_early.clone()
    };
    store.insert_snapshot(&snap_early).await.unwrap();
    store.insert_snapshot(&snap_later).await.unwrap();

    store.delete_snapshots_before("u1", t + ChronoDuration::minutes(30)).await.unwrap();

    let remaining = store.list_snapshots("u1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "s2");
}

/// Scenario 2: stats over trades, driven through a real Store.
#[tokio::test]
async fn scenario_2_stats_over_trades_matches_worked_example() {
    let (store, _dir) = temp_store();
    let registry = Arc::new(VenueRegistry::new());
    let vault = Arc::new(CredentialVault::new(store.clone(), "pass", 3, 60_000));
    let history = HistoryService::new(store.clone(), registry, vault);

    let trade = |side, size, price, fee| venue_core::models::Trade {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: "u1".into(),
        venue: Venue::Polymarket,
        venue_trade_id: None,
        market_id: "m1".into(),
        side,
        size,
        price,
        fee,
        realized_pnl: None,
        timestamp: Utc::now(),
    };
    store.insert_trade(&trade(Side::Buy, 100.0, 0.40, 0.10)).await.unwrap();
    store.insert_trade(&trade(Side::Sell, 100.0, 0.55, 0.10)).await.unwrap();

    let stats = history.get_stats("u1", Period::All).await.unwrap();
    assert_eq!(stats.total_trades, 2);
    assert!((stats.total_volume - 95.0).abs() < 1e-9);
    assert_eq!(stats.win_count, 1);
    assert_eq!(stats.loss_count, 0);
    assert!((stats.total_pnl - 14.80).abs() < 1e-6);
    assert!((stats.win_rate - 100.0).abs() < 1e-9);
    assert!(stats.profit_factor.is_infinite());
}

/// Scenario 3: concentration risk over a fixed position-value distribution.
#[tokio::test]
async fn scenario_3_concentration_risk_matches_worked_example() {
    let pos = |market: &str, value: f64| Position {
        id: format!("p-{market}"),
        user_id: "u1".into(),
        venue: Venue::Polymarket,
        market_id: market.into(),
        outcome_id: "YES".into(),
        side: Side::Buy,
        size: value,
        avg_entry_price: 1.0,
        current_price: 1.0,
        opened_at: Utc::now(),
        updated_at: Utc::now(),
        leverage: None,
        margin_mode: None,
        liquidation_price: None,
        notional: None,
    };
    let positions = vec![
        pos("m1", 60.0),
        pos("m2", 20.0),
        pos("m3", 10.0),
        pos("m4", 5.0),
        pos("m5", 5.0),
    ];
    let result = risk::concentration(&positions);
    assert!((result.hhi - 3750.0).abs() < 1e-6);
    assert!((result.largest_position_pct - 60.0).abs() < 1e-6);
    assert!((result.top3_pct - 90.0).abs() < 1e-6);
    assert_eq!(result.risk_level, risk::RiskLevel::Critical);
}

/// Scenario 4: hedge detection on a Polymarket YES/NO pair.
#[tokio::test]
async fn scenario_4_hedge_detection_matches_worked_example() {
    let pos = |outcome: &str, side: Side, value: f64| Position {
        id: format!("p-{outcome}"),
        user_id: "u1".into(),
        venue: Venue::Polymarket,
        market_id: "m1".into(),
        outcome_id: outcome.into(),
        side,
        size: value,
        avg_entry_price: 1.0,
        current_price: 1.0,
        opened_at: Utc::now(),
        updated_at: Utc::now(),
        leverage: None,
        margin_mode: None,
        liquidation_price: None,
        notional: None,
    };
    let positions = vec![pos("YES", Side::Buy, 100.0), pos("NO", Side::Sell, 40.0)];
    let pairs = risk::find_hedged_pairs(&positions);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].long.outcome_id, "YES");
    assert_eq!(pairs[0].short.outcome_id, "NO");
    assert!((pairs[0].hedge_ratio - 0.40).abs() < 1e-9);
}
