//! Condition evaluator over live price ticks and portfolio snapshots,
//! dispatching through `MessageTransport`/`AlertSink` on trigger. Alerts
//! evaluated against missing prices are skipped, not errored.

use crate::aggregator::PortfolioSummary;
use crate::error::AppResult;
use crate::hooks::AlertSink;
use crate::models::{Alert, AlertKind, Venue};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

pub struct Alerts {
    store: Store,
    sink: Arc<dyn AlertSink>,
}

impl Alerts {
    pub fn new(store: Store, sink: Arc<dyn AlertSink>) -> Self {
        Self { store, sink }
    }

    /// Evaluates every enabled alert of kind `PriceAbove`/`PriceBelow` for
    /// `user_id` against one venue/market price tick.
    pub async fn evaluate_price_tick(&self, user_id: &str, venue: Venue, market_id: &str, price: f64) -> AppResult<()> {
        let alerts = self.store.list_alerts(user_id).await?;
        for mut alert in alerts {
            let applies = match alert.condition.venue {
                Some(v) => v == venue,
                None => true,
            };
            let matches_market = alert
                .condition
                .market_id
                .as_deref()
                .map(|m| m == market_id)
                .unwrap_or(true);
            if !applies || !matches_market {
                continue;
            }

            let triggered = match alert.kind {
                AlertKind::PriceAbove => price > alert.condition.threshold,
                AlertKind::PriceBelow => price < alert.condition.threshold,
                _ => continue,
            };

            if triggered {
                self.fire(&mut alert, format!("{market_id} price {price:.4} crossed {}", alert.condition.threshold))
                    .await?;
            }
        }
        Ok(())
    }

    /// Evaluates portfolio-level alerts (`PortfolioPnlAbove`,
    /// `PortfolioPnlBelow`, `ConcentrationAbove`) against a fresh summary.
    pub async fn evaluate_portfolio(&self, user_id: &str, summary: &PortfolioSummary, concentration_hhi: f64) -> AppResult<()> {
        let alerts = self.store.list_alerts(user_id).await?;
        for mut alert in alerts {
            let triggered = match alert.kind {
                AlertKind::PortfolioPnlAbove => summary.total_pnl_pct > alert.condition.threshold,
                AlertKind::PortfolioPnlBelow => summary.total_pnl_pct < alert.condition.threshold,
                AlertKind::ConcentrationAbove => concentration_hhi > alert.condition.threshold,
                _ => continue,
            };
            if triggered {
                self.fire(
                    &mut alert,
                    format!("portfolio metric crossed threshold {}", alert.condition.threshold),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn fire(&self, alert: &mut Alert, message: String) -> AppResult<()> {
        alert.triggered = true;
        alert.trigger_count += 1;
        alert.last_triggered_at = Some(Utc::now());
        self.store.upsert_alert(alert).await?;
        if let Err(e) = self.sink.on_alert_triggered(alert, &message).await {
            warn!(alert_id = %alert.id, error = %e, "alert dispatch failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NullTransport;
    use crate::models::AlertCondition;

    async fn temp_alerts() -> (Alerts, Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("alerts.db")).unwrap();
        let alerts = Alerts::new(store.clone(), Arc::new(NullTransport));
        (alerts, store, dir)
    }

    #[tokio::test]
    async fn price_above_threshold_triggers_and_increments_count() {
        let (alerts, store, _dir) = temp_alerts().await;
        let alert = Alert {
            id: "a1".into(),
            user_id: "u1".into(),
            kind: AlertKind::PriceAbove,
            condition: AlertCondition { threshold: 0.7, venue: Some(Venue::Polymarket), market_id: Some("m1".into()) },
            enabled: true,
            triggered: false,
            trigger_count: 0,
            channel: "telegram".into(),
            chat_id: "c1".into(),
            created_at: Utc::now(),
            last_triggered_at: None,
        };
        store.upsert_alert(&alert).await.unwrap();
        alerts.evaluate_price_tick("u1", Venue::Polymarket, "m1", 0.75).await.unwrap();
        let reloaded = store.list_alerts("u1").await.unwrap();
        assert_eq!(reloaded[0].trigger_count, 1);
        assert!(reloaded[0].triggered);
    }

    #[tokio::test]
    async fn price_below_threshold_does_not_trigger_price_above() {
        let (alerts, store, _dir) = temp_alerts().await;
        let alert = Alert {
            id: "a1".into(),
            user_id: "u1".into(),
            kind: AlertKind::PriceAbove,
            condition: AlertCondition { threshold: 0.9, venue: None, market_id: None },
            enabled: true,
            triggered: false,
            trigger_count: 0,
            channel: "telegram".into(),
            chat_id: "c1".into(),
            created_at: Utc::now(),
            last_triggered_at: None,
        };
        store.upsert_alert(&alert).await.unwrap();
        alerts.evaluate_price_tick("u1", Venue::Polymarket, "m1", 0.5).await.unwrap();
        let reloaded = store.list_alerts("u1").await.unwrap();
        assert_eq!(reloaded[0].trigger_count, 0);
    }
}
