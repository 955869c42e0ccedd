//! Seams to the external collaborators this crate treats as out of scope:
//! chat/bot transports, the pairing flow, and the LLM chat agent. The core
//! only calls these traits; it never depends on their implementations.

use crate::models::{Alert, ArbOpportunity};
use async_trait::async_trait;

/// Delivers outbound alert/notification strings given `(user_id, channel,
/// chat_id)`. Implemented by whatever bot frontend is wired in; this crate
/// never constructs a Telegram/Discord/Slack client itself.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, user_id: &str, channel: &str, chat_id: &str, body: &str) -> anyhow::Result<()>;
}

/// Exchanges a short-lived pairing code for a `(channel, external_user_id)
/// -> user_id` binding. The core only ever consumes the resolved `user_id`.
#[async_trait]
pub trait PairingService: Send + Sync {
    async fn resolve(&self, channel: &str, external_user_id: &str) -> anyhow::Result<Option<String>>;
}

/// Calls core getters to answer user queries; the core has no notion of
/// what's on the other end (LLM, rules engine, human).
#[async_trait]
pub trait ChatAgent: Send + Sync {
    async fn handle_query(&self, user_id: &str, text: &str) -> anyhow::Result<String>;
}

/// Receives `opportunity` emissions from the ArbitrageEngine. Emissions
/// happen synchronously within the poll tick; implementations must not
/// block.
pub trait OpportunitySubscriber: Send + Sync {
    fn on_opportunity(&self, opportunity: &ArbOpportunity);
}

/// Receives alert firings from the Alerts evaluator.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn on_alert_triggered(&self, alert: &Alert, message: &str) -> anyhow::Result<()>;
}

/// Test double that records nothing and always succeeds; used to exercise
/// engines without a real transport wired in.
#[derive(Default)]
pub struct NullTransport;

#[async_trait]
impl MessageTransport for NullTransport {
    async fn send(&self, _user_id: &str, _channel: &str, _chat_id: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for NullTransport {
    async fn on_alert_triggered(&self, _alert: &Alert, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

impl OpportunitySubscriber for NullTransport {
    fn on_opportunity(&self, _opportunity: &ArbOpportunity) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCondition, AlertKind};
    use chrono::Utc;

    #[tokio::test]
    async fn null_transport_accepts_any_send() {
        let transport = NullTransport;
        let result = transport.send("u1", "telegram", "chat1", "hello").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn null_transport_accepts_any_alert() {
        let sink = NullTransport;
        let alert = Alert {
            id: "a1".into(),
            user_id: "u1".into(),
            kind: AlertKind::PriceAbove,
            condition: AlertCondition { threshold: 0.7, venue: None, market_id: None },
            enabled: true,
            triggered: false,
            trigger_count: 0,
            channel: "telegram".into(),
            chat_id: "chat1".into(),
            created_at: Utc::now(),
            last_triggered_at: None,
        };
        assert!(sink.on_alert_triggered(&alert, "fired").await.is_ok());
    }
}
