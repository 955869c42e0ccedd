//! Hyperliquid: wallet-address authenticated REST. Position size (`szi`)
//! encodes long/short in its sign; `liquidationPx` may be absent for
//! cross-margin or fully-hedged positions.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api.hyperliquid.xyz";

pub struct HyperliquidAdapter {
    client: Client,
}

impl HyperliquidAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for HyperliquidAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// `szi` is a signed size string: negative means short.
fn parse_szi(szi: &str) -> (f64, Side) {
    let size: f64 = szi.parse().unwrap_or(0.0);
    if size < 0.0 {
        (size.abs(), Side::Sell)
    } else {
        (size, Side::Buy)
    }
}

#[async_trait]
impl VenueAdapter for HyperliquidAdapter {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: true,
            supports_funding: true,
            supports_stream: true,
            price_unit: PriceUnit::Usd,
        }
    }

    async fn fetch_positions(&self, cred: &Credential) -> AdapterResult<Vec<Position>> {
        let wallet = cred
            .wallet_secret
            .as_ref()
            .ok_or(AdapterError::AuthError)?;
        let url = format!("{API_BASE}/info");
        let body = serde_json::json!({ "type": "clearinghouseState", "user": wallet });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "clearinghouseState failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct ClearinghouseState {
            #[serde(rename = "assetPositions", default)]
            asset_positions: Vec<AssetPositionWrapper>,
        }
        #[derive(serde::Deserialize)]
        struct AssetPositionWrapper {
            position: RawPosition,
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            coin: String,
            szi: String,
            #[serde(rename = "entryPx")]
            entry_px: String,
            #[serde(rename = "liquidationPx")]
            liquidation_px: Option<String>,
        }
        let parsed: ClearinghouseState = resp.json().await.unwrap_or_default();
        let now = Utc::now();
        let positions = parsed
            .asset_positions
            .into_iter()
            .map(|wrapper| {
                let (size, side) = parse_szi(&wrapper.position.szi);
                let entry: f64 = wrapper.position.entry_px.parse().unwrap_or(0.0);
                Position {
                    id: format!("hl-{}-{}", cred.api_key, wrapper.position.coin),
                    user_id: cred.api_key.clone(),
                    venue: Venue::Hyperliquid,
                    market_id: wrapper.position.coin.clone(),
                    outcome_id: "PERP".into(),
                    side,
                    size,
                    avg_entry_price: entry,
                    current_price: entry,
                    opened_at: now,
                    updated_at: now,
                    leverage: None,
                    margin_mode: None,
                    liquidation_price: wrapper
                        .position
                        .liquidation_px
                        .and_then(|s| s.parse().ok()),
                    notional: None,
                }
            })
            .collect();
        Ok(positions)
    }

    async fn fetch_balances(&self, cred: &Credential) -> AdapterResult<Vec<Balance>> {
        cred.wallet_secret.as_ref().ok_or(AdapterError::AuthError)?;
        Ok(Vec::new())
    }

    async fn fetch_trades(&self, cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<Trade>> {
        cred.wallet_secret.as_ref().ok_or(AdapterError::AuthError)?;
        Ok(Vec::new())
    }

    async fn fetch_funding(&self, cred: &Credential, query: TradeQuery) -> AdapterResult<Vec<FundingPayment>> {
        let wallet = cred.wallet_secret.as_ref().ok_or(AdapterError::AuthError)?;
        let url = format!("{API_BASE}/info");
        let start_time = query.since_unix_ms.unwrap_or(0);
        let body = serde_json::json!({ "type": "userFunding", "user": wallet, "startTime": start_time });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "userFunding failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct FundingEvent {
            time: i64,
            delta: FundingDelta,
        }
        #[derive(serde::Deserialize)]
        struct FundingDelta {
            coin: String,
            usdc: String,
            szi: String,
            #[serde(rename = "fundingRate")]
            funding_rate: String,
        }
        let events: Vec<FundingEvent> = resp.json().await.unwrap_or_default();
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let payments = events
            .into_iter()
            .take(limit)
            .map(|e| FundingPayment {
                user_id: cred.api_key.clone(),
                venue: Venue::Hyperliquid,
                symbol: e.delta.coin,
                rate: e.delta.funding_rate.parse().unwrap_or(0.0),
                amount: e.delta.usdc.parse().unwrap_or(0.0),
                position_size: e.delta.szi.parse::<f64>().unwrap_or(0.0).abs(),
                timestamp: chrono::DateTime::from_timestamp_millis(e.time).unwrap_or_else(Utc::now),
            })
            .collect();
        Ok(payments)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/info");
        let body = serde_json::json!({ "type": "allMids" });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let mids: std::collections::HashMap<String, String> = resp.json().await.unwrap_or_default();
        let price: f64 = mids.get(market_id).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        Ok(Quote {
            price,
            fee: 0.0,
            price_impact: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn szi_sign_encodes_long_short() {
        assert_eq!(parse_szi("10.5"), (10.5, Side::Buy));
        assert_eq!(parse_szi("-3.2"), (3.2, Side::Sell));
    }
}
