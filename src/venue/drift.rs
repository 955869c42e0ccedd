//! Drift Protocol (Solana perpetuals): read-only via Drift's public Data
//! API rather than `solana-sdk`, since this crate only reads state, never
//! submits transactions (Non-goal: on-chain transaction construction).

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://data.api.drift.trade";

pub struct DriftAdapter {
    client: Client,
}

impl DriftAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for DriftAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for DriftAdapter {
    fn venue(&self) -> Venue {
        Venue::Drift
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: true,
            supports_funding: true,
            supports_stream: false,
            price_unit: PriceUnit::Usd,
        }
    }

    async fn fetch_positions(&self, cred: &Credential) -> AdapterResult<Vec<Position>> {
        let wallet = cred.wallet_secret.as_ref().ok_or(AdapterError::AuthError)?;
        let url = format!("{API_BASE}/user/{wallet}/perpPositions");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "perpPositions failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct PositionsResp {
            #[serde(default)]
            positions: Vec<RawPosition>,
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            #[serde(rename = "marketIndex")]
            market_index: u16,
            #[serde(rename = "baseAssetAmount")]
            base_asset_amount: f64,
            #[serde(rename = "entryPrice")]
            entry_price: f64,
            #[serde(rename = "liquidationPrice")]
            liquidation_price: Option<f64>,
        }
        let parsed: PositionsResp = resp.json().await.unwrap_or_default();
        let now = Utc::now();
        let positions = parsed
            .positions
            .into_iter()
            .filter(|p| p.base_asset_amount != 0.0)
            .map(|p| {
                let side = if p.base_asset_amount > 0.0 { Side::Buy } else { Side::Sell };
                Position {
                    id: format!("drift-{}-{}", wallet, p.market_index),
                    user_id: wallet.clone(),
                    venue: Venue::Drift,
                    market_id: p.market_index.to_string(),
                    outcome_id: "PERP".into(),
                    side,
                    size: p.base_asset_amount.abs(),
                    avg_entry_price: p.entry_price,
                    current_price: p.entry_price,
                    opened_at: now,
                    updated_at: now,
                    leverage: None,
                    margin_mode: None,
                    liquidation_price: p.liquidation_price,
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
        let url = format!("{API_BASE}/user/{wallet}/fundingPayments");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "fundingPayments failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct FundingResp {
            #[serde(default)]
            records: Vec<RawFunding>,
        }
        #[derive(serde::Deserialize)]
        struct RawFunding {
            #[serde(rename = "marketIndex")]
            market_index: u16,
            #[serde(rename = "fundingRate")]
            funding_rate: f64,
            amount: f64,
            #[serde(rename = "baseAssetAmount")]
            base_asset_amount: f64,
            ts: i64,
        }
        let parsed: FundingResp = resp.json().await.unwrap_or_default();
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let payments = parsed
            .records
            .into_iter()
            .take(limit)
            .map(|r| FundingPayment {
                user_id: wallet.clone(),
                venue: Venue::Drift,
                symbol: r.market_index.to_string(),
                rate: r.funding_rate,
                amount: r.amount,
                position_size: r.base_asset_amount.abs(),
                timestamp: chrono::DateTime::from_timestamp(r.ts, 0).unwrap_or_else(Utc::now),
            })
            .collect();
        Ok(payments)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/markets/{market_id}/orderbook");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        #[derive(serde::Deserialize, Default)]
        struct OrderbookResp {
            #[serde(rename = "oraclePrice")]
            oracle_price: Option<f64>,
        }
        let parsed: OrderbookResp = resp.json().await.unwrap_or_default();
        Ok(Quote {
            price: parsed.oracle_price.unwrap_or(0.0),
            fee: 0.001,
            price_impact: 0.0,
        })
    }
}
