//! Orca (Solana concentrated-liquidity AMM): Whirlpool quoting via the
//! public API.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api.orca.so";

pub struct OrcaAdapter {
    client: Client,
}

impl OrcaAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for OrcaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for OrcaAdapter {
    fn venue(&self) -> Venue {
        Venue::Orca
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: false,
            supports_funding: false,
            supports_stream: false,
            price_unit: PriceUnit::Usd,
        }
    }

    async fn fetch_positions(&self, _cred: &Credential) -> AdapterResult<Vec<Position>> {
        Err(AdapterError::NotSupported)
    }

    async fn fetch_balances(&self, _cred: &Credential) -> AdapterResult<Vec<Balance>> {
        Err(AdapterError::NotSupported)
    }

    async fn fetch_trades(&self, _cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<Trade>> {
        Err(AdapterError::NotSupported)
    }

    async fn fetch_funding(&self, _cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<FundingPayment>> {
        Err(AdapterError::NotSupported)
    }

    /// `market_id` is a Whirlpool address.
    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/v1/whirlpool/{market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "whirlpool fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct WhirlpoolResp {
            price: Option<f64>,
        }
        let parsed: WhirlpoolResp = resp.json().await.unwrap_or_default();
        Ok(Quote {
            price: parsed.price.unwrap_or(0.0),
            fee: 0.003,
            price_impact: 0.0,
        })
    }
}
