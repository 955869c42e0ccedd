//! Raydium (Solana AMM): pool-reserve quoting via the public API.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api-v3.raydium.io";

pub struct RaydiumAdapter {
    client: Client,
}

impl RaydiumAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for RaydiumAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for RaydiumAdapter {
    fn venue(&self) -> Venue {
        Venue::Raydium
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

    /// `market_id` is a Raydium pool id.
    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/pools/info/ids?ids={market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "pool fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct PoolsResp {
            #[serde(default)]
            data: Vec<PoolData>,
        }
        #[derive(serde::Deserialize)]
        struct PoolData {
            price: f64,
        }
        let parsed: PoolsResp = resp.json().await.unwrap_or_default();
        Ok(Quote {
            price: parsed.data.first().map(|p| p.price).unwrap_or(0.0),
            fee: 0.0025,
            price_impact: 0.0,
        })
    }
}
