//! pump.fun (Solana bonding-curve launchpad): quoting only, via the public
//! frontend API. Tokens graduate off the curve into Raydium pools, so this
//! adapter has no notion of a held position, only a spot price.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://frontend-api.pump.fun";

pub struct PumpFunAdapter {
    client: Client,
}

impl PumpFunAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for PumpFunAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for PumpFunAdapter {
    fn venue(&self) -> Venue {
        Venue::PumpFun
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

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/coins/{market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "coin fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct CoinResp {
            #[serde(rename = "usd_market_cap")]
            usd_market_cap: Option<f64>,
            #[serde(rename = "total_supply")]
            total_supply: Option<f64>,
        }
        let parsed: CoinResp = resp.json().await.unwrap_or_default();
        let price = match (parsed.usd_market_cap, parsed.total_supply) {
            (Some(cap), Some(supply)) if supply > 0.0 => cap / supply,
            _ => 0.0,
        };
        Ok(Quote {
            price,
            fee: 0.01,
            price_impact: 0.0,
        })
    }
}
