//! Manifold Markets: play-money prediction market with a fully open REST
//! API, no signing required beyond a bearer API key.

use super::{
    normalize_cents_to_probability, AdapterResult, Capabilities, Credential, PriceUnit, Quote,
    TradeQuery, VenueAdapter,
};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api.manifold.markets/v0";

pub struct ManifoldAdapter {
    client: Client,
}

impl ManifoldAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for ManifoldAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for ManifoldAdapter {
    fn venue(&self) -> Venue {
        Venue::Manifold
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_futures: false,
            supports_funding: false,
            supports_stream: false,
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
        let url = format!("{API_BASE}/me");
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Key {}", cred.api_key))
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdapterError::AuthError);
        }
        #[derive(serde::Deserialize, Default)]
        struct MeResp {
            balance: Option<f64>,
        }
        let parsed: MeResp = resp.json().await.unwrap_or_default();
        Ok(vec![Balance {
            venue: Venue::Manifold,
            available: parsed.balance.unwrap_or(0.0),
            locked: 0.0,
            total: parsed.balance.unwrap_or(0.0),
        }])
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
        let url = format!("{API_BASE}/market/{market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "market fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct MarketResp {
            probability: Option<f64>,
        }
        let parsed: MarketResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let prob = parsed.probability.unwrap_or(0.0);
        Ok(Quote {
            price: normalize_cents_to_probability(prob * 100.0),
            fee: 0.0,
            price_impact: 0.0,
        })
    }

    async fn search_markets(&self, term: &str) -> AdapterResult<Vec<super::MarketSearchResult>> {
        let url = format!("{API_BASE}/search-markets?term={term}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        #[derive(serde::Deserialize)]
        struct MarketSummary {
            id: String,
            question: String,
        }
        let parsed: Vec<MarketSummary> = resp.json().await.unwrap_or_default();
        Ok(parsed
            .into_iter()
            .map(|m| super::MarketSearchResult {
                market_id: m.id,
                question: m.question,
            })
            .collect())
    }
}
