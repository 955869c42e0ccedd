//! Jupiter (Solana DEX aggregator): spot swap quoting only, via the public
//! quote API. No positions/balances/trades: Jupiter routes swaps, it does
//! not hold perpetual or prediction-market state.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://quote-api.jup.ag/v6";

pub struct JupiterAdapter {
    client: Client,
}

impl JupiterAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for JupiterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for JupiterAdapter {
    fn venue(&self) -> Venue {
        Venue::Jupiter
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

    /// `market_id` is `"<inputMint>:<outputMint>"`; `size` is the input
    /// amount in the input mint's smallest unit.
    async fn quote(&self, market_id: &str, _side: Side, size: f64) -> AdapterResult<Quote> {
        let (input_mint, output_mint) = market_id
            .split_once(':')
            .ok_or_else(|| AdapterError::VenueError {
                code: "bad_market_id".into(),
                msg: "expected \"inputMint:outputMint\"".into(),
            })?;
        let amount = size as u64;
        let url = format!(
            "{API_BASE}/quote?inputMint={input_mint}&outputMint={output_mint}&amount={amount}&slippageBps=50"
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "quote failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct QuoteResp {
            #[serde(rename = "inAmount")]
            in_amount: String,
            #[serde(rename = "outAmount")]
            out_amount: String,
            #[serde(rename = "priceImpactPct")]
            price_impact_pct: String,
        }
        let parsed: QuoteResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let in_amt: f64 = parsed.in_amount.parse().unwrap_or(1.0);
        let out_amt: f64 = parsed.out_amount.parse().unwrap_or(0.0);
        let price = if in_amt > 0.0 { out_amt / in_amt } else { 0.0 };
        Ok(Quote {
            price,
            fee: 0.0,
            price_impact: parsed.price_impact_pct.parse().unwrap_or(0.0),
        })
    }
}
