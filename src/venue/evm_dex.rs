//! Generic EVM DEX adapter (Uniswap-v3-style pools on any EVM chain):
//! quoting via a plain JSON-RPC `eth_call` against the pool's `slot0()`,
//! rather than `alloy`/`ethers`, since this crate only reads state and
//! never constructs an on-chain transaction.

use super::{AdapterResult, Capabilities, Credential, PriceUnit, Quote, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// `slot0()` selector: first 4 bytes of keccak256("slot0()").
const SLOT0_SELECTOR: &str = "0x3850c7bd";

pub struct EvmDexAdapter {
    client: Client,
    rpc_url: String,
}

impl EvmDexAdapter {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            rpc_url: rpc_url.into(),
        }
    }

    /// Decodes `sqrtPriceX96` from a packed `slot0()` return and converts
    /// it to a plain price ratio. `sqrtPriceX96` is a uint160, wider than
    /// `u128`, hence the big-integer parse.
    fn sqrt_price_x96_to_price(hex_data: &str) -> f64 {
        let data = hex_data.trim_start_matches("0x");
        if data.len() < 64 {
            return 0.0;
        }
        let sqrt_price_x96 = match num_bigint::BigUint::parse_bytes(data[0..64].as_bytes(), 16) {
            Some(v) => v,
            None => return 0.0,
        };
        let sqrt_price = sqrt_price_x96.to_string().parse::<f64>().unwrap_or(0.0) / 2f64.powi(96);
        sqrt_price * sqrt_price
    }
}

#[async_trait]
impl VenueAdapter for EvmDexAdapter {
    fn venue(&self) -> Venue {
        Venue::EvmDex
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

    /// `market_id` is the pool contract address.
    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": market_id, "data": SLOT0_SELECTOR }, "latest"],
        });
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "eth_call failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct RpcResp {
            result: Option<String>,
            error: Option<RpcError>,
        }
        #[derive(serde::Deserialize)]
        struct RpcError {
            message: String,
        }
        let parsed: RpcResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(AdapterError::VenueError {
                code: "rpc_error".into(),
                msg: err.message,
            });
        }
        let price = parsed
            .result
            .map(|hex| Self::sqrt_price_x96_to_price(&hex))
            .unwrap_or(0.0);
        Ok(Quote {
            price,
            fee: 0.003,
            price_impact: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_price_x96_decodes_to_positive_price() {
        let sqrt_price_x96: u128 = 1 << 96;
        let hex = format!("{:064x}", sqrt_price_x96);
        let price = EvmDexAdapter::sqrt_price_x96_to_price(&hex);
        assert!((price - 1.0).abs() < 1e-6);
    }
}
