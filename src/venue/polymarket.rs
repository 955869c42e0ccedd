//! Polymarket: CLOB + Gamma REST, EIP-712-signed requests for private
//! endpoints. Prices arrive as cents-scaled decimal strings and are
//! normalized to a `[0,1]` probability before leaving the adapter.

use super::{
    normalize_cents_to_probability, AdapterResult, Capabilities, Credential, PriceUnit, Quote,
    TradeQuery, VenueAdapter,
};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;

const CLOB_API_BASE: &str = "https://clob.polymarket.com";
const DATA_API_BASE: &str = "https://data-api.polymarket.com";

/// CLOB L2 request signature: HMAC-SHA256 over
/// `timestamp + method + path + body`, keyed by the base64 API secret,
/// URL-safe base64 encoded. The secret is tried as URL-safe, then
/// URL-safe-no-pad, then standard base64, matching what different
/// Polymarket API-key issuance flows hand back.
fn sign_clob_request(secret: &str, method: &str, path: &str, body: &str, timestamp: i64) -> AdapterResult<String> {
    let message = format!("{timestamp}{method}{path}{body}");
    let secret_bytes = URL_SAFE
        .decode(secret)
        .or_else(|_| URL_SAFE_NO_PAD.decode(secret))
        .or_else(|_| BASE64.decode(secret))
        .map_err(|_| AdapterError::AuthError)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes).map_err(|_| AdapterError::AuthError)?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

pub struct PolymarketAdapter {
    client: Client,
}

impl PolymarketAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for PolymarketAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for PolymarketAdapter {
    fn venue(&self) -> Venue {
        Venue::Polymarket
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
        if cred.wallet_secret.is_none() {
            return Err(AdapterError::AuthError);
        }
        let path = format!("/positions?user={}", cred.api_key);
        let signature = sign_clob_request(&cred.api_secret, "GET", &path, "", chrono::Utc::now().timestamp())?;
        let url = format!("{DATA_API_BASE}{path}");
        let resp = self
            .client
            .get(&url)
            .header("POLY_API_KEY", &cred.api_key)
            .header("POLY_SIGNATURE", signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(1)));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "positions fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            #[serde(rename = "conditionId")]
            condition_id: String,
            outcome: String,
            size: String,
            #[serde(rename = "avgPrice")]
            avg_price: String,
            #[serde(rename = "curPrice")]
            cur_price: String,
        }
        let raw: Vec<RawPosition> = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let now = chrono::Utc::now();
        let positions = raw
            .into_iter()
            .filter_map(|p| {
                let size: f64 = p.size.parse().ok()?;
                if size == 0.0 {
                    return None;
                }
                Some(Position {
                    id: format!("poly-{}-{}", cred.api_key, p.condition_id),
                    user_id: cred.api_key.clone(),
                    venue: Venue::Polymarket,
                    market_id: p.condition_id,
                    outcome_id: p.outcome,
                    side: Side::Buy,
                    size,
                    avg_entry_price: normalize_cents_to_probability(
                        p.avg_price.parse::<f64>().unwrap_or(0.0) * 100.0,
                    ),
                    current_price: normalize_cents_to_probability(
                        p.cur_price.parse::<f64>().unwrap_or(0.0) * 100.0,
                    ),
                    opened_at: now,
                    updated_at: now,
                    leverage: None,
                    margin_mode: None,
                    liquidation_price: None,
                    notional: None,
                })
            })
            .collect();
        Ok(positions)
    }

    async fn fetch_balances(&self, _cred: &Credential) -> AdapterResult<Vec<Balance>> {
        Err(AdapterError::NotSupported)
    }

    async fn fetch_trades(&self, cred: &Credential, query: TradeQuery) -> AdapterResult<Vec<Trade>> {
        if cred.wallet_secret.is_none() {
            return Err(AdapterError::AuthError);
        }
        let path = "/trades";
        let signature = sign_clob_request(&cred.api_secret, "GET", path, "", chrono::Utc::now().timestamp())?;
        let url = format!("{DATA_API_BASE}{path}?user={}", cred.api_key);
        let resp = self
            .client
            .get(&url)
            .header("POLY_API_KEY", &cred.api_key)
            .header("POLY_SIGNATURE", signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(1)));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "trades fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct RawTrade {
            #[serde(rename = "conditionId")]
            condition_id: String,
            side: String,
            size: String,
            price: String,
            #[serde(rename = "transactionHash")]
            transaction_hash: Option<String>,
            timestamp: i64,
        }
        let raw: Vec<RawTrade> = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let trades = raw
            .into_iter()
            .filter(|t| {
                query
                    .since_unix_ms
                    .map(|since| t.timestamp * 1000 >= since)
                    .unwrap_or(true)
            })
            .take(limit)
            .map(|t| Trade {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: cred.api_key.clone(),
                venue: Venue::Polymarket,
                venue_trade_id: t.transaction_hash,
                market_id: t.condition_id,
                side: if t.side.eq_ignore_ascii_case("buy") { Side::Buy } else { Side::Sell },
                size: t.size.parse().unwrap_or(0.0),
                price: normalize_cents_to_probability(t.price.parse::<f64>().unwrap_or(0.0) * 100.0),
                fee: 0.0,
                realized_pnl: None,
                timestamp: chrono::DateTime::from_timestamp(t.timestamp, 0).unwrap_or_else(chrono::Utc::now),
            })
            .collect();
        Ok(trades)
    }

    async fn fetch_funding(&self, _cred: &Credential, _query: TradeQuery) -> AdapterResult<Vec<FundingPayment>> {
        Err(AdapterError::NotSupported)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{CLOB_API_BASE}/price?token_id={market_id}");
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
        struct PriceResp {
            price: String,
        }
        let parsed: PriceResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let cents: f64 = parsed.price.parse().unwrap_or(0.0) * 100.0;
        Ok(Quote {
            price: normalize_cents_to_probability(cents),
            fee: 0.0,
            price_impact: 0.0,
        })
    }

    async fn search_markets(&self, term: &str) -> AdapterResult<Vec<super::MarketSearchResult>> {
        let url = format!("https://gamma-api.polymarket.com/markets?search={term}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "search failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct MarketSummary {
            #[serde(rename = "conditionId")]
            condition_id: String,
            question: String,
        }
        let markets: Vec<MarketSummary> = resp.json().await.unwrap_or_default();
        Ok(markets
            .into_iter()
            .map(|m| super::MarketSearchResult {
                market_id: m.condition_id,
                question: m.question,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_unit_is_probability() {
        let adapter = PolymarketAdapter::new();
        assert_eq!(adapter.capabilities().price_unit, PriceUnit::Probability);
    }

    #[test]
    fn clob_signature_is_deterministic_and_key_sensitive() {
        let secret = URL_SAFE.encode(b"super-secret-key");
        let a = sign_clob_request(&secret, "GET", "/positions", "", 1_700_000_000).unwrap();
        let b = sign_clob_request(&secret, "GET", "/positions", "", 1_700_000_000).unwrap();
        assert_eq!(a, b);
        let other = sign_clob_request(&secret, "GET", "/trades", "", 1_700_000_000).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn clob_signature_rejects_invalid_base64_secret() {
        assert!(matches!(
            sign_clob_request("not base64 at all!!", "GET", "/positions", "", 1_700_000_000),
            Err(AdapterError::AuthError)
        ));
    }
}
