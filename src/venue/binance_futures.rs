//! Binance USDT-M Futures: HMAC-SHA256-signed REST, with the same
//! rate-limit/backoff handling as the other CEX adapters.

use super::{AdapterResult, Capabilities, Credential, HmacSigner, PriceUnit, Quote, Signer, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://fapi.binance.com";

pub struct BinanceFuturesAdapter {
    client: Client,
}

impl BinanceFuturesAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }

    fn signed_query(cred: &Credential, params: &str) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let query = format!("{params}&timestamp={timestamp}");
        let signer = HmacSigner::new(cred.api_secret.clone());
        let signature = signer.sign(query.as_bytes());
        format!("{query}&signature={signature}")
    }
}

impl Default for BinanceFuturesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for BinanceFuturesAdapter {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
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
        if cred.api_key.is_empty() || cred.api_secret.is_empty() {
            return Err(AdapterError::AuthError);
        }
        let query = Self::signed_query(cred, "");
        let url = format!("{API_BASE}/fapi/v2/positionRisk?{query}");
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &cred.api_key)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(60)));
        }
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdapterError::AuthError);
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "positionRisk failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            symbol: String,
            #[serde(rename = "positionAmt")]
            position_amt: String,
            #[serde(rename = "entryPrice")]
            entry_price: String,
            #[serde(rename = "markPrice")]
            mark_price: String,
            leverage: String,
            #[serde(rename = "liquidationPrice")]
            liquidation_price: String,
        }
        let raw: Vec<RawPosition> = resp.json().await.unwrap_or_default();
        let now = Utc::now();
        let positions = raw
            .into_iter()
            .filter_map(|p| {
                let amt: f64 = p.position_amt.parse().ok()?;
                if amt == 0.0 {
                    return None;
                }
                let side = if amt > 0.0 { Side::Buy } else { Side::Sell };
                Some(Position {
                    id: format!("bnf-{}-{}", cred.api_key, p.symbol),
                    user_id: cred.api_key.clone(),
                    venue: Venue::BinanceFutures,
                    market_id: p.symbol,
                    outcome_id: "PERP".into(),
                    side,
                    size: amt.abs(),
                    avg_entry_price: p.entry_price.parse().unwrap_or(0.0),
                    current_price: p.mark_price.parse().unwrap_or(0.0),
                    opened_at: now,
                    updated_at: now,
                    leverage: p.leverage.parse().ok(),
                    margin_mode: None,
                    liquidation_price: p.liquidation_price.parse().ok(),
                    notional: None,
                })
            })
            .collect();
        Ok(positions)
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

    async fn fetch_funding(&self, cred: &Credential, query: TradeQuery) -> AdapterResult<Vec<FundingPayment>> {
        if cred.api_key.is_empty() || cred.api_secret.is_empty() {
            return Err(AdapterError::AuthError);
        }
        let mut params = "incomeType=FUNDING_FEE".to_string();
        if let Some(limit) = query.limit {
            params.push_str(&format!("&limit={limit}"));
        }
        if let Some(since) = query.since_unix_ms {
            params.push_str(&format!("&startTime={since}"));
        }
        let signed = Self::signed_query(cred, &params);
        let url = format!("{API_BASE}/fapi/v1/income?{signed}");
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &cred.api_key)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(60)));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "income fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct RawIncome {
            symbol: String,
            income: String,
            time: i64,
        }
        let raw: Vec<RawIncome> = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        // The income history reports realized funding cash flow but not the
        // funding rate or position size at settlement; those need a second
        // join against `/fapi/v1/fundingRate`, left as a follow-up.
        let payments = raw
            .into_iter()
            .map(|r| FundingPayment {
                user_id: cred.api_key.clone(),
                venue: Venue::BinanceFutures,
                symbol: r.symbol,
                rate: 0.0,
                amount: r.income.parse().unwrap_or(0.0),
                position_size: 0.0,
                timestamp: chrono::DateTime::from_timestamp_millis(r.time).unwrap_or_else(Utc::now),
            })
            .collect();
        Ok(payments)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/fapi/v1/ticker/price?symbol={market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "ticker fetch failed".into(),
            });
        }
        #[derive(serde::Deserialize)]
        struct TickerResp {
            price: String,
        }
        let parsed: TickerResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        Ok(Quote {
            price: parsed.price.parse().unwrap_or(0.0),
            fee: 0.0004,
            price_impact: 0.0,
        })
    }
}
