//! Bybit USDT Perpetuals: HMAC-SHA256-signed REST, same signing shape as
//! Binance but with Bybit's header-based (not query-string) signature.

use super::{AdapterResult, Capabilities, Credential, HmacSigner, PriceUnit, Quote, Signer, TradeQuery, VenueAdapter};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api.bybit.com";

pub struct BybitAdapter {
    client: Client,
}

impl BybitAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }

    fn signed_headers(cred: &Credential, params: &str) -> (String, String) {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let payload = format!("{timestamp}{}{params}", cred.api_key);
        let signer = HmacSigner::new(cred.api_secret.clone());
        (timestamp, signer.sign(payload.as_bytes()))
    }
}

impl Default for BybitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for BybitAdapter {
    fn venue(&self) -> Venue {
        Venue::Bybit
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
        let (timestamp, signature) = Self::signed_headers(cred, "category=linear");
        let url = format!("{API_BASE}/v5/position/list?category=linear");
        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &cred.api_key)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-SIGN", &signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(30)));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "position/list failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct PositionsResp {
            result: PositionsResult,
        }
        #[derive(serde::Deserialize, Default)]
        struct PositionsResult {
            #[serde(default)]
            list: Vec<RawPosition>,
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            symbol: String,
            side: String,
            size: String,
            #[serde(rename = "avgPrice")]
            avg_price: String,
            #[serde(rename = "markPrice")]
            mark_price: String,
            leverage: String,
            #[serde(rename = "liqPrice")]
            liq_price: String,
        }
        let parsed: PositionsResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        let now = Utc::now();
        let positions = parsed
            .result
            .list
            .into_iter()
            .filter_map(|p| {
                let size: f64 = p.size.parse().ok()?;
                if size == 0.0 {
                    return None;
                }
                let side = if p.side.eq_ignore_ascii_case("buy") { Side::Buy } else { Side::Sell };
                Some(Position {
                    id: format!("byb-{}-{}", cred.api_key, p.symbol),
                    user_id: cred.api_key.clone(),
                    venue: Venue::Bybit,
                    market_id: p.symbol,
                    outcome_id: "PERP".into(),
                    side,
                    size,
                    avg_entry_price: p.avg_price.parse().unwrap_or(0.0),
                    current_price: p.mark_price.parse().unwrap_or(0.0),
                    opened_at: now,
                    updated_at: now,
                    leverage: p.leverage.parse().ok(),
                    margin_mode: None,
                    liquidation_price: p.liq_price.parse().ok(),
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
        let mut params = "category=linear&type=SETTLEMENT".to_string();
        if let Some(limit) = query.limit {
            params.push_str(&format!("&limit={limit}"));
        }
        let (timestamp, signature) = Self::signed_headers(cred, &params);
        let url = format!("{API_BASE}/v5/account/transaction-log?{params}");
        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &cred.api_key)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-SIGN", &signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited(Duration::from_secs(30)));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "transaction-log failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct TxLogResp {
            result: TxLogResult,
        }
        #[derive(serde::Deserialize, Default)]
        struct TxLogResult {
            #[serde(default)]
            list: Vec<RawFunding>,
        }
        #[derive(serde::Deserialize)]
        struct RawFunding {
            symbol: String,
            funding: String,
            qty: String,
            #[serde(rename = "transactionTime")]
            transaction_time: String,
        }
        let parsed: TxLogResp = resp
            .json()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        // The settlement log reports the realized funding cash flow and
        // position size but not the funding rate itself; that needs a
        // second join against the market's funding-rate history.
        let payments = parsed
            .result
            .list
            .into_iter()
            .filter_map(|r| {
                let amount: f64 = r.funding.parse().ok()?;
                let ts: i64 = r.transaction_time.parse().ok()?;
                Some(FundingPayment {
                    user_id: cred.api_key.clone(),
                    venue: Venue::Bybit,
                    symbol: r.symbol,
                    rate: 0.0,
                    amount,
                    position_size: r.qty.parse().unwrap_or(0.0),
                    timestamp: chrono::DateTime::from_timestamp_millis(ts).unwrap_or_else(Utc::now),
                })
            })
            .collect();
        Ok(payments)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/v5/market/tickers?category=linear&symbol={market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        #[derive(serde::Deserialize, Default)]
        struct TickersResp {
            result: TickersResult,
        }
        #[derive(serde::Deserialize, Default)]
        struct TickersResult {
            #[serde(default)]
            list: Vec<Ticker>,
        }
        #[derive(serde::Deserialize)]
        struct Ticker {
            #[serde(rename = "lastPrice")]
            last_price: String,
        }
        let parsed: TickersResp = resp.json().await.unwrap_or_default();
        let price = parsed
            .result
            .list
            .first()
            .and_then(|t| t.last_price.parse().ok())
            .unwrap_or(0.0);
        Ok(Quote {
            price,
            fee: 0.0006,
            price_impact: 0.0,
        })
    }
}
