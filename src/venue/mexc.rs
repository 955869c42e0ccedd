//! MEXC Futures: HMAC-signed REST. MEXC encodes open/close x long/short as a
//! single integer; this adapter normalizes it via `normalize_mexc_side`.

use super::{
    normalize_mexc_side, AdapterResult, Capabilities, Credential, HmacSigner, MexcDirection,
    PriceUnit, Quote, Signer, Side as CoreSide, TradeQuery, VenueAdapter,
};
use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Side, Trade, Venue};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://contract.mexc.com";

pub struct MexcAdapter {
    client: Client,
}

impl MexcAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }

    fn signature(cred: &Credential, params: &str) -> (i64, String) {
        let timestamp = Utc::now().timestamp_millis();
        let payload = format!("{}{timestamp}{params}", cred.api_key);
        let signer = HmacSigner::new(cred.api_secret.clone());
        (timestamp, signer.sign(payload.as_bytes()))
    }
}

impl Default for MexcAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for MexcAdapter {
    fn venue(&self) -> Venue {
        Venue::Mexc
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
        let (timestamp, signature) = Self::signature(cred, "");
        let url = format!("{API_BASE}/api/v1/private/position/open_positions");
        let resp = self
            .client
            .get(&url)
            .header("ApiKey", &cred.api_key)
            .header("Request-Time", timestamp.to_string())
            .header("Signature", &signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "open_positions failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct OpenPositionsResp {
            #[serde(default)]
            data: Vec<RawPosition>,
        }
        #[derive(serde::Deserialize)]
        struct RawPosition {
            symbol: String,
            #[serde(rename = "positionType")]
            position_type: u8,
            #[serde(rename = "holdVol")]
            hold_vol: f64,
            #[serde(rename = "openAvgPrice")]
            open_avg_price: f64,
            #[serde(rename = "liquidatePrice")]
            liquidate_price: Option<f64>,
        }
        let parsed: OpenPositionsResp = resp.json().await.unwrap_or_default();
        let now = Utc::now();
        let positions = parsed
            .data
            .into_iter()
            .filter_map(|p| {
                let (direction, is_open) = normalize_mexc_side(p.position_type)?;
                if !is_open {
                    return None;
                }
                let side = match direction {
                    MexcDirection::Long => CoreSide::Buy,
                    MexcDirection::Short => CoreSide::Sell,
                };
                Some(Position {
                    id: format!("mexc-{}-{}", cred.api_key, p.symbol),
                    user_id: cred.api_key.clone(),
                    venue: Venue::Mexc,
                    market_id: p.symbol,
                    outcome_id: "PERP".into(),
                    side,
                    size: p.hold_vol,
                    avg_entry_price: p.open_avg_price,
                    current_price: p.open_avg_price,
                    opened_at: now,
                    updated_at: now,
                    leverage: None,
                    margin_mode: None,
                    liquidation_price: p.liquidate_price,
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
        let (timestamp, signature) = Self::signature(cred, "");
        let url = format!("{API_BASE}/api/v1/private/position/funding_records");
        let resp = self
            .client
            .get(&url)
            .header("ApiKey", &cred.api_key)
            .header("Request-Time", timestamp.to_string())
            .header("Signature", &signature)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::VenueError {
                code: resp.status().to_string(),
                msg: "funding_records failed".into(),
            });
        }
        #[derive(serde::Deserialize, Default)]
        struct FundingResp {
            #[serde(default)]
            data: Vec<RawFunding>,
        }
        #[derive(serde::Deserialize)]
        struct RawFunding {
            symbol: String,
            #[serde(rename = "positionType")]
            position_type: u8,
            amount: f64,
            rate: f64,
            #[serde(rename = "holdVol")]
            hold_vol: f64,
            #[serde(rename = "settleTime")]
            settle_time: i64,
        }
        let parsed: FundingResp = resp.json().await.unwrap_or_default();
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let payments = parsed
            .data
            .into_iter()
            .filter(|r| normalize_mexc_side(r.position_type).is_some())
            .take(limit)
            .map(|r| FundingPayment {
                user_id: cred.api_key.clone(),
                venue: Venue::Mexc,
                symbol: r.symbol,
                rate: r.rate,
                amount: r.amount,
                position_size: r.hold_vol,
                timestamp: chrono::DateTime::from_timestamp_millis(r.settle_time).unwrap_or_else(Utc::now),
            })
            .collect();
        Ok(payments)
    }

    async fn quote(&self, market_id: &str, _side: Side, _size: f64) -> AdapterResult<Quote> {
        let url = format!("{API_BASE}/api/v1/contract/ticker?symbol={market_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::NetworkError(e.to_string()))?;
        #[derive(serde::Deserialize, Default)]
        struct TickerResp {
            data: Option<TickerData>,
        }
        #[derive(serde::Deserialize)]
        struct TickerData {
            #[serde(rename = "lastPrice")]
            last_price: f64,
        }
        let parsed: TickerResp = resp.json().await.unwrap_or_default();
        Ok(Quote {
            price: parsed.data.map(|d| d.last_price).unwrap_or(0.0),
            fee: 0.0006,
            price_impact: 0.0,
        })
    }
}
