//! The uniform contract every venue adapter implements, plus the registry
//! that holds adapters as stateless handles (Design Note: no back-pointers
//! from engines into adapters).

pub mod binance_futures;
pub mod bybit;
pub mod drift;
pub mod evm_dex;
pub mod hyperliquid;
pub mod jupiter;
pub mod kalshi;
pub mod manifold;
pub mod meteora;
pub mod mexc;
pub mod orca;
pub mod polymarket;
pub mod pump_fun;
pub mod raydium;
mod registry;
mod signer;

pub use registry::VenueRegistry;
pub use signer::{HmacSigner, Signer};

use crate::error::AdapterError;
use crate::models::{Balance, FundingPayment, Position, Trade, Venue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Opaque, process-local credential handed to an adapter for one call.
/// Adapters never retain it past the call (Concurrency & Resource Model).
#[derive(Debug, Clone)]
pub struct Credential {
    pub api_key: String,
    pub api_secret: String,
    /// Wallet-keypair / bearer material for venues that authenticate by
    /// signature rather than HMAC (Polymarket, Hyperliquid, Solana DEXes).
    pub wallet_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TradeQuery {
    pub since_unix_ms: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub fee: f64,
    pub price_impact: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_futures: bool,
    pub supports_funding: bool,
    pub supports_stream: bool,
    /// Unit live quotes are expressed in: a dollar/cents-style venue needs
    /// normalization to a [0,1] probability before entering the portfolio.
    pub price_unit: PriceUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceUnit {
    Probability,
    Usd,
}

/// One hit from a venue's market-search endpoint: enough identity
/// (`market_id`) to look the market back up via `quote`, and enough text
/// (`question`) to score cross-venue similarity against.
#[derive(Debug, Clone)]
pub struct MarketSearchResult {
    pub market_id: String,
    pub question: String,
}

#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;
    fn capabilities(&self) -> Capabilities;

    async fn fetch_positions(&self, cred: &Credential) -> AdapterResult<Vec<Position>>;
    async fn fetch_balances(&self, cred: &Credential) -> AdapterResult<Vec<Balance>>;
    async fn fetch_trades(&self, cred: &Credential, query: TradeQuery) -> AdapterResult<Vec<Trade>>;

    /// Perpetuals-only; non-futures venues return `NotSupported`.
    async fn fetch_funding(&self, cred: &Credential, query: TradeQuery) -> AdapterResult<Vec<FundingPayment>>;

    async fn quote(&self, market_id: &str, side: crate::models::Side, size: f64) -> AdapterResult<Quote>;

    /// Optional: venues with a market-search endpoint participate in
    /// cross-venue auto-matching. Default: not supported.
    async fn search_markets(&self, _term: &str) -> AdapterResult<Vec<MarketSearchResult>> {
        Err(AdapterError::NotSupported)
    }
}

/// Normalizes a dollar/cents-scaled probability (e.g. Polymarket's `"0.62"`
/// cents-style string, Kalshi's integer cents) into `[0,1]`.
pub fn normalize_cents_to_probability(cents: f64) -> f64 {
    (cents / 100.0).clamp(0.0, 1.0)
}

/// MEXC futures encodes open/close x long/short as one integer:
/// 1=open-long, 2=close-short, 3=open-short, 4=close-long. Adapter
/// normalizes to `(direction, is_open)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MexcDirection {
    Long,
    Short,
}

pub fn normalize_mexc_side(code: u8) -> Option<(MexcDirection, bool)> {
    match code {
        1 => Some((MexcDirection::Long, true)),
        2 => Some((MexcDirection::Short, false)),
        3 => Some((MexcDirection::Short, true)),
        4 => Some((MexcDirection::Long, false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_cents_to_probability() {
        assert!((normalize_cents_to_probability(62.0) - 0.62).abs() < 1e-9);
        assert_eq!(normalize_cents_to_probability(150.0), 1.0);
        assert_eq!(normalize_cents_to_probability(-10.0), 0.0);
    }

    #[test]
    fn normalizes_mexc_side_codes() {
        assert_eq!(normalize_mexc_side(1), Some((MexcDirection::Long, true)));
        assert_eq!(normalize_mexc_side(2), Some((MexcDirection::Short, false)));
        assert_eq!(normalize_mexc_side(3), Some((MexcDirection::Short, true)));
        assert_eq!(normalize_mexc_side(4), Some((MexcDirection::Long, false)));
        assert_eq!(normalize_mexc_side(9), None);
    }
}
