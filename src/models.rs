//! Core entities from the data model. Every Store row maps to one of these
//! typed structs; no `HashMap<String, serde_json::Value>` crosses the
//! Store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Polymarket,
    Kalshi,
    Hyperliquid,
    BinanceFutures,
    Bybit,
    Mexc,
    Drift,
    Manifold,
    Jupiter,
    PumpFun,
    Raydium,
    Orca,
    Meteora,
    EvmDex,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Polymarket => "polymarket",
            Venue::Kalshi => "kalshi",
            Venue::Hyperliquid => "hyperliquid",
            Venue::BinanceFutures => "binance_futures",
            Venue::Bybit => "bybit",
            Venue::Mexc => "mexc",
            Venue::Drift => "drift",
            Venue::Manifold => "manifold",
            Venue::Jupiter => "jupiter",
            Venue::PumpFun => "pump_fun",
            Venue::Raydium => "raydium",
            Venue::Orca => "orca",
            Venue::Meteora => "meteora",
            Venue::EvmDex => "evm_dex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "polymarket" => Venue::Polymarket,
            "kalshi" => Venue::Kalshi,
            "hyperliquid" => Venue::Hyperliquid,
            "binance_futures" => Venue::BinanceFutures,
            "bybit" => Venue::Bybit,
            "mexc" => Venue::Mexc,
            "drift" => Venue::Drift,
            "manifold" => Venue::Manifold,
            "jupiter" => Venue::Jupiter,
            "pump_fun" => Venue::PumpFun,
            "raydium" => Venue::Raydium,
            "orca" => Venue::Orca,
            "meteora" => Venue::Meteora,
            "evm_dex" => Venue::EvmDex,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    Demo,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub external_platform_id: String,
    pub settings: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Encrypted on disk; `encrypted_blob` never leaves the vault boundary as
/// plaintext. Per-venue `last_error`/status tracking is ambient and kept
/// in memory only, never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCredential {
    pub user_id: String,
    pub venue: Venue,
    pub mode: CredentialMode,
    pub encrypted_blob: Vec<u8>,
    pub enabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub user_id: String,
    pub venue: Venue,
    pub market_id: String,
    pub outcome_id: String,
    pub side: Side,
    pub size: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub leverage: Option<f64>,
    pub margin_mode: Option<String>,
    pub liquidation_price: Option<f64>,
    pub notional: Option<f64>,
}

impl Position {
    /// Signed mark-to-market value of the position.
    pub fn value(&self) -> f64 {
        self.size * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.size * self.avg_entry_price
    }

    pub fn pnl(&self) -> f64 {
        self.size * (self.current_price - self.avg_entry_price)
    }

    pub fn pnl_pct(&self) -> f64 {
        let basis = self.cost_basis();
        if basis > 0.0 {
            self.pnl() / basis * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub venue: Venue,
    pub available: f64,
    pub locked: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub venue: Venue,
    pub venue_trade_id: Option<String>,
    pub market_id: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
    pub fee: f64,
    pub realized_pnl: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingPayment {
    pub user_id: String,
    pub venue: Venue,
    pub symbol: String,
    pub rate: f64,
    pub amount: f64,
    pub position_size: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: String,
    pub user_id: String,
    pub total_value: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub total_cost_basis: f64,
    pub positions_count: u32,
    pub per_venue_breakdown: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub venue: Venue,
    pub market_id: String,
    pub question: String,
    pub outcomes: Vec<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub last_seen_at: DateTime<Utc>,
    pub cached_raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndexEntry {
    pub venue: Venue,
    pub market_id: String,
    pub question: String,
    pub description: String,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Manual,
    Slug,
    Question,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMember {
    pub venue: Venue,
    pub market_id: String,
    pub outcome_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbMatch {
    pub id: String,
    pub markets: Vec<MatchMember>,
    pub matched_by: MatchedBy,
    pub similarity: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbLeg {
    pub venue: Venue,
    pub market_id: String,
    pub outcome_id: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub id: String,
    pub match_id: String,
    pub buy: ArbLeg,
    pub sell: ArbLeg,
    pub spread: f64,
    pub spread_pct: f64,
    pub profit_per_100: f64,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceAbove,
    PriceBelow,
    PortfolioPnlAbove,
    PortfolioPnlBelow,
    ConcentrationAbove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub threshold: f64,
    pub venue: Option<Venue>,
    pub market_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub user_id: String,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub enabled: bool,
    pub triggered: bool,
    pub trigger_count: u32,
    pub channel: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Crypto,
    Sports,
    Economics,
    Entertainment,
    Weather,
    Science,
    Other,
}
