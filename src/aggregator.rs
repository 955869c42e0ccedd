//! Fans out adapter calls per user in parallel, with settled (never-fail)
//! semantics and a TTL cache, producing the unified portfolio summary.
//! Generalizes a single-exchange fan-out pattern to every enabled venue
//! for a user.

use crate::error::{AppError, AppResult};
use crate::models::{Balance, Position, Venue};
use crate::vault::CredentialVault;
use crate::venue::{Credential, VenueRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_cost_basis: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub positions: Vec<Position>,
    pub balances: Vec<Balance>,
    /// `(venue, last_error_message)` for venues excluded from this merge.
    pub venue_errors: HashMap<String, String>,
}

struct CacheEntry {
    summary: PortfolioSummary,
    fetched_at: DateTime<Utc>,
}

/// Explicit cache object (not a bare `Map` + timestamp): `get` lazily
/// evicts expired entries, `put` and `invalidate` are the only other ops.
struct SummaryCache {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SummaryCache {
    fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: chrono::Duration::seconds(ttl_secs as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, user_id: &str) -> Option<PortfolioSummary> {
        let mut entries = self.entries.lock();
        let expired = entries
            .get(user_id)
            .map(|e| Utc::now() - e.fetched_at > self.ttl)
            .unwrap_or(false);
        if expired {
            entries.remove(user_id);
            return None;
        }
        entries.get(user_id).map(|e| e.summary.clone())
    }

    fn put(&self, user_id: &str, summary: PortfolioSummary) {
        self.entries.lock().insert(
            user_id.to_string(),
            CacheEntry {
                summary,
                fetched_at: Utc::now(),
            },
        );
    }

    fn invalidate(&self, user_id: &str) {
        self.entries.lock().remove(user_id);
    }
}

/// Per-(user,venue) last error, surfaced to UIs/chat bots.
pub struct VenueStatus {
    pub last_error: Mutex<HashMap<(String, Venue), String>>,
    /// Venues skipped until this instant due to `RateLimited`.
    pub rate_limited_until: Mutex<HashMap<(String, Venue), DateTime<Utc>>>,
}

impl Default for VenueStatus {
    fn default() -> Self {
        Self {
            last_error: Mutex::new(HashMap::new()),
            rate_limited_until: Mutex::new(HashMap::new()),
        }
    }
}

pub struct Aggregator {
    registry: Arc<VenueRegistry>,
    vault: Arc<CredentialVault>,
    cache: SummaryCache,
    status: VenueStatus,
    fetch_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        registry: Arc<VenueRegistry>,
        vault: Arc<CredentialVault>,
        fetch_timeout_secs: u64,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            registry,
            vault,
            cache: SummaryCache::new(cache_ttl_secs),
            status: VenueStatus::default(),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
        }
    }

    pub async fn invalidate(&self, user_id: &str) {
        self.cache.invalidate(user_id);
    }

    pub async fn get_summary(&self, user_id: &str) -> AppResult<PortfolioSummary> {
        if let Some(cached) = self.cache.get(user_id) {
            return Ok(cached);
        }

        let venues = self.vault.enabled_venues(user_id).await?;
        let now = Utc::now();

        let mut position_tasks = Vec::new();
        let mut balance_tasks = Vec::new();

        for venue in venues {
            if let Some(until) = self.status.rate_limited_until.lock().get(&(user_id.to_string(), venue)) {
                if *until > now {
                    continue;
                }
            }

            let adapter = match self.registry.get(venue) {
                Some(a) => a,
                None => continue,
            };
            let cred = match self.vault.get(user_id, venue).await {
                Ok(c) => Credential {
                    api_key: c.api_key,
                    api_secret: c.api_secret,
                    wallet_secret: c.wallet_secret,
                },
                Err(AppError::CooldownError(_)) => {
                    self.status
                        .last_error
                        .lock()
                        .insert((user_id.to_string(), venue), "credential in cooldown".into());
                    continue;
                }
                Err(_) => continue,
            };

            let timeout = self.fetch_timeout;
            let adapter_pos = adapter.clone();
            let cred_pos = cred.clone();
            position_tasks.push(async move {
                let result = tokio::time::timeout(timeout, adapter_pos.fetch_positions(&cred_pos)).await;
                (venue, result)
            });

            let adapter_bal = adapter.clone();
            let cred_bal = cred.clone();
            balance_tasks.push(async move {
                let result = tokio::time::timeout(timeout, adapter_bal.fetch_balances(&cred_bal)).await;
                (venue, result)
            });
        }

        let position_results = futures_util::future::join_all(position_tasks).await;
        let balance_results = futures_util::future::join_all(balance_tasks).await;

        let mut positions = Vec::new();
        for (venue, result) in position_results {
            match result {
                Ok(Ok(mut p)) => {
                    self.status.last_error.lock().remove(&(user_id.to_string(), venue));
                    positions.append(&mut p);
                }
                Ok(Err(e)) => self.record_adapter_error(user_id, venue, &e).await,
                Err(_) => {
                    warn!(user_id, venue = venue.as_str(), "position fetch timed out");
                    self.status
                        .last_error
                        .lock()
                        .insert((user_id.to_string(), venue), "fetch timed out".into());
                }
            }
        }

        let mut balances = Vec::new();
        for (venue, result) in balance_results {
            match result {
                Ok(Ok(mut b)) => balances.append(&mut b),
                Ok(Err(e)) => self.record_adapter_error(user_id, venue, &e).await,
                Err(_) => warn!(user_id, venue = venue.as_str(), "balance fetch timed out"),
            }
        }

        let total_value: f64 = positions.iter().map(|p| p.value()).sum();
        let total_cost_basis: f64 = positions.iter().map(|p| p.cost_basis()).sum();
        let total_pnl: f64 = positions.iter().map(|p| p.pnl()).sum();
        let total_pnl_pct = if total_cost_basis > 0.0 {
            total_pnl / total_cost_basis * 100.0
        } else {
            0.0
        };

        let venue_errors = self
            .status
            .last_error
            .lock()
            .iter()
            .filter(|((u, _), _)| u == user_id)
            .map(|((_, v), msg)| (v.as_str().to_string(), msg.clone()))
            .collect();

        let summary = PortfolioSummary {
            total_value,
            total_cost_basis,
            total_pnl,
            total_pnl_pct,
            positions,
            balances,
            venue_errors,
        };

        self.cache.put(user_id, summary.clone());
        info!(user_id, total_value, "aggregated portfolio summary");
        Ok(summary)
    }

    async fn record_adapter_error(&self, user_id: &str, venue: Venue, err: &crate::error::AdapterError) {
        use crate::error::AdapterError;
        match err {
            AdapterError::AuthError => {
                if let Err(e) = self.vault.record_failure(user_id, venue).await {
                    warn!(user_id, venue = venue.as_str(), error = %e, "failed to record credential failure");
                }
            }
            AdapterError::RateLimited(retry_after) => {
                self.status
                    .rate_limited_until
                    .lock()
                    .insert((user_id.to_string(), venue), Utc::now() + chrono::Duration::from_std(*retry_after).unwrap_or_default());
            }
            _ => {}
        }
        self.status
            .last_error
            .lock()
            .insert((user_id.to_string(), venue), err.to_string());
        warn!(user_id, venue = venue.as_str(), error = %err, "adapter call failed, excluded from merge");
    }
}
