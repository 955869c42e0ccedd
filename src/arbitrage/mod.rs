//! Cross-venue market matching, continuous price polling, and the
//! arbitrage opportunity lifecycle: an engine tick loop generalized from
//! one hardcoded exchange pair to an arbitrary `VenueRegistry`.

pub mod matching;

use crate::error::{AdapterError, AppResult};
use crate::hooks::OpportunitySubscriber;
use crate::models::{ArbLeg, ArbMatch, ArbOpportunity, MarketIndexEntry, MatchMember, MatchedBy, Side, Venue};
use crate::store::Store;
use crate::venue::VenueRegistry;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Explicit cache object over `(venue, marketId) -> price`, 5s freshness,
/// evicted lazily on `get`.
struct PriceCache {
    freshness: ChronoDuration,
    entries: Mutex<HashMap<(Venue, String), (f64, DateTime<Utc>)>>,
}

impl PriceCache {
    fn new() -> Self {
        Self {
            freshness: ChronoDuration::seconds(5),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, venue: Venue, market_id: &str) -> Option<f64> {
        let mut entries = self.entries.lock();
        let key = (venue, market_id.to_string());
        let fresh = entries
            .get(&key)
            .map(|(_, at)| Utc::now() - *at < self.freshness)
            .unwrap_or(false);
        if !fresh {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).map(|(price, _)| *price)
    }

    fn put(&self, venue: Venue, market_id: &str, price: f64) {
        self.entries
            .lock()
            .insert((venue, market_id.to_string()), (price, Utc::now()));
    }
}

pub struct ArbitrageEngine {
    store: Store,
    registry: Arc<VenueRegistry>,
    price_cache: PriceCache,
    min_spread: f64,
    opportunity_ttl: ChronoDuration,
    subscribers: Mutex<Vec<Arc<dyn OpportunitySubscriber>>>,
}

struct RankedPair {
    buy: ArbLeg,
    sell: ArbLeg,
    spread: f64,
    spread_pct: f64,
    profit_per_100: f64,
}

impl ArbitrageEngine {
    pub fn new(store: Store, registry: Arc<VenueRegistry>, min_spread: f64, opportunity_ttl_ms: i64) -> Self {
        Self {
            store,
            registry,
            price_cache: PriceCache::new(),
            min_spread,
            opportunity_ttl: ChronoDuration::milliseconds(opportunity_ttl_ms),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn OpportunitySubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    pub async fn add_match(&self, m: ArbMatch) -> AppResult<()> {
        self.store.add_match(&m).await
    }

    pub async fn remove_match(&self, match_id: &str) -> AppResult<()> {
        self.store.remove_match(match_id).await
    }

    /// Queries every venue with a `searchMarkets` capability for each
    /// tracked term, scores cross-venue results by question/embedding
    /// similarity, and persists any pair clearing `min_confidence` as a
    /// new `ArbMatch`. Pairs already covered by an existing match are
    /// skipped. Returns the number of matches created.
    pub async fn auto_match(&self, terms: &[String], min_confidence: f64) -> AppResult<usize> {
        let now = Utc::now();
        let mut entries: Vec<MarketIndexEntry> = Vec::new();

        for venue in self.registry.enabled_venues() {
            let adapter = match self.registry.get(venue) {
                Some(a) => a,
                None => continue,
            };
            for term in terms {
                let results = match adapter.search_markets(term).await {
                    Ok(r) => r,
                    Err(AdapterError::NotSupported) => continue,
                    Err(e) => {
                        warn!(venue = venue.as_str(), term, error = %e, "market search failed");
                        continue;
                    }
                };
                for r in results {
                    let content_hash = hex::encode(Sha256::digest(r.question.as_bytes()));
                    let entry = MarketIndexEntry {
                        venue,
                        market_id: r.market_id,
                        question: r.question,
                        description: String::new(),
                        tags: Vec::new(),
                        content_hash,
                        embedding: None,
                        updated_at: now,
                    };
                    self.store.upsert_market_index_entry(&entry).await?;
                    entries.push(entry);
                }
            }
        }

        let candidates = matching::find_candidates(&entries, min_confidence);
        let existing = self.store.list_matches().await?;
        let mut created = 0;
        for c in candidates {
            let member_a = MatchMember {
                venue: c.a.venue,
                market_id: c.a.market_id.clone(),
                outcome_id: "YES".into(),
            };
            let member_b = MatchMember {
                venue: c.b.venue,
                market_id: c.b.market_id.clone(),
                outcome_id: "YES".into(),
            };
            let already_matched = existing.iter().any(|m| {
                m.markets
                    .iter()
                    .any(|mm| mm.venue == member_a.venue && mm.market_id == member_a.market_id)
                    && m.markets
                        .iter()
                        .any(|mm| mm.venue == member_b.venue && mm.market_id == member_b.market_id)
            });
            if already_matched {
                continue;
            }
            let arb_match = ArbMatch {
                id: uuid::Uuid::new_v4().to_string(),
                markets: vec![member_a, member_b],
                matched_by: if c.by_embedding { MatchedBy::Embedding } else { MatchedBy::Question },
                similarity: c.similarity,
                created_at: now,
            };
            self.store.add_match(&arb_match).await?;
            created += 1;
        }
        Ok(created)
    }

    async fn fetch_price(&self, venue: Venue, market_id: &str) -> Option<f64> {
        if let Some(price) = self.price_cache.get(venue, market_id) {
            return Some(price);
        }
        let adapter = self.registry.get(venue)?;
        match adapter.quote(market_id, Side::Buy, 1.0).await {
            Ok(quote) => {
                self.price_cache.put(venue, market_id, quote.price);
                Some(quote.price)
            }
            Err(e) => {
                warn!(venue = venue.as_str(), market_id, error = %e, "quote fetch failed");
                None
            }
        }
    }

    /// Runs one poll tick: expires stale opportunities, then re-evaluates
    /// every match for a new best buy/sell pair.
    pub async fn tick(&self) -> AppResult<()> {
        self.expire_opportunities().await?;

        let matches = self.store.list_matches().await?;
        for m in matches {
            if m.markets.len() < 2 {
                continue;
            }

            let mut priced = Vec::new();
            for member in &m.markets {
                if let Some(price) = self.fetch_price(member.venue, &member.market_id).await {
                    priced.push(ArbLeg {
                        venue: member.venue,
                        market_id: member.market_id.clone(),
                        outcome_id: member.outcome_id.clone(),
                        price,
                    });
                }
            }
            if priced.len() < 2 {
                continue;
            }

            if let Some(best) = best_pair(&priced, self.min_spread) {
                self.upsert_opportunity(&m, best).await?;
            }
        }
        Ok(())
    }

    async fn expire_opportunities(&self) -> AppResult<()> {
        let now = Utc::now();
        for mut opp in self.store.list_active_opportunities().await? {
            if opp.expires_at < now {
                opp.is_active = false;
                self.store.upsert_opportunity(&opp).await?;
            }
        }
        Ok(())
    }

    async fn upsert_opportunity(&self, m: &ArbMatch, best: RankedPair) -> AppResult<()> {
        let existing = self
            .store
            .list_active_opportunities()
            .await?
            .into_iter()
            .find(|o| {
                o.match_id == m.id
                    && o.buy.venue == best.buy.venue
                    && o.buy.market_id == best.buy.market_id
                    && o.sell.venue == best.sell.venue
                    && o.sell.market_id == best.sell.market_id
            });

        let now = Utc::now();
        match existing {
            Some(mut opp) => {
                // Same (buyVenue,buyMarket,sellVenue,sellMarket) key: refresh
                // prices/spread/expiry in place rather than emitting a new
                // event. The opportunity's identity is the venue pair, not
                // the price at any given tick.
                opp.buy = best.buy;
                opp.sell = best.sell;
                opp.spread = best.spread;
                opp.spread_pct = best.spread_pct;
                opp.profit_per_100 = best.profit_per_100;
                opp.expires_at = now + self.opportunity_ttl;
                self.store.upsert_opportunity(&opp).await?;
            }
            None => {
                let opp = ArbOpportunity {
                    id: uuid::Uuid::new_v4().to_string(),
                    match_id: m.id.clone(),
                    buy: best.buy,
                    sell: best.sell,
                    spread: best.spread,
                    spread_pct: best.spread_pct,
                    profit_per_100: best.profit_per_100,
                    confidence: m.similarity,
                    detected_at: now,
                    expires_at: now + self.opportunity_ttl,
                    is_active: true,
                };
                self.store.upsert_opportunity(&opp).await?;
                info!(match_id = %m.id, spread_pct = opp.spread_pct, "arbitrage opportunity detected");
                for subscriber in self.subscribers.lock().iter() {
                    subscriber.on_opportunity(&opp);
                }
            }
        }
        Ok(())
    }
}

/// Scans every ordered pair within `priced` for the one with the highest
/// `spread_pct` clearing `min_spread`.
fn best_pair(priced: &[ArbLeg], min_spread: f64) -> Option<RankedPair> {
    let mut best: Option<RankedPair> = None;
    for i in 0..priced.len() {
        for j in 0..priced.len() {
            if i == j {
                continue;
            }
            let buy = &priced[i];
            let sell = &priced[j];
            if buy.price <= 0.0 || sell.price <= buy.price {
                continue;
            }
            let spread = sell.price - buy.price;
            let spread_pct = spread / buy.price * 100.0;
            if spread_pct < min_spread * 100.0 {
                continue;
            }
            let profit_per_100 = (100.0 / buy.price) * sell.price - 100.0;
            let is_better = best.as_ref().map(|b| spread_pct > b.spread_pct).unwrap_or(true);
            if is_better {
                best = Some(RankedPair {
                    buy: buy.clone(),
                    sell: sell.clone(),
                    spread,
                    spread_pct,
                    profit_per_100,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(venue: Venue, price: f64) -> ArbLeg {
        ArbLeg {
            venue,
            market_id: "m".into(),
            outcome_id: "YES".into(),
            price,
        }
    }

    #[test]
    fn best_pair_matches_worked_example() {
        let priced = vec![leg(Venue::Polymarket, 0.62), leg(Venue::Kalshi, 0.70)];
        let best = best_pair(&priced, 0.02).expect("spread clears minSpread");
        assert_eq!(best.buy.venue, Venue::Polymarket);
        assert_eq!(best.sell.venue, Venue::Kalshi);
        assert!((best.spread - 0.08).abs() < 1e-9);
        assert!((best.spread_pct - 12.903225806451612).abs() < 1e-6);
        assert!((best.profit_per_100 - 12.903225806451612).abs() < 1e-6);
    }

    #[test]
    fn no_pair_clears_min_spread_returns_none() {
        let priced = vec![leg(Venue::Polymarket, 0.62), leg(Venue::Kalshi, 0.63)];
        assert!(best_pair(&priced, 0.5).is_none());
    }

    #[test]
    fn single_priced_leg_has_no_pair() {
        let priced = vec![leg(Venue::Polymarket, 0.62)];
        assert!(best_pair(&priced, 0.0).is_none());
    }
}
