//! Embedded relational persistence. A narrow gateway around a single SQLite
//! connection, serialized behind one writer (`tokio::sync::Mutex`).
//!
//! Write failures are surfaced to callers as `AppError::StorageError`. Read
//! failures on missing entities return `Ok(None)`, never an error.

mod schema;

use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

fn venue_to_sql(v: Venue) -> &'static str {
    v.as_str()
}

fn venue_from_sql(s: &str) -> rusqlite::Result<Venue> {
    Venue::parse(s).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, "venue".into(), rusqlite::types::Type::Text)
    })
}

fn dt_to_sql(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_from_sql(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))
}

fn opt_dt_from_sql(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| dt_from_sql(&s)).transpose()
}

impl Store {
    pub fn new(db_path: impl AsRef<Path>) -> AppResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Serialize an arbitrary multi-statement sequence against the single
    /// writer. Other mutating helpers each take the lock for one statement;
    /// callers needing atomicity across several statements use this.
    pub async fn with_connection<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send,
    {
        let conn = self.conn.lock().await;
        Ok(f(&conn)?)
    }

    /// Copies the current database image to `<dir>/backup-<unix_ms>.db`,
    /// then deletes files beyond `retention`, oldest (by the timestamp
    /// embedded in the filename, not mtime) first.
    pub async fn backup_now(&self, dir: impl AsRef<Path>, retention: usize) -> AppResult<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::StorageError(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })?;

        let conn = self.conn.lock().await;
        conn.pragma_update(None, "wal_checkpoint", "TRUNCATE").ok();
        let ts = Utc::now().timestamp_millis();
        let dest = dir.join(format!("backup-{ts}.db"));
        std::fs::copy(&self.db_path, &dest).map_err(|e| {
            AppError::StorageError(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })?;
        drop(conn);

        if let Err(e) = prune_backups(dir, retention) {
            warn!("backup pruning failed: {e}");
        }
        info!("wrote backup {}", dest.display());
        Ok(dest)
    }

    // ---- Users ----

    pub async fn upsert_user(&self, user: &User) -> AppResult<()> {
        let settings = serde_json::to_string(&user.settings).unwrap_or_else(|_| "{}".into());
        self.with_connection({
            let user = user.clone();
            move |conn| {
                conn.execute(
                    "INSERT INTO users (id, external_platform_id, settings, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET settings = excluded.settings",
                    params![user.id, user.external_platform_id, settings, dt_to_sql(user.created_at)],
                )?;
                Ok(())
            }
        })
        .await
    }

    pub async fn get_user_by_external_id(&self, external_id: &str) -> AppResult<Option<User>> {
        let external_id = external_id.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT id, external_platform_id, settings, created_at FROM users WHERE external_platform_id = ?1",
                params![external_id],
                row_to_user,
            )
            .optional()
        })
        .await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, external_platform_id, settings, created_at FROM users")?;
            let rows = stmt.query_map([], row_to_user)?;
            rows.collect()
        })
        .await
    }

    // ---- Trading credentials ----

    pub async fn upsert_credential(&self, cred: &TradingCredential) -> AppResult<()> {
        let cred = cred.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO trading_credentials
                    (user_id, venue, mode, encrypted_blob, enabled, last_used_at, failed_attempts, cooldown_until)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id, venue) DO UPDATE SET
                    mode = excluded.mode,
                    encrypted_blob = excluded.encrypted_blob,
                    enabled = excluded.enabled,
                    last_used_at = excluded.last_used_at,
                    failed_attempts = excluded.failed_attempts,
                    cooldown_until = excluded.cooldown_until",
                params![
                    cred.user_id,
                    venue_to_sql(cred.venue),
                    mode_to_sql(cred.mode),
                    cred.encrypted_blob,
                    cred.enabled,
                    cred.last_used_at.map(dt_to_sql),
                    cred.failed_attempts,
                    cred.cooldown_until.map(dt_to_sql),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_credential(&self, user_id: &str, venue: Venue) -> AppResult<Option<TradingCredential>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT user_id, venue, mode, encrypted_blob, enabled, last_used_at, failed_attempts, cooldown_until
                 FROM trading_credentials WHERE user_id = ?1 AND venue = ?2",
                params![user_id, venue_to_sql(venue)],
                row_to_credential,
            )
            .optional()
        })
        .await
    }

    pub async fn list_enabled_credentials(&self, user_id: &str) -> AppResult<Vec<TradingCredential>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, venue, mode, encrypted_blob, enabled, last_used_at, failed_attempts, cooldown_until
                 FROM trading_credentials WHERE user_id = ?1 AND enabled = 1",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_credential)?;
            rows.collect()
        })
        .await
    }

    // ---- Positions ----

    pub async fn upsert_position(&self, pos: &Position) -> AppResult<()> {
        let pos = pos.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO positions
                    (id, user_id, venue, market_id, outcome_id, side, size, avg_entry_price,
                     current_price, opened_at, updated_at, leverage, margin_mode, liquidation_price, notional)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                 ON CONFLICT(user_id, venue, market_id, outcome_id) DO UPDATE SET
                    size = excluded.size,
                    avg_entry_price = excluded.avg_entry_price,
                    current_price = excluded.current_price,
                    updated_at = excluded.updated_at,
                    leverage = excluded.leverage,
                    margin_mode = excluded.margin_mode,
                    liquidation_price = excluded.liquidation_price,
                    notional = excluded.notional",
                params![
                    pos.id,
                    pos.user_id,
                    venue_to_sql(pos.venue),
                    pos.market_id,
                    pos.outcome_id,
                    side_to_sql(pos.side),
                    pos.size,
                    pos.avg_entry_price,
                    pos.current_price,
                    dt_to_sql(pos.opened_at),
                    dt_to_sql(pos.updated_at),
                    pos.leverage,
                    pos.margin_mode,
                    pos.liquidation_price,
                    pos.notional,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_positions(&self, user_id: &str) -> AppResult<Vec<Position>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, venue, market_id, outcome_id, side, size, avg_entry_price,
                        current_price, opened_at, updated_at, leverage, margin_mode, liquidation_price, notional
                 FROM positions WHERE user_id = ?1",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_position)?;
            rows.collect()
        })
        .await
    }

    pub async fn delete_position(&self, id: &str) -> AppResult<()> {
        let id = id.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM positions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    // ---- Trades ----

    /// Idempotent on `(venue, venue_trade_id)`: replaying the same trade
    /// payload `N` times yields exactly one row.
    pub async fn insert_trade(&self, trade: &Trade) -> AppResult<()> {
        let trade = trade.clone();
        self.with_connection(move |conn| {
            if let Some(venue_trade_id) = &trade.venue_trade_id {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT id FROM trades WHERE venue = ?1 AND venue_trade_id = ?2",
                        params![venue_to_sql(trade.venue), venue_trade_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if exists.is_some() {
                    return Ok(());
                }
            }
            conn.execute(
                "INSERT INTO trades (id, user_id, venue, venue_trade_id, market_id, side, size, price, fee, realized_pnl, timestamp)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    trade.id,
                    trade.user_id,
                    venue_to_sql(trade.venue),
                    trade.venue_trade_id,
                    trade.market_id,
                    side_to_sql(trade.side),
                    trade.size,
                    trade.price,
                    trade.fee,
                    trade.realized_pnl,
                    dt_to_sql(trade.timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_trades(&self, user_id: &str, since: Option<DateTime<Utc>>) -> AppResult<Vec<Trade>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let mut out = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT id, user_id, venue, venue_trade_id, market_id, side, size, price, fee, realized_pnl, timestamp
                 FROM trades WHERE user_id = ?1 AND timestamp >= ?2 ORDER BY timestamp ASC",
            )?;
            let since_str = dt_to_sql(since.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC));
            let rows = stmt.query_map(params![user_id, since_str], row_to_trade)?;
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
        .await
    }

    // ---- Funding payments ----

    pub async fn insert_funding(&self, f: &FundingPayment) -> AppResult<()> {
        let f = f.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO funding_payments (user_id, venue, symbol, rate, amount, position_size, timestamp)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    f.user_id,
                    venue_to_sql(f.venue),
                    f.symbol,
                    f.rate,
                    f.amount,
                    f.position_size,
                    dt_to_sql(f.timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_funding_total(&self, user_id: &str, since: Option<DateTime<Utc>>) -> AppResult<f64> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let since_str = dt_to_sql(since.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC));
            conn.query_row(
                "SELECT COALESCE(SUM(amount), 0.0) FROM funding_payments WHERE user_id = ?1 AND timestamp >= ?2",
                params![user_id, since_str],
                |r| r.get(0),
            )
        })
        .await
    }

    // ---- Portfolio snapshots ----

    pub async fn insert_snapshot(&self, snap: &PortfolioSnapshot) -> AppResult<()> {
        let snap = snap.clone();
        let breakdown = serde_json::to_string(&snap.per_venue_breakdown).unwrap_or_else(|_| "{}".into());
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO portfolio_snapshots
                    (id, user_id, total_value, total_pnl, total_pnl_pct, total_cost_basis, positions_count, per_venue_breakdown, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    snap.id,
                    snap.user_id,
                    snap.total_value,
                    snap.total_pnl,
                    snap.total_pnl_pct,
                    snap.total_cost_basis,
                    snap.positions_count,
                    breakdown,
                    dt_to_sql(snap.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_snapshots(&self, user_id: &str) -> AppResult<Vec<PortfolioSnapshot>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, total_value, total_pnl, total_pnl_pct, total_cost_basis, positions_count, per_venue_breakdown, created_at
                 FROM portfolio_snapshots WHERE user_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_snapshot)?;
            rows.collect()
        })
        .await
    }

    pub async fn delete_snapshots_before(&self, user_id: &str, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "DELETE FROM portfolio_snapshots WHERE user_id = ?1 AND created_at < ?2",
                params![user_id, dt_to_sql(cutoff)],
            )
        })
        .await
    }

    // ---- Markets ----

    pub async fn upsert_market(&self, market: &Market) -> AppResult<()> {
        let market = market.clone();
        let outcomes = serde_json::to_string(&market.outcomes).unwrap_or_else(|_| "[]".into());
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO markets (venue, market_id, question, outcomes, end_date, resolved, last_seen_at, cached_raw)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(venue, market_id) DO UPDATE SET
                    question = excluded.question,
                    outcomes = excluded.outcomes,
                    end_date = excluded.end_date,
                    resolved = excluded.resolved,
                    last_seen_at = excluded.last_seen_at,
                    cached_raw = excluded.cached_raw",
                params![
                    venue_to_sql(market.venue),
                    market.market_id,
                    market.question,
                    outcomes,
                    market.end_date.map(dt_to_sql),
                    market.resolved,
                    dt_to_sql(market.last_seen_at),
                    market.cached_raw,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_market(&self, venue: Venue, market_id: &str) -> AppResult<Option<Market>> {
        let market_id = market_id.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT venue, market_id, question, outcomes, end_date, resolved, last_seen_at, cached_raw
                 FROM markets WHERE venue = ?1 AND market_id = ?2",
                params![venue_to_sql(venue), market_id],
                row_to_market,
            )
            .optional()
        })
        .await
    }

    /// Evicts markets not seen since `cutoff`: the market cache's TTL eviction.
    pub async fn evict_stale_markets(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM markets WHERE last_seen_at < ?1", params![dt_to_sql(cutoff)])
        })
        .await
    }

    // ---- Market index entries (semantic matching) ----

    pub async fn upsert_market_index_entry(&self, entry: &MarketIndexEntry) -> AppResult<()> {
        let entry = entry.clone();
        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".into());
        let embedding: Option<Vec<u8>> = entry.embedding.as_ref().map(|e| {
            e.iter().flat_map(|f| f.to_le_bytes()).collect()
        });
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO market_index_entries (venue, market_id, question, description, tags, content_hash, embedding, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(venue, market_id) DO UPDATE SET
                    question = excluded.question,
                    description = excluded.description,
                    tags = excluded.tags,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at",
                params![
                    venue_to_sql(entry.venue),
                    entry.market_id,
                    entry.question,
                    entry.description,
                    tags,
                    entry.content_hash,
                    embedding,
                    dt_to_sql(entry.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_market_index_entries(&self) -> AppResult<Vec<MarketIndexEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT venue, market_id, question, description, tags, content_hash, embedding, updated_at
                 FROM market_index_entries",
            )?;
            let rows = stmt.query_map([], row_to_index_entry)?;
            rows.collect()
        })
        .await
    }

    // ---- Arb matches ----

    pub async fn add_match(&self, m: &ArbMatch) -> AppResult<()> {
        let m = m.clone();
        let markets = serde_json::to_string(&m.markets).unwrap_or_else(|_| "[]".into());
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO arb_matches (id, markets, matched_by, similarity, created_at)
                 VALUES (?1,?2,?3,?4,?5)",
                params![m.id, markets, matched_by_to_sql(m.matched_by), m.similarity, dt_to_sql(m.created_at)],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_match(&self, id: &str) -> AppResult<()> {
        let id = id.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM arb_matches WHERE id = ?1", params![id])?;
            conn.execute("DELETE FROM arb_opportunities WHERE match_id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    pub async fn list_matches(&self) -> AppResult<Vec<ArbMatch>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, markets, matched_by, similarity, created_at FROM arb_matches")?;
            let rows = stmt.query_map([], row_to_match)?;
            rows.collect()
        })
        .await
    }

    // ---- Arb opportunities ----

    pub async fn upsert_opportunity(&self, opp: &ArbOpportunity) -> AppResult<()> {
        let opp = opp.clone();
        let buy = serde_json::to_string(&opp.buy).unwrap_or_default();
        let sell = serde_json::to_string(&opp.sell).unwrap_or_default();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO arb_opportunities
                    (id, match_id, buy, sell, spread, spread_pct, profit_per_100, confidence, detected_at, expires_at, is_active)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                 ON CONFLICT(id) DO UPDATE SET
                    buy = excluded.buy,
                    sell = excluded.sell,
                    spread = excluded.spread,
                    spread_pct = excluded.spread_pct,
                    profit_per_100 = excluded.profit_per_100,
                    confidence = excluded.confidence,
                    expires_at = excluded.expires_at,
                    is_active = excluded.is_active",
                params![
                    opp.id,
                    opp.match_id,
                    buy,
                    sell,
                    opp.spread,
                    opp.spread_pct,
                    opp.profit_per_100,
                    opp.confidence,
                    dt_to_sql(opp.detected_at),
                    dt_to_sql(opp.expires_at),
                    opp.is_active,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_active_opportunities(&self) -> AppResult<Vec<ArbOpportunity>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, match_id, buy, sell, spread, spread_pct, profit_per_100, confidence, detected_at, expires_at, is_active
                 FROM arb_opportunities WHERE is_active = 1",
            )?;
            let rows = stmt.query_map([], row_to_opportunity)?;
            rows.collect()
        })
        .await
    }

    // ---- Alerts ----

    pub async fn upsert_alert(&self, alert: &Alert) -> AppResult<()> {
        let alert = alert.clone();
        let condition = serde_json::to_string(&alert.condition).unwrap_or_default();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO alerts (id, user_id, kind, condition, enabled, triggered, trigger_count, channel, chat_id, created_at, last_triggered_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                 ON CONFLICT(id) DO UPDATE SET
                    enabled = excluded.enabled,
                    triggered = excluded.triggered,
                    trigger_count = excluded.trigger_count,
                    last_triggered_at = excluded.last_triggered_at",
                params![
                    alert.id,
                    alert.user_id,
                    alert_kind_to_sql(alert.kind),
                    condition,
                    alert.enabled,
                    alert.triggered,
                    alert.trigger_count,
                    alert.channel,
                    alert.chat_id,
                    dt_to_sql(alert.created_at),
                    alert.last_triggered_at.map(dt_to_sql),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_alerts(&self, user_id: &str) -> AppResult<Vec<Alert>> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, condition, enabled, triggered, trigger_count, channel, chat_id, created_at, last_triggered_at
                 FROM alerts WHERE user_id = ?1 AND enabled = 1",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_alert)?;
            rows.collect()
        })
        .await
    }
}

fn prune_backups(dir: &Path, retention: usize) -> std::io::Result<()> {
    let mut entries: Vec<(i64, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let ts: i64 = name
                .strip_prefix("backup-")?
                .strip_suffix(".db")?
                .parse()
                .ok()?;
            Some((ts, e.path()))
        })
        .collect();
    entries.sort_by_key(|(ts, _)| *ts);
    if entries.len() > retention {
        for (_, path) in &entries[..entries.len() - retention] {
            std::fs::remove_file(path).ok();
        }
    }
    Ok(())
}

fn mode_to_sql(m: CredentialMode) -> &'static str {
    match m {
        CredentialMode::Demo => "demo",
        CredentialMode::Live => "live",
    }
}

fn mode_from_sql(s: &str) -> rusqlite::Result<CredentialMode> {
    match s {
        "demo" => Ok(CredentialMode::Demo),
        "live" => Ok(CredentialMode::Live),
        _ => Err(rusqlite::Error::InvalidColumnType(0, s.into(), rusqlite::types::Type::Text)),
    }
}

fn side_to_sql(s: Side) -> &'static str {
    match s {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn side_from_sql(s: &str) -> rusqlite::Result<Side> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        _ => Err(rusqlite::Error::InvalidColumnType(0, s.into(), rusqlite::types::Type::Text)),
    }
}

fn matched_by_to_sql(m: MatchedBy) -> &'static str {
    match m {
        MatchedBy::Manual => "manual",
        MatchedBy::Slug => "slug",
        MatchedBy::Question => "question",
        MatchedBy::Embedding => "embedding",
    }
}

fn matched_by_from_sql(s: &str) -> rusqlite::Result<MatchedBy> {
    match s {
        "manual" => Ok(MatchedBy::Manual),
        "slug" => Ok(MatchedBy::Slug),
        "question" => Ok(MatchedBy::Question),
        "embedding" => Ok(MatchedBy::Embedding),
        _ => Err(rusqlite::Error::InvalidColumnType(0, s.into(), rusqlite::types::Type::Text)),
    }
}

fn alert_kind_to_sql(k: AlertKind) -> &'static str {
    match k {
        AlertKind::PriceAbove => "price_above",
        AlertKind::PriceBelow => "price_below",
        AlertKind::PortfolioPnlAbove => "portfolio_pnl_above",
        AlertKind::PortfolioPnlBelow => "portfolio_pnl_below",
        AlertKind::ConcentrationAbove => "concentration_above",
    }
}

fn alert_kind_from_sql(s: &str) -> rusqlite::Result<AlertKind> {
    match s {
        "price_above" => Ok(AlertKind::PriceAbove),
        "price_below" => Ok(AlertKind::PriceBelow),
        "portfolio_pnl_above" => Ok(AlertKind::PortfolioPnlAbove),
        "portfolio_pnl_below" => Ok(AlertKind::PortfolioPnlBelow),
        "concentration_above" => Ok(AlertKind::ConcentrationAbove),
        _ => Err(rusqlite::Error::InvalidColumnType(0, s.into(), rusqlite::types::Type::Text)),
    }
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let settings_json: String = row.get(2)?;
    Ok(User {
        id: row.get(0)?,
        external_platform_id: row.get(1)?,
        settings: serde_json::from_str(&settings_json).unwrap_or_default(),
        created_at: dt_from_sql(&row.get::<_, String>(3)?)?,
    })
}

fn row_to_credential(row: &Row) -> rusqlite::Result<TradingCredential> {
    Ok(TradingCredential {
        user_id: row.get(0)?,
        venue: venue_from_sql(&row.get::<_, String>(1)?)?,
        mode: mode_from_sql(&row.get::<_, String>(2)?)?,
        encrypted_blob: row.get(3)?,
        enabled: row.get(4)?,
        last_used_at: opt_dt_from_sql(row.get(5)?)?,
        failed_attempts: row.get(6)?,
        cooldown_until: opt_dt_from_sql(row.get(7)?)?,
    })
}

fn row_to_position(row: &Row) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        user_id: row.get(1)?,
        venue: venue_from_sql(&row.get::<_, String>(2)?)?,
        market_id: row.get(3)?,
        outcome_id: row.get(4)?,
        side: side_from_sql(&row.get::<_, String>(5)?)?,
        size: row.get(6)?,
        avg_entry_price: row.get(7)?,
        current_price: row.get(8)?,
        opened_at: dt_from_sql(&row.get::<_, String>(9)?)?,
        updated_at: dt_from_sql(&row.get::<_, String>(10)?)?,
        leverage: row.get(11)?,
        margin_mode: row.get(12)?,
        liquidation_price: row.get(13)?,
        notional: row.get(14)?,
    })
}

fn row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        venue: venue_from_sql(&row.get::<_, String>(2)?)?,
        venue_trade_id: row.get(3)?,
        market_id: row.get(4)?,
        side: side_from_sql(&row.get::<_, String>(5)?)?,
        size: row.get(6)?,
        price: row.get(7)?,
        fee: row.get(8)?,
        realized_pnl: row.get(9)?,
        timestamp: dt_from_sql(&row.get::<_, String>(10)?)?,
    })
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<PortfolioSnapshot> {
    let breakdown_json: String = row.get(7)?;
    Ok(PortfolioSnapshot {
        id: row.get(0)?,
        user_id: row.get(1)?,
        total_value: row.get(2)?,
        total_pnl: row.get(3)?,
        total_pnl_pct: row.get(4)?,
        total_cost_basis: row.get(5)?,
        positions_count: row.get(6)?,
        per_venue_breakdown: serde_json::from_str(&breakdown_json).unwrap_or_default(),
        created_at: dt_from_sql(&row.get::<_, String>(8)?)?,
    })
}

fn row_to_market(row: &Row) -> rusqlite::Result<Market> {
    let outcomes_json: String = row.get(3)?;
    Ok(Market {
        venue: venue_from_sql(&row.get::<_, String>(0)?)?,
        market_id: row.get(1)?,
        question: row.get(2)?,
        outcomes: serde_json::from_str(&outcomes_json).unwrap_or_default(),
        end_date: opt_dt_from_sql(row.get(4)?)?,
        resolved: row.get(5)?,
        last_seen_at: dt_from_sql(&row.get::<_, String>(6)?)?,
        cached_raw: row.get(7)?,
    })
}

fn row_to_index_entry(row: &Row) -> rusqlite::Result<MarketIndexEntry> {
    let tags_json: String = row.get(4)?;
    let embedding_bytes: Option<Vec<u8>> = row.get(6)?;
    let embedding = embedding_bytes.map(|bytes| {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    });
    Ok(MarketIndexEntry {
        venue: venue_from_sql(&row.get::<_, String>(0)?)?,
        market_id: row.get(1)?,
        question: row.get(2)?,
        description: row.get(3)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        content_hash: row.get(5)?,
        embedding,
        updated_at: dt_from_sql(&row.get::<_, String>(7)?)?,
    })
}

fn row_to_match(row: &Row) -> rusqlite::Result<ArbMatch> {
    let markets_json: String = row.get(1)?;
    Ok(ArbMatch {
        id: row.get(0)?,
        markets: serde_json::from_str(&markets_json).unwrap_or_default(),
        matched_by: matched_by_from_sql(&row.get::<_, String>(2)?)?,
        similarity: row.get(3)?,
        created_at: dt_from_sql(&row.get::<_, String>(4)?)?,
    })
}

fn row_to_opportunity(row: &Row) -> rusqlite::Result<ArbOpportunity> {
    let buy_json: String = row.get(2)?;
    let sell_json: String = row.get(3)?;
    Ok(ArbOpportunity {
        id: row.get(0)?,
        match_id: row.get(1)?,
        buy: serde_json::from_str(&buy_json).unwrap_or_else(|_| default_leg()),
        sell: serde_json::from_str(&sell_json).unwrap_or_else(|_| default_leg()),
        spread: row.get(4)?,
        spread_pct: row.get(5)?,
        profit_per_100: row.get(6)?,
        confidence: row.get(7)?,
        detected_at: dt_from_sql(&row.get::<_, String>(8)?)?,
        expires_at: dt_from_sql(&row.get::<_, String>(9)?)?,
        is_active: row.get(10)?,
    })
}

fn default_leg() -> ArbLeg {
    ArbLeg {
        venue: Venue::Polymarket,
        market_id: String::new(),
        outcome_id: String::new(),
        price: 0.0,
    }
}

fn row_to_alert(row: &Row) -> rusqlite::Result<Alert> {
    let condition_json: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: alert_kind_from_sql(&row.get::<_, String>(2)?)?,
        condition: serde_json::from_str(&condition_json).unwrap_or(AlertCondition {
            threshold: 0.0,
            venue: None,
            market_id: None,
        }),
        enabled: row.get(4)?,
        triggered: row.get(5)?,
        trigger_count: row.get(6)?,
        channel: row.get(7)?,
        chat_id: row.get(8)?,
        created_at: dt_from_sql(&row.get::<_, String>(9)?)?,
        last_triggered_at: opt_dt_from_sql(row.get(10)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upsert_position_roundtrips() {
        let (store, _dir) = temp_store().await;
        let pos = Position {
            id: "p1".into(),
            user_id: "u1".into(),
            venue: Venue::Polymarket,
            market_id: "m1".into(),
            outcome_id: "YES".into(),
            side: Side::Buy,
            size: 100.0,
            avg_entry_price: 0.4,
            current_price: 0.55,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            leverage: None,
            margin_mode: None,
            liquidation_price: None,
            notional: None,
        };
        store.upsert_position(&pos).await.unwrap();
        let positions = store.list_positions("u1").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].market_id, "m1");
        assert!((positions[0].current_price - 0.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn insert_trade_is_idempotent_on_venue_trade_id() {
        let (store, _dir) = temp_store().await;
        let trade = Trade {
            id: "t1".into(),
            user_id: "u1".into(),
            venue: Venue::Kalshi,
            venue_trade_id: Some("vtid-1".into()),
            market_id: "m1".into(),
            side: Side::Buy,
            size: 10.0,
            price: 0.5,
            fee: 0.01,
            realized_pnl: None,
            timestamp: Utc::now(),
        };
        for _ in 0..5 {
            store.insert_trade(&trade).await.unwrap();
        }
        let trades = store.list_trades("u1", None).await.unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn add_then_remove_match_leaves_list_unchanged() {
        let (store, _dir) = temp_store().await;
        let before = store.list_matches().await.unwrap().len();
        let m = ArbMatch {
            id: "match1".into(),
            markets: vec![],
            matched_by: MatchedBy::Manual,
            similarity: 0.9,
            created_at: Utc::now(),
        };
        store.add_match(&m).await.unwrap();
        store.remove_match("match1").await.unwrap();
        let after = store.list_matches().await.unwrap().len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn snapshot_prune_keeps_only_newer_snapshot() {
        let (store, _dir) = temp_store().await;
        let t0 = Utc::now();
        let snap1 = PortfolioSnapshot {
            id: "s1".into(),
            user_id: "u1".into(),
            total_value: 100.0,
            total_pnl: 0.0,
            total_pnl_pct: 0.0,
            total_cost_basis: 100.0,
            positions_count: 1,
            per_venue_breakdown: HashMap::new(),
            created_at: t0,
        };
        let snap2 = PortfolioSnapshot {
            id: "s2".into(),
            created_at: t0 + chrono::Duration::hours(1),
            ..snap1.clone()
        };
        store.insert_snapshot(&snap1).await.unwrap();
        store.insert_snapshot(&snap2).await.unwrap();
        store
            .delete_snapshots_before("u1", t0 + chrono::Duration::minutes(30))
            .await
            .unwrap();
        let remaining = store.list_snapshots("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "s2");
    }

    #[tokio::test]
    async fn backup_now_writes_timestamped_file_and_prunes() {
        let (store, dir) = temp_store().await;
        let backups_dir = dir.path().join("backups");
        for _ in 0..3 {
            store.backup_now(&backups_dir, 2).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let count = std::fs::read_dir(&backups_dir).unwrap().count();
        assert_eq!(count, 2);
    }
}
