//! Idempotent schema migrations.
//!
//! Every statement here is safe to re-run: `CREATE TABLE/INDEX IF NOT
//! EXISTS`, and new columns arrive via `ALTER TABLE ... ADD COLUMN` guarded
//! to swallow the "duplicate column name" failure SQLite raises when the
//! column is already present. `_schema_version` records one row per applied
//! migration; `MAX(version)` is "the latest applied version".

use rusqlite::Connection;

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS _schema_version (version INTEGER PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        external_platform_id TEXT NOT NULL UNIQUE,
        settings TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trading_credentials (
        user_id TEXT NOT NULL,
        venue TEXT NOT NULL,
        mode TEXT NOT NULL,
        encrypted_blob BLOB NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_used_at TEXT,
        failed_attempts INTEGER NOT NULL DEFAULT 0,
        cooldown_until TEXT,
        PRIMARY KEY (user_id, venue)
    )",
    "CREATE TABLE IF NOT EXISTS positions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        venue TEXT NOT NULL,
        market_id TEXT NOT NULL,
        outcome_id TEXT NOT NULL,
        side TEXT NOT NULL,
        size REAL NOT NULL,
        avg_entry_price REAL NOT NULL,
        current_price REAL NOT NULL,
        opened_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        leverage REAL,
        margin_mode TEXT,
        liquidation_price REAL,
        notional REAL,
        UNIQUE (user_id, venue, market_id, outcome_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_positions_user ON positions(user_id)",
    "CREATE TABLE IF NOT EXISTS trades (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        venue TEXT NOT NULL,
        venue_trade_id TEXT,
        market_id TEXT NOT NULL,
        side TEXT NOT NULL,
        size REAL NOT NULL,
        price REAL NOT NULL,
        fee REAL NOT NULL DEFAULT 0,
        realized_pnl REAL,
        timestamp TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_venue_tradeid
        ON trades(venue, venue_trade_id) WHERE venue_trade_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_trades_user_ts ON trades(user_id, timestamp DESC)",
    "CREATE TABLE IF NOT EXISTS funding_payments (
        user_id TEXT NOT NULL,
        venue TEXT NOT NULL,
        symbol TEXT NOT NULL,
        rate REAL NOT NULL,
        amount REAL NOT NULL,
        position_size REAL NOT NULL,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_funding_user_ts ON funding_payments(user_id, timestamp DESC)",
    "CREATE TABLE IF NOT EXISTS portfolio_snapshots (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        total_value REAL NOT NULL,
        total_pnl REAL NOT NULL,
        total_pnl_pct REAL NOT NULL,
        total_cost_basis REAL NOT NULL,
        positions_count INTEGER NOT NULL,
        per_venue_breakdown TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_user_ts ON portfolio_snapshots(user_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS markets (
        venue TEXT NOT NULL,
        market_id TEXT NOT NULL,
        question TEXT NOT NULL,
        outcomes TEXT NOT NULL,
        end_date TEXT,
        resolved INTEGER NOT NULL DEFAULT 0,
        last_seen_at TEXT NOT NULL,
        cached_raw TEXT,
        PRIMARY KEY (venue, market_id)
    )",
    "CREATE TABLE IF NOT EXISTS market_index_entries (
        venue TEXT NOT NULL,
        market_id TEXT NOT NULL,
        question TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]',
        content_hash TEXT NOT NULL,
        embedding BLOB,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (venue, market_id)
    )",
    "CREATE TABLE IF NOT EXISTS arb_matches (
        id TEXT PRIMARY KEY,
        markets TEXT NOT NULL,
        matched_by TEXT NOT NULL,
        similarity REAL NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS arb_opportunities (
        id TEXT PRIMARY KEY,
        match_id TEXT NOT NULL,
        buy TEXT NOT NULL,
        sell TEXT NOT NULL,
        spread REAL NOT NULL,
        spread_pct REAL NOT NULL,
        profit_per_100 REAL NOT NULL,
        confidence REAL NOT NULL,
        detected_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        is_active INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_opportunities_active ON arb_opportunities(is_active)",
    "CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        condition TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        triggered INTEGER NOT NULL DEFAULT 0,
        trigger_count INTEGER NOT NULL DEFAULT 0,
        channel TEXT NOT NULL,
        chat_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_triggered_at TEXT
    )",
];

/// Columns introduced after the initial table creation. Each entry is
/// `(table, column, sql_type)`; applying one is a best-effort `ALTER TABLE`
/// that swallows the "duplicate column name" error SQLite returns when the
/// column already exists from a prior run.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    // Example slot for future additive migrations, e.g.:
    // ("positions", "tags", "TEXT"),
];

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    for stmt in CREATE_TABLES {
        conn.execute(stmt, [])?;
    }

    for (table, column, sql_type) in ADDED_COLUMNS {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}");
        if let Err(e) = conn.execute(&sql, []) {
            let msg = e.to_string();
            if !msg.contains("duplicate column name") {
                return Err(e);
            }
        }
    }

    let version: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _schema_version", [], |r| r.get(0))?;
    let target_version = 1;
    if version < target_version {
        conn.execute(
            "INSERT INTO _schema_version (version) VALUES (?1)",
            rusqlite::params![target_version],
        )?;
    }

    Ok(())
}
