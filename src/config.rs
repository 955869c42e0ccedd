//! Process configuration, loaded from the environment: `dotenv().ok()`
//! then typed `std::env::var` reads with sane fallbacks.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the SQLite file and `backups/` subdirectory.
    pub state_dir: PathBuf,
    pub database_path: PathBuf,

    /// Passphrase the CredentialVault derives its process-scoped key from.
    /// Never persisted.
    pub vault_passphrase: String,

    pub backup_interval_mins: u64,
    pub backup_retention_count: usize,

    pub aggregator_fetch_timeout_secs: u64,
    pub aggregator_cache_ttl_secs: u64,

    pub arbitrage_poll_interval_ms: u64,
    pub arbitrage_min_spread: f64,
    pub arbitrage_opportunity_ttl_ms: i64,
    pub arbitrage_min_match_confidence: f64,
    pub arbitrage_match_interval_mins: u64,
    /// Search terms Auto-match sweeps across every venue, comma-separated
    /// in `ARBITRAGE_MATCH_TERMS`. Empty by default: an operator opts in
    /// to Auto-match by naming what it should track.
    pub arbitrage_match_terms: Vec<String>,

    pub credential_failure_threshold: u32,
    pub credential_backoff_base_ms: i64,

    pub scheduler_job_deadline_secs: u64,
    pub shutdown_deadline_secs: u64,

    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let state_dir: PathBuf = std::env::var("STATE_DIR")
            .unwrap_or_else(|_| "./state".to_string())
            .into();
        let database_path = state_dir.join("venue-core.db");

        let vault_passphrase = std::env::var("VAULT_PASSPHRASE")
            .unwrap_or_else(|_| "development-only-insecure-passphrase".to_string());

        let backup_interval_mins = env_parse("BACKUP_INTERVAL_MINS", 60);
        let backup_retention_count = env_parse("BACKUP_RETENTION_COUNT", 24);

        let aggregator_fetch_timeout_secs = env_parse("AGGREGATOR_FETCH_TIMEOUT_SECS", 10);
        let aggregator_cache_ttl_secs = env_parse("AGGREGATOR_CACHE_TTL_SECS", 30);

        let arbitrage_poll_interval_ms = env_parse("ARBITRAGE_POLL_INTERVAL_MS", 10_000);
        let arbitrage_min_spread = env_parse("ARBITRAGE_MIN_SPREAD", 0.02);
        let arbitrage_opportunity_ttl_ms = env_parse("ARBITRAGE_OPPORTUNITY_TTL_MS", 300_000);
        let arbitrage_min_match_confidence = env_parse("ARBITRAGE_MIN_MATCH_CONFIDENCE", 0.8);
        let arbitrage_match_interval_mins = env_parse("ARBITRAGE_MATCH_INTERVAL_MINS", 30);
        let arbitrage_match_terms: Vec<String> = std::env::var("ARBITRAGE_MATCH_TERMS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let credential_failure_threshold = env_parse("CREDENTIAL_FAILURE_THRESHOLD", 3);
        let credential_backoff_base_ms = env_parse("CREDENTIAL_BACKOFF_BASE_MS", 60_000);

        let scheduler_job_deadline_secs = env_parse("SCHEDULER_JOB_DEADLINE_SECS", 300);
        let shutdown_deadline_secs = env_parse("SHUTDOWN_DEADLINE_SECS", 5);

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            state_dir,
            database_path,
            vault_passphrase,
            backup_interval_mins,
            backup_retention_count,
            aggregator_fetch_timeout_secs,
            aggregator_cache_ttl_secs,
            arbitrage_poll_interval_ms,
            arbitrage_min_spread,
            arbitrage_opportunity_ttl_ms,
            arbitrage_min_match_confidence,
            arbitrage_match_interval_mins,
            arbitrage_match_terms,
            credential_failure_threshold,
            credential_backoff_base_ms,
            scheduler_job_deadline_secs,
            shutdown_deadline_secs,
            dry_run,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
