//! Connection pool setup (spec C1, §4.1).
//!
//! A bounded `SqlitePool` with an idle TTL and acquire timeout, plus the
//! pragma set §4.1 calls out: WAL journaling, `synchronous=NORMAL`, a
//! ~2MiB page cache, in-memory temp storage, a 256MiB mmap window, WAL
//! auto-checkpoint every 1000 pages, and a busy timeout so a writer
//! doesn't immediately fail another connection's query.

use relay_protocol::config::PoolConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DbError, Result};

/// SQLite page cache size in KiB, negative per SQLite's `PRAGMA cache_size`
/// convention (negative = size in KiB rather than pages).
const CACHE_SIZE_KIB: i64 = -2048;
const MMAP_SIZE_BYTES: i64 = 256 * 1024 * 1024;
const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;
const BUSY_TIMEOUT_MS: u64 = 30_000;

pub async fn create_pool(database_path: &std::path::Path, config: &PoolConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}?mode=rwc",
        database_path.display()
    ))
    .map_err(DbError::Sqlx)?
    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
    .synchronous(SqliteSynchronous::Normal)
    .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
    .pragma("cache_size", CACHE_SIZE_KIB.to_string())
    .pragma("temp_store", "MEMORY")
    .pragma("mmap_size", MMAP_SIZE_BYTES.to_string())
    .pragma("wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES.to_string())
    .create_if_missing(true);

    let max_connections = if config.enabled { config.max_connections.max(1) } else { 1 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(Some(Duration::from_secs(config.max_idle_time)))
        .acquire_timeout(Duration::from_secs(config.timeout))
        .connect_with(options)
        .await
        .map_err(DbError::Sqlx)?;

    tracing::info!(
        max_connections,
        idle_timeout_secs = config.max_idle_time,
        acquire_timeout_secs = config.timeout,
        "opened sqlite connection pool"
    );

    Ok(pool)
}

/// Point-in-time pool occupancy, reported by `mmrelay check-config` as a
/// diagnostic (spec C1 supplement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_size: u32,
    pub idle_connections: usize,
    pub active_connections: usize,
}

pub fn stats(pool: &SqlitePool) -> PoolStats {
    let pool_size = pool.size();
    let idle_connections = pool.num_idle();
    PoolStats {
        pool_size,
        idle_connections,
        active_connections: (pool_size as usize).saturating_sub(idle_connections),
    }
}
