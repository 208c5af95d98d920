//! SQLite-backed persistence for the relay (spec C1/C5, §4.1/§4.5).
//!
//! A single `SqlitePool` (see [`pool`]) backs three independent stores:
//! the bidirectional message map ([`message_map`]), the node name cache
//! ([`names`]), and opaque per-plugin data ([`plugin_data`]). All three
//! share the same pool and the same migration step ([`schema`]).

pub mod error;
pub mod message_map;
pub mod names;
pub mod plugin_data;
pub mod pool;
pub mod schema;

pub use error::{DbError, Result};
pub use message_map::MessageMapStore;
pub use names::NameCacheStore;
pub use plugin_data::PluginDataStore;
pub use pool::{create_pool, stats as pool_stats, PoolStats};
pub use schema::run_migrations;

use relay_protocol::config::PoolConfig;
use sqlx::SqlitePool;

/// Open a pool at `database_path` and run migrations, ready for use by
/// the three stores above.
pub async fn open(database_path: &std::path::Path, pool_config: &PoolConfig) -> Result<SqlitePool> {
    let pool = pool::create_pool(database_path, pool_config).await?;
    schema::run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_a_queryable_pool_with_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sqlite");
        let config = PoolConfig {
            enabled: true,
            max_connections: 2,
            max_idle_time: 300,
            timeout: 5,
        };
        let pool = open(&path, &config).await.unwrap();
        let store = MessageMapStore::new(&pool);
        assert!(store
            .by_mesh_id(relay_ids::MeshMessageId(1))
            .await
            .unwrap()
            .is_none());
    }
}
