//! Table definitions for the relay's three stores: the message map (C5),
//! the node name cache (C9), and per-plugin opaque data.

use sqlx::SqlitePool;

use crate::error::Result;

const CREATE_MESSAGE_MAP: &str = r#"
CREATE TABLE IF NOT EXISTS message_map (
    matrix_event_id   TEXT PRIMARY KEY,
    mesh_id           INTEGER NOT NULL,
    room_id           TEXT NOT NULL,
    meshtastic_text   TEXT,
    meshtastic_meshnet TEXT,
    created_at        TEXT NOT NULL
)
"#;

const CREATE_MESSAGE_MAP_MESH_ID_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_message_map_mesh_id ON message_map(mesh_id)";

const CREATE_MESSAGE_MAP_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_message_map_created_at ON message_map(created_at)";

const CREATE_NODE_NAMES: &str = r#"
CREATE TABLE IF NOT EXISTS node_names (
    node_id     INTEGER PRIMARY KEY,
    long_name   TEXT,
    short_name  TEXT,
    updated_at  TEXT NOT NULL
)
"#;

const CREATE_PLUGIN_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS plugin_data (
    plugin_name   TEXT NOT NULL,
    mesh_node_id  INTEGER NOT NULL,
    data          BLOB NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (plugin_name, mesh_node_id)
)
"#;

const CREATE_PLUGIN_DATA_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_plugin_data_plugin_name ON plugin_data(plugin_name)";

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in [
        CREATE_MESSAGE_MAP,
        CREATE_MESSAGE_MAP_MESH_ID_INDEX,
        CREATE_MESSAGE_MAP_CREATED_AT_INDEX,
        CREATE_NODE_NAMES,
        CREATE_PLUGIN_DATA,
        CREATE_PLUGIN_DATA_NAME_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
