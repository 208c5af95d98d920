//! The bidirectional Matrix <-> mesh message index (spec C5).
//!
//! Rows are append-only. A corrupt row — an empty `matrix_event_id` or
//! `room_id`, which should never happen but has been observed after
//! manual database surgery — is skipped on read with a warning rather
//! than surfaced as an error, per spec §4.5's "tolerate corrupt rows"
//! edge case.

use chrono::{DateTime, Utc};
use relay_ids::{MatrixEventId, MeshMessageId, RoomId};
use relay_protocol::MessageMapRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

pub struct MessageMapStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageMapStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn store(&self, row: &MessageMapRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO message_map \
             (matrix_event_id, mesh_id, room_id, meshtastic_text, meshtastic_meshnet, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(row.matrix_event_id.as_str())
        .bind(row.mesh_id.0 as i64)
        .bind(row.room_id.as_str())
        .bind(&row.meshtastic_text)
        .bind(&row.meshtastic_meshnet)
        .bind(row.created_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// The most recently inserted row for `mesh_id` (spec §3: "(mesh ID →
    /// Matrix event) lookup returns the most recent row by insertion
    /// order"). Ordered by `rowid` rather than `created_at` since rows are
    /// never mutated and `rowid` is exact insertion order, whereas
    /// `created_at` can tie at whatever resolution the clock gives it.
    pub async fn by_mesh_id(&self, mesh_id: MeshMessageId) -> Result<Option<MessageMapRow>> {
        let row = sqlx::query("SELECT * FROM message_map WHERE mesh_id = ?1 ORDER BY rowid DESC LIMIT 1")
            .bind(mesh_id.0 as i64)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.and_then(decode_row))
    }

    pub async fn by_matrix_event_id(
        &self,
        matrix_event_id: &MatrixEventId,
    ) -> Result<Option<MessageMapRow>> {
        let row = sqlx::query("SELECT * FROM message_map WHERE matrix_event_id = ?1")
            .bind(matrix_event_id.as_str())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.and_then(decode_row))
    }

    /// Delete every row. Used when `database.msg_map.wipe_on_restart` is set.
    pub async fn wipe(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM message_map").execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Keep only the `keep` most recently inserted rows (by `rowid`, per
    /// spec §3/§4.5 "delete oldest by insertion rowid"), per
    /// `database.msg_map.msgs_to_keep`.
    pub async fn prune(&self, keep: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM message_map WHERE rowid NOT IN \
             (SELECT rowid FROM message_map ORDER BY rowid DESC LIMIT ?1)",
        )
        .bind(keep)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn decode_row(row: SqliteRow) -> Option<MessageMapRow> {
    let matrix_event_id: String = row.try_get("matrix_event_id").ok()?;
    let room_id: String = row.try_get("room_id").ok()?;
    if matrix_event_id.is_empty() || room_id.is_empty() {
        tracing::warn!("skipping corrupt message_map row with empty key field");
        return None;
    }
    let mesh_id: i64 = row.try_get("mesh_id").ok()?;
    let created_at_raw: String = row.try_get("created_at").ok()?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .ok()?
        .with_timezone(&Utc);
    Some(MessageMapRow {
        matrix_event_id: MatrixEventId::new(matrix_event_id),
        mesh_id: MeshMessageId(mesh_id as u32),
        room_id: RoomId::new(room_id),
        meshtastic_text: row.try_get("meshtastic_text").ok(),
        meshtastic_meshnet: row.try_get("meshtastic_meshnet").ok(),
        created_at,
    })
}
