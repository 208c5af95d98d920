//! Shared domain types for the Matrix <-> Meshtastic relay.
//!
//! Every type that crosses a component boundary (config, routing, the
//! message-map row, a plugin's verdict) lives here so `relay_db`,
//! `relay_radio` and `relay_core` can all depend on it without depending on
//! each other.

pub mod attribution;
pub mod config;
pub mod paths;
pub mod plugin;
pub mod portnum;
pub mod routing;

pub use attribution::{format_attribution, parse_attribution, AttributionError};
pub use config::{Config, ConfigError, ConnectionType, LogLevel};
pub use paths::HomeDir;
pub use plugin::{PluginDescriptor, PluginVerdict};
pub use portnum::PortNumber;
pub use routing::{RoutingEntry, RoutingTable};

use relay_ids::{MatrixEventId, MeshMessageId, MeshNodeId, RoomId};
use serde::{Deserialize, Serialize};

/// A persisted row of the bidirectional Matrix <-> mesh index (spec C5).
///
/// Matrix event ID is the primary key. Rows are append-only: once stored
/// they are never updated, only deleted by `prune`/`wipe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMapRow {
    pub matrix_event_id: MatrixEventId,
    pub mesh_id: MeshMessageId,
    pub room_id: RoomId,
    pub meshtastic_text: Option<String>,
    pub meshtastic_meshnet: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A node's cached long/short display name (spec C9, backed by C1).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeNames {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

impl NodeNames {
    /// Display-name resolution order: long name, then short name, then
    /// the synthesized `Node !<hex8>` fallback.
    pub fn resolve(&self, node_id: MeshNodeId) -> String {
        self.long_name
            .clone()
            .or_else(|| self.short_name.clone())
            .unwrap_or_else(|| format!("Node {}", node_id.as_hex()))
    }
}
