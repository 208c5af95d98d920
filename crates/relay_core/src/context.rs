//! The `Relay` context: the handful of long-lived values every inbound
//! pipeline and plugin needs, gathered into one struct instead of
//! threaded through as separate globals (spec §9 design notes).

use std::sync::Arc;

use relay_ids::MeshNodeId;
use relay_protocol::{Config, RoutingTable};
use relay_radio::{CancellationToken, SendPacerHandle};
use sqlx::SqlitePool;

use crate::bridge::MatrixBridge;
use crate::mesh_id::MeshMessageIdGenerator;

/// Shared, cheaply-clonable handle to everything a packet/event handler
/// needs: the database pool, the outbound mesh send queue, the bridge
/// onto the Matrix runtime, the static routing table, and the resolved
/// config. One `Relay` is built at startup and cloned into every task.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    pub config: Config,
    pub routing: RoutingTable,
    pub db: SqlitePool,
    pub mesh_sender: SendPacerHandle,
    pub matrix_bridge: MatrixBridge,
    pub cancel: CancellationToken,
    pub my_node_id: MeshNodeId,
    pub mesh_id_generator: MeshMessageIdGenerator,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        routing: RoutingTable,
        db: SqlitePool,
        mesh_sender: SendPacerHandle,
        matrix_bridge: MatrixBridge,
        cancel: CancellationToken,
        my_node_id: MeshNodeId,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                config,
                routing,
                db,
                mesh_sender,
                matrix_bridge,
                cancel,
                my_node_id,
                mesh_id_generator: MeshMessageIdGenerator::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.inner.routing
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn mesh_sender(&self) -> &SendPacerHandle {
        &self.inner.mesh_sender
    }

    pub fn matrix_bridge(&self) -> &MatrixBridge {
        &self.inner.matrix_bridge
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Our own mesh node ID, used to filter locally-originated packet
    /// echoes (spec C6 step 1) and to detect mesh-addressed DMs (C6
    /// step 3).
    pub fn my_node_id(&self) -> MeshNodeId {
        self.inner.my_node_id
    }

    /// Allocate the next locally-assigned mesh message ID for an
    /// outbound Matrix->mesh send (spec C5/C7; see DESIGN.md for why the
    /// relay assigns this ID itself rather than reading one back from
    /// the radio library).
    pub fn next_mesh_message_id(&self) -> relay_ids::MeshMessageId {
        self.inner.mesh_id_generator.next()
    }
}
