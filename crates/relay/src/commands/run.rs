//! `mmrelay run` (spec §9): the long-running daemon. Wires up the
//! database, the Matrix client, the radio gateway, and the concurrency
//! bridge, then drives the Matrix sync loop until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use relay_core::{handle_mesh_packet, MatrixBridge, PluginRegistry, Relay};
use relay_ids::MeshNodeId;
use relay_protocol::{Config, RoutingTable};
use relay_radio::cancel::CancellationToken;
use relay_radio::connection::{ConnectionEngine, ConnectionEvent, ReconnectConfig};
use relay_radio::pacer::{clamp_delay, SendPacer};
use relay_radio::transport::{build_gateway, MeshGateway, SharedGateway};

use crate::commands::GlobalArgs;
use crate::matrix::{Credentials, RelayMatrixClient};

/// How long the startup handshake is given to learn the device's own
/// node number before giving up and falling back to an unknown ID
/// (spec C6 step 1 can't origin-filter without one, but a relay that
/// refuses to start over a slow handshake is worse than one that
/// occasionally forwards its own echo for the first few seconds).
const NODE_ID_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(20);

pub async fn run(global: GlobalArgs) -> Result<()> {
    let has_credentials_file = global.home.credentials_path().is_file();
    let config = Config::load_from_path(&global.config_path, has_credentials_file)
        .with_context(|| format!("failed to load config from {}", global.config_path.display()))?;

    let credentials = resolve_credentials(&global, &config)?;

    let matrix_client = RelayMatrixClient::build(&credentials.homeserver, &global.home.matrix_store_dir())
        .await
        .context("failed to build matrix client")?;
    matrix_client.restore(&credentials).await.context("failed to restore matrix session")?;

    let routing = RoutingTable::from_config(&config);
    let room_ids: Vec<_> = config.matrix_rooms.iter().map(|r| relay_ids::RoomId::new(r.id.clone())).collect();
    let room_refs: Vec<&relay_ids::RoomId> = room_ids.iter().collect();
    matrix_client.ensure_joined(&room_refs).await.context("failed to join configured matrix rooms")?;

    let db = relay_db::open(&global.home.database_path(), &config.database.pool)
        .await
        .context("failed to open database")?;
    prepare_message_map(&db, &config).await?;

    let cancel = CancellationToken::new();
    let gateway = build_gateway(&config.meshtastic);
    let mut shared = SharedGateway::new(gateway);

    shared.connect().await.context("failed to open initial meshtastic connection")?;
    let my_node_id = bootstrap_my_node_id(&mut shared).await;
    if my_node_id.is_none() {
        tracing::warn!("meshtastic device did not report its node id within the startup window, origin filtering may pass through self-echoes until it does");
    }

    let mut warned_message_delay = std::collections::HashSet::new();
    let send_delay = clamp_delay(config.meshtastic.message_delay, &mut warned_message_delay);
    let (pacer, mesh_sender) = SendPacer::new(send_delay);

    let matrix_bridge = MatrixBridge::with_handle(tokio::runtime::Handle::current());
    let relay = Relay::new(
        config,
        routing,
        db,
        mesh_sender,
        matrix_bridge,
        cancel.clone(),
        my_node_id.map(MeshNodeId).unwrap_or(MeshNodeId(0)),
    );
    let plugins = Arc::new(PluginRegistry::new(Vec::new()));

    let mut pacer_gateway = shared.clone();
    let pacer_task = tokio::spawn(async move {
        let mut pacer = pacer;
        pacer.run(&mut pacer_gateway).await;
    });

    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut connection_engine = ConnectionEngine::new_preconnected(shared, ReconnectConfig::default(), cancel.clone());
    let connection_task = tokio::spawn(async move {
        connection_engine.run(packet_tx, event_tx).await;
    });

    let events_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ConnectionEvent::Connected => tracing::info!("meshtastic connected"),
                ConnectionEvent::Disconnected { error } => tracing::warn!(%error, "meshtastic disconnected"),
                ConnectionEvent::Reconnecting { attempt, delay } => {
                    tracing::info!(attempt, delay_secs = delay.as_secs(), "reconnecting to meshtastic")
                }
                ConnectionEvent::ShutDown => {
                    tracing::info!("meshtastic connection shut down");
                    break;
                }
            }
        }
    });

    let packets_relay = relay.clone();
    let packets_plugins = plugins.clone();
    let packets_sender = matrix_client.clone();
    let packets_task = tokio::spawn(async move {
        while let Some(packet) = packet_rx.recv().await {
            if let Err(error) = handle_mesh_packet(&packets_relay, &packets_sender, &packets_plugins, packet).await {
                tracing::warn!(%error, "failed to handle inbound mesh packet");
            }
        }
    });

    let sync_relay = relay.clone();
    let sync_plugins = plugins.clone();
    let sync_client = matrix_client.clone();
    let sync_task = tokio::spawn(async move { sync_client.run_sync_loop(sync_relay, sync_plugins).await });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested, stopping");
    cancel.cancel();
    relay.matrix_bridge().shutdown();

    let _ = connection_task.await;
    let _ = events_task.await;
    let _ = packets_task.await;
    let _ = pacer_task.await;
    match sync_task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::warn!(%error, "matrix sync loop exited with an error"),
        Err(error) => tracing::warn!(%error, "matrix sync task panicked"),
    }

    Ok(())
}

/// Prefer a saved `credentials.json` (the `auth` subcommand's output);
/// fall back to `matrix.access_token`/`bot_user_id` from config, with a
/// synthetic device ID since a bare access token carries no device ID of
/// its own (spec §6 AMBIENT note on credentials resolution).
fn resolve_credentials(global: &GlobalArgs, config: &Config) -> Result<Credentials> {
    let path = global.home.credentials_path();
    if path.is_file() {
        return Credentials::load(&path);
    }
    let access_token = config
        .matrix
        .access_token
        .clone()
        .context("no credentials.json and no matrix.access_token in config")?;
    Ok(Credentials {
        homeserver: config.matrix.homeserver.clone(),
        user_id: config.matrix.bot_user_id.clone(),
        access_token,
        device_id: "MMRELAYRS".to_string(),
    })
}

async fn prepare_message_map(db: &sqlx::SqlitePool, config: &Config) -> Result<()> {
    let store = relay_db::MessageMapStore::new(db);
    if config.database.msg_map.wipe_on_restart {
        let removed = store.wipe().await.context("failed to wipe message map on restart")?;
        tracing::info!(removed, "wiped message map on restart");
    } else if let Some(keep) = config.database.msg_map.msgs_to_keep {
        let removed = store.prune(keep).await.context("failed to prune message map")?;
        if removed > 0 {
            tracing::info!(removed, keep, "pruned message map to configured retention");
        }
    }
    Ok(())
}

/// Drain handshake frames until the device reports `my_node_id` or the
/// bootstrap window elapses. Any actual mesh packets seen during this
/// window are discarded rather than queued: they predate the relay's
/// own startup and carry nothing this run has routing/plugin state for
/// yet.
async fn bootstrap_my_node_id(gateway: &mut SharedGateway<relay_radio::transport::StreamGateway>) -> Option<u32> {
    let deadline = tokio::time::Instant::now() + NODE_ID_BOOTSTRAP_TIMEOUT;
    loop {
        if let Some(id) = gateway.my_node_id() {
            return Some(id);
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, gateway.recv()).await {
            Ok(Some(_packet)) => continue,
            Ok(None) => return gateway.my_node_id(),
            Err(_elapsed) => return None,
        }
    }
}
