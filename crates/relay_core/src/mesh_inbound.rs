//! Inbound radio handler (spec C6, §4.6).
//!
//! Runs for every decoded packet the radio connection engine (C3) hands
//! up: origin-filters our own echoed packets, refreshes the name cache,
//! works out which Matrix rooms the packet's channel (or DM status) maps
//! to, offers it to plugin dispatch (C8), and — for text packets the
//! pipeline didn't consume — formats and forwards it to Matrix (C2),
//! recording the resulting message-map row (C5).

use async_trait::async_trait;

use relay_db::{MessageMapStore, NameCacheStore};
use relay_ids::{MatrixEventId, RoomId};
use relay_protocol::{format_attribution, parse_attribution, MessageMapRow, PluginVerdict, PortNumber};
use relay_radio::transport::RadioPacket;

use crate::context::Relay;
use crate::dispatch::{DispatchInput, PluginRegistry};
use crate::identity;

/// The narrow capability `relay_core` needs from the Matrix side: send
/// text into a room and get back the event ID Matrix assigned it. No
/// concrete SDK type crosses this boundary (spec §4.7 AMBIENT note).
#[async_trait]
pub trait MatrixSender: Send + Sync {
    async fn send_text(&self, room_id: &RoomId, body: &str) -> anyhow::Result<MatrixEventId>;
}

/// Run the full C6 pipeline for one decoded packet.
pub async fn handle_mesh_packet(
    relay: &Relay,
    sender: &dyn MatrixSender,
    plugins: &PluginRegistry,
    packet: RadioPacket,
) -> anyhow::Result<()> {
    let from_node = relay_ids::MeshNodeId(packet.from_node);

    // Step 1: origin filter.
    if from_node == relay.my_node_id() {
        return Ok(());
    }

    let names = NameCacheStore::new(relay.db());

    // Step 2: name cache refresh, only when the packet actually carried a
    // NODEINFO payload with names (a plain text/telemetry packet doesn't).
    if let Some(user) = &packet.user_info {
        names
            .upsert(from_node, Some(&user.long_name), Some(&user.short_name))
            .await?;
    }

    // Step 3: direct-message detection.
    let is_dm = packet.to_node == relay.my_node_id().0;

    // Step 4: channel enablement / DM fan-out.
    let target_rooms: Vec<RoomId> = if is_dm {
        relay.routing().all_rooms().into_iter().cloned().collect()
    } else {
        relay.routing().rooms_for_channel(packet.channel).into_iter().cloned().collect()
    };
    if target_rooms.is_empty() {
        return Ok(());
    }

    // Step 5: payload classification.
    let port = PortNumber::from_raw(packet.portnum);
    let text = if port.is_core_text() {
        String::from_utf8_lossy(&packet.payload).to_string()
    } else {
        String::new()
    };

    // Step 6: plugin dispatch. Every classified packet is offered to
    // plugins, text or not; only text packets get core-level forwarding.
    let dispatch_input = DispatchInput::MeshText { channel: packet.channel, from_node: from_node.0, text: text.clone() };
    let verdict = plugins.dispatch(dispatch_input, Some(packet.channel)).await;
    if matches!(verdict, PluginVerdict::Consumed) {
        return Ok(());
    }

    // Step 8 (sensor/telemetry/position): delegated entirely to plugins
    // above; the core has nothing further to do for non-text payloads.
    if !port.is_core_text() {
        return Ok(());
    }
    if text.is_empty() {
        return Ok(());
    }

    // Step 7: text forwarding.
    let our_meshnet = relay.config().meshtastic.meshnet_name.clone();
    let (outbound_text, origin_text, origin_meshnet) = match parse_attribution(&text) {
        Some((_, meshnet, _)) if meshnet != our_meshnet => {
            // Already attributed by another relay on another mesh: pass
            // through verbatim so the chain of attributions stays intact.
            (text.clone(), text.clone(), meshnet)
        }
        _ => {
            let resolved_names = names.get(from_node).await?;
            let display_name = identity::resolve_mesh_display_name(from_node, &resolved_names);
            let wrapped = format_attribution(&display_name, &our_meshnet, &text)?;
            (wrapped, text.clone(), our_meshnet.clone())
        }
    };

    let message_map = MessageMapStore::new(relay.db());
    let mesh_id = relay_ids::MeshMessageId(packet.id);

    for room in &target_rooms {
        if relay.is_shutting_down() {
            break;
        }
        let room_for_send = room.clone();
        let text_for_send = outbound_text.clone();
        let submission = relay
            .matrix_bridge()
            .submit(async move { sender_send(sender, room_for_send, text_for_send).await });

        let send_result = match submission {
            Ok(handle) => handle.await,
            Err(error) => {
                tracing::warn!(%error, room = %room, "dropped matrix forward submission");
                continue;
            }
        };

        match send_result {
            Ok(Ok(matrix_event_id)) => {
                let row = MessageMapRow {
                    matrix_event_id,
                    mesh_id,
                    room_id: room.clone(),
                    meshtastic_text: Some(origin_text.clone()),
                    meshtastic_meshnet: Some(origin_meshnet.clone()),
                    created_at: chrono::Utc::now(),
                };
                if let Err(error) = message_map.store(&row).await {
                    tracing::warn!(%error, room = %room, "failed to store message-map row for mesh forward");
                }
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, room = %room, "failed to forward mesh text to matrix room");
            }
            Err(join_error) => {
                tracing::warn!(%join_error, room = %room, "matrix forward task panicked");
            }
        }
    }

    Ok(())
}

// `submit`'s future must be `'static`, so the borrow of `sender` (which
// lives on the caller's stack for the duration of `handle_mesh_packet`)
// can't cross into it directly. `MatrixSender` implementations are
// cheaply-cloned handles in practice (an `Arc<Client>` wrapper); this
// helper takes the trait object by reference for the single `.await`
// needed and is itself what gets captured into the submitted future.
async fn sender_send(
    sender: &dyn MatrixSender,
    room_id: RoomId,
    body: String,
) -> anyhow::Result<MatrixEventId> {
    sender.send_text(&room_id, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::{Config, RoutingEntry, RoutingTable};
    use relay_radio::{CancellationToken, SendPacer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingSender {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MatrixSender for RecordingSender {
        async fn send_text(&self, room_id: &RoomId, body: &str) -> anyhow::Result<MatrixEventId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push((room_id.as_str().to_string(), body.to_string()));
            Ok(MatrixEventId::new(format!("$evt{}", self.calls.load(Ordering::SeqCst))))
        }
    }

    fn minimal_config_yaml() -> String {
        r#"
matrix:
  homeserver: "https://matrix.example.org"
  access_token: "tok"
  bot_user_id: "@bot:example.org"
matrix_rooms:
  - id: "!a:s"
    meshtastic_channel: 0
meshtastic:
  connection_type: serial
  serial_port: /dev/ttyUSB0
  meshnet_name: "M1"
"#
        .to_string()
    }

    async fn test_relay() -> (Relay, relay_radio::SendPacerHandle) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        relay_db::run_migrations(&pool).await.unwrap();
        let config = Config::load_from_str(&minimal_config_yaml(), false).unwrap();
        let routing = RoutingTable::new(vec![RoutingEntry { room_id: RoomId::new("!a:s"), channel: 0 }]);
        let (_pacer, handle) = SendPacer::new(Duration::from_millis(2100));
        let relay = Relay::new(
            config,
            routing,
            pool,
            handle.clone(),
            crate::bridge::MatrixBridge::new(),
            CancellationToken::new(),
            relay_ids::MeshNodeId(0xAAAAAAAA),
        );
        (relay, handle)
    }

    fn sample_packet(from_node: u32, to_node: u32, channel: u8, text: &str, id: u32) -> RadioPacket {
        RadioPacket {
            id,
            from_node,
            to_node,
            channel,
            portnum: PortNumber::TextMessageApp.as_raw(),
            payload: text.as_bytes().to_vec(),
            want_ack: false,
            user_info: None,
        }
    }

    fn empty_registry() -> PluginRegistry {
        PluginRegistry::new(Vec::new())
    }

    #[tokio::test]
    async fn own_node_echo_is_dropped() {
        let (relay, _handle) = test_relay().await;
        let sender = RecordingSender { sent: Arc::new(Mutex::new(Vec::new())), calls: Arc::new(AtomicUsize::new(0)) };
        let packet = sample_packet(0xAAAAAAAA, 0xFFFFFFFF, 0, "hello", 1);
        handle_mesh_packet(&relay, &sender, &empty_registry(), packet).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_text_is_wrapped_and_forwarded_with_map_row() {
        let (relay, _handle) = test_relay().await;
        let sender = RecordingSender { sent: Arc::new(Mutex::new(Vec::new())), calls: Arc::new(AtomicUsize::new(0)) };
        let packet = sample_packet(0x11223344, 0xFFFFFFFF, 0, "hello", 42);
        handle_mesh_packet(&relay, &sender, &empty_registry(), packet).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "!a:s");
        assert_eq!(sent[0].1, "[Node !11223344/M1]: hello");
        drop(sent);

        let message_map = MessageMapStore::new(relay.db());
        let row = message_map.by_mesh_id(relay_ids::MeshMessageId(42)).await.unwrap().unwrap();
        assert_eq!(row.matrix_event_id.as_str(), "$evt1");
    }

    #[tokio::test]
    async fn cross_mesh_text_is_not_rewrapped() {
        let (relay, _handle) = test_relay().await;
        let sender = RecordingSender { sent: Arc::new(Mutex::new(Vec::new())), calls: Arc::new(AtomicUsize::new(0)) };
        let packet = sample_packet(0x11223344, 0xFFFFFFFF, 0, "[Bob/M2]: yo", 7);
        handle_mesh_packet(&relay, &sender, &empty_registry(), packet).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "[Bob/M2]: yo");
    }

    #[tokio::test]
    async fn unrouted_channel_is_dropped() {
        let (relay, _handle) = test_relay().await;
        let sender = RecordingSender { sent: Arc::new(Mutex::new(Vec::new())), calls: Arc::new(AtomicUsize::new(0)) };
        let packet = sample_packet(0x11223344, 0xFFFFFFFF, 5, "hello", 1);
        handle_mesh_packet(&relay, &sender, &empty_registry(), packet).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
