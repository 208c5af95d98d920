//! Inbound Matrix handler (spec C7, §4.7).
//!
//! Registered with the Matrix client for room events. Filters out our
//! own echoes, events in unrouted rooms, and events older than the
//! current sync (so a restart doesn't re-forward history), then offers
//! the event to plugin dispatch (C8) before falling through to the
//! default text/emote/reaction translation and mesh enqueue (C4),
//! recording the resulting message-map row (C5).

use relay_ids::{MatrixEventId, MeshMessageId, RoomId};
use relay_protocol::{MessageMapRow, PluginVerdict};
use relay_radio::pacer::SendRequest;
use relay_ids::MeshNodeId;

use crate::context::Relay;
use crate::dispatch::{DispatchInput, PluginRegistry};

/// Meshtastic firmware's practical text payload limit (spec §4.7 step 7).
pub const MESH_MTU_BYTES: usize = 200;

/// A Matrix room event, narrowed to what C7 needs to classify and act on
/// it. No concrete `matrix-sdk` type appears in this enum; the `relay`
/// binary crate is responsible for translating SDK events into this
/// shape (spec §4.7 AMBIENT note).
#[derive(Debug, Clone)]
pub enum MatrixEvent {
    Text(MatrixMessage),
    Emote(MatrixMessage),
    Notice(MatrixMessage),
    Reaction {
        event_id: MatrixEventId,
        room_id: RoomId,
        sender: String,
        sender_display_name: Option<String>,
        relates_to: MatrixEventId,
        emoji: String,
        origin_server_ts: i64,
    },
    Encrypted {
        room_id: RoomId,
        origin_server_ts: i64,
    },
    Membership {
        room_id: RoomId,
        user_id: String,
        joined: bool,
    },
}

#[derive(Debug, Clone)]
pub struct MatrixMessage {
    pub event_id: MatrixEventId,
    pub room_id: RoomId,
    pub sender: String,
    pub sender_display_name: Option<String>,
    pub body: String,
    pub origin_server_ts: i64,
    pub in_reply_to: Option<MatrixEventId>,
}

/// Run the full C7 pipeline for one Matrix event.
///
/// `our_user_id` is the bot's own Matrix user ID (step 1); `sync_start_ts`
/// is the origin-server timestamp, in milliseconds, at which the current
/// sync session began (step 3); `max_age_ms` is the configured margin
/// beyond which an event is treated as stale history.
pub async fn handle_matrix_event(
    relay: &Relay,
    plugins: &PluginRegistry,
    event: MatrixEvent,
    our_user_id: &str,
    sync_start_ts: i64,
    max_age_ms: i64,
) -> anyhow::Result<()> {
    let room_id = event_room_id(&event);

    // Step 2: room filter.
    if !relay.routing().is_room_routed(room_id) {
        return Ok(());
    }

    match event {
        MatrixEvent::Membership { .. } => {
            // Bookkeeping only. Nothing to relay.
            Ok(())
        }
        MatrixEvent::Encrypted { room_id, .. } => {
            // Arrives here only pre-decrypt, which shouldn't happen once
            // E2EE is configured; post-decrypt events re-enter as
            // Text/Emote/Notice. Can't translate it, so degrade per
            // spec §9: log and drop rather than forward ciphertext.
            tracing::warn!(room = %room_id, "dropping undecryptable matrix event");
            Ok(())
        }
        MatrixEvent::Reaction {
            event_id: _,
            room_id,
            sender,
            sender_display_name,
            relates_to,
            emoji,
            origin_server_ts,
        } => {
            // Step 1: self filter.
            if sender == our_user_id {
                return Ok(());
            }
            // Step 3: age filter.
            if sync_start_ts - origin_server_ts > max_age_ms {
                return Ok(());
            }
            handle_reaction(relay, &room_id, &sender, sender_display_name.as_deref(), &relates_to, &emoji).await
        }
        MatrixEvent::Text(message) | MatrixEvent::Emote(message) | MatrixEvent::Notice(message) => {
            if message.sender == our_user_id {
                return Ok(());
            }
            if sync_start_ts - message.origin_server_ts > max_age_ms {
                return Ok(());
            }
            handle_message(relay, plugins, &message).await
        }
    }
}

fn event_room_id(event: &MatrixEvent) -> &RoomId {
    match event {
        MatrixEvent::Text(m) | MatrixEvent::Emote(m) | MatrixEvent::Notice(m) => &m.room_id,
        MatrixEvent::Reaction { room_id, .. } => room_id,
        MatrixEvent::Encrypted { room_id, .. } => room_id,
        MatrixEvent::Membership { room_id, .. } => room_id,
    }
}

async fn handle_reaction(
    relay: &Relay,
    room_id: &RoomId,
    sender: &str,
    sender_display_name: Option<&str>,
    relates_to: &MatrixEventId,
    emoji: &str,
) -> anyhow::Result<()> {
    let message_map = relay_db::MessageMapStore::new(relay.db());
    let Some(original) = message_map.by_matrix_event_id(relates_to).await? else {
        // Step 4: referenced event unknown to C5, drop.
        return Ok(());
    };
    let display_name = crate::identity::resolve_matrix_display_name(sender, sender_display_name);
    let excerpt = excerpt(original.meshtastic_text.as_deref().unwrap_or(""));
    let body = format!("{display_name} reacted {emoji} to: {excerpt}");
    // Reactions never create a new message-map entry (spec §4.7 invariant).
    enqueue_to_routed_channels(relay, room_id, &body).await
}

async fn handle_message(relay: &Relay, plugins: &PluginRegistry, message: &MatrixMessage) -> anyhow::Result<()> {
    // Step 5: remote-origin detection.
    let our_meshnet = &relay.config().meshtastic.meshnet_name;
    if let Some((_, meshnet, _)) = relay_protocol::parse_attribution(&message.body) {
        if crate::identity::is_own_meshnet(&meshnet, our_meshnet) {
            return Ok(());
        }
    }

    // Step 6: plugin dispatch.
    let dispatch_input = DispatchInput::MatrixText {
        room_id: message.room_id.as_str().to_string(),
        sender: message.sender.clone(),
        text: message.body.clone(),
    };
    if matches!(plugins.dispatch(dispatch_input, None).await, PluginVerdict::Consumed) {
        return Ok(());
    }

    // Step 4 (reply): prefix a quoted excerpt of the referenced mesh text.
    let mut body = message.body.clone();
    if let Some(reply_to) = &message.in_reply_to {
        let message_map = relay_db::MessageMapStore::new(relay.db());
        if let Some(original) = message_map.by_matrix_event_id(reply_to).await? {
            let quoted = excerpt(original.meshtastic_text.as_deref().unwrap_or(""));
            body = format!("[re: {quoted}] {body}");
        }
    }

    // Step 7: text translation.
    let display_name = crate::identity::resolve_matrix_display_name(&message.sender, message.sender_display_name.as_deref());
    let attributed = format!("[{display_name}]: {body}");
    let truncated = truncate_to_mtu(&attributed);

    let channels = relay.routing().channels_for_room(&message.room_id);
    let mesh_id = relay.next_mesh_message_id();
    let message_map = relay_db::MessageMapStore::new(relay.db());

    for channel in channels {
        if relay.is_shutting_down() {
            break;
        }
        let (tx, rx) = tokio::sync::oneshot::channel();
        relay.mesh_sender().enqueue(SendRequest {
            text: truncated.clone(),
            destination: MeshNodeId::BROADCAST.0,
            channel,
            want_ack: false,
            reply: Some(tx),
        });

        match rx.await {
            Ok(Ok(())) => {
                let row = MessageMapRow {
                    matrix_event_id: message.event_id.clone(),
                    mesh_id: MeshMessageId(mesh_id.0),
                    room_id: message.room_id.clone(),
                    meshtastic_text: Some(truncated.clone()),
                    meshtastic_meshnet: Some(our_meshnet.clone()),
                    created_at: chrono::Utc::now(),
                };
                if let Err(error) = message_map.store(&row).await {
                    tracing::warn!(%error, room = %message.room_id, "failed to store message-map row for matrix forward");
                }
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, room = %message.room_id, channel, "failed to send matrix text to mesh");
            }
            Err(_) => {
                tracing::warn!(room = %message.room_id, "send pacer dropped without replying (shutdown)");
            }
        }
    }

    Ok(())
}

async fn enqueue_to_routed_channels(relay: &Relay, room_id: &RoomId, body: &str) -> anyhow::Result<()> {
    for channel in relay.routing().channels_for_room(room_id) {
        if relay.is_shutting_down() {
            break;
        }
        relay.mesh_sender().enqueue(SendRequest {
            text: truncate_to_mtu(body),
            destination: MeshNodeId::BROADCAST.0,
            channel,
            want_ack: false,
            reply: None,
        });
    }
    Ok(())
}

/// Truncate to the mesh MTU on a UTF-8 boundary, appending an ellipsis
/// when truncation actually occurred (spec §4.7 step 7).
fn truncate_to_mtu(text: &str) -> String {
    if text.len() <= MESH_MTU_BYTES {
        return text.to_string();
    }
    const ELLIPSIS: &str = "...";
    let budget = MESH_MTU_BYTES.saturating_sub(ELLIPSIS.len());
    let mut cut = budget;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], ELLIPSIS)
}

/// A short quoted excerpt of mesh text for reply/reaction forwarding.
fn excerpt(text: &str) -> String {
    const EXCERPT_CHARS: usize = 40;
    let trimmed: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        format!("{trimmed}...")
    } else {
        trimmed
    }
}
