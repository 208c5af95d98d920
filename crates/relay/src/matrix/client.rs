//! The concrete Matrix collaborator (spec §4.7 AMBIENT note): builds a
//! `matrix-sdk` client, translates its sync events into
//! [`relay_core::MatrixEvent`], and implements [`relay_core::MatrixSender`]
//! so `relay_core` never has to name a concrete SDK type.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::events::reaction::OriginalSyncReactionEvent;
use matrix_sdk::ruma::events::room::message::{
    MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent,
};
use matrix_sdk::ruma::events::room::member::StrippedRoomMemberEvent;
use matrix_sdk::{Client, RoomMemberships};

use relay_core::{handle_matrix_event, MatrixEvent, MatrixMessage, MatrixSender, PluginRegistry, Relay};
use relay_ids::{MatrixEventId, RoomId};

use crate::matrix::credentials::Credentials;

/// Margin beyond which an event at sync startup is treated as stale
/// history rather than something to relay (spec §4.7 step 3).
const MAX_EVENT_AGE_MS: i64 = 5 * 60 * 1000;

/// Thin `Arc<Client>` wrapper: the only concrete Matrix type that crosses
/// into `relay_core`, via the narrow [`MatrixSender`] trait.
#[derive(Clone)]
pub struct RelayMatrixClient {
    client: Client,
}

impl RelayMatrixClient {
    /// Build (but do not log in or sync) a client for `homeserver`, with
    /// its crypto/session store rooted at `store_dir`.
    pub async fn build(homeserver: &str, store_dir: &std::path::Path) -> Result<Self> {
        let client = Client::builder()
            .homeserver_url(homeserver)
            .sqlite_store(store_dir, None)
            .build()
            .await
            .context("failed to build matrix client")?;
        Ok(Self { client })
    }

    /// Restore a previously-saved session (the common `Run` path).
    pub async fn restore(&self, credentials: &Credentials) -> Result<()> {
        use matrix_sdk::matrix_auth::MatrixSession;
        use matrix_sdk::ruma::OwnedUserId;
        use matrix_sdk::SessionMeta;

        let user_id: OwnedUserId = credentials
            .user_id
            .parse()
            .with_context(|| format!("invalid matrix user id {:?}", credentials.user_id))?;
        let session = MatrixSession {
            meta: SessionMeta {
                user_id,
                device_id: credentials.device_id.as_str().into(),
            },
            tokens: matrix_sdk::matrix_auth::MatrixSessionTokens {
                access_token: credentials.access_token.clone(),
                refresh_token: None,
            },
        };
        self.client
            .matrix_auth()
            .restore_session(session)
            .await
            .context("failed to restore matrix session")
    }

    /// Interactive password login (the `Auth` subcommand's path), returning
    /// credentials ready to persist.
    pub async fn login_password(&self, username: &str, password: &str) -> Result<Credentials> {
        let response = self
            .client
            .matrix_auth()
            .login_username(username, password)
            .initial_device_display_name("mmrelay")
            .send()
            .await
            .context("matrix login failed")?;
        Ok(Credentials {
            homeserver: self.client.homeserver().to_string(),
            user_id: response.user_id.to_string(),
            access_token: response.access_token,
            device_id: response.device_id.to_string(),
        })
    }

    pub fn our_user_id(&self) -> String {
        self.client
            .user_id()
            .map(|id| id.to_string())
            .unwrap_or_default()
    }

    /// Join every configured room we're not already a member of, by ID or
    /// alias, so `Run` doesn't require the operator to invite the bot
    /// separately (spec §6 AMBIENT note).
    pub async fn ensure_joined(&self, room_ids: &[&RoomId]) -> Result<()> {
        for room_id in room_ids {
            if self.client.get_room(&parse_room_or_alias(room_id)?).is_some() {
                continue;
            }
            if let Err(error) = self.client.join_room_by_id_or_alias(room_id.as_str(), &[]).await {
                tracing::warn!(room = %room_id, %error, "failed to join configured matrix room");
            }
        }
        Ok(())
    }

    /// Register the C7 event handlers and run the sync loop until the
    /// relay's cancellation token fires.
    pub async fn run_sync_loop(&self, relay: Relay, plugins: Arc<PluginRegistry>) -> Result<()> {
        let our_user_id = self.our_user_id();
        let sync_start_ts = chrono::Utc::now().timestamp_millis();

        {
            let relay = relay.clone();
            let plugins = plugins.clone();
            let our_user_id = our_user_id.clone();
            self.client.add_event_handler(
                move |event: OriginalSyncRoomMessageEvent, room: Room| {
                    let relay = relay.clone();
                    let plugins = plugins.clone();
                    let our_user_id = our_user_id.clone();
                    async move {
                        let message = translate_message(&event, &room).await;
                        let matrix_event = match event.content.msgtype {
                            MessageType::Emote(_) => MatrixEvent::Emote(message),
                            MessageType::Notice(_) => MatrixEvent::Notice(message),
                            _ => MatrixEvent::Text(message),
                        };
                        if let Err(error) = handle_matrix_event(
                            &relay,
                            &plugins,
                            matrix_event,
                            &our_user_id,
                            sync_start_ts,
                            MAX_EVENT_AGE_MS,
                        )
                        .await
                        {
                            tracing::warn!(%error, "matrix message handler failed");
                        }
                    }
                },
            );
        }

        {
            let relay = relay.clone();
            let plugins = plugins.clone();
            let our_user_id = our_user_id.clone();
            self.client.add_event_handler(
                move |event: OriginalSyncReactionEvent, room: Room| {
                    let relay = relay.clone();
                    let plugins = plugins.clone();
                    let our_user_id = our_user_id.clone();
                    async move {
                        let matrix_event = MatrixEvent::Reaction {
                            event_id: MatrixEventId::new(event.event_id.to_string()),
                            room_id: RoomId::new(room.room_id().to_string()),
                            sender: event.sender.to_string(),
                            sender_display_name: display_name_of(&room, &event.sender).await,
                            relates_to: MatrixEventId::new(event.content.relates_to.event_id.to_string()),
                            emoji: event.content.relates_to.key.clone(),
                            origin_server_ts: event.origin_server_ts.get().into(),
                        };
                        if let Err(error) = handle_matrix_event(
                            &relay,
                            &plugins,
                            matrix_event,
                            &our_user_id,
                            sync_start_ts,
                            MAX_EVENT_AGE_MS,
                        )
                        .await
                        {
                            tracing::warn!(%error, "matrix reaction handler failed");
                        }
                    }
                },
            );
        }

        {
            let relay = relay.clone();
            self.client.add_event_handler(move |event: StrippedRoomMemberEvent, room: Room| {
                let relay = relay.clone();
                async move {
                    let joined = matches!(
                        event.content.membership,
                        matrix_sdk::ruma::events::room::member::MembershipState::Join
                    );
                    let matrix_event = MatrixEvent::Membership {
                        room_id: RoomId::new(room.room_id().to_string()),
                        user_id: event.state_key.to_string(),
                        joined,
                    };
                    // Membership carries no handler-level error path worth
                    // surfacing; C7 treats it as pure bookkeeping.
                    let _ = handle_matrix_event(&relay, &PluginRegistry::new(Vec::new()), matrix_event, "", 0, 0).await;
                }
            });
        }

        let settings = SyncSettings::default().timeout(Duration::from_secs(30));
        loop {
            if relay.is_shutting_down() {
                return Ok(());
            }
            if let Err(error) = self.client.sync_once(settings.clone()).await {
                tracing::warn!(%error, "matrix sync iteration failed, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[async_trait]
impl MatrixSender for RelayMatrixClient {
    async fn send_text(&self, room_id: &RoomId, body: &str) -> anyhow::Result<MatrixEventId> {
        let room_or_alias = parse_room_or_alias(room_id)?;
        let room = self
            .client
            .get_room(&room_or_alias)
            .with_context(|| format!("not joined to room {room_id}"))?;
        let response = room
            .send(RoomMessageEventContent::text_plain(body))
            .await
            .with_context(|| format!("failed to send to room {room_id}"))?;
        Ok(MatrixEventId::new(response.event_id.to_string()))
    }
}

fn parse_room_or_alias(room_id: &RoomId) -> Result<matrix_sdk::ruma::OwnedRoomId> {
    room_id
        .as_str()
        .try_into()
        .with_context(|| format!("{:?} is not a valid matrix room id", room_id.as_str()))
}

async fn display_name_of(room: &Room, user_id: &matrix_sdk::ruma::UserId) -> Option<String> {
    room.get_member(user_id)
        .await
        .ok()
        .flatten()
        .and_then(|member| member.display_name().map(|s| s.to_string()))
}

async fn translate_message(event: &OriginalSyncRoomMessageEvent, room: &Room) -> MatrixMessage {
    let body = match &event.content.msgtype {
        MessageType::Text(text) => text.body.clone(),
        MessageType::Emote(emote) => emote.body.clone(),
        MessageType::Notice(notice) => notice.body.clone(),
        other => other.body().to_string(),
    };
    let in_reply_to = event
        .content
        .relates_to
        .as_ref()
        .and_then(|relation| match relation {
            matrix_sdk::ruma::events::room::message::Relation::Reply { in_reply_to } => {
                Some(MatrixEventId::new(in_reply_to.event_id.to_string()))
            }
            _ => None,
        });
    MatrixMessage {
        event_id: MatrixEventId::new(event.event_id.to_string()),
        room_id: RoomId::new(room.room_id().to_string()),
        sender: event.sender.to_string(),
        sender_display_name: display_name_of(room, &event.sender).await,
        body,
        origin_server_ts: event.origin_server_ts.get().into(),
        in_reply_to,
    }
}

/// Every member currently joined to `room`, for plugins that need a
/// roster (not exercised by the core pipeline itself).
#[allow(dead_code)]
async fn joined_members(room: &Room) -> Result<Vec<String>> {
    let members = room
        .members(RoomMemberships::JOIN)
        .await
        .context("failed to list room members")?;
    Ok(members.into_iter().map(|m| m.user_id().to_string()).collect())
}
