//! Abstraction over the three Meshtastic transports (serial/TCP/BLE).
//!
//! The wire protocol itself is out of scope (spec §1 Non-goals): this
//! module only has to open a stream, hand it to the `meshtastic` crate's
//! `StreamApi`, and translate its decoded packets/errors into the small
//! surface [`connection`](crate::connection) and [`pacer`](crate::pacer)
//! actually need. Anything protocol-shaped (port numbers, payload bytes)
//! is decoded further up in `relay_core`.

use std::time::Duration;

use async_trait::async_trait;
use meshtastic::api::StreamApi;
use meshtastic::packet::PacketReceiver;
use meshtastic::protobufs::{from_radio::PayloadVariant, mesh_packet, FromRadio};
use meshtastic::utils;
use prost::Message;
use relay_protocol::config::{ConnectionType, MeshtasticConfig};
use thiserror::Error;

/// Fallback used when `meshtastic.timeout` isn't a usable bound (spec
/// §4.3 step 2: "must be > 0, else fall back to default with a warning").
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolve the configured open timeout, falling back to the default and
/// warning when the configured value can't bound anything (non-positive,
/// `NaN`, or otherwise not finite).
fn effective_open_timeout(configured_secs: f64) -> Duration {
    if configured_secs.is_finite() && configured_secs > 0.0 {
        Duration::from_secs_f64(configured_secs)
    } else {
        tracing::warn!(
            configured = configured_secs,
            fallback_secs = DEFAULT_OPEN_TIMEOUT.as_secs(),
            "meshtastic.timeout must be > 0, falling back to default"
        );
        DEFAULT_OPEN_TIMEOUT
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {kind} transport: {source}")]
    Open {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("meshtastic connection closed")]
    Closed,
    #[error("meshtastic configure handshake failed: {0}")]
    Configure(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// A decoded inbound packet, already stripped of everything but what
/// `relay_core`'s inbound-radio pipeline (C6) needs to classify it.
#[derive(Debug, Clone)]
pub struct RadioPacket {
    pub id: u32,
    pub from_node: u32,
    pub to_node: u32,
    pub channel: u8,
    pub portnum: u32,
    pub payload: Vec<u8>,
    pub want_ack: bool,
    /// Long/short name pair decoded from a `NODEINFO_APP` payload, if
    /// this packet carried one (spec §4.6 step 2).
    pub user_info: Option<NodeUserInfo>,
}

#[derive(Debug, Clone)]
pub struct NodeUserInfo {
    pub long_name: String,
    pub short_name: String,
}

/// The narrow surface the connection engine and pacer need from a live
/// Meshtastic link, independent of which transport backs it.
#[async_trait]
pub trait MeshGateway: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn disconnect(&mut self);
    async fn recv(&mut self) -> Option<RadioPacket>;
    async fn send_text(
        &mut self,
        text: &str,
        destination: u32,
        channel: u8,
        want_ack: bool,
    ) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;

    /// Periodic liveness probe (spec §4.3 step 4: "periodic liveness
    /// probe, e.g. every 60s; on probe failure, trigger reconnect").
    /// Returns `false` when the link should be considered dead even
    /// though nothing has failed loudly yet (a wedged stream that never
    /// errors but also never delivers anything). The default just checks
    /// [`Self::is_connected`]; `StreamApi` exposes no separate ping, so
    /// there's nothing stronger to ask it for.
    async fn probe(&mut self) -> bool {
        self.is_connected()
    }

    /// Our own node number, learned from the device's `MyNodeInfo` frame
    /// during the configure handshake. `None` until that frame has been
    /// observed (most gateways don't report one at all, hence the
    /// default); only [`StreamGateway`] overrides this.
    fn my_node_id(&self) -> Option<u32> {
        None
    }
}

/// Build the configured transport's gateway. Connection itself happens in
/// [`MeshGateway::connect`], not here, so construction can't fail on a
/// transient link error.
pub fn build_gateway(config: &MeshtasticConfig) -> StreamGateway {
    StreamGateway {
        config: config.clone(),
        state: None,
    }
}

struct ConnectedState {
    api: StreamApi,
    receiver: PacketReceiver,
    /// Captured from the device's `MyNodeInfo` frame, sent as part of the
    /// configure handshake before any `MeshPacket`s arrive.
    my_node_id: Option<u32>,
}

/// `MeshGateway` backed by `meshtastic::api::StreamApi` over whichever
/// stream (`serial`/`tcp`) [`ConnectionType`] selects. BLE is accepted by
/// config validation but not yet wired to a concrete stream builder here;
/// dialing one returns [`TransportError::Open`].
pub struct StreamGateway {
    config: MeshtasticConfig,
    state: Option<ConnectedState>,
}

impl StreamGateway {
    /// The unbounded dial: build the configured stream, hand it to
    /// `StreamApi`, and run the configure handshake. Callers go through
    /// [`MeshGateway::connect`], which wraps this in the `meshtastic.timeout`
    /// bound.
    async fn dial(&mut self) -> Result<(), TransportError> {
        let stream_api = StreamApi::new();
        let connected = match self.config.connection_type.normalized() {
            ConnectionType::Serial => {
                let port = self
                    .config
                    .serial_port
                    .clone()
                    .expect("validated at config load");
                let stream = utils::stream::build_serial_stream(port, None, None, None)
                    .map_err(|e| TransportError::Open {
                        kind: "serial",
                        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                    })?;
                stream_api.connect(stream).await
            }
            ConnectionType::Tcp => {
                let host = self.config.host.clone().expect("validated at config load");
                let stream = utils::stream::build_tcp_stream(host)
                    .await
                    .map_err(|e| TransportError::Open {
                        kind: "tcp",
                        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                    })?;
                stream_api.connect(stream).await
            }
            ConnectionType::Ble => {
                return Err(TransportError::Open {
                    kind: "ble",
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "BLE stream backend not linked in this build",
                    ),
                });
            }
            ConnectionType::Network => unreachable!("normalized() maps Network to Tcp"),
        };
        let (receiver, api) = connected;
        let config_id = utils::generate_rand_id();
        let api = api
            .configure(config_id)
            .await
            .map_err(|e| TransportError::Configure(e.to_string()))?;
        self.state = Some(ConnectedState { api, receiver, my_node_id: None });
        Ok(())
    }
}

#[async_trait]
impl MeshGateway for StreamGateway {
    /// Open the transport, bounded by `meshtastic.timeout` (spec §4.3 step
    /// 2, §5 "Radio open: bounded by `meshtastic.timeout`"). A hung device
    /// — stream never connects, or the configure handshake never
    /// completes — times out instead of blocking startup/reconnect
    /// forever.
    async fn connect(&mut self) -> Result<(), TransportError> {
        let timeout = effective_open_timeout(self.config.timeout);
        match tokio::time::timeout(timeout, self.dial()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Open {
                kind: "handshake",
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("meshtastic open did not complete within {timeout:?}"),
                ),
            }),
        }
    }

    async fn disconnect(&mut self) {
        // Dropping the `StreamApi`/receiver pair closes the underlying
        // stream; the crate has no separate graceful-close handshake.
        self.state = None;
    }

    async fn recv(&mut self) -> Option<RadioPacket> {
        // The configure handshake interleaves `MyNodeInfo`, node list,
        // config and channel frames ahead of (and between) actual
        // `MeshPacket`s. Only the latter decode to a `RadioPacket`;
        // returning `None` on the first non-packet frame would make the
        // connection engine think the link closed, so loop past them
        // instead, capturing `my_node_id` from `MyInfo` as it goes.
        loop {
            let state = self.state.as_mut()?;
            let from_radio: FromRadio = state.receiver.recv().await?;
            if let Some(PayloadVariant::MyInfo(info)) = from_radio.payload_variant.as_ref() {
                state.my_node_id = Some(info.my_node_num);
            }
            if let Some(packet) = decode_packet(from_radio) {
                return Some(packet);
            }
        }
    }

    async fn send_text(
        &mut self,
        text: &str,
        destination: u32,
        channel: u8,
        want_ack: bool,
    ) -> Result<(), TransportError> {
        let state = self.state.as_mut().ok_or(TransportError::Closed)?;
        state
            .api
            .send_text(text.to_string(), destination, channel as u32, want_ack)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    fn my_node_id(&self) -> Option<u32> {
        self.state.as_ref().and_then(|s| s.my_node_id)
    }
}

/// Shares one live [`MeshGateway`] between the connection engine (which
/// drives `recv`) and the send pacer (which drives `send_text`), neither of
/// which otherwise has a reason to know the other exists. Each call takes
/// the lock for just that call; `is_connected`/`my_node_id` use `try_lock`
/// since they're polled from contexts that must not block on an in-flight
/// `recv().await`, and report the conservative default for is_connected
/// (`true`, i.e. "don't assume disconnected") when the lock is contended.
#[derive(Clone)]
pub struct SharedGateway<G> {
    inner: std::sync::Arc<tokio::sync::Mutex<G>>,
}

impl<G: MeshGateway> SharedGateway<G> {
    pub fn new(gateway: G) -> Self {
        Self { inner: std::sync::Arc::new(tokio::sync::Mutex::new(gateway)) }
    }
}

#[async_trait]
impl<G: MeshGateway> MeshGateway for SharedGateway<G> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.inner.lock().await.connect().await
    }

    async fn disconnect(&mut self) {
        self.inner.lock().await.disconnect().await
    }

    async fn recv(&mut self) -> Option<RadioPacket> {
        self.inner.lock().await.recv().await
    }

    async fn probe(&mut self) -> bool {
        self.inner.lock().await.probe().await
    }

    async fn send_text(
        &mut self,
        text: &str,
        destination: u32,
        channel: u8,
        want_ack: bool,
    ) -> Result<(), TransportError> {
        self.inner.lock().await.send_text(text, destination, channel, want_ack).await
    }

    fn is_connected(&self) -> bool {
        self.inner.try_lock().map(|g| g.is_connected()).unwrap_or(true)
    }

    fn my_node_id(&self) -> Option<u32> {
        self.inner.try_lock().ok().and_then(|g| g.my_node_id())
    }
}

fn decode_packet(from_radio: FromRadio) -> Option<RadioPacket> {
    let PayloadVariant::Packet(packet) = from_radio.payload_variant? else {
        return None;
    };
    let data = match packet.payload_variant? {
        mesh_packet::PayloadVariant::Decoded(data) => data,
        // Encrypted packets this node can't decrypt carry no usable payload.
        mesh_packet::PayloadVariant::Encrypted(_) => return None,
    };
    let portnum = data.portnum as u32;
    let user_info = if portnum == 4 {
        meshtastic::protobufs::User::decode(data.payload.as_slice())
            .ok()
            .map(|user| NodeUserInfo { long_name: user.long_name, short_name: user.short_name })
    } else {
        None
    };
    Some(RadioPacket {
        id: packet.id,
        from_node: packet.from,
        to_node: packet.to,
        channel: packet.channel as u8,
        portnum,
        payload: data.payload,
        want_ack: packet.want_ack,
        user_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_timeout_is_used_as_is() {
        assert_eq!(effective_open_timeout(30.0), Duration::from_secs(30));
    }

    #[test]
    fn non_positive_timeout_falls_back_to_default() {
        assert_eq!(effective_open_timeout(0.0), DEFAULT_OPEN_TIMEOUT);
        assert_eq!(effective_open_timeout(-5.0), DEFAULT_OPEN_TIMEOUT);
        assert_eq!(effective_open_timeout(f64::NAN), DEFAULT_OPEN_TIMEOUT);
    }
}
