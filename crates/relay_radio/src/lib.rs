//! The Meshtastic-facing half of the relay: picking a transport,
//! keeping it connected (C3) and pacing outbound sends through it (C4).

pub mod cancel;
pub mod connection;
pub mod pacer;
pub mod transport;

pub use cancel::CancellationToken;
pub use connection::{ConnectionEngine, ConnectionEvent, ReconnectConfig};
pub use pacer::{SendPacer, SendPacerHandle, SendRequest};
pub use transport::{MeshGateway, RadioPacket, SharedGateway, TransportError};
