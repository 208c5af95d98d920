//! Core relay logic: the concurrency bridge between the Matrix and mesh
//! domains (C2), the inbound radio and Matrix handlers (C6/C7), plugin
//! dispatch (C8), and the identity/attribution helpers they share (C9).
//!
//! Nothing in this crate speaks to a concrete Matrix SDK or mesh
//! transport directly — [`mesh_inbound::MatrixSender`] and
//! [`matrix_inbound::MatrixEvent`] are the narrow boundaries the `relay`
//! binary crate implements against. That keeps this crate testable
//! without a live homeserver or radio.

pub mod bridge;
pub mod context;
pub mod dispatch;
pub mod identity;
pub mod matrix_inbound;
pub mod mesh_id;
pub mod mesh_inbound;

pub use bridge::{BridgeError, MatrixBridge};
pub use context::Relay;
pub use dispatch::{clamp_response_delay, DispatchInput, DispatchOutcome, PluginHandler, PluginRegistry};
pub use matrix_inbound::{handle_matrix_event, MatrixEvent, MatrixMessage, MESH_MTU_BYTES};
pub use mesh_id::MeshMessageIdGenerator;
pub use mesh_inbound::{handle_mesh_packet, MatrixSender};
