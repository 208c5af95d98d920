//! Opaque identifier types shared across the relay crates.
//!
//! None of these are UUIDs: Matrix event/room IDs are homeserver-opaque
//! strings and mesh node/message IDs are 32-bit integers assigned by
//! firmware, so each gets its own small newtype rather than a shared
//! UUID-backed macro.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast destination sentinel used by the mesh firmware.
pub const BROADCAST_NODE: u32 = 0xFFFF_FFFF;

/// A Matrix event ID, e.g. `$abc123:example.org`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixEventId(String);

impl MatrixEventId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatrixEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MatrixEventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A Matrix room identifier, either `!opaque:server` or `#alias:server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Room IDs start with `!`; aliases start with `#`. Anything else is malformed.
    pub fn is_well_formed(&self) -> bool {
        self.0.starts_with('!') || self.0.starts_with('#')
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A Meshtastic node ID: a 32-bit integer, conventionally rendered `!hex8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshNodeId(pub u32);

impl MeshNodeId {
    pub const BROADCAST: MeshNodeId = MeshNodeId(BROADCAST_NODE);

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_NODE
    }

    /// Render as `!<hex8>`, the firmware's own display convention.
    pub fn as_hex(&self) -> String {
        format!("!{:08x}", self.0)
    }
}

impl fmt::Display for MeshNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl From<u32> for MeshNodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A Meshtastic packet/message ID: a 32-bit integer assigned by the sending node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshMessageId(pub u32);

impl fmt::Display for MeshMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MeshMessageId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
