//! Meshtastic payload port numbers routed by the core (spec §4.6).
//!
//! The set of port numbers the core classifies by name is normative per
//! spec §4.6/§9: text and detection-sensor are handled directly, telemetry
//! and position are handed to plugins untouched, everything else is handed
//! to plugin dispatch only. New kinds are added only via explicit plugin
//! opt-in, not by silently widening this match.

/// A decoded packet's payload kind, as tagged by `decoded.portnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortNumber {
    TextMessageApp,
    DetectionSensorApp,
    TelemetryApp,
    PositionApp,
    NodeInfoApp,
    /// Any port number the core has no dedicated handling for. Still
    /// offered to plugin dispatch.
    Other(u32),
}

impl PortNumber {
    /// Raw Meshtastic `PortNum` protobuf values, per the firmware's own enum.
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => PortNumber::TextMessageApp,
            4 => PortNumber::NodeInfoApp,
            3 => PortNumber::PositionApp,
            67 => PortNumber::TelemetryApp,
            10 => PortNumber::DetectionSensorApp,
            other => PortNumber::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            PortNumber::TextMessageApp => 1,
            PortNumber::NodeInfoApp => 4,
            PortNumber::PositionApp => 3,
            PortNumber::TelemetryApp => 67,
            PortNumber::DetectionSensorApp => 10,
            PortNumber::Other(v) => v,
        }
    }

    /// Whether the core formats this kind itself (text only) versus
    /// delegating entirely to plugins.
    pub fn is_core_text(self) -> bool {
        matches!(self, PortNumber::TextMessageApp)
    }
}
