//! The in-memory routing table binding Matrix rooms to mesh channels (§3).
//!
//! Built once from config at startup and read-only thereafter (spec §5). A
//! room may appear multiple times only with distinct channels, and a
//! channel may appear multiple times with distinct rooms; lookup is a
//! plain linear scan since the table is tiny (a handful of rooms at most).

use relay_ids::RoomId;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub room_id: RoomId,
    pub channel: u8,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
}

impl RoutingTable {
    pub fn new(entries: Vec<RoutingEntry>) -> Self {
        Self { entries }
    }

    /// Build the table from a loaded config's `matrix_rooms` list.
    /// Channel values are already range-validated by
    /// [`Config::validate`](crate::config::Config::validate) before this
    /// runs, so the cast from the validated `i64` is infallible in
    /// practice.
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .matrix_rooms
            .iter()
            .map(|room| RoutingEntry {
                room_id: RoomId::new(room.id.clone()),
                channel: room.meshtastic_channel as u8,
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    /// All rooms mapped from a given mesh channel, in config order.
    pub fn rooms_for_channel(&self, channel: u8) -> Vec<&RoomId> {
        self.entries
            .iter()
            .filter(|e| e.channel == channel)
            .map(|e| &e.room_id)
            .collect()
    }

    /// All channels a given Matrix room is mapped to, in config order.
    pub fn channels_for_room(&self, room_id: &RoomId) -> Vec<u8> {
        self.entries
            .iter()
            .filter(|e| &e.room_id == room_id)
            .map(|e| e.channel)
            .collect()
    }

    /// Every room known to the table, regardless of channel. Used for DM
    /// delivery when `meshtastic.broadcast_enabled` treats a direct message
    /// as deliverable to all mapped rooms (spec §4.6 step 4, default).
    pub fn all_rooms(&self) -> Vec<&RoomId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&&entry.room_id) {
                seen.push(&entry.room_id);
            }
        }
        seen
    }

    pub fn is_room_routed(&self, room_id: &RoomId) -> bool {
        self.entries.iter().any(|e| &e.room_id == room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        RoutingTable::new(vec![
            RoutingEntry { room_id: RoomId::new("!a:s"), channel: 0 },
            RoutingEntry { room_id: RoomId::new("!b:s"), channel: 0 },
            RoutingEntry { room_id: RoomId::new("!a:s"), channel: 1 },
        ])
    }

    #[test]
    fn rooms_for_channel_returns_all_matches() {
        let t = table();
        let rooms: Vec<String> = t
            .rooms_for_channel(0)
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect();
        assert_eq!(rooms, vec!["!a:s".to_string(), "!b:s".to_string()]);
    }

    #[test]
    fn channels_for_room_returns_all_matches() {
        let t = table();
        assert_eq!(t.channels_for_room(&RoomId::new("!a:s")), vec![0, 1]);
    }

    #[test]
    fn unrouted_channel_returns_empty() {
        let t = table();
        assert!(t.rooms_for_channel(7).is_empty());
    }

    #[test]
    fn from_config_builds_entries_from_matrix_rooms() {
        let yaml = r#"
matrix:
  homeserver: "https://matrix.example.org"
  access_token: "tok"
  bot_user_id: "@bot:example.org"
matrix_rooms:
  - id: "!a:s"
    meshtastic_channel: 0
  - id: "!b:s"
    meshtastic_channel: 2
meshtastic:
  connection_type: serial
  serial_port: /dev/ttyUSB0
"#;
        let config = crate::config::Config::load_from_str(yaml, false).unwrap();
        let table = RoutingTable::from_config(&config);
        assert_eq!(table.rooms_for_channel(0), vec![&RoomId::new("!a:s")]);
        assert_eq!(table.rooms_for_channel(2), vec![&RoomId::new("!b:s")]);
    }
}
