//! Plugin contract types (spec C8, §4.8, §9 "dynamic dispatch -> tagged variants").

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a plugin handler decided to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginVerdict {
    /// Stop the pipeline; no further plugin or core handling runs.
    Consumed,
    /// Let the message continue through the pipeline.
    Passthrough,
}

/// Static metadata a plugin declares about itself (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub priority: i32,
    pub matrix_commands: HashSet<String>,
    pub mesh_commands: HashSet<String>,
    /// Mesh channels this plugin is active on. Empty means all channels.
    pub channels: HashSet<u8>,
}

impl PluginDescriptor {
    pub fn is_active_on_channel(&self, channel: u8) -> bool {
        self.channels.is_empty() || self.channels.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_channel_set_means_all_channels_active() {
        let d = PluginDescriptor {
            name: "weather".into(),
            priority: 10,
            matrix_commands: HashSet::new(),
            mesh_commands: HashSet::new(),
            channels: HashSet::new(),
        };
        assert!(d.is_active_on_channel(0));
        assert!(d.is_active_on_channel(7));
    }

    #[test]
    fn explicit_channel_set_restricts_activity() {
        let d = PluginDescriptor {
            name: "weather".into(),
            priority: 10,
            matrix_commands: HashSet::new(),
            mesh_commands: HashSet::new(),
            channels: [2].into_iter().collect(),
        };
        assert!(d.is_active_on_channel(2));
        assert!(!d.is_active_on_channel(0));
    }
}
