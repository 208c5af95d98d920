//! `mmrelay generate-config` (spec §6 AMBIENT note): write a commented
//! sample `config.yaml` into the resolved home directory. The core has
//! no opinion on what a sample config looks like, so this lives entirely
//! in the binary crate.

use anyhow::{Context, Result};

use crate::commands::GlobalArgs;

const SAMPLE_CONFIG: &str = r#"# mmrelay sample configuration. Edit the values below, then run
# `mmrelay check-config` to validate before `mmrelay run`.

matrix:
  homeserver: "https://matrix.org"
  # Leave unset if a credentials.json (written by `mmrelay auth`) is present.
  access_token: ""
  bot_user_id: "@mmrelay:matrix.org"
  e2ee:
    enabled: false

matrix_rooms:
  - id: "!roomid:matrix.org"
    meshtastic_channel: 0

meshtastic:
  connection_type: serial
  serial_port: /dev/ttyUSB0
  # host: 192.168.1.50       # used when connection_type is tcp
  # ble_address: AA:BB:CC:DD:EE:FF  # used when connection_type is ble
  broadcast_enabled: true
  detection_sensor: false
  message_delay: 2.1
  meshnet_name: "default"
  timeout: 60.0

database:
  msg_map:
    wipe_on_restart: false
    msgs_to_keep: ~
  pool:
    enabled: true
    max_connections: 10
    max_idle_time: 300
    timeout: 30

plugins: {}

logging:
  level: info
  # file: /custom/path/mmrelay.log
"#;

pub fn run(global: GlobalArgs, force: bool) -> Result<()> {
    let path = global.home.config_path();
    if path.is_file() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, SAMPLE_CONFIG)
        .with_context(|| format!("failed to write sample config to {}", path.display()))?;
    println!("wrote sample config to {}", path.display());
    Ok(())
}
