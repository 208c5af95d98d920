//! `mmrelay install-service` (spec §6 AMBIENT note): print a systemd user
//! unit for running `mmrelay run` under `systemctl --user`. Printed to
//! stdout rather than written directly, same as `generate-config` asks
//! before overwriting anything on disk, except here the caller decides
//! where the unit file belongs.

use anyhow::Result;

use crate::commands::GlobalArgs;

pub fn run(global: GlobalArgs) -> Result<()> {
    let exe = std::env::current_exe().unwrap_or_else(|_| "mmrelay".into());
    let home = global.home.root();

    println!(
        "# Save as ~/.config/systemd/user/mmrelay.service, then:\n\
         #   systemctl --user daemon-reload\n\
         #   systemctl --user enable --now mmrelay\n\
         [Unit]\n\
         Description=Matrix <-> Meshtastic relay\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={} --home {} run\n\
         Restart=on-failure\n\
         RestartSec=10\n\
         \n\
         [Install]\n\
         WantedBy=default.target",
        exe.display(),
        home.display(),
    );
    Ok(())
}
