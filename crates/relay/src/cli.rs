//! Top-level CLI surface (spec §6 AMBIENT note), grounded on the
//! teacher's top-level-args-plus-subcommand `Cli`/`Commands` shape.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mmrelay", about = "Bidirectional Matrix <-> Meshtastic relay")]
pub struct Cli {
    /// Explicit home directory, overriding MMRELAY_HOME and the platform default.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Explicit config file path, overriding the default search under `home`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Mirror the file log filter onto stderr instead of warn-only output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to Matrix and the mesh and relay messages until stopped. The default when no subcommand is given.
    Run,
    /// Write a sample config.yaml into the resolved home directory.
    GenerateConfig {
        /// Overwrite an existing config.yaml.
        #[arg(long)]
        force: bool,
    },
    /// Load and validate config.yaml without connecting to anything.
    CheckConfig,
    /// Log in to Matrix interactively and write credentials.json.
    Auth {
        /// Matrix homeserver URL, e.g. https://matrix.org.
        #[arg(long)]
        homeserver: String,
        /// Matrix username (without the @ or :server part).
        #[arg(long)]
        username: String,
    },
    /// Print a systemd unit file for running the relay as a service.
    InstallService,
}

impl Cli {
    /// `Run` is the default when no subcommand is given, matching the
    /// teacher's "bare invocation does the main thing" convention.
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Run)
    }
}
