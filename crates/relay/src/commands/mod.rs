//! One module per subcommand, following the teacher's `cli/` convention:
//! an `Args` struct (here, the shared [`GlobalArgs`] resolved in `main`)
//! and a `pub fn run(...)`/`pub async fn run(...)` entry point per module.

pub mod auth;
pub mod check_config;
pub mod generate_config;
pub mod install_service;
pub mod run;

use std::path::PathBuf;

use relay_protocol::HomeDir;

/// Resolved once in `main` from `Cli`'s global flags and threaded into
/// every subcommand, instead of each one re-reading `std::env`/argv.
pub struct GlobalArgs {
    pub home: HomeDir,
    pub config_path: PathBuf,
    pub verbose: bool,
}
