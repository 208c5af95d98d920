//! `mmrelay` entry point (spec §6 AMBIENT note): parse the CLI, resolve
//! the home directory and config path, initialize logging, and dispatch
//! to the selected subcommand. Modeled on the teacher's `fn main() ->
//! ExitCode` plus `tracing_subscriber::registry()` shape, scaled down to
//! this binary's much smaller command surface.

mod cli;
mod commands;
mod matrix;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use relay_protocol::HomeDir;

use cli::{Cli, Commands};
use commands::GlobalArgs;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let home = HomeDir::resolve(cli.home.as_deref());
    if home.used_legacy_env {
        // Logging isn't initialized yet at this point, so this goes straight
        // to stderr; it's the one diagnostic worth seeing even if config
        // loading later fails outright.
        eprintln!("MMRELAY_BASE_DIR/MMRELAY_DATA_DIR are deprecated, use MMRELAY_HOME instead");
    }
    if let Err(error) = home.ensure_dirs() {
        eprintln!("failed to create home directory layout at {}: {error}", home.root().display());
        return ExitCode::FAILURE;
    }

    let config_path = resolve_config_path(&home, cli.config.as_deref());
    let logging_level = relay_protocol::config::Config::load_from_path(&config_path, true)
        .map(|config| config.logging.level)
        .unwrap_or_default();
    if let Err(error) = relay_logging::init_logging(relay_logging::LogConfig {
        home: &home,
        level: logging_level,
        file_override: None,
        verbose: cli.verbose,
    }) {
        eprintln!("failed to initialize logging: {error}");
        return ExitCode::FAILURE;
    }

    let global = GlobalArgs { home, config_path, verbose: cli.verbose };
    let result = match cli.command() {
        Commands::Run => run_async(commands::run::run(global)),
        Commands::GenerateConfig { force } => commands::generate_config::run(global, *force),
        Commands::CheckConfig => commands::check_config::run(global),
        Commands::Auth { homeserver, username } => {
            run_async(commands::auth::run(global, homeserver.clone(), username.clone()))
        }
        Commands::InstallService => commands::install_service::run(global),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "mmrelay exited with an error");
            eprintln!("error: {error:?}");
            ExitCode::FAILURE
        }
    }
}

/// Build the single multi-thread Tokio runtime the whole process shares
/// (spec §9: one runtime, the Matrix sync loop and radio tasks all run on
/// it) and drive `future` to completion on it.
fn run_async<F: std::future::Future<Output = anyhow::Result<()>>>(future: F) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| anyhow::anyhow!("failed to start tokio runtime: {error}"))?;
    runtime.block_on(future)
}

/// Config path search order (spec §6): an explicit `--config` always
/// wins, even if the file doesn't exist yet (so `check-config`/`run`
/// surface a clear "file not found" rather than silently falling back);
/// otherwise `<home>/config.yaml` if present; otherwise `./config.yaml`
/// if present and distinct from the home path; otherwise the home path,
/// so callers always get a path to try loading (and fail informatively
/// on) rather than an `Option`.
fn resolve_config_path(home: &HomeDir, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let home_config = home.config_path();
    if home_config.is_file() {
        return home_config;
    }
    let cwd_config = PathBuf::from("config.yaml");
    if cwd_config.is_file() && cwd_config != home_config {
        return cwd_config;
    }
    home_config
}
