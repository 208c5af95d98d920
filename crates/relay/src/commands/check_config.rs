//! `mmrelay check-config` (spec §6 AMBIENT note): load and validate the
//! config, open the database pool to confirm it's reachable, and print a
//! short diagnostic summary. Never touches Matrix or the radio: this is a
//! config-only sanity check, not a dry run of `run`.

use anyhow::{Context, Result};

use relay_protocol::Config;

use crate::commands::GlobalArgs;

pub fn run(global: GlobalArgs) -> Result<()> {
    let has_credentials_file = global.home.credentials_path().is_file();
    let config = Config::load_from_path(&global.config_path, has_credentials_file).with_context(|| {
        format!("config at {} is invalid", global.config_path.display())
    })?;

    println!("config ok: {}", global.config_path.display());
    println!("  matrix homeserver: {}", config.matrix.homeserver);
    println!("  matrix bot user: {}", config.matrix.bot_user_id);
    println!("  e2ee enabled: {}", config.matrix.e2ee.enabled);
    println!("  rooms configured: {}", config.matrix_rooms.len());
    for room in &config.matrix_rooms {
        println!("    {} -> channel {}", room.id, room.meshtastic_channel);
    }
    println!(
        "  meshtastic: {:?} (message_delay={}s, meshnet_name={:?})",
        config.meshtastic.connection_type, config.message_delay(), config.meshtastic.meshnet_name
    );

    let db_path = global.home.database_path();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime for database check")?;
    let stats = runtime
        .block_on(check_database(&db_path, &config))
        .context("failed to open database")?;
    println!(
        "  database: {} (pool_size={}, active={}, idle={})",
        db_path.display(),
        stats.pool_size,
        stats.active_connections,
        stats.idle_connections
    );

    if global.home.credentials_path().is_file() {
        println!("  credentials: found at {}", global.home.credentials_path().display());
    } else if config.matrix.access_token.is_some() {
        println!("  credentials: using matrix.access_token from config");
    } else {
        println!("  credentials: none found, run `mmrelay auth` before `mmrelay run`");
    }

    Ok(())
}

async fn check_database(db_path: &std::path::Path, config: &Config) -> Result<relay_db::PoolStats> {
    let pool = relay_db::open(db_path, &config.database.pool).await?;
    let stats = relay_db::pool_stats(&pool);
    pool.close().await;
    Ok(stats)
}
