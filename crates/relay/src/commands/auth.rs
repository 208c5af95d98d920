//! `mmrelay auth` (spec §6 AMBIENT note): interactive password login,
//! saving the resulting session to `credentials.json` so `run` never
//! needs a bare `matrix.access_token` in config.

use anyhow::{Context, Result};

use crate::commands::GlobalArgs;
use crate::matrix::RelayMatrixClient;

pub async fn run(global: GlobalArgs, homeserver: String, username: String) -> Result<()> {
    let password = rpassword::prompt_password(format!("Matrix password for {username}: "))
        .context("failed to read password")?;

    let store_dir = global.home.matrix_store_dir();
    let client = RelayMatrixClient::build(&homeserver, &store_dir)
        .await
        .context("failed to build matrix client")?;
    let credentials = client
        .login_password(&username, &password)
        .await
        .context("login failed")?;

    let path = global.home.credentials_path();
    credentials.save(&path)?;
    println!("logged in as {} on {}, saved credentials to {}", credentials.user_id, credentials.homeserver, path.display());
    Ok(())
}
