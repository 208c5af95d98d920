//! Home-directory resolution and the on-disk layout under it (spec §6).
//!
//! Precedence, highest first: an explicit `--home` CLI flag, then
//! `MMRELAY_HOME`, then the legacy `MMRELAY_BASE_DIR`/`MMRELAY_DATA_DIR`
//! pair (deprecated, logged once), then a platform default
//! (`~/.mmrelay` on Unix, the platform data dir from [`dirs`] elsewhere).

use std::path::{Path, PathBuf};

/// Resolved once at startup and threaded through everywhere a path is
/// needed, rather than re-resolving `MMRELAY_HOME` on every lookup.
#[derive(Debug, Clone)]
pub struct HomeDir {
    root: PathBuf,
    /// Set when resolution fell back to the legacy env vars, so the
    /// caller can log a deprecation warning exactly once.
    pub used_legacy_env: bool,
}

impl HomeDir {
    pub fn resolve(cli_home: Option<&Path>) -> HomeDir {
        if let Some(path) = cli_home {
            return HomeDir { root: path.to_path_buf(), used_legacy_env: false };
        }
        if let Ok(value) = std::env::var("MMRELAY_HOME") {
            if !value.is_empty() {
                return HomeDir { root: PathBuf::from(value), used_legacy_env: false };
            }
        }
        let base = std::env::var("MMRELAY_BASE_DIR").ok().filter(|v| !v.is_empty());
        let data = std::env::var("MMRELAY_DATA_DIR").ok().filter(|v| !v.is_empty());
        if base.is_some() || data.is_some() {
            let root = PathBuf::from(data.or(base).expect("checked is_some above"));
            return HomeDir { root, used_legacy_env: true };
        }
        HomeDir { root: default_home(), used_legacy_env: false }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_dir().join("meshtastic.sqlite")
    }

    pub fn matrix_store_dir(&self) -> PathBuf {
        self.root.join("matrix").join("store")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.logs_dir().join("mmrelay.log")
    }

    pub fn plugins_custom_dir(&self) -> PathBuf {
        self.root.join("plugins").join("custom")
    }

    pub fn plugins_community_dir(&self) -> PathBuf {
        self.root.join("plugins").join("community")
    }

    /// Create every directory this layout needs, idempotently.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.root.clone(),
            self.database_dir(),
            self.matrix_store_dir(),
            self.logs_dir(),
            self.plugins_custom_dir(),
            self.plugins_community_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mmrelay")
}

#[cfg(not(unix))]
fn default_home() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mmrelay")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        std::env::remove_var("MMRELAY_HOME");
        std::env::remove_var("MMRELAY_BASE_DIR");
        std::env::remove_var("MMRELAY_DATA_DIR");
    }

    #[test]
    fn cli_flag_takes_precedence_over_everything() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("MMRELAY_HOME", "/from/env");
        let home = HomeDir::resolve(Some(Path::new("/from/cli")));
        assert_eq!(home.root(), Path::new("/from/cli"));
        assert!(!home.used_legacy_env);
        clear_env();
    }

    #[test]
    fn mmrelay_home_env_is_used_when_no_cli_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("MMRELAY_HOME", "/from/env");
        let home = HomeDir::resolve(None);
        assert_eq!(home.root(), Path::new("/from/env"));
        assert!(!home.used_legacy_env);
        clear_env();
    }

    #[test]
    fn legacy_env_vars_are_used_as_fallback_and_flagged() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("MMRELAY_DATA_DIR", "/legacy/data");
        let home = HomeDir::resolve(None);
        assert_eq!(home.root(), Path::new("/legacy/data"));
        assert!(home.used_legacy_env);
        clear_env();
    }

    #[test]
    fn layout_paths_are_rooted_under_home() {
        let home = HomeDir { root: PathBuf::from("/x"), used_legacy_env: false };
        assert_eq!(home.config_path(), PathBuf::from("/x/config.yaml"));
        assert_eq!(home.database_path(), PathBuf::from("/x/database/meshtastic.sqlite"));
        assert_eq!(home.matrix_store_dir(), PathBuf::from("/x/matrix/store"));
        assert_eq!(home.log_file_path(), PathBuf::from("/x/logs/mmrelay.log"));
        assert_eq!(home.plugins_custom_dir(), PathBuf::from("/x/plugins/custom"));
        assert_eq!(home.plugins_community_dir(), PathBuf::from("/x/plugins/community"));
    }
}
