//! Per-user directories for configuration and logs.
//!
//! `CHATHUB_HOME` overrides both, which keeps test runs and portable
//! installs out of the user's real profile.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{ChatError, ChatResult};

/// Environment variable that relocates every ChatHub directory.
pub const HOME_ENV: &str = "CHATHUB_HOME";

/// Directory lookup rooted at the OS conventions or at `CHATHUB_HOME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    home: Option<PathBuf>,
}

impl Platform {
    /// Read the override from the environment.
    pub fn from_env() -> Self {
        let home = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty());
        Self { home }
    }

    /// Root every directory at `home`.
    pub fn rooted_at(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    /// Where `config.toml` lives: `<config dir>/ChatHub`.
    pub fn config_dir(&self) -> ChatResult<PathBuf> {
        self.resolve(dirs::config_dir, "config")
    }

    /// Where the rolling log files go: `<data dir>/ChatHub/logs`.
    pub fn log_dir(&self) -> ChatResult<PathBuf> {
        Ok(self.resolve(dirs::data_dir, "data")?.join("logs"))
    }

    fn resolve(&self, os_dir: fn() -> Option<PathBuf>, kind: &str) -> ChatResult<PathBuf> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        os_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or_else(|| ChatError::Config(format!("could not determine the {kind} directory")))
    }
}
