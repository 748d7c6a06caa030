//! Application paths for portable and installed modes
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps the
//!   config, journal and logs in the executable's directory.
//! - **Installed mode** (default): data lives in the platform data directory
//!   under `Rig Remote`.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Rig Remote";

/// Application paths for config, journal and logs
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Directory holding the sled journal
    pub state_dir: PathBuf,
    /// Directory for rolling tracing logs
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the paths from the executable location and platform dirs
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        // In debug builds a rig.yaml in the working directory wins
        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("rig.yaml").exists() {
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            Self::portable(&exe_dir)
        } else {
            let data_dir = dirs::data_dir().unwrap_or_else(|| exe_dir.clone());
            Self::installed(&data_dir.join(APP_NAME))
        }
    }

    /// All files next to `base`
    pub fn portable(base: &Path) -> Self {
        Self {
            config: base.join("rig.yaml"),
            state_dir: base.join(".state"),
            logs_dir: base.join("logs"),
            is_portable: true,
        }
    }

    /// Files under an application data directory
    pub fn installed(app_data: &Path) -> Self {
        Self {
            config: app_data.join("rig.yaml"),
            state_dir: app_data.join("state"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Override the config location (command line)
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = config.into();
        self
    }

    /// Directory used for display in logs
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the state and log directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// sled database holding the event journal
    pub fn journal_db_path(&self) -> PathBuf {
        self.state_dir.join("journal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_portable_layout() {
        let paths = AppPaths::portable(Path::new("rig"));
        assert!(paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("rig/rig.yaml"));
        assert_eq!(paths.journal_db_path(), PathBuf::from("rig/.state/journal"));
        assert_eq!(paths.base_dir(), PathBuf::from("rig"));
    }

    #[test]
    fn test_config_override_and_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::installed(temp_dir.path()).with_config("custom.yaml");
        assert!(!paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("custom.yaml"));

        paths.ensure_directories().unwrap();
        assert!(paths.state_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
    }
}
