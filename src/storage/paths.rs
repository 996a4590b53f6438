//! Platform config location.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};

/// Where spendbar keeps its files on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config: PathBuf,
}

impl AppPaths {
    /// Resolve the platform config directory, falling back to
    /// `~/.config/spendbar` when the platform lookup fails.
    #[must_use]
    pub fn new() -> Self {
        let config = ProjectDirs::from("com", "spendbar", "spendbar").map_or_else(
            || {
                BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf())
                    .join(".config")
                    .join("spendbar")
            },
            |dirs| dirs.config_dir().to_path_buf(),
        );
        Self { config }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
