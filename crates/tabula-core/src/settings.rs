//! Engine settings, read from `settings.toml`.
//!
//! Every field has a default, so a partial (or missing) file is fine:
//!
//! ```toml
//! timeout_ms = 500
//! default_shape = { rows = 100, columns = 10, tables = 1 }
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use tabula_engine::Shape;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wall-clock limit for one cell evaluation or macro run.
    pub timeout_ms: u64,
    /// Largest shape a grid may take.
    pub max_shape: Shape,
    /// Shape of a new grid.
    pub default_shape: Shape,
    /// Undo steps kept.
    pub max_undo: usize,
    /// How many cells may be evaluated inside each other before giving up.
    pub max_recursion_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            timeout_ms: 1000,
            max_shape: Shape::new(1_000_000, 100_000, 100),
            default_shape: Shape::new(1000, 100, 3),
            max_undo: 100,
            max_recursion_depth: 64,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.default_shape.checked(&settings.max_shape)?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from the user config dir, falling back to defaults when the
    /// file does not exist.
    pub fn load_default() -> Result<Self> {
        match user_settings_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading settings");
                Self::load(&path)
            }
            _ => Ok(Settings::default()),
        }
    }
}

pub fn user_settings_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "tabula")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("settings.toml");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabulaError;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_toml_str("timeout_ms = 250\n").unwrap();
        assert_eq!(settings.timeout_ms, 250);
        assert_eq!(settings.max_undo, 100);
        assert_eq!(settings.default_shape, Shape::new(1000, 100, 3));
    }

    #[test]
    fn test_invalid_default_shape_rejected() {
        let err = Settings::from_toml_str(
            "default_shape = { rows = 0, columns = 1, tables = 1 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, TabulaError::Shape(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Settings::from_toml_str("timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, TabulaError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_undo = 5").unwrap();
        writeln!(file, "[max_shape]\nrows = 10\ncolumns = 10\ntables = 2").unwrap();
        writeln!(file, "[default_shape]\nrows = 5\ncolumns = 5\ntables = 1").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.max_undo, 5);
        assert_eq!(settings.max_shape, Shape::new(10, 10, 2));
    }
}
