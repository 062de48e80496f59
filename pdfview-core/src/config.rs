use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blob::PDF_MIME_TYPE;
use crate::error::ConfigError;

pub const DEFAULT_ZOOM_MIN: f32 = 0.5;
pub const DEFAULT_ZOOM_MAX: f32 = 2.0;
pub const DEFAULT_ZOOM_STEP: f32 = 0.1;
pub const DEFAULT_SCALE: f32 = 1.0;

pub const PDFIUM_LIBRARY_ENV: &str = "PDFVIEW_PDFIUM_LIBRARY_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub zoom_step: f32,
    pub accepted_mime_type: String,
    /// Initial dark-mode flag for a fresh session.
    pub dark_mode: bool,
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom_min: DEFAULT_ZOOM_MIN,
            zoom_max: DEFAULT_ZOOM_MAX,
            zoom_step: DEFAULT_ZOOM_STEP,
            accepted_mime_type: PDF_MIME_TYPE.to_string(),
            dark_mode: false,
            pdfium_library_path: None,
        }
    }
}

impl ViewerConfig {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("net", "pdfview", "pdfview")
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = [self.zoom_min, self.zoom_max, self.zoom_step];
        if bounds.iter().any(|value| !value.is_finite() || *value <= 0.0) {
            return Err(ConfigError::Invalid(
                "zoom bounds and step must be positive".to_string(),
            ));
        }
        if self.zoom_min > self.zoom_max {
            return Err(ConfigError::Invalid(format!(
                "zoom_min {} exceeds zoom_max {}",
                self.zoom_min, self.zoom_max
            )));
        }
        if !(self.zoom_min..=self.zoom_max).contains(&DEFAULT_SCALE) {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}..={} must contain {}",
                self.zoom_min, self.zoom_max, DEFAULT_SCALE
            )));
        }
        if self.accepted_mime_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "accepted_mime_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Library path from the environment, falling back to the config file.
    pub fn resolved_pdfium_library_path(&self) -> Option<PathBuf> {
        std::env::var_os(PDFIUM_LIBRARY_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.pdfium_library_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.accepted_mime_type, "application/pdf");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "zoom_max = 3.0\ndark_mode = true\n").unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.zoom_max, 3.0);
        assert_eq!(config.zoom_min, DEFAULT_ZOOM_MIN);
        assert!(config.dark_mode);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "zoom_min = 1.5\nzoom_max = 1.2\n").unwrap();

        assert!(matches!(
            ViewerConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn range_must_contain_default_scale() {
        let config = ViewerConfig {
            zoom_min: 1.2,
            zoom_max: 2.0,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "zoom_speed = 2\n").unwrap();

        assert!(matches!(
            ViewerConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
