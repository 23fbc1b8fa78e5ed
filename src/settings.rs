//! Viewer configuration, stored as YAML under the user config directory.
//!
//! Settings are read once at startup and passed read-only into the
//! components that need them.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pokazka";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Pages prerendered ahead of and behind the current one
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,

    /// Bitmap cache bound in mebibytes
    #[serde(default = "default_cache_max_mb")]
    pub cache_max_mb: usize,

    /// Render key geometry is rounded to this many pixels
    #[serde(default = "default_quantize_px")]
    pub quantize_px: u32,

    /// Render worker threads; unset means sized from the machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Start media overlays marked autoplay as soon as their page shows
    #[serde(default = "default_true")]
    pub autoplay: bool,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_lookahead() -> usize {
    2
}

fn default_cache_max_mb() -> usize {
    256
}

fn default_quantize_px() -> u32 {
    16
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            lookahead: default_lookahead(),
            cache_max_mb: default_cache_max_mb(),
            quantize_px: default_quantize_px(),
            workers: None,
            autoplay: default_true(),
        }
    }
}

impl Settings {
    pub fn cache_max_bytes(&self) -> usize {
        self.cache_max_mb.saturating_mul(1024 * 1024)
    }

    /// Worker pool size: the configured value, or three quarters of the
    /// available cores, at least one
    pub fn effective_workers(&self) -> usize {
        if let Some(workers) = self.workers {
            return workers.max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(2);
        (cores * 3 / 4).max(1)
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the user config directory, writing a default file on
/// first run. Any failure falls back to defaults; never fatal.
pub fn load_settings() -> Settings {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };
    if path.exists() {
        load_settings_from(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to(&settings, &path);
        settings
    }
}

/// Load settings from an explicit path, falling back to defaults on error
pub fn load_settings_from(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");
                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to(&settings, path);
                }
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                Settings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            Settings::default()
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

pub fn save_settings(settings: &Settings) {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };
    save_settings_to(settings, &path);
}

fn save_settings_to(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    match serde_yaml::to_string(settings) {
        Ok(content) => match fs::write(path, content) {
            Ok(()) => debug!("Saved settings to {path:?}"),
            Err(e) => error!("Failed to save settings to {path:?}: {e}"),
        },
        Err(e) => error!("Failed to serialize settings: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_yaml::from_str("version: 1\n").unwrap();
        assert_eq!(settings.lookahead, 2);
        assert_eq!(settings.cache_max_mb, 256);
        assert_eq!(settings.quantize_px, 16);
        assert!(settings.workers.is_none());
        assert!(settings.autoplay);
    }

    #[test]
    fn configured_worker_count_wins() {
        let settings = Settings {
            workers: Some(3),
            ..Settings::default()
        };
        assert_eq!(settings.effective_workers(), 3);

        let zero = Settings {
            workers: Some(0),
            ..Settings::default()
        };
        assert_eq!(zero.effective_workers(), 1);
    }

    #[test]
    fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let settings = Settings {
            lookahead: 4,
            cache_max_mb: 64,
            ..Settings::default()
        };
        save_settings_to(&settings, &path);

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.lookahead, 4);
        assert_eq!(loaded.cache_max_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let loaded = load_settings_from(Path::new("/nonexistent/config.yaml"));
        assert_eq!(loaded.lookahead, Settings::default().lookahead);
    }
}
