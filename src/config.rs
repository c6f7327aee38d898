// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON at `<config dir>/camfilter/config.json`. Every field has a
//! default, so a partial file is fine. Filter parameters are fixed and are
//! not configurable.

use crate::backends::camera::{CaptureBackend, SourceSettings};
use crate::constants;
use crate::errors::ConfigError;
use crate::filters::FilterType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const APP_DIR: &str = "camfilter";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera device index (`/dev/videoN`)
    pub camera_index: usize,
    /// Capture backend tried first (mmap or userptr)
    pub preferred_backend: CaptureBackend,
    /// Requested capture resolution
    pub capture_width: u32,
    pub capture_height: u32,
    /// Open attempts per backend before falling back
    pub open_attempts: u32,
    /// Longest wait for the capture thread when stopping
    pub stop_timeout_ms: u64,
    /// Filter selected at startup
    pub initial_filter: FilterType,
    /// Use the synthetic test pattern instead of a real camera
    pub use_test_pattern: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: constants::DEFAULT_CAMERA_INDEX,
            preferred_backend: CaptureBackend::default(),
            capture_width: constants::CAPTURE_WIDTH,
            capture_height: constants::CAPTURE_HEIGHT,
            open_attempts: constants::timing::OPEN_ATTEMPTS,
            stop_timeout_ms: constants::timing::STOP_TIMEOUT.as_millis() as u64,
            initial_filter: FilterType::default(),
            use_test_pattern: false,
        }
    }
}

impl Config {
    /// Default location of the config file, if the platform has a config dir
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location
    ///
    /// Never fails: a missing file or a malformed one yields the defaults,
    /// the latter with a warning.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            debug!("No config directory on this platform, using defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring config file");
                Self::default()
            }
        }
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Frame source settings derived from this configuration
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            camera_index: self.camera_index,
            preferred_backend: self.preferred_backend,
            width: self.capture_width,
            height: self.capture_height,
            open_attempts: self.open_attempts.max(1),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            ..SourceSettings::default()
        }
    }
}
