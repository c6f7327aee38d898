// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use crate::constants::{self, timing};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// V4L2 buffer I/O method used to stream from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Memory-mapped driver buffers
    #[default]
    Mmap,
    /// Buffers allocated in user space and handed to the driver
    UserPtr,
}

impl CaptureBackend {
    pub const ALL: [CaptureBackend; 2] = [CaptureBackend::Mmap, CaptureBackend::UserPtr];

    /// Backends to try, preferred first, then the remaining ones
    pub fn fallback_order(preferred: CaptureBackend) -> Vec<CaptureBackend> {
        let mut order = vec![preferred];
        order.extend(Self::ALL.into_iter().filter(|b| *b != preferred));
        order
    }
}

impl std::fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureBackend::Mmap => write!(f, "mmap"),
            CaptureBackend::UserPtr => write!(f, "userptr"),
        }
    }
}

/// How a [`FrameSource`](super::FrameSource) opens and drives its device
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Device index (`/dev/videoN`)
    pub camera_index: usize,
    /// Backend tried first; the others follow as fallbacks
    pub preferred_backend: CaptureBackend,
    /// Requested frame size; the device may pick another
    pub width: u32,
    pub height: u32,
    /// Open attempts per backend
    pub open_attempts: u32,
    pub open_retry_delay: Duration,
    pub grab_retry_delay: Duration,
    /// Longest `stop_stream` waits for the capture thread
    pub stop_timeout: Duration,
    /// Frames dropped after opening for a single capture
    pub warmup_frames: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            camera_index: constants::DEFAULT_CAMERA_INDEX,
            preferred_backend: CaptureBackend::default(),
            width: constants::CAPTURE_WIDTH,
            height: constants::CAPTURE_HEIGHT,
            open_attempts: timing::OPEN_ATTEMPTS,
            open_retry_delay: timing::OPEN_RETRY_DELAY,
            grab_retry_delay: timing::GRAB_RETRY_DELAY,
            stop_timeout: timing::STOP_TIMEOUT,
            warmup_frames: timing::SINGLE_CAPTURE_WARMUP_FRAMES,
        }
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No device exists at the requested index
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device exists but could not be opened with any backend
    #[error("Failed to open camera: {0}")]
    OpenFailed(String),

    /// Device is open but produced no usable frame
    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    /// Device offers no pixel format we can decode
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(String),
}
