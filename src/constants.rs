// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants
//!
//! Filter parameters are fixed defaults; there is intentionally no
//! configuration surface for them.

use std::time::Duration;

/// Index of the default camera device (`/dev/video0`)
pub const DEFAULT_CAMERA_INDEX: usize = 0;

/// Number of intensity levels in a histogram (8-bit samples)
pub const HISTOGRAM_BINS: usize = 256;

/// Filter engine defaults
pub mod filter_defaults {
    /// Gaussian blur kernel size (must be odd and positive)
    pub const BLUR_KERNEL_SIZE: i32 = 5;

    /// Erosion/dilation passes with the 3x3 structuring element
    pub const MORPH_ITERATIONS: i32 = 1;

    /// Canny hysteresis thresholds
    pub const CANNY_LOW_THRESHOLD: f32 = 50.0;
    pub const CANNY_HIGH_THRESHOLD: f32 = 150.0;

    /// Binarization threshold applied before contour detection.
    /// Pixels strictly above this value are foreground.
    pub const CONTOUR_THRESHOLD: u8 = 128;

    /// Outline color for contours drawn on color images (RGB)
    pub const CONTOUR_COLOR: [u8; 3] = [0, 255, 0];

    /// Outline intensity for contours drawn on grayscale images
    pub const CONTOUR_GRAY_LEVEL: u8 = 255;

    /// Outline thickness in pixels
    pub const CONTOUR_THICKNESS: u32 = 2;
}

/// Capture timing defaults
pub mod timing {
    use super::Duration;

    /// Open attempts per backend before falling back to the next one
    pub const OPEN_ATTEMPTS: u32 = 3;

    /// Pause between failed open attempts
    pub const OPEN_RETRY_DELAY: Duration = Duration::from_millis(200);

    /// Pause after a failed grab before trying again
    pub const GRAB_RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Upper bound on how long `stop` waits for the capture thread
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Polling interval while waiting for the capture thread to exit
    pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// Frames discarded after opening the device for a single capture,
    /// giving auto-exposure a moment to settle
    pub const SINGLE_CAPTURE_WARMUP_FRAMES: u32 = 2;

    /// Grab attempts a single capture makes before giving up
    pub const SINGLE_CAPTURE_READ_ATTEMPTS: u32 = 20;

    /// Pacing of the synthetic camera (about 30 fps)
    pub const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(33);
}

/// Requested capture resolution. Devices may answer with another size.
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

/// Terminal viewer refresh interval
pub const TERMINAL_TICK: Duration = Duration::from_millis(16);

/// Jobs a consumer context holds before `post` starts refusing work.
/// A slow consumer drops live frames instead of growing the queue.
pub const CONSUMER_QUEUE_CAPACITY: usize = 32;

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
