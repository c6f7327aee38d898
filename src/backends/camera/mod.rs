// SPDX-License-Identifier: GPL-3.0-only

//! Camera frame source
//!
//! ```text
//! ┌──────────────────────┐
//! │ Workflow / Live      │
//! └──────────┬───────────┘
//!            │ FrameProvider
//!            ▼
//! ┌──────────────────────┐
//! │     FrameSource      │  ← backend fallback, capture thread, stop
//! └──────────┬───────────┘
//!            │ DeviceOpener
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌──────────┐
//!   │ V4L2 │  │Synthetic │
//!   └──────┘  └──────────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod source;
pub mod synthetic;
pub mod types;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;

pub use source::FrameSource;
pub use synthetic::{SyntheticOpener, read_stamp};
pub use types::*;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use v4l2::V4l2Opener;

use image::DynamicImage;
use std::sync::Arc;

/// An opened camera
///
/// Frames are read in two steps: `grab` pulls the next frame from the driver,
/// `retrieve` decodes the grabbed frame into a caller-owned buffer that is
/// reused across frames.
pub trait CameraDevice {
    fn grab(&mut self) -> BackendResult<()>;

    fn retrieve(&mut self, frame: &mut DynamicImage) -> BackendResult<()>;

    fn read(&mut self, frame: &mut DynamicImage) -> BackendResult<()> {
        self.grab()?;
        self.retrieve(frame)
    }
}

/// Opens camera devices. Devices are opened on the thread that reads them.
pub trait DeviceOpener: Send + Sync {
    fn open(
        &self,
        settings: &SourceSettings,
        backend: CaptureBackend,
    ) -> BackendResult<Box<dyn CameraDevice>>;
}

/// Receives every streamed frame on the capture thread
///
/// The frame is only borrowed for the duration of the call; clone it to keep it.
pub type FrameSink = Box<dyn FnMut(&DynamicImage) + Send>;

/// Frame source interface used by the pipelines
pub trait FrameProvider: Send + Sync {
    /// Open the device, read one frame, close the device. Blocking.
    ///
    /// An active stream is stopped first.
    fn capture_single_frame(&self) -> BackendResult<DynamicImage>;

    /// Start streaming frames into `sink` on a dedicated thread
    ///
    /// Returns once the device is open. Calling it while already streaming
    /// does nothing.
    fn start_stream(&self, sink: FrameSink) -> BackendResult<()>;

    /// Stop streaming and release the device. No-op when not streaming.
    fn stop_stream(&self);

    fn is_streaming(&self) -> bool;
}

/// Synthetic test pattern when asked for, the platform webcam otherwise
pub fn opener_for(use_test_pattern: bool) -> Arc<dyn DeviceOpener> {
    if use_test_pattern {
        tracing::info!("Using the synthetic test pattern camera");
        Arc::new(SyntheticOpener::test_pattern())
    } else {
        default_opener()
    }
}

/// Opener for the real webcam on this platform
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub fn default_opener() -> Arc<dyn DeviceOpener> {
    Arc::new(V4l2Opener)
}

/// Opener for the real webcam on this platform
///
/// Built without V4L2 support, so the test pattern stands in.
#[cfg(not(all(target_os = "linux", feature = "v4l2")))]
pub fn default_opener() -> Arc<dyn DeviceOpener> {
    tracing::warn!("V4L2 support not compiled in, using the synthetic camera");
    Arc::new(SyntheticOpener::test_pattern())
}
