// SPDX-License-Identifier: GPL-3.0-only

//! Frame source driving one camera device
//!
//! The device is opened on the thread that reads it: the calling thread for a
//! single capture, the capture thread for a stream. Start, stop and single
//! captures are serialized by one mutex, so a stream never starts in the
//! middle of a single capture and a single capture always stops a running
//! stream first.

use super::frame_loop::{CaptureLoopController, StartError};
use super::types::*;
use super::{CameraDevice, DeviceOpener, FrameProvider, FrameSink};
use crate::constants::timing::SINGLE_CAPTURE_READ_ATTEMPTS;
use image::DynamicImage;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Log every Nth consecutive grab failure while streaming
const GRAB_FAILURE_LOG_INTERVAL: u64 = 100;

/// Frame source for one camera
pub struct FrameSource {
    opener: Arc<dyn DeviceOpener>,
    settings: SourceSettings,
    /// Running capture loop, if any
    stream: Mutex<Option<CaptureLoopController>>,
    /// True while the capture thread holds an open device
    active: Arc<AtomicBool>,
}

impl FrameSource {
    pub fn new(opener: Arc<dyn DeviceOpener>, settings: SourceSettings) -> Self {
        Self {
            opener,
            settings,
            stream: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<CaptureLoopController>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open the camera, walking the backend fallback chain
///
/// Each backend gets `open_attempts` tries. A missing device ends the search
/// right away since no backend can open it.
fn open_device(
    opener: &dyn DeviceOpener,
    settings: &SourceSettings,
) -> BackendResult<Box<dyn CameraDevice>> {
    let attempts = settings.open_attempts.max(1);
    let mut last_error = None;

    for backend in CaptureBackend::fallback_order(settings.preferred_backend) {
        for attempt in 1..=attempts {
            match opener.open(settings, backend) {
                Ok(device) => {
                    info!(
                        index = settings.camera_index,
                        backend = %backend,
                        attempt,
                        "Camera opened"
                    );
                    return Ok(device);
                }
                Err(BackendError::DeviceNotFound(msg)) => {
                    warn!(index = settings.camera_index, "Camera not found: {}", msg);
                    return Err(BackendError::DeviceNotFound(msg));
                }
                Err(e) => {
                    warn!(
                        index = settings.camera_index,
                        backend = %backend,
                        attempt,
                        error = %e,
                        "Failed to open camera"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(settings.open_retry_delay);
                    }
                }
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no backend available".to_string());
    Err(BackendError::OpenFailed(format!(
        "camera {}: {}",
        settings.camera_index, reason
    )))
}

/// Clears the active flag when the capture loop state is dropped
struct ActiveFlag(Arc<AtomicBool>);

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State owned by the capture thread
struct StreamState {
    device: Box<dyn CameraDevice>,
    /// Reused decode target
    frame: DynamicImage,
    sink: FrameSink,
    grab_retry_delay: Duration,
    frames: u64,
    grab_failures: u64,
    _active: ActiveFlag,
}

impl StreamState {
    fn step(&mut self) {
        if let Err(e) = self.device.grab() {
            self.grab_failures += 1;
            if self.grab_failures % GRAB_FAILURE_LOG_INTERVAL == 1 {
                warn!(failures = self.grab_failures, error = %e, "Failed to grab frame");
            }
            thread::sleep(self.grab_retry_delay);
            return;
        }
        self.grab_failures = 0;

        if let Err(e) = self.device.retrieve(&mut self.frame) {
            debug!(error = %e, "Failed to decode frame, skipping");
            return;
        }

        self.frames += 1;
        let Self { sink, frame, .. } = self;
        if panic::catch_unwind(AssertUnwindSafe(|| sink(&*frame))).is_err() {
            error!(frame = self.frames, "Frame sink panicked, continuing");
        } else if self.frames % 60 == 0 {
            debug!(
                frame = self.frames,
                width = self.frame.width(),
                height = self.frame.height(),
                "Frame delivered"
            );
        }
    }
}

/// Stop the loop in `slot`, waiting at most `timeout`
fn stop_locked(slot: &mut Option<CaptureLoopController>, timeout: Duration) {
    let Some(mut controller) = slot.take() else {
        return;
    };

    info!("Stopping camera stream");
    if controller.stop_timeout(timeout) {
        info!("Camera stream stopped");
    } else {
        warn!(
            timeout_ms = timeout.as_millis() as u64,
            "Capture thread still busy after stop timeout, continuing without it"
        );
    }
}

impl FrameProvider for FrameSource {
    fn capture_single_frame(&self) -> BackendResult<DynamicImage> {
        let mut stream = self.lock_stream();
        if stream.is_some() {
            debug!("Stopping stream before single capture");
            stop_locked(&mut stream, self.settings.stop_timeout);
        }

        let mut device = open_device(self.opener.as_ref(), &self.settings)?;
        let mut frame = DynamicImage::new_rgb8(0, 0);
        let mut delivered = 0;
        let mut last_error = None;

        for _ in 0..self.settings.warmup_frames + SINGLE_CAPTURE_READ_ATTEMPTS {
            match device.read(&mut frame) {
                Ok(()) => {
                    delivered += 1;
                    if delivered > self.settings.warmup_frames {
                        info!(
                            width = frame.width(),
                            height = frame.height(),
                            "Single frame captured"
                        );
                        return Ok(frame);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Single capture read failed");
                    last_error = Some(e);
                    thread::sleep(self.settings.grab_retry_delay);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no frame delivered".to_string());
        Err(BackendError::ReadFailed(reason))
    }

    fn start_stream(&self, sink: FrameSink) -> BackendResult<()> {
        let mut stream = self.lock_stream();

        if let Some(controller) = stream.as_ref() {
            if controller.is_running() {
                warn!("Camera stream already running, ignoring start");
                return Ok(());
            }
            // Loop thread died; reap it before starting a new one
            stop_locked(&mut stream, self.settings.stop_timeout);
        }

        let opener = Arc::clone(&self.opener);
        let settings = self.settings.clone();
        let active = Arc::clone(&self.active);

        let controller = CaptureLoopController::start_with_init(
            "camera-stream",
            move || -> BackendResult<StreamState> {
                let device = open_device(opener.as_ref(), &settings)?;
                active.store(true, Ordering::SeqCst);
                Ok(StreamState {
                    device,
                    frame: DynamicImage::new_rgb8(0, 0),
                    sink,
                    grab_retry_delay: settings.grab_retry_delay,
                    frames: 0,
                    grab_failures: 0,
                    _active: ActiveFlag(active),
                })
            },
            StreamState::step,
        )
        .map_err(|e| match e {
            StartError::Init(e) => e,
            other @ StartError::ThreadExited(_) => BackendError::Other(other.to_string()),
        })?;

        *stream = Some(controller);
        info!(index = self.settings.camera_index, "Camera stream started");
        Ok(())
    }

    fn stop_stream(&self) {
        let mut stream = self.lock_stream();
        stop_locked(&mut stream, self.settings.stop_timeout);
    }

    fn is_streaming(&self) -> bool {
        let stream = self.lock_stream();
        stream.as_ref().is_some_and(|c| c.is_running()) && self.active.load(Ordering::SeqCst)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        let timeout = self.settings.stop_timeout;
        let slot = self.stream.get_mut().unwrap_or_else(PoisonError::into_inner);
        stop_locked(slot, timeout);
    }
}
