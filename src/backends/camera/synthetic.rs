// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera
//!
//! Produces a moving test pattern, one fixed frame, or sequence-stamped frames
//! without any hardware.
//! Failures can be scripted per backend or per read, and the opener counts
//! how many devices it opened and how many are still alive.

use super::types::*;
use super::{CameraDevice, DeviceOpener};
use crate::constants::timing::SYNTHETIC_FRAME_INTERVAL;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
enum Pattern {
    /// Gradient with a bright square sweeping across it
    Moving,
    /// The same frame every time
    Fixed(DynamicImage),
    /// Uniform frames whose color encodes the sequence number
    Stamped,
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    live: AtomicUsize,
    frames: AtomicU64,
}

/// Opens synthetic camera devices
#[derive(Debug, Clone)]
pub struct SyntheticOpener {
    pattern: Pattern,
    frame_interval: Duration,
    failing_backends: HashSet<CaptureBackend>,
    fail_grabs: bool,
    fail_retrieve_every: Option<u64>,
    counters: Arc<Counters>,
}

impl SyntheticOpener {
    /// Moving test pattern at the requested capture size
    pub fn test_pattern() -> Self {
        Self {
            pattern: Pattern::Moving,
            frame_interval: SYNTHETIC_FRAME_INTERVAL,
            failing_backends: HashSet::new(),
            fail_grabs: false,
            fail_retrieve_every: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Deliver `frame` on every read, whatever size was requested
    pub fn fixed_frame(frame: DynamicImage) -> Self {
        Self {
            pattern: Pattern::Fixed(frame),
            ..Self::test_pattern()
        }
    }

    /// Uniform frames carrying their sequence number, see [`read_stamp`]
    pub fn sequence_stamped() -> Self {
        Self {
            pattern: Pattern::Stamped,
            ..Self::test_pattern()
        }
    }

    /// Time each grab blocks, emulating the device frame rate
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Refuse to open on `backend`
    pub fn fail_open_on(mut self, backend: CaptureBackend) -> Self {
        self.failing_backends.insert(backend);
        self
    }

    /// Refuse to open on every backend
    pub fn fail_all_opens(mut self) -> Self {
        self.failing_backends.extend(CaptureBackend::ALL);
        self
    }

    /// Open fine but never deliver a frame
    pub fn fail_every_grab(mut self) -> Self {
        self.fail_grabs = true;
        self
    }

    /// Fail decoding every `n`th frame
    pub fn fail_retrieve_every(mut self, n: u64) -> Self {
        self.fail_retrieve_every = Some(n.max(1));
        self
    }

    /// Open calls so far, failed ones included
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Devices opened and not yet dropped
    pub fn live_devices(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Frames grabbed across all devices
    pub fn frames_produced(&self) -> u64 {
        self.counters.frames.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for SyntheticOpener {
    fn open(
        &self,
        settings: &SourceSettings,
        backend: CaptureBackend,
    ) -> BackendResult<Box<dyn CameraDevice>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        if self.failing_backends.contains(&backend) {
            return Err(BackendError::OpenFailed(format!(
                "synthetic camera refuses {} backend",
                backend
            )));
        }

        self.counters.live.fetch_add(1, Ordering::SeqCst);
        debug!(backend = %backend, "Synthetic camera opened");

        Ok(Box::new(SyntheticDevice {
            pattern: self.pattern.clone(),
            width: settings.width.max(1),
            height: settings.height.max(1),
            frame_interval: self.frame_interval,
            fail_grabs: self.fail_grabs,
            fail_retrieve_every: self.fail_retrieve_every,
            sequence: 0,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct SyntheticDevice {
    pattern: Pattern,
    width: u32,
    height: u32,
    frame_interval: Duration,
    fail_grabs: bool,
    fail_retrieve_every: Option<u64>,
    sequence: u64,
    counters: Arc<Counters>,
}

impl SyntheticDevice {
    fn render_moving(&self, out: &mut DynamicImage) {
        let (w, h) = (self.width, self.height);
        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1) as u64;
        let left = ((self.sequence * 4) % travel) as u32;
        let top = (h - side.min(h)) / 2;

        // Reuse the caller's buffer when the size matches
        let mut img = match std::mem::replace(out, DynamicImage::new_rgb8(0, 0)) {
            DynamicImage::ImageRgb8(img) if img.dimensions() == (w, h) => img,
            _ => RgbImage::new(w, h),
        };

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let inside = (left..left + side).contains(&x) && (top..top + side).contains(&y);
            *pixel = if inside {
                Rgb([255, 255, 255])
            } else {
                Rgb([
                    (x * 160 / w) as u8,
                    (y * 160 / h) as u8,
                    ((self.sequence * 2) % 128) as u8,
                ])
            };
        }

        *out = DynamicImage::ImageRgb8(img);
    }
}

impl CameraDevice for SyntheticDevice {
    fn grab(&mut self) -> BackendResult<()> {
        if self.fail_grabs {
            return Err(BackendError::ReadFailed(
                "synthetic camera produced no frame".to_string(),
            ));
        }
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        self.sequence += 1;
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn retrieve(&mut self, frame: &mut DynamicImage) -> BackendResult<()> {
        if let Some(n) = self.fail_retrieve_every
            && self.sequence % n == 0
        {
            return Err(BackendError::ReadFailed(format!(
                "synthetic decode failure at frame {}",
                self.sequence
            )));
        }

        match &self.pattern {
            Pattern::Moving => self.render_moving(frame),
            Pattern::Fixed(fixed) => frame.clone_from(fixed),
            Pattern::Stamped => {
                let [_, r, g, b] = (self.sequence as u32).to_be_bytes();
                *frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    self.width,
                    self.height,
                    Rgb([r, g, b]),
                ));
            }
        }
        Ok(())
    }
}

/// Sequence number of a frame from [`SyntheticOpener::sequence_stamped`]
pub fn read_stamp(frame: &DynamicImage) -> Option<u64> {
    let rgb = frame.as_rgb8()?;
    let Rgb([r, g, b]) = *rgb.get_pixel_checked(0, 0)?;
    Some(u64::from(u32::from_be_bytes([0, r, g, b])))
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        debug!(frames = self.sequence, "Synthetic camera closed");
    }
}
