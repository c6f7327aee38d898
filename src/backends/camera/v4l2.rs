// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 webcam capture
//!
//! Opens `/dev/videoN` through the `v4l` crate, asks for MJPEG at the
//! requested size and accepts whatever the driver settles on as long as it is
//! MJPEG, YUYV, UYVY or RGB24. Streaming uses either memory-mapped or
//! user-pointer buffers.

use super::format_converters::{Yuv422Order, rgb24_to_rgb, yuv422_to_rgb};
use super::types::*;
use super::{CameraDevice, DeviceOpener};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// Driver buffers queued for streaming
const BUFFER_COUNT: u32 = 4;

/// Pixel layouts we know how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelLayout {
    Mjpeg,
    Yuv422(Yuv422Order),
    Rgb24,
}

impl PixelLayout {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(PixelLayout::Mjpeg),
            b"YUYV" => Some(PixelLayout::Yuv422(Yuv422Order::Yuyv)),
            b"UYVY" => Some(PixelLayout::Yuv422(Yuv422Order::Uyvy)),
            b"RGB3" => Some(PixelLayout::Rgb24),
            _ => None,
        }
    }
}

/// Opens V4L2 devices by index
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Opener;

impl DeviceOpener for V4l2Opener {
    fn open(
        &self,
        settings: &SourceSettings,
        backend: CaptureBackend,
    ) -> BackendResult<Box<dyn CameraDevice>> {
        let path = format!("/dev/video{}", settings.camera_index);
        info!(path = %path, backend = %backend, "Opening V4L2 device");

        let dev = Device::new(settings.camera_index).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BackendError::DeviceNotFound(path.clone()),
            _ => BackendError::OpenFailed(format!("{}: {}", path, e)),
        })?;

        let mut format = dev
            .format()
            .map_err(|e| BackendError::OpenFailed(format!("failed to query format: {}", e)))?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = FourCC::new(b"MJPG");

        // The driver answers with the closest format it supports
        let format = match dev.set_format(&format) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "Could not set format, using current device format");
                dev.format().map_err(|e| {
                    BackendError::OpenFailed(format!("failed to query format: {}", e))
                })?
            }
        };

        let layout = PixelLayout::from_fourcc(format.fourcc).ok_or_else(|| {
            BackendError::FormatNotSupported(format!("{} ({})", format.fourcc, path))
        })?;

        info!(
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            stride = format.stride,
            "Negotiated V4L2 format"
        );

        let stream = match backend {
            CaptureBackend::Mmap => {
                v4l::io::mmap::Stream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)
                    .map(V4l2Stream::Mmap)
            }
            CaptureBackend::UserPtr => {
                v4l::io::userptr::Stream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)
                    .map(V4l2Stream::UserPtr)
            }
        }
        .map_err(|e| BackendError::OpenFailed(format!("{} stream setup failed: {}", backend, e)))?;

        Ok(Box::new(V4l2Camera {
            stream,
            _device: dev,
            layout,
            width: format.width,
            height: format.height,
            stride: format.stride as usize,
            pending: Vec::new(),
            scratch: Vec::new(),
        }))
    }
}

enum V4l2Stream {
    Mmap(v4l::io::mmap::Stream<'static>),
    UserPtr(v4l::io::userptr::Stream),
}

impl V4l2Stream {
    /// Dequeue the next filled buffer and copy its payload into `out`
    fn next_into(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let (buf, meta) = match self {
            V4l2Stream::Mmap(s) => s.next()?,
            V4l2Stream::UserPtr(s) => s.next()?,
        };

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        out.clear();
        out.extend_from_slice(&buf[..used]);
        Ok(())
    }
}

struct V4l2Camera {
    // Dropped before the device
    stream: V4l2Stream,
    _device: Device,
    layout: PixelLayout,
    width: u32,
    height: u32,
    stride: usize,
    /// Raw bytes of the last grabbed frame
    pending: Vec<u8>,
    /// Decode target for raw formats
    scratch: Vec<u8>,
}

impl CameraDevice for V4l2Camera {
    fn grab(&mut self) -> BackendResult<()> {
        self.stream
            .next_into(&mut self.pending)
            .map_err(|e| BackendError::ReadFailed(format!("dequeue failed: {}", e)))
    }

    fn retrieve(&mut self, frame: &mut DynamicImage) -> BackendResult<()> {
        if self.pending.is_empty() {
            return Err(BackendError::ReadFailed("no grabbed frame".to_string()));
        }

        match self.layout {
            PixelLayout::Mjpeg => {
                let decoded = image::load_from_memory_with_format(&self.pending, ImageFormat::Jpeg)
                    .map_err(|e| BackendError::ReadFailed(format!("MJPEG decode: {}", e)))?;
                *frame = match decoded {
                    DynamicImage::ImageRgb8(_) => decoded,
                    other => DynamicImage::ImageRgb8(other.to_rgb8()),
                };
            }
            PixelLayout::Yuv422(order) => {
                let stride = if self.stride == 0 {
                    self.width as usize * 2
                } else {
                    self.stride
                };
                let mut buf = take_rgb_buffer(frame, &mut self.scratch);
                yuv422_to_rgb(&self.pending, self.width, self.height, stride, order, &mut buf);
                *frame = into_frame(buf, self.width, self.height)?;
            }
            PixelLayout::Rgb24 => {
                let stride = if self.stride == 0 {
                    self.width as usize * 3
                } else {
                    self.stride
                };
                let mut buf = take_rgb_buffer(frame, &mut self.scratch);
                rgb24_to_rgb(&self.pending, self.width, self.height, stride, &mut buf);
                *frame = into_frame(buf, self.width, self.height)?;
            }
        }

        debug!(bytes = self.pending.len(), "Frame decoded");
        Ok(())
    }
}

/// Take the caller's RGB allocation for reuse, or the scratch buffer
fn take_rgb_buffer(frame: &mut DynamicImage, scratch: &mut Vec<u8>) -> Vec<u8> {
    match std::mem::replace(frame, DynamicImage::new_rgb8(0, 0)) {
        DynamicImage::ImageRgb8(img) => img.into_raw(),
        _ => std::mem::take(scratch),
    }
}

fn into_frame(buf: Vec<u8>, width: u32, height: u32) -> BackendResult<DynamicImage> {
    RgbImage::from_raw(width, height, buf)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::ReadFailed("decoded buffer size mismatch".to_string()))
}
