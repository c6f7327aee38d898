// SPDX-License-Identifier: GPL-3.0-only
//! Raw pixel format conversion for V4L2 frames
//!
//! Converters write packed RGB24 into a caller-owned buffer so the capture
//! loop can reuse one allocation across frames. `stride` is the length of one
//! source row in bytes, which drivers may pad beyond `width * bytes_per_pixel`.

/// Packed YUV 4:2:2 byte orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yuv422Order {
    /// Y0 U0 Y1 V0
    Yuyv,
    /// U0 Y0 V0 Y1
    Uyvy,
}

/// BT.601 YUV to RGB for one pixel
#[inline]
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// Convert packed YUV 4:2:2 (YUYV or UYVY) to RGB24
///
/// Each 4-byte group encodes 2 pixels sharing one U/V pair. Rows shorter than
/// `stride` leave the missing pixels black.
pub fn yuv422_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    order: Yuv422Order,
    out: &mut Vec<u8>,
) {
    let w = width as usize;
    let h = height as usize;
    out.clear();
    out.resize(w * h * 3, 0);

    for row in 0..h {
        let Some(src) = data.get(row * stride..(row * stride + w * 2).min(data.len())) else {
            break;
        };
        let dst = &mut out[row * w * 3..(row + 1) * w * 3];

        for (pair, chunk) in src.chunks_exact(4).enumerate() {
            let (y0, u, y1, v) = match order {
                Yuv422Order::Yuyv => (chunk[0], chunk[1], chunk[2], chunk[3]),
                Yuv422Order::Uyvy => (chunk[1], chunk[0], chunk[3], chunk[2]),
            };
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            for (i, y) in [y0, y1].into_iter().enumerate() {
                let x = pair * 2 + i;
                if x >= w {
                    break;
                }
                dst[x * 3..x * 3 + 3].copy_from_slice(&yuv_to_rgb(y as f32, u, v));
            }
        }
    }
}

/// Copy RGB24 rows into a tightly packed buffer, dropping row padding
pub fn rgb24_to_rgb(data: &[u8], width: u32, height: u32, stride: usize, out: &mut Vec<u8>) {
    let row_len = width as usize * 3;
    out.clear();
    out.reserve(row_len * height as usize);

    for row in 0..height as usize {
        let start = row * stride;
        match data.get(start..start + row_len) {
            Some(src) => out.extend_from_slice(src),
            None => out.resize(out.len() + row_len, 0),
        }
    }
}
