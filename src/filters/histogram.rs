// SPDX-License-Identifier: GPL-3.0-only

//! Intensity histogram of a single-channel image

use crate::constants::HISTOGRAM_BINS;
use crate::errors::{FilterError, FilterResult};
use image::DynamicImage;

use super::engine::{channel_count, validate_input};

/// Pixel count per intensity level, 256 bins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u64; HISTOGRAM_BINS],
}

impl Histogram {
    /// Build a histogram from raw bin counts
    pub fn from_bins(bins: [u64; HISTOGRAM_BINS]) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u64; HISTOGRAM_BINS] {
        &self.bins
    }

    /// Count at one intensity level
    pub fn get(&self, level: u8) -> u64 {
        self.bins[level as usize]
    }

    /// Sum of all bins (the pixel count of the source image)
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Most populated intensity level and its count; the lowest level wins ties
    pub fn peak(&self) -> (u8, u64) {
        let mut best = (0u8, self.bins[0]);
        for (level, &count) in self.bins.iter().enumerate().skip(1) {
            if count > best.1 {
                best = (level as u8, count);
            }
        }
        best
    }

    /// Mean intensity, `None` for an empty histogram
    pub fn mean(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let weighted: u64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(level, &count)| level as u64 * count)
            .sum();
        Some(weighted as f64 / total as f64)
    }

    /// Sum adjacent bins down to `buckets` groups, for compact display.
    /// `buckets` is clamped to `1..=256`.
    pub fn downsample(&self, buckets: usize) -> Vec<u64> {
        let buckets = buckets.clamp(1, HISTOGRAM_BINS);
        let mut out = vec![0u64; buckets];
        for (level, &count) in self.bins.iter().enumerate() {
            out[level * buckets / HISTOGRAM_BINS] += count;
        }
        out
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            bins: [0; HISTOGRAM_BINS],
        }
    }
}

/// Count pixels per intensity level. The input must have exactly one channel.
pub fn histogram(image: &DynamicImage) -> FilterResult<Histogram> {
    const OP: &str = "histogram";
    validate_input(OP, image)?;

    let channels = channel_count(image);
    let DynamicImage::ImageLuma8(gray) = image else {
        return Err(FilterError::processing(
            OP,
            format!("expected a single-channel image, got {} channels", channels),
        ));
    };

    let mut bins = [0u64; HISTOGRAM_BINS];
    for pixel in gray.pixels() {
        bins[pixel[0] as usize] += 1;
    }

    Ok(Histogram { bins })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FilterErrorKind;
    use image::{GrayImage, Luma, RgbImage};

    #[test]
    fn test_sum_matches_pixel_count() {
        let gray = GrayImage::from_fn(17, 9, |x, y| Luma([((x * 31 + y * 7) % 256) as u8]));
        let hist = histogram(&DynamicImage::ImageLuma8(gray)).unwrap();

        assert_eq!(hist.bins().len(), 256);
        assert_eq!(hist.total(), 17 * 9);
    }

    #[test]
    fn test_uniform_image_fills_one_bin() {
        let gray = GrayImage::from_pixel(12, 5, Luma([42]));
        let hist = histogram(&DynamicImage::ImageLuma8(gray)).unwrap();

        assert_eq!(hist.get(42), 60);
        assert_eq!(hist.total(), 60);
        assert_eq!(hist.peak(), (42, 60));
        assert_eq!(hist.mean(), Some(42.0));
    }

    #[test]
    fn test_color_input_is_processing_error() {
        let rgb = RgbImage::new(4, 4);
        let err = histogram(&DynamicImage::ImageRgb8(rgb)).unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::Processing);
    }

    #[test]
    fn test_empty_input_is_invalid_argument() {
        let err = histogram(&DynamicImage::ImageLuma8(GrayImage::new(0, 0))).unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::InvalidArgument);
    }

    #[test]
    fn test_downsample_preserves_total() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
        let hist = histogram(&DynamicImage::ImageLuma8(gray)).unwrap();

        let buckets = hist.downsample(32);
        assert_eq!(buckets.len(), 32);
        assert_eq!(buckets.iter().sum::<u64>(), 256);
        assert!(buckets.iter().all(|&b| b == 8));
    }
}
