// SPDX-License-Identifier: GPL-3.0-only

//! Image filters
//!
//! Stateless transforms over one image buffer. [`FilterType`] is the closed set
//! of display filters the user can pick from, and [`render_filter`] maps a
//! selection onto the cached base images using a [`FilterEngine`].

pub mod contours;
pub mod engine;
pub mod histogram;

pub use contours::{Contour, ContourSet, detect_contours, draw_contours};
pub use engine::{canny, channel_count, dilate, erode, gaussian_blur, to_grayscale};
pub use histogram::{Histogram, histogram};

use crate::constants::filter_defaults::{BLUR_KERNEL_SIZE, MORPH_ITERATIONS};
use crate::errors::FilterResult;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display filter selection, ordered by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterType {
    /// Unprocessed color frame
    #[default]
    Original,
    Grayscale,
    Blur,
    Edges,
    ErosionDilation,
    Contours,
}

impl FilterType {
    /// Every filter in index order
    pub const ALL: [FilterType; 6] = [
        FilterType::Original,
        FilterType::Grayscale,
        FilterType::Blur,
        FilterType::Edges,
        FilterType::ErosionDilation,
        FilterType::Contours,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Filter at `index`, clamped into the valid range
    pub fn from_index_clamped(index: i64) -> Self {
        let last = (Self::ALL.len() - 1) as i64;
        Self::ALL[index.clamp(0, last) as usize]
    }

    /// Stable lowercase name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            FilterType::Original => "original",
            FilterType::Grayscale => "grayscale",
            FilterType::Blur => "blur",
            FilterType::Edges => "edges",
            FilterType::ErosionDilation => "erosion-dilation",
            FilterType::Contours => "contours",
        }
    }

    /// Human readable label
    pub fn display_name(self) -> &'static str {
        match self {
            FilterType::Original => "Original",
            FilterType::Grayscale => "Grayscale",
            FilterType::Blur => "Blur",
            FilterType::Edges => "Edges",
            FilterType::ErosionDilation => "Erosion + Dilation",
            FilterType::Contours => "Contours",
        }
    }

    /// Whether rendering needs the color original as well as the gray image
    pub fn needs_original(self) -> bool {
        matches!(self, FilterType::Original | FilterType::Contours)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        let len = Self::ALL.len();
        Self::ALL[(self.index() + len - 1) % len]
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for FilterType {
    type Err = String;

    /// Accepts a name (`edges`, `erosion-dilation`, ...) or an index
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if let Ok(index) = wanted.parse::<i64>() {
            return Ok(Self::from_index_clamped(index));
        }

        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted || f.name().replace('-', "_") == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("unknown filter '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Filter operations used by the pipelines and display state
///
/// Default methods run the CPU implementations in [`engine`]; implementors
/// override individual operations (tests use this to inject failures).
pub trait FilterEngine: Send + Sync {
    fn to_grayscale(&self, image: &DynamicImage) -> FilterResult<DynamicImage> {
        engine::to_grayscale(image)
    }

    fn histogram(&self, image: &DynamicImage) -> FilterResult<Histogram> {
        histogram::histogram(image)
    }

    fn gaussian_blur(&self, image: &DynamicImage, kernel_size: i32) -> FilterResult<DynamicImage> {
        engine::gaussian_blur(image, kernel_size)
    }

    fn erode(&self, image: &DynamicImage, iterations: i32) -> FilterResult<DynamicImage> {
        engine::erode(image, iterations)
    }

    fn dilate(&self, image: &DynamicImage, iterations: i32) -> FilterResult<DynamicImage> {
        engine::dilate(image, iterations)
    }

    fn canny(&self, image: &DynamicImage) -> FilterResult<DynamicImage> {
        engine::canny(image)
    }

    fn detect_contours(&self, image: &DynamicImage) -> FilterResult<ContourSet> {
        contours::detect_contours(image)
    }

    fn draw_contours(
        &self,
        original: &DynamicImage,
        contours: &ContourSet,
    ) -> FilterResult<DynamicImage> {
        contours::draw_contours(original, contours)
    }
}

/// Stock engine running every operation on the CPU
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuFilterEngine;

impl FilterEngine for CpuFilterEngine {}

/// Produce the image shown for `filter`
///
/// `original` is only consulted by filters that report
/// [`FilterType::needs_original`]; everything else works from `grayscale`.
pub fn render_filter(
    engine: &dyn FilterEngine,
    filter: FilterType,
    original: &DynamicImage,
    grayscale: &DynamicImage,
) -> FilterResult<DynamicImage> {
    match filter {
        FilterType::Original => Ok(original.clone()),
        FilterType::Grayscale => Ok(grayscale.clone()),
        FilterType::Blur => engine.gaussian_blur(grayscale, BLUR_KERNEL_SIZE),
        FilterType::Edges => engine.canny(grayscale),
        FilterType::ErosionDilation => {
            let eroded = engine.erode(grayscale, MORPH_ITERATIONS)?;
            engine.dilate(&eroded, MORPH_ITERATIONS)
        }
        FilterType::Contours => {
            let found = engine.detect_contours(grayscale)?;
            engine.draw_contours(original, &found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FilterError, FilterErrorKind};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_index_clamps() {
        assert_eq!(FilterType::from_index_clamped(-4), FilterType::Original);
        assert_eq!(FilterType::from_index_clamped(3), FilterType::Edges);
        assert_eq!(FilterType::from_index_clamped(99), FilterType::Contours);
    }

    #[test]
    fn test_index_round_trip() {
        for (i, filter) in FilterType::ALL.iter().enumerate() {
            assert_eq!(filter.index(), i);
            assert_eq!(FilterType::from_index_clamped(i as i64), *filter);
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("edges".parse::<FilterType>(), Ok(FilterType::Edges));
        assert_eq!(
            "Erosion_Dilation".parse::<FilterType>(),
            Ok(FilterType::ErosionDilation)
        );
        assert_eq!("2".parse::<FilterType>(), Ok(FilterType::Blur));
        assert!("sepia".parse::<FilterType>().is_err());
    }

    #[test]
    fn test_cycle_wraps() {
        assert_eq!(FilterType::Contours.next(), FilterType::Original);
        assert_eq!(FilterType::Original.previous(), FilterType::Contours);
    }

    #[test]
    fn test_needs_original() {
        let needing: Vec<_> = FilterType::ALL
            .into_iter()
            .filter(|f| f.needs_original())
            .collect();
        assert_eq!(needing, vec![FilterType::Original, FilterType::Contours]);
    }

    #[test]
    fn test_render_every_filter() {
        let original = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            if (4..12).contains(&x) && (4..12).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let gray = to_grayscale(&original).unwrap();

        for filter in FilterType::ALL {
            let out = render_filter(&CpuFilterEngine, filter, &original, &gray).unwrap();
            assert_eq!((out.width(), out.height()), (16, 16), "{}", filter);
            let expected_channels = if filter.needs_original() { 3 } else { 1 };
            assert_eq!(channel_count(&out), expected_channels, "{}", filter);
        }
    }

    struct BrokenCanny;

    impl FilterEngine for BrokenCanny {
        fn canny(&self, _image: &DynamicImage) -> FilterResult<DynamicImage> {
            Err(FilterError::processing("canny", "injected"))
        }
    }

    #[test]
    fn test_render_propagates_engine_errors() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
        let err = render_filter(&BrokenCanny, FilterType::Edges, &gray, &gray).unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::Processing);

        // other filters still use the default implementations
        assert!(render_filter(&BrokenCanny, FilterType::Blur, &gray, &gray).is_ok());
    }
}
