// SPDX-License-Identifier: GPL-3.0-only

//! Pure image transforms
//!
//! Every function borrows its input and returns a freshly allocated buffer,
//! so callers may drop inputs or chain calls freely. Inputs are validated
//! before any processing: empty or non 8-bit buffers are invalid arguments,
//! numeric parameters are range-checked, and panics raised inside `imageproc`
//! are reported as processing errors for the operation that caused them.

use crate::constants::filter_defaults::{CANNY_HIGH_THRESHOLD, CANNY_LOW_THRESHOLD};
use crate::errors::{FilterError, FilterResult};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::{edges, morphology};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Number of channels in the buffer (1 gray, 2 gray+alpha, 3 RGB, 4 RGBA)
pub fn channel_count(image: &DynamicImage) -> usize {
    image.color().channel_count() as usize
}

/// Reject empty buffers and sample types other than 8-bit
pub(crate) fn validate_input(operation: &'static str, image: &DynamicImage) -> FilterResult<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FilterError::invalid_argument(operation, "image is empty"));
    }

    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Ok(()),
        other => Err(FilterError::invalid_argument(
            operation,
            format!("unsupported sample type {:?}", other.color()),
        )),
    }
}

/// Run a transform, turning a panic inside it into a processing error
pub(crate) fn guarded<T>(
    operation: &'static str,
    f: impl FnOnce() -> FilterResult<T>,
) -> FilterResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(FilterError::processing(
            operation,
            panic_message(payload.as_ref()),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Convert to a single-channel 8-bit image
///
/// Already-gray input is copied, so the result never aliases the input.
pub fn to_grayscale(image: &DynamicImage) -> FilterResult<DynamicImage> {
    to_gray_image("grayscale", image).map(DynamicImage::ImageLuma8)
}

pub(crate) fn to_gray_image(operation: &'static str, image: &DynamicImage) -> FilterResult<GrayImage> {
    validate_input(operation, image)?;

    match image {
        DynamicImage::ImageLuma8(gray) => Ok(gray.clone()),
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Ok(image.to_luma8()),
        other => Err(FilterError::processing(
            operation,
            format!(
                "cannot convert {} channel image to grayscale",
                channel_count(other)
            ),
        )),
    }
}

/// Gray view of the input for operations that work on intensity only
pub(crate) fn gray_for(operation: &'static str, image: &DynamicImage) -> FilterResult<GrayImage> {
    validate_input(operation, image)?;
    to_gray_image(operation, image).map_err(|e| {
        FilterError::processing_with_source(operation, "grayscale conversion failed", e)
    })
}

/// Sigma used for a square Gaussian kernel of `kernel_size`,
/// following the usual `0.3 * ((k - 1) / 2 - 1) + 0.8` rule
fn kernel_sigma(kernel_size: i32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian with exactly `kernel_size` taps
fn gaussian_kernel(kernel_size: i32) -> Vec<f32> {
    let sigma = kernel_sigma(kernel_size);
    let radius = kernel_size / 2;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Gaussian blur with a square kernel. `kernel_size` must be odd and positive.
pub fn gaussian_blur(image: &DynamicImage, kernel_size: i32) -> FilterResult<DynamicImage> {
    const OP: &str = "gaussian_blur";
    validate_input(OP, image)?;

    if kernel_size <= 0 || kernel_size % 2 == 0 {
        return Err(FilterError::out_of_range(
            OP,
            "kernel_size",
            kernel_size as i64,
            "odd and greater than 0",
        ));
    }

    // A 1x1 kernel is the identity
    if kernel_size == 1 {
        return Ok(image.clone());
    }

    let kernel = gaussian_kernel(kernel_size);
    guarded(OP, || match image {
        DynamicImage::ImageLuma8(img) => {
            Ok(DynamicImage::ImageLuma8(separable_filter_equal(img, &kernel)))
        }
        DynamicImage::ImageLumaA8(img) => {
            Ok(DynamicImage::ImageLumaA8(separable_filter_equal(img, &kernel)))
        }
        DynamicImage::ImageRgb8(img) => {
            Ok(DynamicImage::ImageRgb8(separable_filter_equal(img, &kernel)))
        }
        DynamicImage::ImageRgba8(img) => {
            Ok(DynamicImage::ImageRgba8(separable_filter_equal(img, &kernel)))
        }
        other => Err(FilterError::invalid_argument(
            OP,
            format!("unsupported sample type {:?}", other.color()),
        )),
    })
}

#[derive(Debug, Clone, Copy)]
enum Morphology {
    Erode,
    Dilate,
}

impl Morphology {
    fn name(self) -> &'static str {
        match self {
            Morphology::Erode => "erode",
            Morphology::Dilate => "dilate",
        }
    }

    /// `iterations` passes of the 3x3 square structuring element
    fn apply(self, plane: &GrayImage, iterations: u32) -> GrayImage {
        let pass = |img: &GrayImage| match self {
            Morphology::Erode => morphology::erode(img, Norm::LInf, 1),
            Morphology::Dilate => morphology::dilate(img, Norm::LInf, 1),
        };

        let mut out = pass(plane);
        for _ in 1..iterations {
            out = pass(&out);
        }
        out
    }
}

/// Apply a plane transform to every channel of an 8-bit image
fn map_channels<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    transform: &dyn Fn(&GrayImage) -> GrayImage,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let mut out = ImageBuffer::<P, Vec<u8>>::new(width, height);

    for channel in 0..P::CHANNEL_COUNT as usize {
        let plane = GrayImage::from_fn(width, height, |x, y| {
            Luma([image.get_pixel(x, y).channels()[channel]])
        });
        let processed = transform(&plane);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            pixel.channels_mut()[channel] = processed.get_pixel(x, y)[0];
        }
    }

    out
}

fn morph(image: &DynamicImage, iterations: i32, op: Morphology) -> FilterResult<DynamicImage> {
    let name = op.name();
    validate_input(name, image)?;

    if iterations <= 0 {
        return Err(FilterError::out_of_range(
            name,
            "iterations",
            iterations as i64,
            "greater than 0",
        ));
    }

    let iterations = iterations as u32;
    let transform = |plane: &GrayImage| op.apply(plane, iterations);
    guarded(name, || match image {
        DynamicImage::ImageLuma8(img) => Ok(DynamicImage::ImageLuma8(transform(img))),
        DynamicImage::ImageLumaA8(img) => Ok(DynamicImage::ImageLumaA8(map_channels(img, &transform))),
        DynamicImage::ImageRgb8(img) => Ok(DynamicImage::ImageRgb8(map_channels(img, &transform))),
        DynamicImage::ImageRgba8(img) => Ok(DynamicImage::ImageRgba8(map_channels(img, &transform))),
        other => Err(FilterError::invalid_argument(
            name,
            format!("unsupported sample type {:?}", other.color()),
        )),
    })
}

/// Morphological erosion with a 3x3 rectangular element, `iterations` times
pub fn erode(image: &DynamicImage, iterations: i32) -> FilterResult<DynamicImage> {
    morph(image, iterations, Morphology::Erode)
}

/// Morphological dilation with a 3x3 rectangular element, `iterations` times
pub fn dilate(image: &DynamicImage, iterations: i32) -> FilterResult<DynamicImage> {
    morph(image, iterations, Morphology::Dilate)
}

/// Canny edge map. Color input is converted to gray first.
pub fn canny(image: &DynamicImage) -> FilterResult<DynamicImage> {
    const OP: &str = "canny";
    let gray = gray_for(OP, image)?;

    guarded(OP, || {
        Ok(DynamicImage::ImageLuma8(edges::canny(
            &gray,
            CANNY_LOW_THRESHOLD,
            CANNY_HIGH_THRESHOLD,
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FilterErrorKind;
    use image::{GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    fn checkerboard(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([250, 240, 230])
            } else {
                Rgb([10, 20, 30])
            }
        }))
    }

    #[test]
    fn test_grayscale_of_color_is_single_channel() {
        let gray = to_grayscale(&checkerboard(20, 10)).unwrap();
        assert_eq!(channel_count(&gray), 1);
        assert_eq!((gray.width(), gray.height()), (20, 10));
    }

    #[test]
    fn test_grayscale_is_idempotent() {
        let once = to_grayscale(&checkerboard(8, 8)).unwrap();
        let twice = to_grayscale(&once).unwrap();
        assert_eq!(channel_count(&twice), 1);
        assert_eq!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn test_grayscale_of_uniform_gray_keeps_level() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([128, 128, 128])));
        let gray = to_grayscale(&rgb).unwrap();
        assert!(gray.as_bytes().iter().all(|&v| v == 128));
    }

    #[test]
    fn test_grayscale_rejects_two_channels() {
        let la = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(2, 2, LumaA([1, 255])));
        let err = to_grayscale(&la).unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::Processing);
    }

    #[test]
    fn test_empty_input_is_invalid_argument() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        for err in [
            to_grayscale(&empty).unwrap_err(),
            gaussian_blur(&empty, 5).unwrap_err(),
            erode(&empty, 1).unwrap_err(),
            dilate(&empty, 1).unwrap_err(),
            canny(&empty).unwrap_err(),
        ] {
            assert_eq!(err.kind(), FilterErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_sixteen_bit_input_is_invalid_argument() {
        let deep = DynamicImage::ImageLuma16(ImageBuffer::new(4, 4));
        let err = gaussian_blur(&deep, 3).unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::InvalidArgument);
    }

    #[test]
    fn test_blur_rejects_even_and_non_positive_kernels() {
        let img = checkerboard(8, 8);
        for k in [0, -1, -3, 2, 4, 10] {
            let err = gaussian_blur(&img, k).unwrap_err();
            assert_eq!(err.kind(), FilterErrorKind::OutOfRange, "kernel {}", k);
        }
    }

    #[test]
    fn test_morphology_rejects_non_positive_iterations() {
        let img = checkerboard(8, 8);
        for n in [0, -1, -100] {
            assert_eq!(erode(&img, n).unwrap_err().kind(), FilterErrorKind::OutOfRange);
            assert_eq!(dilate(&img, n).unwrap_err().kind(), FilterErrorKind::OutOfRange);
        }
    }

    #[test]
    fn test_transforms_preserve_shape() {
        let inputs = [
            checkerboard(16, 12),
            DynamicImage::ImageLuma8(GrayImage::from_fn(16, 12, |x, _| Luma([(x * 15) as u8]))),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 12, Rgba([9, 8, 7, 255]))),
        ];

        for img in &inputs {
            let channels = channel_count(img);
            for out in [
                gaussian_blur(img, 5).unwrap(),
                erode(img, 1).unwrap(),
                dilate(img, 2).unwrap(),
            ] {
                assert_eq!((out.width(), out.height()), (16, 12));
                assert_eq!(channel_count(&out), channels);
            }

            let edges = canny(img).unwrap();
            assert_eq!((edges.width(), edges.height()), (16, 12));
            assert_eq!(channel_count(&edges), 1);
        }
    }

    #[test]
    fn test_erode_shrinks_and_dilate_grows() {
        let mut gray = GrayImage::new(9, 9);
        for y in 2..7 {
            for x in 2..7 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        let img = DynamicImage::ImageLuma8(gray);
        let count = |i: &DynamicImage| i.as_bytes().iter().filter(|&&v| v == 255).count();

        let eroded = erode(&img, 1).unwrap();
        let dilated = dilate(&img, 1).unwrap();

        assert_eq!(count(&img), 25);
        assert_eq!(count(&eroded), 9);
        assert_eq!(count(&dilated), 49);
    }

    #[test]
    fn test_blur_kernel_one_is_identity() {
        let img = checkerboard(8, 8);
        let out = gaussian_blur(&img, 1).unwrap();
        assert_eq!(img.as_bytes(), out.as_bytes());
    }

    #[test]
    fn test_blur_spreads_impulse_over_kernel_width() {
        let mut gray = GrayImage::new(11, 11);
        gray.put_pixel(5, 5, Luma([255]));
        let img = DynamicImage::ImageLuma8(gray);

        for (k, taps) in [(3, 3), (5, 5)] {
            let out = gaussian_blur(&img, k).unwrap().to_luma8();
            let row = (0..11).filter(|&x| out.get_pixel(x, 5)[0] > 0).count();
            let col = (0..11).filter(|&y| out.get_pixel(5, y)[0] > 0).count();
            assert_eq!(row, taps, "kernel {}", k);
            assert_eq!(col, taps, "kernel {}", k);
        }
    }

    #[test]
    fn test_gaussian_kernel_is_normalized() {
        for k in [3, 5, 7] {
            let kernel = gaussian_kernel(k);
            assert_eq!(kernel.len(), k as usize);
            assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            assert_eq!(kernel.first(), kernel.last());
        }
    }

    #[test]
    fn test_canny_finds_edges_on_checkerboard() {
        let edges = canny(&checkerboard(32, 32)).unwrap();
        assert!(edges.as_bytes().iter().any(|&v| v == 255));
    }

    #[test]
    fn test_guarded_reports_panics() {
        let result: FilterResult<()> = guarded("explode", || panic!("library failure"));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), FilterErrorKind::Processing);
        assert!(err.to_string().contains("library failure"));
    }
}
