// SPDX-License-Identifier: GPL-3.0-only

//! Contour extraction and drawing
//!
//! Detection binarizes the gray image at a fixed threshold and keeps only the
//! outermost borders, so holes inside a shape do not produce extra outlines.

use crate::constants::filter_defaults::{
    CONTOUR_COLOR, CONTOUR_GRAY_LEVEL, CONTOUR_THICKNESS, CONTOUR_THRESHOLD,
};
use crate::errors::{FilterError, FilterResult};
use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, Rgba};
use imageproc::contours::find_contours;
use imageproc::drawing::{Canvas, draw_line_segment_mut};
use imageproc::point::Point;

use super::engine::{gray_for, guarded, validate_input};

/// One closed outline, points in boundary order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Inclusive bounding box as `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let first = self.points.first()?;
        let init = (first.x, first.y, first.x, first.y);
        Some(self.points.iter().fold(init, |(x0, y0, x1, y1), p| {
            (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
        }))
    }
}

/// Outlines found in one image. An empty set means no shapes were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContourSet {
    contours: Vec<Contour>,
}

impl ContourSet {
    pub fn new(contours: Vec<Contour>) -> Self {
        Self { contours }
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub fn len(&self) -> usize {
        self.contours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    /// Contour with the most boundary points
    pub fn largest(&self) -> Option<&Contour> {
        self.contours.iter().max_by_key(|c| c.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter()
    }
}

/// Find the outer borders of bright regions. Color input is converted to gray.
pub fn detect_contours(image: &DynamicImage) -> FilterResult<ContourSet> {
    const OP: &str = "detect_contours";
    let gray = gray_for(OP, image)?;

    let (width, height) = gray.dimensions();
    let binary = GrayImage::from_fn(width, height, |x, y| {
        if gray.get_pixel(x, y)[0] > CONTOUR_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let found = guarded(OP, || Ok(find_contours::<i32>(&binary)))?;

    let contours = found
        .into_iter()
        .filter(|c| c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .collect();

    Ok(ContourSet::new(contours))
}

/// Copy `original` and outline every contour on the copy
///
/// Color images get green outlines, gray images white ones. Alpha is left
/// opaque where an outline is drawn.
pub fn draw_contours(original: &DynamicImage, contours: &ContourSet) -> FilterResult<DynamicImage> {
    const OP: &str = "draw_contours";
    validate_input(OP, original)?;

    let mut out = original.clone();
    if contours.is_empty() {
        return Ok(out);
    }

    let [r, g, b] = CONTOUR_COLOR;
    let level = CONTOUR_GRAY_LEVEL;

    guarded(OP, || {
        match &mut out {
            DynamicImage::ImageLuma8(img) => outline_all(img, contours, Luma([level])),
            DynamicImage::ImageLumaA8(img) => outline_all(img, contours, LumaA([level, 255])),
            DynamicImage::ImageRgb8(img) => outline_all(img, contours, Rgb([r, g, b])),
            DynamicImage::ImageRgba8(img) => outline_all(img, contours, Rgba([r, g, b, 255])),
            other => {
                return Err(FilterError::invalid_argument(
                    OP,
                    format!("unsupported sample type {:?}", other.color()),
                ));
            }
        }
        Ok(())
    })?;

    Ok(out)
}

fn outline_all<C>(canvas: &mut C, contours: &ContourSet, color: C::Pixel)
where
    C: Canvas,
    C::Pixel: Copy,
{
    for contour in contours.iter() {
        let points = contour.points();
        match points {
            [] => {}
            [only] => thick_segment(canvas, *only, *only, color),
            [first, .., last] => {
                for pair in points.windows(2) {
                    thick_segment(canvas, pair[0], pair[1], color);
                }
                thick_segment(canvas, *last, *first, color);
            }
        }
    }
}

/// Segment widened to `CONTOUR_THICKNESS` by stamping offset copies
/// centred on the contour. `draw_line_segment_mut` clips to the canvas.
fn thick_segment<C>(canvas: &mut C, from: Point<i32>, to: Point<i32>, color: C::Pixel)
where
    C: Canvas,
    C::Pixel: Copy,
{
    let thickness = CONTOUR_THICKNESS as i32;
    let offsets = -(thickness / 2)..thickness - thickness / 2;
    for dy in offsets.clone() {
        for dx in offsets.clone() {
            draw_line_segment_mut(
                canvas,
                ((from.x + dx) as f32, (from.y + dy) as f32),
                ((to.x + dx) as f32, (to.y + dy) as f32),
                color,
            );
        }
    }
}
