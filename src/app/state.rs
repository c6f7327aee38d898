// SPDX-License-Identifier: GPL-3.0-only

//! Display state
//!
//! Holds what the viewer shows: the displayed image, the histogram and the
//! selected filter, plus the original/grayscale pair from the last successful
//! capture so a filter change can be re-rendered without capturing again.
//! Only the consumer context mutates it.

use crate::filters::{FilterEngine, FilterType, Histogram, render_filter};
use crate::pipelines::workflow::ProcessingResult;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Change notifications for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The displayed image was replaced
    ImageChanged,
    /// A different filter was selected
    FilterChanged(FilterType),
    /// The histogram was replaced
    HistogramChanged,
    /// All buffers were released
    Cleared,
}

/// Callback notified after each state change
pub type DisplayObserver = Box<dyn FnMut(&DisplayEvent) + Send>;

/// Current displayed image, histogram and filter selection
pub struct DisplayState {
    engine: Arc<dyn FilterEngine>,
    /// Color frame from the last successful capture
    original: Option<DynamicImage>,
    /// Gray conversion of `original`
    grayscale: Option<DynamicImage>,
    displayed: Option<DynamicImage>,
    histogram: Option<Histogram>,
    histogram_generated: bool,
    selected: FilterType,
    last_error: Option<String>,
    observer: Option<DisplayObserver>,
}

impl DisplayState {
    pub fn new(engine: Arc<dyn FilterEngine>) -> Self {
        Self {
            engine,
            original: None,
            grayscale: None,
            displayed: None,
            histogram: None,
            histogram_generated: false,
            selected: FilterType::default(),
            last_error: None,
            observer: None,
        }
    }

    /// Register the observer, replacing any previous one
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&DisplayEvent) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    fn notify(&mut self, event: DisplayEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    pub fn displayed(&self) -> Option<&DynamicImage> {
        self.displayed.as_ref()
    }

    pub fn original(&self) -> Option<&DynamicImage> {
        self.original.as_ref()
    }

    pub fn grayscale(&self) -> Option<&DynamicImage> {
        self.grayscale.as_ref()
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    pub fn histogram_generated(&self) -> bool {
        self.histogram_generated
    }

    pub fn selected_filter(&self) -> FilterType {
        self.selected
    }

    /// Message of the most recent failure, cleared by the next success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Select a filter by index, clamping out-of-range values
    ///
    /// If the selection changed and the base images it needs are cached, the
    /// displayed image is re-rendered right away. Returns the filter now
    /// selected.
    pub fn set_selected_filter(&mut self, index: i64) -> FilterType {
        let filter = FilterType::from_index_clamped(index);
        if filter == self.selected {
            return filter;
        }

        debug!(from = %self.selected, to = %filter, "Filter selected");
        self.selected = filter;
        self.notify(DisplayEvent::FilterChanged(filter));
        self.rerender();
        filter
    }

    /// Render the selected filter from the cached bases, if they are present
    fn rerender(&mut self) {
        let rendered = match (&self.original, &self.grayscale) {
            (Some(original), _) if self.selected == FilterType::Original => Ok(original.clone()),
            (Some(original), Some(gray)) => {
                render_filter(self.engine.as_ref(), self.selected, original, gray)
            }
            (None, Some(gray)) if !self.selected.needs_original() => {
                render_filter(self.engine.as_ref(), self.selected, gray, gray)
            }
            _ => {
                debug!(filter = %self.selected, "No base images for filter yet");
                return;
            }
        };

        match rendered {
            Ok(image) => {
                // Install first, release the old buffer afterwards
                let previous = self.displayed.replace(image);
                self.notify(DisplayEvent::ImageChanged);
                drop(previous);
            }
            Err(e) => {
                warn!(filter = %self.selected, error = %e, "Filter failed, keeping previous image");
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Adopt the outcome of a capture workflow
    ///
    /// Success replaces the cached bases and histogram and re-renders the
    /// selected filter. Failure releases everything and records the message.
    pub fn ingest_workflow_result(&mut self, result: ProcessingResult) {
        match result {
            ProcessingResult::Success(output) => {
                self.original = Some(output.original);
                self.grayscale = Some(output.grayscale);
                self.histogram = Some(output.histogram);
                self.histogram_generated = true;
                self.last_error = None;
                self.notify(DisplayEvent::HistogramChanged);
                self.rerender();
            }
            ProcessingResult::Failure(failure) => {
                warn!(stage = %failure.stage, "Capture failed: {}", failure.message);
                self.clear();
                self.last_error = Some(failure.message);
            }
        }
    }

    /// Show a frame produced by the live pipeline
    pub fn show_live_frame(&mut self, image: DynamicImage, histogram: Option<Histogram>) {
        let previous = self.displayed.replace(image);
        self.notify(DisplayEvent::ImageChanged);
        drop(previous);

        if let Some(histogram) = histogram {
            self.histogram = Some(histogram);
            self.histogram_generated = true;
            self.notify(DisplayEvent::HistogramChanged);
        }
    }

    /// Release every buffer and the histogram
    pub fn clear(&mut self) {
        self.original = None;
        self.grayscale = None;
        self.displayed = None;
        self.histogram = None;
        self.histogram_generated = false;
        self.last_error = None;
        self.notify(DisplayEvent::Cleared);
    }
}
