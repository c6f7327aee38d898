// SPDX-License-Identifier: GPL-3.0-only

//! camfilter - webcam capture with a live image filter pipeline
//!
//! Captures frames from a webcam, converts them to grayscale, computes an
//! intensity histogram and renders one of several filters (blur, Canny edges,
//! erosion/dilation, contours) either for a single capture or continuously.
//!
//! # Architecture
//!
//! - [`backends`]: frame source over V4L2 or a synthetic test pattern
//! - [`filters`]: stateless image operations
//! - [`pipelines`]: single capture workflow and live streaming pipeline
//! - [`app`]: display state and the consumer contexts that feed it
//! - [`config`]: user configuration handling
//! - [`terminal`]: terminal viewer
//!
//! # Example
//!
//! ```no_run
//! use camfilter::backends::camera::{FrameSource, SourceSettings, default_opener};
//! use camfilter::filters::CpuFilterEngine;
//! use camfilter::pipelines::workflow::Workflow;
//! use std::sync::Arc;
//!
//! let source = Arc::new(FrameSource::new(default_opener(), SourceSettings::default()));
//! let workflow = Workflow::new(source, Arc::new(CpuFilterEngine));
//! let result = workflow.run_blocking();
//! println!("captured: {}", result.is_success());
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod pipelines;
pub mod terminal;

// Re-export commonly used types
pub use app::{DisplayEvent, DisplayState};
pub use config::Config;
pub use errors::{ConfigError, FilterError, FilterErrorKind, FilterResult};
pub use filters::{FilterEngine, FilterType, Histogram};
pub use pipelines::live::{LivePipelineController, LiveState};
pub use pipelines::workflow::{ProcessingResult, Workflow};
