// SPDX-License-Identifier: GPL-3.0-only

//! Single capture workflow
//!
//! ```text
//! Idle → Capturing → Converting → Histogramming → Succeeded
//!            │            │              │
//!            └────────────┴──────────────┴──────→ Failed
//! ```
//!
//! Each run captures one frame, converts it to grayscale and computes the
//! histogram. Errors never escape as `Err`: every run ends in a
//! [`ProcessingResult`] the caller can hand straight to the display state.

use crate::backends::camera::FrameProvider;
use crate::filters::{FilterEngine, Histogram};
use image::DynamicImage;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where a workflow run is, or where it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowStage {
    #[default]
    Idle,
    Capturing,
    Converting,
    Histogramming,
    Succeeded,
    Failed,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::Capturing => "capturing",
            WorkflowStage::Converting => "converting",
            WorkflowStage::Histogramming => "histogramming",
            WorkflowStage::Succeeded => "succeeded",
            WorkflowStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Buffers produced by a successful run
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    /// Color frame as captured
    pub original: DynamicImage,
    /// Single-channel conversion of `original`
    pub grayscale: DynamicImage,
    pub histogram: Histogram,
}

/// Why a run failed. Carries no image buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFailure {
    /// Stage that was running when the failure happened
    pub stage: WorkflowStage,
    pub message: String,
}

impl fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.stage)
    }
}

/// Outcome of one workflow run
#[derive(Debug, Clone)]
pub enum ProcessingResult {
    Success(CaptureOutput),
    Failure(WorkflowFailure),
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingResult::Success(_))
    }

    pub fn output(&self) -> Option<&CaptureOutput> {
        match self {
            ProcessingResult::Success(output) => Some(output),
            ProcessingResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkflowFailure> {
        match self {
            ProcessingResult::Success(_) => None,
            ProcessingResult::Failure(failure) => Some(failure),
        }
    }
}

/// Capture → grayscale → histogram orchestrator
pub struct Workflow {
    source: Arc<dyn FrameProvider>,
    engine: Arc<dyn FilterEngine>,
    stage: Arc<Mutex<WorkflowStage>>,
}

impl Workflow {
    pub fn new(source: Arc<dyn FrameProvider>, engine: Arc<dyn FilterEngine>) -> Self {
        Self {
            source,
            engine,
            stage: Arc::new(Mutex::new(WorkflowStage::Idle)),
        }
    }

    /// Stage of the current or most recent run
    pub fn stage(&self) -> WorkflowStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the workflow on the blocking thread pool
    ///
    /// The calling task is never blocked by camera I/O or image processing.
    pub async fn run(&self) -> ProcessingResult {
        let source = Arc::clone(&self.source);
        let engine = Arc::clone(&self.engine);
        let stage = Arc::clone(&self.stage);

        let joined = tokio::task::spawn_blocking(move || {
            execute(source.as_ref(), engine.as_ref(), &stage)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => {
                let tracker = StageTracker { stage: &self.stage };
                let stage = tracker.current();
                tracker.set(WorkflowStage::Failed);
                warn!(stage = %stage, error = %e, "Workflow worker failed");
                ProcessingResult::Failure(WorkflowFailure {
                    stage,
                    message: format!("workflow worker failed: {}", e),
                })
            }
        }
    }

    /// Run the workflow on the calling thread
    pub fn run_blocking(&self) -> ProcessingResult {
        execute(self.source.as_ref(), self.engine.as_ref(), &self.stage)
    }
}

struct StageTracker<'a> {
    stage: &'a Mutex<WorkflowStage>,
}

impl StageTracker<'_> {
    fn current(&self) -> WorkflowStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: WorkflowStage) {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *stage;
        debug!(from = %from, to = %next, "Workflow stage");
        *stage = next;
    }

    fn fail(&self, message: String) -> ProcessingResult {
        let stage = self.current();
        self.set(WorkflowStage::Failed);
        warn!(stage = %stage, "Workflow failed: {}", message);
        ProcessingResult::Failure(WorkflowFailure { stage, message })
    }
}

fn execute(
    source: &dyn FrameProvider,
    engine: &dyn FilterEngine,
    stage: &Mutex<WorkflowStage>,
) -> ProcessingResult {
    let tracker = StageTracker { stage };
    tracker.set(WorkflowStage::Idle);

    tracker.set(WorkflowStage::Capturing);
    let original = match source.capture_single_frame() {
        Ok(frame) => frame,
        Err(e) => return tracker.fail(format!("capture failed: {}", e)),
    };

    tracker.set(WorkflowStage::Converting);
    let grayscale = match engine.to_grayscale(&original) {
        Ok(gray) => gray,
        Err(e) => return tracker.fail(e.to_string()),
    };

    tracker.set(WorkflowStage::Histogramming);
    let histogram = match engine.histogram(&grayscale) {
        Ok(hist) => hist,
        Err(e) => return tracker.fail(e.to_string()),
    };

    tracker.set(WorkflowStage::Succeeded);
    info!(
        width = original.width(),
        height = original.height(),
        pixels = histogram.total(),
        "Capture workflow finished"
    );

    ProcessingResult::Success(CaptureOutput {
        original,
        grayscale,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{
        BackendError, BackendResult, FrameSink, FrameSource, SourceSettings, SyntheticOpener,
    };
    use crate::errors::{FilterError, FilterResult};
    use crate::filters::{CpuFilterEngine, Histogram, channel_count};
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    struct BrokenCamera;

    impl FrameProvider for BrokenCamera {
        fn capture_single_frame(&self) -> BackendResult<DynamicImage> {
            Err(BackendError::OpenFailed("camera 0: busy".to_string()))
        }

        fn start_stream(&self, _sink: FrameSink) -> BackendResult<()> {
            Err(BackendError::OpenFailed("camera 0: busy".to_string()))
        }

        fn stop_stream(&self) {}

        fn is_streaming(&self) -> bool {
            false
        }
    }

    struct NoGray;

    impl FilterEngine for NoGray {
        fn to_grayscale(&self, _image: &DynamicImage) -> FilterResult<DynamicImage> {
            Err(FilterError::processing("grayscale", "injected"))
        }
    }

    struct NoHistogram;

    impl FilterEngine for NoHistogram {
        fn histogram(&self, _gray: &DynamicImage) -> FilterResult<Histogram> {
            Err(FilterError::processing("histogram", "injected"))
        }
    }

    fn gray_source() -> Arc<dyn FrameProvider> {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([128, 128, 128])));
        let opener = SyntheticOpener::fixed_frame(frame).frame_interval(Duration::ZERO);
        Arc::new(FrameSource::new(Arc::new(opener), SourceSettings::default()))
    }

    #[test]
    fn test_capture_failure_mentions_capture() {
        let workflow = Workflow::new(Arc::new(BrokenCamera), Arc::new(CpuFilterEngine));
        let result = workflow.run_blocking();

        let failure = result.failure().expect("run should fail");
        assert!(failure.message.contains("capture"));
        assert_eq!(failure.stage, WorkflowStage::Capturing);
        assert_eq!(workflow.stage(), WorkflowStage::Failed);
    }

    #[test]
    fn test_conversion_failure_reports_stage() {
        let workflow = Workflow::new(gray_source(), Arc::new(NoGray));
        let result = workflow.run_blocking();

        let failure = result.failure().expect("run should fail");
        assert_eq!(failure.stage, WorkflowStage::Converting);
        assert!(failure.message.contains("injected"));
    }

    #[test]
    fn test_histogram_failure_reports_stage() {
        let workflow = Workflow::new(gray_source(), Arc::new(NoHistogram));
        let result = workflow.run_blocking();

        let failure = result.failure().expect("run should fail");
        assert_eq!(failure.stage, WorkflowStage::Histogramming);
        assert!(failure.message.contains("injected"));
        assert_eq!(workflow.stage(), WorkflowStage::Failed);
    }

    #[test]
    fn test_uniform_frame_histogram() {
        let workflow = Workflow::new(gray_source(), Arc::new(CpuFilterEngine));
        let result = workflow.run_blocking();

        let output = result.output().expect("run should succeed");
        assert_eq!(output.histogram.get(128), 100);
        assert_eq!(output.histogram.total(), 100);
        assert_eq!((output.grayscale.width(), output.grayscale.height()), (10, 10));
        assert_eq!(channel_count(&output.grayscale), 1);
        assert_eq!(channel_count(&output.original), 3);
        assert_eq!(workflow.stage(), WorkflowStage::Succeeded);
    }

    #[tokio::test]
    async fn test_async_run_matches_blocking() {
        let workflow = Workflow::new(gray_source(), Arc::new(CpuFilterEngine));
        let result = workflow.run().await;

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_async_capture_failure() {
        let workflow = Workflow::new(Arc::new(BrokenCamera), Arc::new(CpuFilterEngine));
        let result = workflow.run().await;

        assert!(!result.is_success());
        assert!(result.failure().unwrap().message.starts_with("capture failed"));
    }
}
