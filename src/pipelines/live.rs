// SPDX-License-Identifier: GPL-3.0-only

//! Live filter pipeline
//!
//! ```text
//! capture thread                                consumer context
//! ──────────────                                ────────────────
//! frame ─▶ clone ─▶ gray + histogram
//!                 ─▶ selected filter ─▶ post ─▶ still this session? ─▶ sink
//! ```
//!
//! Each `start` opens a new session with its own id. `stop` retires the id
//! before stopping the source, so jobs already queued for the old session are
//! dropped on the consumer side instead of reaching the sink.

use crate::app::dispatch::ConsumerContext;
use crate::backends::camera::{BackendResult, FrameProvider};
use crate::filters::{FilterEngine, FilterType, Histogram, render_filter};
use image::DynamicImage;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Lifecycle of the live pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveState {
    #[default]
    Stopped,
    Starting,
    Streaming,
    Stopping,
}

/// Receives each processed frame on the consumer context
pub type LiveSink = Box<dyn FnMut(DynamicImage, Option<Histogram>) + Send>;

/// No session is active
const NO_SESSION: u64 = 0;

/// Everything the capture thread needs to process one frame
struct FrameWorker {
    engine: Arc<dyn FilterEngine>,
    context: Arc<dyn ConsumerContext>,
    filter: Arc<AtomicUsize>,
    active_session: Arc<AtomicU64>,
    session: u64,
    sink: Arc<Mutex<LiveSink>>,
    frames: u64,
}

impl FrameWorker {
    fn process(&mut self, frame: &DynamicImage) {
        self.frames += 1;

        // The source reuses its buffer, so take our own copy first
        let original = frame.clone();

        let grayscale = match self.engine.to_grayscale(&original) {
            Ok(gray) => gray,
            Err(e) => {
                warn!(frame = self.frames, error = %e, "Grayscale conversion failed, skipping frame");
                return;
            }
        };

        let histogram = match self.engine.histogram(&grayscale) {
            Ok(hist) => hist,
            Err(e) => {
                warn!(frame = self.frames, error = %e, "Histogram failed, skipping frame");
                return;
            }
        };

        let selected = FilterType::from_index_clamped(self.filter.load(Ordering::Relaxed) as i64);
        let rendered = match render_filter(self.engine.as_ref(), selected, &original, &grayscale) {
            Ok(image) => image,
            Err(e) => {
                warn!(filter = %selected, error = %e, "Filter failed, showing grayscale");
                grayscale
            }
        };

        if self.active_session.load(Ordering::SeqCst) != self.session {
            return;
        }

        if self.frames % 60 == 0 {
            debug!(
                frame = self.frames,
                filter = %selected,
                width = rendered.width(),
                height = rendered.height(),
                "Live frame processed"
            );
        }

        let session = self.session;
        let active_session = Arc::clone(&self.active_session);
        let sink = Arc::clone(&self.sink);
        let posted = self.context.post(Box::new(move || {
            if active_session.load(Ordering::SeqCst) != session {
                debug!(session, "Dropping frame from stopped session");
                return;
            }
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *sink)(rendered, Some(histogram));
        }));

        if !posted {
            debug!(frame = self.frames, "Consumer context full or closed, frame dropped");
        }
    }
}

/// Drives the frame source and feeds filtered frames to a consumer
pub struct LivePipelineController {
    source: Arc<dyn FrameProvider>,
    engine: Arc<dyn FilterEngine>,
    context: Arc<dyn ConsumerContext>,
    /// Transitions are serialized by this lock
    state: Mutex<LiveState>,
    active_session: Arc<AtomicU64>,
    last_session: AtomicU64,
    filter: Arc<AtomicUsize>,
}

impl LivePipelineController {
    pub fn new(
        source: Arc<dyn FrameProvider>,
        engine: Arc<dyn FilterEngine>,
        context: Arc<dyn ConsumerContext>,
    ) -> Self {
        Self {
            source,
            engine,
            context,
            state: Mutex::new(LiveState::Stopped),
            active_session: Arc::new(AtomicU64::new(NO_SESSION)),
            last_session: AtomicU64::new(NO_SESSION),
            filter: Arc::new(AtomicUsize::new(FilterType::default().index())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LiveState {
        *self.lock_state()
    }

    pub fn is_streaming(&self) -> bool {
        *self.lock_state() == LiveState::Streaming && self.source.is_streaming()
    }

    /// Filter applied to frames captured from now on
    pub fn set_filter(&self, filter: FilterType) {
        self.filter.store(filter.index(), Ordering::Relaxed);
        debug!(filter = %filter, "Live filter selected");
    }

    pub fn selected_filter(&self) -> FilterType {
        FilterType::from_index_clamped(self.filter.load(Ordering::Relaxed) as i64)
    }

    /// Start streaming into `sink`
    ///
    /// Does nothing if already streaming. If the camera cannot be opened the
    /// error is returned and the controller stays stopped.
    pub fn start<F>(&self, sink: F) -> BackendResult<()>
    where
        F: FnMut(DynamicImage, Option<Histogram>) + Send + 'static,
    {
        let mut state = self.lock_state();
        if *state != LiveState::Stopped {
            let current = *state;
            warn!(state = ?current, "Live pipeline already running, ignoring start");
            return Ok(());
        }

        *state = LiveState::Starting;
        let session = self.last_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.active_session.store(session, Ordering::SeqCst);

        let sink: LiveSink = Box::new(sink);
        let mut worker = FrameWorker {
            engine: Arc::clone(&self.engine),
            context: Arc::clone(&self.context),
            filter: Arc::clone(&self.filter),
            active_session: Arc::clone(&self.active_session),
            session,
            sink: Arc::new(Mutex::new(sink)),
            frames: 0,
        };

        match self
            .source
            .start_stream(Box::new(move |frame: &DynamicImage| worker.process(frame)))
        {
            Ok(()) => {
                *state = LiveState::Streaming;
                info!(session, filter = %self.selected_filter(), "Live pipeline started");
                Ok(())
            }
            Err(e) => {
                self.active_session.store(NO_SESSION, Ordering::SeqCst);
                *state = LiveState::Stopped;
                error!(error = %e, "Failed to start live pipeline");
                Err(e)
            }
        }
    }

    /// Stop streaming. Frames still queued for the consumer are discarded.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if *state == LiveState::Stopped {
            debug!("Live pipeline not running, nothing to stop");
            return;
        }

        *state = LiveState::Stopping;
        let session = self.active_session.swap(NO_SESSION, Ordering::SeqCst);
        self.source.stop_stream();
        *state = LiveState::Stopped;
        info!(session, "Live pipeline stopped");
    }
}

impl Drop for LivePipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dispatch::QueueContext;
    use crate::backends::camera::{FrameSource, SourceSettings, SyntheticOpener, read_stamp};
    use crate::errors::{FilterError, FilterResult};
    use crate::filters::{CpuFilterEngine, channel_count};
    use std::thread;
    use std::time::Duration;

    struct Harness {
        opener: Arc<SyntheticOpener>,
        queue: Arc<QueueContext>,
        controller: LivePipelineController,
    }

    fn harness(opener: SyntheticOpener, engine: Arc<dyn FilterEngine>) -> Harness {
        let opener = Arc::new(opener.frame_interval(Duration::from_millis(1)));
        let settings = SourceSettings {
            width: 32,
            height: 24,
            grab_retry_delay: Duration::from_millis(1),
            open_retry_delay: Duration::from_millis(1),
            ..SourceSettings::default()
        };
        let source = Arc::new(FrameSource::new(opener.clone(), settings));
        let queue = Arc::new(QueueContext::new());
        let controller = LivePipelineController::new(source, engine, queue.clone());
        Harness {
            opener,
            queue,
            controller,
        }
    }

    /// Drain the queue until `n` frames reached the sink
    fn pump(queue: &QueueContext, received: &Received, n: usize) -> bool {
        for _ in 0..400 {
            queue.run_pending();
            if received.lock().unwrap().len() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    type Received = Arc<Mutex<Vec<(DynamicImage, Option<Histogram>)>>>;

    fn collecting_sink() -> (
        Received,
        impl FnMut(DynamicImage, Option<Histogram>) + Send + 'static,
    ) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&received);
        (received, move |img, hist| clone.lock().unwrap().push((img, hist)))
    }

    #[test]
    fn test_frames_reach_sink_with_histogram() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (received, sink) = collecting_sink();

        h.controller.start(sink).unwrap();
        assert_eq!(h.controller.state(), LiveState::Streaming);
        assert!(h.controller.is_streaming());
        assert!(pump(&h.queue, &received, 3));

        let frames = received.lock().unwrap();
        let (img, hist) = &frames[0];
        assert_eq!((img.width(), img.height()), (32, 24));
        assert_eq!(hist.as_ref().map(|h| h.total()), Some(32 * 24));
        drop(frames);

        h.controller.stop();
    }

    #[test]
    fn test_frames_delivered_in_capture_order() {
        let h = harness(SyntheticOpener::sequence_stamped(), Arc::new(CpuFilterEngine));
        let (received, sink) = collecting_sink();

        h.controller.set_filter(FilterType::Original);
        h.controller.start(sink).unwrap();
        assert!(pump(&h.queue, &received, 20));
        h.controller.stop();

        let stamps: Vec<u64> = received
            .lock()
            .unwrap()
            .iter()
            .map(|(img, _)| read_stamp(img).unwrap())
            .collect();
        // Frames may be dropped under load but never reordered or repeated
        assert!(
            stamps.windows(2).all(|pair| pair[0] < pair[1]),
            "out of order: {:?}",
            stamps
        );
    }

    #[test]
    fn test_no_sink_calls_after_stop() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (received, sink) = collecting_sink();

        h.controller.start(sink).unwrap();
        assert!(pump(&h.queue, &received, 1));

        // let frames pile up in the queue, then stop
        thread::sleep(Duration::from_millis(20));
        h.controller.stop();
        let before = received.lock().unwrap().len();

        h.queue.run_pending();
        thread::sleep(Duration::from_millis(20));
        h.queue.run_pending();

        assert_eq!(received.lock().unwrap().len(), before);
        assert_eq!(h.opener.live_devices(), 0);
        assert!(!h.controller.is_streaming());
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (_received, sink) = collecting_sink();

        h.controller.start(sink).unwrap();
        h.controller.stop();
        h.controller.stop();
        assert_eq!(h.controller.state(), LiveState::Stopped);

        // never started
        let idle = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        idle.controller.stop();
        assert_eq!(idle.opener.opens(), 0);
    }

    #[test]
    fn test_start_twice_opens_one_device() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (_first, sink) = collecting_sink();
        let (_second, other) = collecting_sink();

        h.controller.start(sink).unwrap();
        h.controller.start(other).unwrap();

        assert_eq!(h.opener.opens(), 1);
        assert_eq!(h.opener.live_devices(), 1);
        h.controller.stop();
    }

    #[test]
    fn test_open_failure_leaves_controller_stopped() {
        let h = harness(
            SyntheticOpener::test_pattern().fail_all_opens(),
            Arc::new(CpuFilterEngine),
        );
        let (received, sink) = collecting_sink();

        assert!(h.controller.start(sink).is_err());
        assert_eq!(h.controller.state(), LiveState::Stopped);
        assert_eq!(h.opener.live_devices(), 0);
        assert_eq!(h.queue.run_pending(), 0);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restart_after_stop() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (received, sink) = collecting_sink();
        h.controller.start(sink).unwrap();
        h.controller.stop();

        let (again, sink) = collecting_sink();
        h.controller.start(sink).unwrap();
        assert!(pump(&h.queue, &again, 1));
        h.controller.stop();

        assert_eq!(h.opener.opens(), 2);
        drop(received);
    }

    #[test]
    fn test_selected_filter_is_applied() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(CpuFilterEngine));
        let (received, sink) = collecting_sink();

        h.controller.set_filter(FilterType::Edges);
        assert_eq!(h.controller.selected_filter(), FilterType::Edges);
        h.controller.start(sink).unwrap();
        assert!(pump(&h.queue, &received, 2));
        h.controller.stop();

        let frames = received.lock().unwrap();
        assert!(frames.iter().all(|(img, _)| channel_count(img) == 1));
    }

    struct NoEdges;

    impl FilterEngine for NoEdges {
        fn canny(&self, _image: &DynamicImage) -> FilterResult<DynamicImage> {
            Err(FilterError::processing("canny", "injected"))
        }
    }

    #[test]
    fn test_filter_failure_falls_back_to_grayscale() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(NoEdges));
        let (received, sink) = collecting_sink();

        h.controller.set_filter(FilterType::Edges);
        h.controller.start(sink).unwrap();
        assert!(pump(&h.queue, &received, 1));
        h.controller.stop();

        let frames = received.lock().unwrap();
        let (img, hist) = &frames[0];
        assert_eq!(channel_count(img), 1);
        assert!(hist.is_some());
    }

    struct NoGray;

    impl FilterEngine for NoGray {
        fn to_grayscale(&self, _image: &DynamicImage) -> FilterResult<DynamicImage> {
            Err(FilterError::processing("grayscale", "injected"))
        }
    }

    #[test]
    fn test_grayscale_failure_skips_frames() {
        let h = harness(SyntheticOpener::test_pattern(), Arc::new(NoGray));
        let (received, sink) = collecting_sink();

        h.controller.start(sink).unwrap();
        thread::sleep(Duration::from_millis(30));
        h.queue.run_pending();
        h.controller.stop();

        assert!(received.lock().unwrap().is_empty());
    }
}
