// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture loops
//!
//! A [`CaptureLoopController`] owns one worker thread that runs a loop closure
//! until the controller signals it. The loop state (an open camera) is created
//! on the worker thread through an init closure, so it never has to cross
//! threads.

use crate::constants::timing::{JOIN_POLL_INTERVAL, STOP_TIMEOUT};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why [`CaptureLoopController::start_with_init`] did not start a loop
#[derive(Debug, thiserror::Error)]
pub enum StartError<E> {
    /// The init closure returned an error
    #[error("{0}")]
    Init(E),
    /// The thread could not be spawned or died before reporting
    #[error("capture thread '{0}' exited during initialization")]
    ThreadExited(String),
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = CaptureLoopController::start_with_init(
///     "camera-stream",
///     || open_camera(),
///     |camera| {
///         if let Some(frame) = camera.read() {
///             deliver(frame);
///         }
///     },
/// )?;
///
/// // Later, stop the loop without waiting forever
/// controller.stop_timeout(Duration::from_secs(2));
/// ```
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a capture loop whose state is built on the worker thread
    ///
    /// Blocks until `init_fn` has run. If it fails the thread exits and the
    /// error is returned here, so no loop is left behind. `loop_fn` then runs
    /// until the controller is stopped, and the state is dropped on the worker
    /// thread when the loop ends.
    pub fn start_with_init<S, E, I, F>(
        name: &str,
        init_fn: I,
        mut loop_fn: F,
    ) -> Result<Self, StartError<E>>
    where
        S: 'static,
        E: Send + 'static,
        I: FnOnce() -> Result<S, E> + Send + 'static,
        F: FnMut(&mut S) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();
        let (init_tx, init_rx) = mpsc::sync_channel::<Result<(), E>>(1);

        info!(name = %name, "Starting capture loop");

        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => {
                        debug!(name = %name_clone, "Initialization successful");
                        let _ = init_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        warn!(name = %name_clone, "Initialization failed");
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };

                while !stop_signal_clone.load(Ordering::SeqCst) {
                    loop_fn(&mut state);
                }
                debug!(name = %name_clone, "Stop signal received");

                drop(state);
                info!(name = %name_clone, "Capture loop thread exiting");
            });

        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture thread");
                return Err(StartError::ThreadExited(name.to_string()));
            }
        };

        match init_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                thread_handle: Some(thread_handle),
                stop_signal,
                name: name.to_string(),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(StartError::Init(e))
            }
            Err(_) => {
                // Sender dropped without a message: init panicked
                let _ = thread_handle.join();
                Err(StartError::ThreadExited(name.to_string()))
            }
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop, waiting at most `timeout` for the thread
    ///
    /// Returns `false` if the thread was still running at the deadline; it is
    /// then detached and finishes on its own once its current iteration ends.
    pub fn stop_timeout(&mut self, timeout: Duration) -> bool {
        self.request_stop();

        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    name = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Capture loop did not stop in time, detaching thread"
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
        } else {
            debug!(name = %self.name, "Capture loop thread finished");
        }
        true
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop_timeout(STOP_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_loop(
        name: &str,
        counter: Arc<AtomicU32>,
        pause: Duration,
    ) -> CaptureLoopController {
        CaptureLoopController::start_with_init(
            name,
            || Ok::<_, ()>(()),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(pause);
            },
        )
        .unwrap()
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut controller =
            counting_loop("test-loop", Arc::clone(&counter), Duration::from_millis(10));

        thread::sleep(Duration::from_millis(50));

        assert!(controller.stop_timeout(Duration::from_secs(2)));
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());

        // No iteration runs after stop returned
        let after_stop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_with_init() {
        let result = Arc::new(AtomicU32::new(0));
        let result_clone = Arc::clone(&result);

        let mut controller = CaptureLoopController::start_with_init(
            "test-init-loop",
            || Ok::<_, String>(42u32),
            move |state| {
                result_clone.store(*state, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            },
        )
        .unwrap();

        for _ in 0..200 {
            if result.load(Ordering::SeqCst) == 42 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(result.load(Ordering::SeqCst), 42);
        assert!(controller.stop_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn test_init_failure_is_reported() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let result = CaptureLoopController::start_with_init(
            "test-fail-init",
            || Err::<(), _>("Init failed".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
            },
        );

        match result {
            Err(StartError::Init(msg)) => assert_eq!(msg, "Init failed"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("init failure must not start a loop"),
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_init_panic_is_reported() {
        let result = CaptureLoopController::start_with_init(
            "test-panic-init",
            || -> Result<(), ()> { panic!("device exploded") },
            |_| {},
        );

        assert!(matches!(result, Err(StartError::ThreadExited(name)) if name == "test-panic-init"));
    }

    #[test]
    fn test_state_dropped_on_worker_when_loop_ends() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let dropped_clone = Arc::clone(&dropped);

        let mut controller = CaptureLoopController::start_with_init(
            "test-state-drop",
            move || Ok::<_, ()>(Flag(dropped_clone)),
            |_| thread::sleep(Duration::from_millis(1)),
        )
        .unwrap();

        assert!(!dropped.load(Ordering::SeqCst));
        assert!(controller.stop_timeout(Duration::from_secs(2)));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_timeout_detaches_stuck_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut controller = counting_loop("test-stuck", counter, Duration::from_millis(300));

        thread::sleep(Duration::from_millis(20));
        assert!(!controller.stop_timeout(Duration::from_millis(20)));
        // Already detached, a second stop returns immediately
        assert!(controller.stop_timeout(Duration::from_millis(1)));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_drop_stops_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let controller =
            counting_loop("test-running", Arc::clone(&counter), Duration::from_millis(5));

        assert!(controller.is_running());
        drop(controller);

        let after_drop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), after_drop);
    }
}
