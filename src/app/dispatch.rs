// SPDX-License-Identifier: GPL-3.0-only

//! Consumer contexts
//!
//! The live pipeline produces frames on the capture thread but display state
//! is only touched from one consumer. Jobs posted to a context run there one
//! at a time, in the order they were posted. Both contexts are bounded by
//! [`CONSUMER_QUEUE_CAPACITY`]: once full, `post` refuses work until the
//! consumer catches up.

use crate::constants::CONSUMER_QUEUE_CAPACITY;
use futures::channel::mpsc::{self, Receiver, Sender, TrySendError};
use futures::executor::block_on_stream;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Work item executed on the consumer
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere jobs can be sent to run in FIFO order
pub trait ConsumerContext: Send + Sync {
    /// Queue `job`. Returns `false` if the queue is full or the context no
    /// longer accepts work; the job is dropped in both cases.
    fn post(&self, job: Job) -> bool;
}

fn lock_sender(tx: &Mutex<Sender<Job>>) -> MutexGuard<'_, Sender<Job>> {
    tx.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("Consumer job panicked");
    }
}

/// Queue drained by the owner's event loop
///
/// The terminal viewer calls [`QueueContext::run_pending`] once per tick, so
/// posted jobs run on the UI thread.
pub struct QueueContext {
    tx: Mutex<Sender<Job>>,
    rx: Mutex<Receiver<Job>>,
}

impl QueueContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE_CAPACITY);
        Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        }
    }

    /// Like [`ConsumerContext::post`], but hands the job back on failure so
    /// the caller can retry once the queue has room
    pub fn try_post(&self, job: Job) -> Result<(), TrySendError<Job>> {
        lock_sender(&self.tx).try_send(job)
    }

    /// Run every job queued so far, plus any they post. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock is released before running so jobs may post more work
            let next = self
                .rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_recv();
            match next {
                Ok(job) => {
                    run_job(job);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }
}

impl Default for QueueContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerContext for QueueContext {
    fn post(&self, job: Job) -> bool {
        self.try_post(job).is_ok()
    }
}

/// Dedicated consumer thread
///
/// Used where no event loop exists (the headless `stream` command). Dropping
/// the context lets queued jobs finish, then joins the thread.
pub struct ThreadContext {
    tx: Mutex<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadContext {
    pub fn new(name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>(CONSUMER_QUEUE_CAPACITY);
        let thread_name = name.to_string();

        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %thread_name, "Consumer thread started");
            for job in block_on_stream(rx) {
                run_job(job);
            }
            debug!(name = %thread_name, "Consumer thread exiting");
        })?;

        Ok(Self {
            tx: Mutex::new(tx),
            worker: Some(worker),
        })
    }
}

impl ConsumerContext for ThreadContext {
    fn post(&self, job: Job) -> bool {
        lock_sender(&self.tx).try_send(job).is_ok()
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        lock_sender(&self.tx).close_channel();
        if let Some(worker) = self.worker.take() {
            // A job dropping the last handle runs on the worker itself
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("Consumer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_queue_runs_in_order() {
        let queue = QueueContext::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = Arc::clone(&log);
            assert!(queue.post(Box::new(move || log.lock().unwrap().push(i))));
        }

        assert_eq!(queue.run_pending(), 5);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_queue_survives_panicking_job() {
        let queue = QueueContext::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        queue.post(Box::new(|| panic!("job failure")));
        queue.post(Box::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queue_refuses_work_when_full() {
        let queue = QueueContext::new();

        let mut accepted = 0;
        while queue.post(Box::new(|| {})) {
            accepted += 1;
            assert!(accepted <= CONSUMER_QUEUE_CAPACITY + 1, "queue never filled up");
        }
        assert!(accepted >= CONSUMER_QUEUE_CAPACITY);

        let refused = queue.try_post(Box::new(|| {})).unwrap_err();
        assert!(refused.is_full());

        assert_eq!(queue.run_pending(), accepted);
        assert!(queue.post(Box::new(|| {})));
        assert_eq!(queue.run_pending(), 1);
    }

    #[test]
    fn test_thread_context_refuses_after_drop_started() {
        let ctx = ThreadContext::new("test-closed").unwrap();
        lock_sender(&ctx.tx).close_channel();
        assert!(!ctx.post(Box::new(|| {})));
    }

    #[test]
    fn test_thread_context_drains_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let ctx = ThreadContext::new("test-consumer").unwrap();

        for _ in 0..10 {
            let count = Arc::clone(&count);
            ctx.post(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        drop(ctx);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
