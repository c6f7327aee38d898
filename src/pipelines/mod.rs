// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipelines
//!
//! Both pipelines pull frames from a [`FrameProvider`](crate::backends::camera::FrameProvider)
//! and run the filters off the presentation thread.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────┐     ┌──────────────────┐
//! │ Frame Source │ ──▶ │  Workflow          │ ──▶ │ ProcessingResult │
//! │ (one frame)  │     │  - grayscale       │     │                  │
//! │              │     │  - histogram       │     │                  │
//! └──────────────┘     └────────────────────┘     └──────────────────┘
//!
//! ┌──────────────┐     ┌────────────────────┐     ┌──────────────────┐
//! │ Frame Source │ ──▶ │  Live pipeline     │ ──▶ │ Consumer context │
//! │  (stream)    │     │  - grayscale       │     │  (display sink)  │
//! │              │     │  - histogram       │     │                  │
//! │              │     │  - selected filter │     │                  │
//! └──────────────┘     └────────────────────┘     └──────────────────┘
//! ```
//!
//! - [`workflow`]: single capture, run on the tokio blocking pool
//! - [`live`]: continuous capture with per-frame filtering

pub mod live;
pub mod workflow;
