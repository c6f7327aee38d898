// SPDX-License-Identifier: GPL-3.0-only

//! Presentation-side state
//!
//! - [`dispatch`]: consumer contexts that run posted work in order
//! - [`state`]: the displayed image, histogram and filter selection

pub mod dispatch;
pub mod state;

pub use dispatch::{ConsumerContext, Job, QueueContext, ThreadContext};
pub use state::{DisplayEvent, DisplayState};
