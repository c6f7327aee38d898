// SPDX-License-Identifier: GPL-3.0-only

//! Hardware backends
//!
//! - [`camera`]: camera devices (V4L2 or a synthetic test pattern) and the
//!   frame source that drives them

pub mod camera;
