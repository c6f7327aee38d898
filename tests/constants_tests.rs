// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camfilter::constants::{self, filter_defaults, timing};

#[test]
fn test_histogram_has_one_bin_per_level() {
    assert_eq!(constants::HISTOGRAM_BINS, 256);
}

#[test]
fn test_canny_thresholds_ordered() {
    assert!(filter_defaults::CANNY_LOW_THRESHOLD < filter_defaults::CANNY_HIGH_THRESHOLD);
}

#[test]
fn test_contour_defaults() {
    assert_eq!(filter_defaults::CONTOUR_THRESHOLD, 128);
    assert_eq!(filter_defaults::CONTOUR_COLOR, [0, 255, 0]);
    assert!(filter_defaults::CONTOUR_THICKNESS >= 1);
}

#[test]
fn test_stop_timeout_outlasts_poll_interval() {
    // Stop must get several chances to observe the thread finishing
    assert!(timing::STOP_TIMEOUT > timing::JOIN_POLL_INTERVAL * 10);
}

#[test]
fn test_single_capture_reads_past_warmup() {
    assert!(timing::SINGLE_CAPTURE_READ_ATTEMPTS > timing::SINGLE_CAPTURE_WARMUP_FRAMES);
}

#[test]
fn test_version_not_empty() {
    assert!(!constants::app_info::version().is_empty());
}
