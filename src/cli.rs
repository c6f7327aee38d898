// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Single captures with a printed histogram
//! - Headless live streaming
//! - Listing the available filters

use camfilter::Config;
use camfilter::app::ThreadContext;
use camfilter::backends::camera::{FrameProvider, FrameSource, opener_for};
use camfilter::filters::{
    CpuFilterEngine, FilterEngine, FilterType, Histogram, channel_count, render_filter,
};
use camfilter::pipelines::live::LivePipelineController;
use camfilter::pipelines::workflow::{ProcessingResult, Workflow};
use image::DynamicImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Rows in the printed histogram
const HISTOGRAM_ROWS: usize = 16;
/// Longest bar in the printed histogram
const HISTOGRAM_BAR_WIDTH: u64 = 48;

fn build_source(config: &Config) -> Arc<dyn FrameProvider> {
    Arc::new(FrameSource::new(
        opener_for(config.use_test_pattern),
        config.source_settings(),
    ))
}

/// Capture one frame, print its histogram and render `filter`
pub fn capture(config: &Config, filter: FilterType) -> Result<(), Box<dyn std::error::Error>> {
    let engine: Arc<dyn FilterEngine> = Arc::new(CpuFilterEngine);
    let workflow = Workflow::new(build_source(config), Arc::clone(&engine));

    println!("Capturing...");
    let rt = tokio::runtime::Runtime::new()?;
    let output = match rt.block_on(workflow.run()) {
        ProcessingResult::Success(output) => output,
        ProcessingResult::Failure(failure) => return Err(failure.to_string().into()),
    };

    println!(
        "Frame: {}x{}, {} channel(s)",
        output.original.width(),
        output.original.height(),
        channel_count(&output.original)
    );
    print_histogram(&output.histogram);

    let rendered = render_filter(engine.as_ref(), filter, &output.original, &output.grayscale)?;
    println!();
    println!(
        "Filter '{}': {}x{}, {} channel(s)",
        filter.name(),
        rendered.width(),
        rendered.height(),
        channel_count(&rendered)
    );

    if filter == FilterType::Contours {
        let contours = engine.detect_contours(&output.grayscale)?;
        println!("Contours: {}", contours.len());
        if let Some(largest) = contours.largest() {
            println!("Largest contour: {} points", largest.len());
        }
    }

    Ok(())
}

/// Run the live pipeline until `frames` frames arrived or Ctrl+C
pub fn stream(
    config: &Config,
    frames: Option<u64>,
    filter: FilterType,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = Arc::new(ThreadContext::new("camfilter-consumer")?);
    let controller = LivePipelineController::new(
        build_source(config),
        Arc::new(CpuFilterEngine),
        context.clone(),
    );
    controller.set_filter(filter);

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let received = Arc::new(AtomicU64::new(0));
    let received_clone = received.clone();
    let start = Instant::now();

    controller.start(move |image: DynamicImage, histogram: Option<Histogram>| {
        let n = received_clone.fetch_add(1, Ordering::SeqCst) + 1;
        if frames.is_some_and(|limit| n > limit) {
            return;
        }
        print_frame_stats(n, &image, histogram.as_ref());
    })?;

    println!(
        "Streaming with filter '{}' (press Ctrl+C to stop)",
        filter.name()
    );

    while !stop_flag.load(Ordering::SeqCst) {
        if frames.is_some_and(|limit| received.load(Ordering::SeqCst) >= limit) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    controller.stop();
    drop(controller);
    // Let already queued frames print before the summary
    drop(context);

    let elapsed = start.elapsed().as_secs_f64();
    let count = match frames {
        Some(limit) => received.load(Ordering::SeqCst).min(limit),
        None => received.load(Ordering::SeqCst),
    };
    println!(
        "Received {} frame(s) in {:.1}s ({:.1} fps)",
        count,
        elapsed,
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    );

    Ok(())
}

/// Print every filter with its index
pub fn list_filters() {
    println!("Available filters:");
    for filter in FilterType::ALL {
        println!(
            "  [{}] {:<17} {}",
            filter.index(),
            filter.name(),
            filter.display_name()
        );
    }
}

fn print_frame_stats(n: u64, image: &DynamicImage, histogram: Option<&Histogram>) {
    match histogram {
        Some(hist) => {
            let (peak, _) = hist.peak();
            println!(
                "frame {:>5}: {}x{} {}ch mean {:>6.1} peak {:>3}",
                n,
                image.width(),
                image.height(),
                channel_count(image),
                hist.mean().unwrap_or(0.0),
                peak
            );
        }
        None => println!(
            "frame {:>5}: {}x{} {}ch",
            n,
            image.width(),
            image.height(),
            channel_count(image)
        ),
    }
}

fn print_histogram(histogram: &Histogram) {
    let (peak, peak_count) = histogram.peak();
    println!(
        "Histogram: {} pixels, mean {:.1}, peak level {} ({} pixels)",
        histogram.total(),
        histogram.mean().unwrap_or(0.0),
        peak,
        peak_count
    );

    let buckets = histogram.downsample(HISTOGRAM_ROWS);
    let max = buckets.iter().copied().max().unwrap_or(0).max(1);
    let levels_per_row = 256 / HISTOGRAM_ROWS;

    for (i, count) in buckets.iter().enumerate() {
        let low = i * levels_per_row;
        let high = low + levels_per_row - 1;
        let bar = "#".repeat((count * HISTOGRAM_BAR_WIDTH / max) as usize);
        println!(
            "  {:>3}-{:>3} | {:<width$} {}",
            low,
            high,
            bar,
            count,
            width = HISTOGRAM_BAR_WIDTH as usize
        );
    }
}
