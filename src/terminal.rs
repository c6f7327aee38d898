// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based filter viewer
//!
//! Renders the displayed image to the terminal using Unicode half-block
//! characters for improved vertical resolution, with a histogram strip and a
//! status bar underneath. Frames and capture results reach the display state
//! through a [`QueueContext`] drained once per tick.

use crate::Config;
use crate::app::{DisplayState, Job, QueueContext};
use crate::backends::camera::{FrameProvider, FrameSource, opener_for};
use crate::constants::TERMINAL_TICK;
use crate::filters::{CpuFilterEngine, FilterEngine, FilterType, Histogram};
use crate::pipelines::live::{LivePipelineController, LiveState};
use crate::pipelines::workflow::Workflow;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::{DynamicImage, GenericImageView};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info};

/// Rows used by the histogram strip
const HISTOGRAM_HEIGHT: u16 = 4;

/// Run the terminal viewer
pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut viewer = Viewer::new(config)?;

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = viewer.run_app(&mut terminal);
    viewer.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn lock(display: &Mutex<DisplayState>) -> MutexGuard<'_, DisplayState> {
    display.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Viewer {
    display: Arc<Mutex<DisplayState>>,
    queue: Arc<QueueContext>,
    live: LivePipelineController,
    workflow: Arc<Workflow>,
    runtime: tokio::runtime::Runtime,
    /// A single capture is in flight
    capturing: Arc<AtomicBool>,
    show_help: bool,
    notice: Option<String>,
}

impl Viewer {
    fn new(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let engine: Arc<dyn FilterEngine> = Arc::new(CpuFilterEngine);
        let source: Arc<dyn FrameProvider> = Arc::new(FrameSource::new(
            opener_for(config.use_test_pattern),
            config.source_settings(),
        ));
        let queue = Arc::new(QueueContext::new());

        let mut display = DisplayState::new(Arc::clone(&engine));
        let filter = display.set_selected_filter(config.initial_filter.index() as i64);

        let live =
            LivePipelineController::new(Arc::clone(&source), Arc::clone(&engine), queue.clone());
        live.set_filter(filter);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        Ok(Self {
            display: Arc::new(Mutex::new(display)),
            queue,
            live,
            workflow: Arc::new(Workflow::new(source, engine)),
            runtime,
            capturing: Arc::new(AtomicBool::new(false)),
            show_help: false,
            notice: None,
        })
    }

    fn run_app(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            // Apply frames and capture results posted since the last tick
            self.queue.run_pending();

            let status_message = self.status_message();
            terminal.draw(|f| {
                let area = f.area();
                let display = lock(&self.display);

                // Reserve bottom lines for histogram and status
                let reserved = HISTOGRAM_HEIGHT + 1;
                let image_area = Rect {
                    x: area.x,
                    y: area.y,
                    width: area.width,
                    height: area.height.saturating_sub(reserved),
                };
                let histogram_area = Rect {
                    x: area.x,
                    y: area.y + image_area.height,
                    width: area.width,
                    height: HISTOGRAM_HEIGHT.min(area.height.saturating_sub(1)),
                };
                let status_area = Rect {
                    x: area.x,
                    y: area.height.saturating_sub(1),
                    width: area.width,
                    height: 1,
                };

                f.render_widget(FrameWidget { image: display.displayed() }, image_area);
                f.render_widget(
                    HistogramStrip {
                        histogram: display.histogram(),
                    },
                    histogram_area,
                );
                f.render_widget(
                    StatusBar {
                        message: &status_message,
                    },
                    status_area,
                );
            })?;

            // Handle input with timeout for frame updates
            if event::poll(TERMINAL_TICK)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }

                match key.code {
                    KeyCode::Char('q') => break,
                    KeyCode::Char('h') => self.show_help = !self.show_help,
                    KeyCode::Char(' ') => self.toggle_streaming(),
                    KeyCode::Char('c') => self.start_capture(),
                    KeyCode::Right => {
                        let next = self.selected_filter().next();
                        self.select_filter(next.index() as i64);
                    }
                    KeyCode::Left => {
                        let previous = self.selected_filter().previous();
                        self.select_filter(previous.index() as i64);
                    }
                    KeyCode::Char(digit @ '0'..='9') => {
                        self.select_filter(i64::from(digit as u8 - b'0'));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn selected_filter(&self) -> FilterType {
        lock(&self.display).selected_filter()
    }

    fn select_filter(&mut self, index: i64) {
        let filter = lock(&self.display).set_selected_filter(index);
        self.live.set_filter(filter);
        self.notice = None;
    }

    fn toggle_streaming(&mut self) {
        if self.live.state() != LiveState::Stopped {
            self.live.stop();
            self.notice = Some("Streaming stopped".to_string());
            return;
        }

        // The capture owns the device until its result is ingested
        if self.capturing.load(Ordering::SeqCst) {
            self.notice = Some("Capture in progress".to_string());
            return;
        }

        let display = Arc::clone(&self.display);
        let started = self
            .live
            .start(move |image: DynamicImage, histogram: Option<Histogram>| {
                lock(&display).show_live_frame(image, histogram);
            });

        self.notice = match started {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to start streaming");
                Some(format!("Error: {}", e))
            }
        };
    }

    /// Run the capture workflow on the runtime and post the result back
    fn start_capture(&mut self) {
        if self.capturing.swap(true, Ordering::SeqCst) {
            self.notice = Some("Capture already in progress".to_string());
            return;
        }

        // The workflow needs the device to itself
        self.live.stop();
        self.notice = Some("Capturing...".to_string());

        let workflow = Arc::clone(&self.workflow);
        let display = Arc::clone(&self.display);
        let queue = Arc::clone(&self.queue);
        let capturing = Arc::clone(&self.capturing);

        self.runtime.spawn(async move {
            let result = workflow.run().await;
            info!(success = result.is_success(), "Capture finished");
            let mut job: Job = Box::new(move || {
                lock(&display).ingest_workflow_result(result);
                capturing.store(false, Ordering::SeqCst);
            });
            // Live frames may fill the queue; the result must not be lost
            loop {
                match queue.try_post(job) {
                    Ok(()) => break,
                    Err(e) if e.is_full() => {
                        job = e.into_inner();
                        tokio::time::sleep(TERMINAL_TICK).await;
                    }
                    Err(_) => {
                        error!("Viewer queue closed, dropping capture result");
                        break;
                    }
                }
            }
        });
    }

    fn status_message(&mut self) -> String {
        if self.show_help {
            return String::from(
                "0-5: Select filter | ←/→: Cycle | space: Stream | c: Capture | \
                 h: Toggle help | q/Ctrl+C: Quit",
            );
        }

        if !self.capturing.load(Ordering::SeqCst)
            && self.notice.as_deref() == Some("Capturing...")
        {
            self.notice = None;
        }

        let display = lock(&self.display);
        let mut msg = format!(
            "[{}] {}",
            display.selected_filter().index(),
            display.selected_filter()
        );
        msg.push_str(match self.live.state() {
            LiveState::Streaming => " | streaming",
            LiveState::Starting => " | starting",
            LiveState::Stopping => " | stopping",
            LiveState::Stopped => " | stopped",
        });

        if let Some(notice) = &self.notice {
            msg.push_str(" | ");
            msg.push_str(notice);
        } else if let Some(err) = display.last_error() {
            msg.push_str(" | Error: ");
            msg.push_str(err);
        }

        msg.push_str(" | 'h' help | 'q' quit");
        msg
    }

    fn shutdown(self) {
        self.live.stop();
        self.runtime.shutdown_timeout(Duration::from_secs(1));
        lock(&self.display).clear();
    }
}

/// Widget that renders an image using half-block characters
struct FrameWidget<'a> {
    image: Option<&'a DynamicImage>,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(image) = self.image.filter(|img| img.width() > 0 && img.height() > 0) else {
            // Nothing yet - show placeholder
            let msg = "Press space to stream or 'c' to capture";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        // Calculate display dimensions maintaining aspect ratio
        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = image.width() as f64 / image.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };

        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = image.width() as f64 / display_width as f64;
        let y_scale = image.height() as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(image, src_x, src_y_top));
                    cell.set_bg(sample_pixel(image, src_x, src_y_bottom));
                }
            }
        }
    }
}

/// Color at `(x, y)`, clamped to the image; gray images come back gray
fn sample_pixel(image: &DynamicImage, x: u32, y: u32) -> Color {
    let x = x.min(image.width() - 1);
    let y = y.min(image.height() - 1);
    let [r, g, b, _] = image.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Bar chart of the histogram, one column per group of intensity levels
struct HistogramStrip<'a> {
    histogram: Option<&'a Histogram>,
}

const BAR_EIGHTHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

impl Widget for HistogramStrip<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let Some(histogram) = self.histogram else {
            buf.set_string(
                area.x,
                area.y + area.height - 1,
                "No histogram",
                ratatui::style::Style::default().fg(Color::DarkGray),
            );
            return;
        };

        let columns = histogram.downsample(area.width as usize);
        let max = columns.iter().copied().max().unwrap_or(0).max(1);
        let levels = u64::from(area.height) * 8;

        for (i, &count) in columns.iter().enumerate() {
            let x = area.x + i as u16;
            // Height in eighths of a cell, drawn bottom up
            let mut remaining = count * levels / max;
            for row in (0..area.height).rev() {
                let ch = match remaining {
                    0 => ' ',
                    n if n >= 8 => '█',
                    n => BAR_EIGHTHS[n as usize - 1],
                };
                remaining = remaining.saturating_sub(8);

                if let Some(cell) = buf.cell_mut((x, area.y + row)) {
                    cell.set_char(ch);
                    cell.set_fg(Color::Gray);
                }
            }
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();

        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
