// SPDX-License-Identifier: GPL-3.0-only

use camfilter::Config;
use camfilter::constants::app_info;
use camfilter::filters::FilterType;
use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "camfilter")]
#[command(about = "Webcam capture with live grayscale, histogram and image filters")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Use the synthetic test pattern instead of a real camera
    #[arg(long, global = true)]
    test_pattern: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal viewer (default)
    Terminal,

    /// Capture one frame and print its histogram and filter output
    Capture {
        /// Filter to render (name or index, see 'camfilter filters')
        #[arg(short, long, default_value = "original")]
        filter: FilterType,
    },

    /// Stream frames through the live pipeline and log per-frame stats
    Stream {
        /// Stop after this many frames (default: until Ctrl+C)
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Filter applied to each frame
        #[arg(short, long, default_value = "original")]
        filter: FilterType,
    },

    /// List available filters
    Filters,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camfilter=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load();
    config.use_test_pattern |= cli.test_pattern;

    match cli.command {
        Some(Commands::Terminal) | None => camfilter::terminal::run(&config),
        Some(Commands::Capture { filter }) => cli::capture(&config, filter),
        Some(Commands::Stream { frames, filter }) => cli::stream(&config, frames, filter),
        Some(Commands::Filters) => {
            cli::list_filters();
            Ok(())
        }
    }
}
