//! Markview - offline-capable markdown viewer
//!
//! Renders markdown with syntax highlighting and diagrams, keeping the remote
//! resources it needs in a versioned on-disk cache.

mod app;
mod cache;
mod core;
mod render;
mod ui;
mod viewport;

use std::path::PathBuf;

use app::{AppOptions, MarkviewApp};
use clap::Parser;
use eframe::egui;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::core::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "markview")]
#[command(about = "View markdown files with highlighted code and diagrams")]
struct Cli {
    /// Markdown file to open
    file: Option<PathBuf>,

    /// Kroki-compatible server used to render diagrams
    #[arg(long, default_value = "https://kroki.io/")]
    diagram_server: Url,

    /// Directory for the offline resource cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Keep fetched resources in memory only
    #[arg(long)]
    no_offline_cache: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> eframe::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(level)
        .init();

    tracing::info!("Starting Markview...");

    let options = AppOptions {
        initial_file: cli.file,
        diagram_server: cli.diagram_server,
        cache_dir: cli.cache_dir.unwrap_or_else(AppConfig::cache_dir),
        offline_cache: !cli.no_offline_cache,
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 800.0])
            .with_min_inner_size([600.0, 400.0])
            .with_title(MarkviewApp::initial_title())
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Markview",
        native_options,
        Box::new(|cc| Ok(Box::new(MarkviewApp::new(cc, options)?))),
    )
}
