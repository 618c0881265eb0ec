use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info};
use simplelog::{Config, WriteLogger};

use pdfslice::panic_handler::initialize_panic_handler;

/// Render the visible part of a document viewport to PNG
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Document to open
    file: PathBuf,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1000.0)]
    width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1500.0)]
    height: f32,

    /// Zoom factor, clamped to the configured limits
    #[arg(long, default_value_t = 1.0)]
    zoom: f32,

    /// Scroll to the top of this page (0-based) first
    #[arg(long)]
    page: Option<usize>,

    /// Additional vertical scroll in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    scroll_y: f32,

    /// Page spacing in pixels, overriding the config file
    #[arg(long)]
    spacing: Option<i32>,

    /// Show only these pages, e.g. 2-5 (0-based, inclusive)
    #[arg(long, value_parser = parse_page_range)]
    pages: Option<(usize, usize)>,

    /// Where to write the composite
    #[arg(long, short, default_value = "viewport.png")]
    out: PathBuf,

    /// Print document and layout info instead of rendering
    #[arg(long)]
    info: bool,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    #[arg(long, default_value = "pdfslice.log")]
    log_file: PathBuf,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up waiting for the render after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn parse_page_range(value: &str) -> Result<(usize, usize), String> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got {value:?}"))?;
    let start: usize = start.trim().parse().map_err(|e| format!("{e}"))?;
    let end: usize = end.trim().parse().map_err(|e| format!("{e}"))?;
    if end < start {
        return Err(format!("range end {end} is before start {start}"));
    }
    Ok((start, end))
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        args.log_level,
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("Failed to create {}", args.log_file.display()))?,
    )?;
    initialize_panic_handler();

    info!("Starting pdfslice for {}", args.file.display());
    let result = run(&args);
    if let Err(err) = &result {
        error!("pdfslice failed: {err:?}");
    }
    info!("Shutting down pdfslice");
    result
}

#[cfg(feature = "pdf")]
fn run(args: &Args) -> Result<()> {
    use std::time::{Duration, Instant};

    use pdfslice::pdf::{DocumentSource, MupdfBackend, Offset, ViewportSize};
    use pdfslice::settings::load_settings;
    use pdfslice::{Command, RenderService, ServiceConfig};

    let mut settings = load_settings(args.config.as_deref());
    if let Some(spacing) = args.spacing {
        settings.page_spacing = spacing;
    }
    let mut config = ServiceConfig::from_settings(&settings);
    if let Some((start, end)) = args.pages {
        config = config.with_page_range(start..=end);
    }

    let mut service = RenderService::new(Box::new(MupdfBackend), config);
    let viewport = ViewportSize::new(args.width, args.height);
    service
        .load(&DocumentSource::Path(args.file.clone()), viewport)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    service.apply_command(Command::SetZoom(args.zoom));
    if let Some(page) = args.page {
        service.apply_command(Command::ScrollToPage(page));
    }
    if args.scroll_y != 0.0 {
        service.apply_command(Command::Pan(Offset::new(0.0, -args.scroll_y)));
    }

    if args.info {
        print_info(&service);
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while service.is_busy() {
        if Instant::now() >= deadline {
            anyhow::bail!("render did not finish within {}s", args.timeout);
        }
        service.poll_blocking(Duration::from_millis(100));
    }

    if let Some(err) = service.display_state().error() {
        if service.current_image().is_none() {
            anyhow::bail!("render failed: {err}");
        }
        eprintln!("warning: {err}");
    }

    let image = service
        .current_image()
        .context("nothing visible in the viewport")?
        .clone();
    service
        .with_pixels(image.buffer, |pixels, dimensions| {
            pdfslice::snapshot::save_png(pixels, dimensions, settings.background, &args.out)
        })
        .context("rendered buffer is gone")??;

    println!(
        "Wrote {} ({}x{}, {} slices)",
        args.out.display(),
        image.info.dimensions.width,
        image.info.dimensions.height,
        image.transforms.len()
    );
    Ok(())
}

#[cfg(feature = "pdf")]
fn print_info(service: &pdfslice::RenderService) {
    let Some(state) = service.view_state() else {
        return;
    };
    let zoom = state.zoom();
    let layout = state.layout();

    println!("Pages shown:     {}", layout.page_count());
    if let Some(range) = layout.page_range() {
        println!("Page range:      {}-{}", range.start(), range.end());
    }
    println!("Zoom:            {}%", zoom.percent());
    println!("Document height: {:.0}px", zoom.document_height());
    println!("Scroll:          ({:.0}, {:.0})", zoom.scroll_x(), zoom.scroll_y());
    if let Some(page) = state.current_page() {
        println!("Current page:    {page}");
    }
    for info in state.visible_pages() {
        println!(
            "  page {:>4}: {:.0}x{:.0} cut top {:.0} bottom {:.0} left {} right {} gap {} ({:.0}% visible)",
            info.page_index,
            info.scaled_width,
            info.scaled_height,
            info.top_cutoff,
            info.bottom_cutoff,
            info.left_cutoff,
            info.right_cutoff,
            info.top_gap,
            info.visibility_h() * 100.0
        );
    }
}

#[cfg(not(feature = "pdf"))]
fn run(_args: &Args) -> Result<()> {
    anyhow::bail!("pdfslice was built without the `pdf` feature, no rasterizer is available")
}
