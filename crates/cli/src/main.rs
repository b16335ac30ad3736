//! CLI tool for exporting PowerPoint slides as transparent PNG images.
//!
//! Every slide is rendered, its title is erased, the result is cropped to the
//! remaining content and written as `<title>.png`.

use anyhow::{Context, Result};
use clap::Parser;
use slide_core::pipeline::check_source;
use slide_core::{Pipeline, PipelineOptions};
use slide_pptx::PptxParser;
use slide_render::LibreOfficeRasterizer;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// Export PowerPoint slides to cropped PNG files with a transparent background.
#[derive(Parser, Debug)]
#[command(name = "slide-png")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Existing images with the same name are overwritten.")]
struct Args {
    /// Input PowerPoint file (.pptx)
    input: PathBuf,

    /// Output directory
    #[arg(default_value = "images")]
    output_dir: PathBuf,

    /// Rendering resolution in DPI
    #[arg(default_value_t = 300)]
    dpi: u32,

    /// Keep the title in the image
    #[arg(long)]
    keep_title: bool,

    /// Do not crop images to their content
    #[arg(long)]
    no_crop: bool,

    /// Margin in pixels kept around the content when cropping
    #[arg(long, default_value_t = 20)]
    crop_margin: u32,

    /// Output size in percent of the cropped image
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    scale: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            output_dir: self.output_dir.clone(),
            dpi: self.dpi,
            remove_title: !self.keep_title,
            autocrop: !self.no_crop,
            crop_margin: self.crop_margin,
            scale_percent: self.scale,
            ..PipelineOptions::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    // Failures are reported, never turned into a failing exit status.
    match panic::catch_unwind(AssertUnwindSafe(|| export(&args))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::debug!("Export of {} aborted", args.input.display());
            eprintln!("Error: {:?}", e);
        }
        Err(_) => {
            eprintln!("Error: unexpected failure while exporting {}", args.input.display());
        }
    }

    Ok(())
}

/// Export all slides of the input deck.
fn export(args: &Args) -> Result<()> {
    check_source(&args.input)?;

    println!("Loading {}...", args.input.display());
    let slides = PptxParser::new()
        .parse_file(&args.input)
        .with_context(|| format!("Failed to read slides from {}", args.input.display()))?;

    let pipeline = Pipeline::new(LibreOfficeRasterizer::new(), args.pipeline_options());
    let mut out = io::stdout().lock();

    pipeline
        .run(&args.input, &slides, &mut out)
        .with_context(|| format!("Failed to export {}", args.input.display()))?;

    Ok(())
}
