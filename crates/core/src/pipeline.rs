//! Slide export pipeline.
//!
//! Pairs rasterized pages with their slide descriptors, runs the image
//! filters on each page and writes the resulting PNG files.

use crate::filters;
use crate::sanitize::NameRegistry;
use crate::types::{bytes_to_mb, RelativeBox, RunStats, SlideDescriptor};
use crate::{Error, Result};
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Page images produced by a rasterizer, in page order.
pub trait PageSource {
    /// Number of pages available.
    fn page_count(&self) -> usize;

    /// Decode the page at `index` (0-based).
    fn load_page(&mut self, index: usize) -> Result<DynamicImage>;
}

impl PageSource for Vec<DynamicImage> {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn load_page(&mut self, index: usize) -> Result<DynamicImage> {
        self.get(index)
            .cloned()
            .ok_or_else(|| Error::CorruptedFile(format!("Page {} out of range", index + 1)))
    }
}

/// Turns a presentation into one raster image per page.
pub trait Rasterizer {
    /// Rasterize `source` at `dpi`.
    fn rasterize(&self, source: &Path, dpi: u32) -> Result<Box<dyn PageSource>>;
}

/// Settings for one export run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Directory receiving the PNG files.
    pub output_dir: PathBuf,

    /// Rasterization resolution.
    pub dpi: u32,

    /// Erase the title region from each page.
    pub remove_title: bool,

    /// Crop each page to its visible content.
    pub autocrop: bool,

    /// Pixels kept around the content when cropping.
    pub crop_margin: u32,

    /// Output size in percent; 100 or more keeps the cropped size.
    pub scale_percent: u32,

    /// Pixels erased around the title box.
    pub title_margin: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("images"),
            dpi: 300,
            remove_title: true,
            autocrop: true,
            crop_margin: 20,
            scale_percent: 100,
            title_margin: 15,
        }
    }
}

/// Fail early when the source presentation is missing.
pub fn check_source(source: &Path) -> Result<()> {
    if source.is_file() {
        Ok(())
    } else {
        Err(Error::InputNotFound(source.display().to_string()))
    }
}

/// Apply the filter chain to one decoded page.
pub fn process_image(
    image: DynamicImage,
    bbox: Option<&RelativeBox>,
    options: &PipelineOptions,
) -> RgbaImage {
    let mut image = filters::make_background_transparent(filters::to_rgba(image));

    if options.remove_title {
        image = filters::erase_region(image, bbox, options.title_margin);
    }

    if options.autocrop {
        image = filters::autocrop(image, options.crop_margin);
    }

    if options.scale_percent < 100 {
        image = filters::downscale(image, options.scale_percent);
    }

    image
}

/// Encode `image` as a maximally compressed PNG, replacing any existing file.
///
/// Returns the number of bytes written.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<u64> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilterType::Adaptive);
    encoder.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)?;

    fs::write(path, &buffer)?;
    Ok(buffer.len() as u64)
}

/// Drives one export run.
///
/// Name deduplication and statistics live here, so every run starts clean.
pub struct Pipeline<R: Rasterizer> {
    rasterizer: R,
    options: PipelineOptions,
    registry: NameRegistry,
    stats: RunStats,
}

impl<R: Rasterizer> Pipeline<R> {
    /// Create a pipeline around a rasterizer.
    pub fn new(rasterizer: R, options: PipelineOptions) -> Self {
        Self {
            rasterizer,
            options,
            registry: NameRegistry::new(),
            stats: RunStats::default(),
        }
    }

    /// The options of this run.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Export every visible slide of `source` as PNG.
    ///
    /// Progress is written to `out`. The first failing page aborts the run;
    /// files written before it stay in place.
    pub fn run<W: Write>(
        mut self,
        source: &Path,
        slides: &[SlideDescriptor],
        out: &mut W,
    ) -> Result<RunStats> {
        check_source(source)?;
        self.prepare_output_dir(out)?;
        self.announce(slides, out)?;

        writeln!(out, "Rasterizing {}...", source.display())?;
        let mut pages = self.rasterizer.rasterize(source, self.options.dpi)?;
        let page_count = pages.page_count();
        self.stats.pages = page_count;
        log::debug!("Rasterizer returned {} pages", page_count);

        // Hidden slides are not part of the exported PDF.
        let visible: Vec<&SlideDescriptor> = slides.iter().filter(|s| !s.hidden).collect();
        if visible.len() != page_count {
            log::warn!(
                "Got {} pages for {} visible slides, processing the first {}",
                page_count,
                visible.len(),
                page_count.min(visible.len())
            );
        }

        writeln!(out, "Processing images...")?;
        for (index, slide) in visible.into_iter().take(page_count).enumerate() {
            let image = pages.load_page(index)?;
            self.export_page(image, slide, out)?;
        }

        self.write_summary(out)?;
        Ok(self.stats)
    }

    fn prepare_output_dir<W: Write>(&self, out: &mut W) -> Result<()> {
        let dir = &self.options.output_dir;
        fs::create_dir_all(dir)?;

        let existing = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name.to_lowercase().ends_with(".png"))
                    .unwrap_or(false)
            })
            .count();

        if existing > 0 {
            writeln!(out, "Output directory: {}/ ({} existing images)", dir.display(), existing)?;
            writeln!(out, "Images with the same name will be overwritten")?;
        } else {
            writeln!(out, "Output directory: {}/", dir.display())?;
        }

        Ok(())
    }

    fn announce<W: Write>(&self, slides: &[SlideDescriptor], out: &mut W) -> Result<()> {
        let options = &self.options;

        writeln!(out, "{} slides found", slides.len())?;
        writeln!(out, "Exporting PNG with transparent background (DPI: {})", options.dpi)?;
        if options.remove_title {
            writeln!(out, "Titles will be removed from the images")?;
        }
        if options.autocrop {
            writeln!(out, "Images will be cropped to their content (margin: {}px)", options.crop_margin)?;
        }
        if options.scale_percent < 100 {
            writeln!(out, "Images will be scaled to {}% of their size", options.scale_percent)?;
        }
        writeln!(out)?;

        for slide in slides {
            let hidden = if slide.hidden { " [hidden]" } else { "" };
            writeln!(out, "  Slide {}: {}{}", slide.number, slide.display_title(), hidden)?;
        }
        writeln!(out)?;

        Ok(())
    }

    fn export_page<W: Write>(
        &mut self,
        image: DynamicImage,
        slide: &SlideDescriptor,
        out: &mut W,
    ) -> Result<()> {
        let output_name = self.registry.output_name(slide.title.as_deref(), slide.number);
        let output_path = self.options.output_dir.join(&output_name);
        let existed = output_path.exists();

        log::debug!(
            "Slide {}: {}x{} page -> {}",
            slide.number,
            image.width(),
            image.height(),
            output_path.display()
        );

        let processed = process_image(image, slide.bbox.as_ref(), &self.options);
        let bytes = write_png(&processed, &output_path)?;
        self.stats.record(existed, bytes);

        let mut parts = vec![if existed { "overwritten" } else { "created" }.to_string()];
        if self.options.remove_title && slide.bbox.is_some() {
            parts.push("title erased".to_string());
        }
        if self.options.autocrop {
            parts.push(format!("{}x{}", processed.width(), processed.height()));
        }
        if self.options.scale_percent < 100 {
            parts.push(format!("{}%", self.options.scale_percent));
        }
        parts.push(format!("{:.2}MB", bytes_to_mb(bytes)));

        writeln!(out, "  {} -> {}", parts.join(" | "), output_name)?;
        Ok(())
    }

    fn write_summary<W: Write>(&self, out: &mut W) -> Result<()> {
        let stats = &self.stats;

        writeln!(out)?;
        writeln!(out, "Statistics:")?;
        if stats.created > 0 {
            writeln!(out, "   {} new images created", stats.created)?;
        }
        if stats.overwritten > 0 {
            writeln!(out, "   {} images overwritten", stats.overwritten)?;
        }
        writeln!(out, "   Total size: {:.2} MB", stats.total_mb())?;
        writeln!(out, "   Average size: {:.2} MB per image", stats.average_mb())?;
        writeln!(out)?;
        writeln!(out, "Export finished! Images in {}/", self.options.output_dir.display())?;

        Ok(())
    }
}
