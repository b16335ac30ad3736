//! Rasterizer backed by LibreOffice and poppler's `pdftoppm`.
//!
//! The deck is first exported to PDF by a headless office suite, then every
//! PDF page is rendered to PNG. Both steps write into one temporary directory
//! owned by the returned [`RasterPages`].

use image::DynamicImage;
use slide_core::{Error, PageSource, Rasterizer, Result};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Office binaries tried in order.
const OFFICE_BINARIES: &[&str] = &["soffice", "libreoffice"];

/// PDF rasterizer binary.
const PDFTOPPM_BINARY: &str = "pdftoppm";

/// File name prefix of rendered pages (`slide-01.png`, ...).
const PAGE_PREFIX: &str = "slide";

/// Rasterizes presentations through external programs.
#[derive(Debug, Clone)]
pub struct LibreOfficeRasterizer {
    office_binaries: Vec<String>,
    pdftoppm: String,
}

impl Default for LibreOfficeRasterizer {
    fn default() -> Self {
        Self {
            office_binaries: OFFICE_BINARIES.iter().map(|s| s.to_string()).collect(),
            pdftoppm: PDFTOPPM_BINARY.to_string(),
        }
    }
}

impl LibreOfficeRasterizer {
    /// Create a rasterizer using `soffice`/`libreoffice` and `pdftoppm`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific office binary instead of searching the defaults.
    pub fn with_office_binary(mut self, binary: impl Into<String>) -> Self {
        self.office_binaries = vec![binary.into()];
        self
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_pdftoppm(mut self, binary: impl Into<String>) -> Self {
        self.pdftoppm = binary.into();
        self
    }

    /// Export `source` to PDF inside `out_dir`, returning the PDF path.
    fn convert_to_pdf(&self, source: &Path, out_dir: &Path) -> Result<PathBuf> {
        let office = self
            .office_binaries
            .iter()
            .find_map(|name| find_tool(name))
            .ok_or_else(|| Error::ToolMissing {
                tool: self.office_binaries.join(" / "),
                hint: office_install_hint().to_string(),
            })?;
        log::info!("Using {} for PPTX -> PDF", office.display());

        let mut command = Command::new(&office);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(source);
        run_tool(&mut command, &office, office_install_hint())?;

        let stem = source
            .file_stem()
            .ok_or_else(|| Error::Conversion(format!("Invalid source path: {}", source.display())))?;
        let mut pdf_name = stem.to_os_string();
        pdf_name.push(".pdf");
        let pdf = out_dir.join(pdf_name);

        if !pdf.is_file() {
            return Err(Error::Conversion(format!("PDF file was not created: {}", pdf.display())));
        }

        Ok(pdf)
    }

    /// Render every page of `pdf` to PNG files in `out_dir`.
    fn render_pages(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let pdftoppm = find_tool(&self.pdftoppm).ok_or_else(|| Error::ToolMissing {
            tool: self.pdftoppm.clone(),
            hint: poppler_install_hint().to_string(),
        })?;
        log::debug!("Rendering {} at {} DPI", pdf.display(), dpi);

        let mut command = Command::new(&pdftoppm);
        command
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(out_dir.join(PAGE_PREFIX));
        run_tool(&mut command, &pdftoppm, poppler_install_hint())?;

        let pages = collect_pages(out_dir)?;
        if pages.is_empty() {
            return Err(Error::EmptyRasterization(out_dir.display().to_string()));
        }

        Ok(pages)
    }
}

impl Rasterizer for LibreOfficeRasterizer {
    fn rasterize(&self, source: &Path, dpi: u32) -> Result<Box<dyn PageSource>> {
        let dir = tempfile::Builder::new().prefix("slide-png-").tempdir()?;
        log::debug!("Working directory {}", dir.path().display());

        let pdf = self.convert_to_pdf(source, dir.path())?;
        let pages = self.render_pages(&pdf, dpi, dir.path())?;
        log::info!("Rendered {} pages", pages.len());

        Ok(Box::new(RasterPages::new(dir, pages)))
    }
}

/// Rendered page files, deleted together with their directory on drop.
#[derive(Debug)]
pub struct RasterPages {
    dir: TempDir,
    pages: Vec<PathBuf>,
}

impl RasterPages {
    /// Take ownership of `dir` and the page files inside it.
    pub fn new(dir: TempDir, pages: Vec<PathBuf>) -> Self {
        Self { dir, pages }
    }

    /// Directory holding the pages.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl PageSource for RasterPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&mut self, index: usize) -> Result<DynamicImage> {
        let path = self
            .pages
            .get(index)
            .ok_or_else(|| Error::CorruptedFile(format!("Page {} out of range", index + 1)))?;
        Ok(image::open(path)?)
    }
}

/// PNG files in `dir`, ordered by the page number at the end of their stem.
pub fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(OsStr::to_str) == Some("png"))
        .collect();

    pages.sort_by(|a, b| {
        let key = |p: &PathBuf| {
            let stem = p.file_stem().and_then(OsStr::to_str).unwrap_or_default().to_string();
            (page_number(&stem), stem)
        };
        key(a).cmp(&key(b))
    });

    Ok(pages)
}

/// Trailing number of a page stem: `slide-07` -> 7.
fn page_number(stem: &str) -> Option<u64> {
    let digits: String = stem.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

/// Locate an executable on `PATH`.
///
/// Names containing a path separator are checked as given.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let path = dir.join(name);
        if path.is_file() {
            return Some(path);
        }
        if cfg!(windows) {
            let exe = path.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Run a prepared command, turning launch failures and non-zero exits into
/// errors that carry the program's output.
fn run_tool(command: &mut Command, program: &Path, hint: &str) -> Result<Output> {
    let tool = program.display().to_string();
    log::debug!("Running {:?}", command);

    let output = command.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::ToolMissing {
            tool: tool.clone(),
            hint: hint.to_string(),
        },
        _ => Error::IoError(e),
    })?;

    if !output.status.success() {
        let mut captured = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(stderr.trim());
        }

        return Err(Error::ToolFailed {
            tool,
            status: output.status.to_string(),
            output: captured,
        });
    }

    Ok(output)
}

fn office_install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "   - macOS: brew install --cask libreoffice"
    } else if cfg!(windows) {
        "   - Windows: https://www.libreoffice.org/download/"
    } else {
        "   - Ubuntu/Debian: sudo apt-get install libreoffice"
    }
}

fn poppler_install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "   - macOS: brew install poppler"
    } else if cfg!(windows) {
        "   - Windows: https://github.com/oschwartz10612/poppler-windows/releases"
    } else {
        "   - Ubuntu/Debian: sudo apt-get install poppler-utils"
    }
}
