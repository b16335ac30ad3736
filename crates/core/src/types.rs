//! Domain types describing slides and the outcome of a run.

use serde::{Deserialize, Serialize};

/// A rectangle expressed as fractions of the slide width and height.
///
/// Values are nominally in `[0, 1]` but are kept as-is for shapes that hang
/// off the slide; the eraser clamps them to the image later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl RelativeBox {
    /// Build a relative box from absolute shape geometry and slide size.
    ///
    /// All values must share one unit (EMU for PPTX).
    pub fn from_absolute(
        x: f64,
        y: f64,
        cx: f64,
        cy: f64,
        slide_width: f64,
        slide_height: f64,
    ) -> Option<Self> {
        if slide_width <= 0.0 || slide_height <= 0.0 {
            return None;
        }

        Some(Self {
            left: x / slide_width,
            top: y / slide_height,
            width: cx / slide_width,
            height: cy / slide_height,
        })
    }
}

/// Title information captured for one slide before rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideDescriptor {
    /// 1-based slide number in deck order.
    pub number: usize,

    /// Title placeholder text, or the first non-empty text on the slide.
    pub title: Option<String>,

    /// Where that text sits on the slide.
    pub bbox: Option<RelativeBox>,

    /// Hidden slides are skipped by the PDF export.
    pub hidden: bool,
}

impl SlideDescriptor {
    /// Create a descriptor with no title.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            title: None,
            bbox: None,
            hidden: false,
        }
    }

    /// Attach a title and its location.
    pub fn with_title(mut self, title: impl Into<String>, bbox: Option<RelativeBox>) -> Self {
        self.title = Some(title.into());
        self.bbox = bbox;
        self
    }

    /// Title shortened for progress output.
    pub fn display_title(&self) -> String {
        match self.title.as_deref() {
            None | Some("") => "(untitled)".to_string(),
            Some(title) if title.chars().count() > 50 => {
                let short: String = title.chars().take(50).collect();
                format!("{}...", short)
            }
            Some(title) => title.to_string(),
        }
    }
}

/// Counters collected while writing output files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Files that did not exist before this run.
    pub created: usize,

    /// Files that replaced an existing file of the same name.
    pub overwritten: usize,

    /// Sum of written file sizes in bytes.
    pub total_bytes: u64,

    /// Pages handed over by the rasterizer.
    pub pages: usize,
}

impl RunStats {
    /// Record one written file.
    pub fn record(&mut self, existed: bool, bytes: u64) {
        if existed {
            self.overwritten += 1;
        } else {
            self.created += 1;
        }
        self.total_bytes += bytes;
    }

    /// Total output size in MB.
    pub fn total_mb(&self) -> f64 {
        bytes_to_mb(self.total_bytes)
    }

    /// Average output size per rasterized page in MB.
    pub fn average_mb(&self) -> f64 {
        if self.pages == 0 {
            return 0.0;
        }
        self.total_mb() / self.pages as f64
    }
}

/// Convert a byte count to megabytes (1024 × 1024).
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
