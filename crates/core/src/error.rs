//! Error types for slide image extraction.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting slides to PNG.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write a file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The source presentation does not exist.
    #[error("File not found: {0}")]
    InputNotFound(String),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error (for PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// Invalid or corrupted file.
    #[error("Invalid or corrupted file: {0}")]
    CorruptedFile(String),

    /// A required external program is not installed.
    #[error("{tool} not found. Install it:\n{hint}")]
    ToolMissing {
        /// Program name that was searched for.
        tool: String,
        /// Platform-specific installation guidance.
        hint: String,
    },

    /// An external program exited with a non-zero status.
    #[error("{tool} failed ({status}):\n{output}")]
    ToolFailed {
        tool: String,
        status: String,
        /// Captured stdout and stderr.
        output: String,
    },

    /// The intermediate document was not produced.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Rasterization produced no page images.
    #[error("No PNG pages were generated in {0}")]
    EmptyRasterization(String),

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}
