//! External rasterizer backend for slide-png.
//!
//! Converts a deck to PDF with LibreOffice and renders each page to PNG with
//! poppler's `pdftoppm`.

pub mod libreoffice;

pub use libreoffice::{find_tool, LibreOfficeRasterizer, RasterPages};
