//! PPTX (Office Open XML) slide title locator.
//!
//! Reads .pptx files (ZIP archives of XML parts) and reports, for every
//! slide, its title text and where that title sits on the slide.

pub mod parser;

pub use parser::PptxParser;
