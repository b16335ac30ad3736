//! Core domain types, filename sanitizing, image filters and the export
//! pipeline for turning presentation slides into transparent PNG images.

pub mod error;
pub mod filters;
pub mod pipeline;
pub mod sanitize;
pub mod types;

pub use error::{Error, Result};
pub use pipeline::{PageSource, Pipeline, PipelineOptions, Rasterizer};
pub use sanitize::{sanitize_filename, NameRegistry};
pub use types::{RelativeBox, RunStats, SlideDescriptor};
