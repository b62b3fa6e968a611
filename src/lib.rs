//! # docx2pdf
//!
//! Convert DOCX documents to paginated, image-based PDF.
//!
//! ## How it works
//!
//! The document is mapped to styled HTML (headings, paragraphs, lists,
//! tables, inline images, chart placeholders), laid out on a virtual
//! 8.5-inch page and painted into one tall bitmap at 2× supersampling. That
//! bitmap is scaled to the PDF page width and sliced over as many US-Letter
//! pages as it needs. The output contains no selectable text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Extract   unzip, map styles to HTML, inline images    (10%)
//!  ├─ 2. Render    layout + paint into one bitmap (spawn_blocking)  (70%)
//!  ├─ 3. Paginate  page-height bands of the scaled bitmap
//!  └─ 4. Assemble  one image-only PDF page per band          (70→100%)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2pdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("report.docx")?;
//!     let output = convert(&bytes, &ConversionConfig::default()).await?;
//!     std::fs::write("report.pdf", &output.pdf)?;
//!     eprintln!("{} pages", output.page_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docx2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Fonts
//!
//! Text is drawn with an installed sans-serif face (Arial, Helvetica,
//! Liberation Sans, Arimo or DejaVu Sans, in that order). Extra directories
//! can be added with [`ConversionConfigBuilder::font_dir`]. Without any usable
//! font the conversion fails with [`Docx2PdfError::FontUnavailable`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod stylesheet;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, PageGeometry, SliceMode};
pub use convert::{
    convert, convert_file, convert_sync, convert_to_file, convert_with_host, default_host,
    extract_html, inspect,
};
pub use error::{Docx2PdfError, ErrorKind};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata};
pub use pipeline::extract::MarkupFragment;
pub use pipeline::render::RasterImage;
pub use pipeline::surface::RenderHost;
pub use progress::{
    ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage,
};
pub use stream::{convert_stream, ConversionEvent, ProgressStream};
