//! Error types for the docx2pdf library.
//!
//! Conversion is all-or-nothing: every failure is fatal and surfaces as a
//! single [`Docx2PdfError`] from the top-level `convert*` functions. Nothing
//! inside the pipeline catches or retries.
//!
//! Variants are grouped by the stage that raises them. [`Docx2PdfError::kind`]
//! collapses them into an [`ErrorKind`] for callers that only want to know
//! *where* the conversion broke:
//!
//! * **Parse**: the input is not a readable DOCX package.
//! * **Render**: the markup could not be rasterised.
//! * **Assembly**: the PDF writer failed while building pages.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docx2pdf library.
#[derive(Debug, Error)]
pub enum Docx2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("DOCX file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The bytes are not a ZIP container (legacy `.doc`, truncated upload, …).
    #[error("Input is not a DOCX package: {detail}\nLegacy .doc files must be re-saved as .docx.")]
    NotAZip { detail: String },

    /// A mandatory part is absent from the package.
    #[error("DOCX package is missing required part '{part}'")]
    MissingPart { part: String },

    /// A package part exists but is not well-formed XML.
    #[error("Malformed XML in '{part}': {detail}")]
    MalformedXml { part: String, detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// No usable font face could be found for text rasterisation.
    #[error(
        "No usable font found for rendering.\n\
Install a sans-serif font (e.g. Liberation Sans or DejaVu Sans) or pass --font-dir <DIR>."
    )]
    FontUnavailable,

    /// An inline image could not be decoded and taint tolerance is disabled.
    #[error("Failed to decode embedded image: {detail}")]
    ImageDecode { detail: String },

    /// The laid-out document is taller than the configured raster cap.
    #[error("Rendered document is {height}px tall, above the {limit}px limit")]
    RasterTooLarge { height: u32, limit: u32 },

    /// Any other failure while painting the render surface.
    #[error("Rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The PDF could not be assembled from the raster.
    #[error("PDF assembly failed: {detail}")]
    AssemblyFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`Docx2PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Parse,
    Render,
    Assembly,
    Io,
    Config,
    Internal,
}

impl Docx2PdfError {
    /// The pipeline stage (or outer concern) this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAZip { .. } | Self::MissingPart { .. } | Self::MalformedXml { .. } => {
                ErrorKind::Parse
            }
            Self::FontUnavailable
            | Self::ImageDecode { .. }
            | Self::RasterTooLarge { .. }
            | Self::RasterisationFailed { .. } => ErrorKind::Render,
            Self::AssemblyFailed { .. } => ErrorKind::Assembly,
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::OutputWriteFailed { .. } => ErrorKind::Io,
            Self::InvalidConfig(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn malformed(part: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedXml {
            part: part.to_string(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_part_display() {
        let e = Docx2PdfError::MissingPart {
            part: "word/document.xml".into(),
        };
        assert!(e.to_string().contains("word/document.xml"));
        assert_eq!(e.kind(), ErrorKind::Parse);
    }

    #[test]
    fn raster_too_large_display() {
        let e = Docx2PdfError::RasterTooLarge {
            height: 90_000,
            limit: 60_000,
        };
        let msg = e.to_string();
        assert!(msg.contains("90000px"), "got: {msg}");
        assert!(msg.contains("60000px"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Render);
    }

    #[test]
    fn malformed_helper_keeps_part_name() {
        let e = Docx2PdfError::malformed("word/styles.xml", "unexpected end of stream");
        assert!(e.to_string().contains("word/styles.xml"));
        assert!(e.to_string().contains("unexpected end"));
    }

    #[test]
    fn kinds_cover_assembly_and_io() {
        let e = Docx2PdfError::AssemblyFailed {
            detail: "zero width".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Assembly);

        let e = Docx2PdfError::OutputWriteFailed {
            path: "/tmp/out.pdf".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(e.kind(), ErrorKind::Io);
        assert!(e.to_string().contains("disk full"));
    }
}
