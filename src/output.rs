//! Result types returned by the conversion entry points.

use serde::{Deserialize, Serialize};

/// Everything a successful conversion produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The finished PDF file.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// Properties read from the source package.
    pub metadata: DocumentMetadata,
    /// Timing and geometry figures.
    pub stats: ConversionStats,
    /// Extraction warnings (unmapped styles, missing image parts, …).
    pub warnings: Vec<String>,
}

impl ConversionOutput {
    /// Number of PDF pages written.
    pub fn page_count(&self) -> usize {
        self.stats.page_count
    }
}

/// Package properties (`docProps/core.xml`) plus structural counts gathered
/// during extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub paragraph_count: usize,
    pub heading_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub chart_count: usize,
}

/// Figures describing one conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// PDF pages produced.
    pub page_count: usize,
    /// Raster width in device pixels.
    pub raster_width: u32,
    /// Raster height in device pixels.
    pub raster_height: u32,
    /// Raster height scaled to the PDF page width, in points.
    pub scaled_height_pt: f32,
    /// Size of the PDF in bytes.
    pub pdf_bytes: usize,
    pub extract_duration_ms: u64,
    pub render_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}
