//! Eager (whole-document) conversion entry points.
//!
//! [`convert`] runs the three stages back to back and returns the finished
//! PDF in memory. Use [`crate::stream::convert_stream`] to observe progress
//! as a stream of events instead of through a callback.

use crate::config::{ConversionConfig, PageGeometry};
use crate::error::Docx2PdfError;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::extract::{self, MarkupFragment};
use crate::pipeline::stylemap::StyleMap;
use crate::pipeline::surface::RenderHost;
use crate::pipeline::{assemble, paginate, render};
use crate::progress::{ProgressReporter, Stage};
use once_cell::sync::Lazy;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

static DEFAULT_HOST: Lazy<Arc<RenderHost>> = Lazy::new(RenderHost::new);

/// The host that [`convert`] attaches render surfaces to.
///
/// Between conversions it holds no surfaces.
pub fn default_host() -> &'static Arc<RenderHost> {
    &DEFAULT_HOST
}

/// Convert DOCX bytes to a PDF.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Any stage failure is fatal: parse errors for unreadable packages, render
/// errors for missing fonts or undecodable images (with `allow_taint` off),
/// assembly errors from the PDF writer.
pub async fn convert(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2PdfError> {
    convert_with_host(bytes, config, default_host()).await
}

/// [`convert`] against a caller-owned [`RenderHost`].
pub async fn convert_with_host(
    bytes: &[u8],
    config: &ConversionConfig,
    host: &Arc<RenderHost>,
) -> Result<ConversionOutput, Docx2PdfError> {
    let total_start = Instant::now();
    info!("Starting conversion: {} bytes", bytes.len());

    // ── Step 1: Extract markup ───────────────────────────────────────────
    let extract_start = Instant::now();
    let fragment = extract_fragment(bytes, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} bytes of markup in {}ms",
        fragment.html.len(),
        extract_duration_ms
    );
    for warning in &fragment.warnings {
        debug!("Extraction warning: {}", warning);
    }

    // ── Step 2: Rasterise ────────────────────────────────────────────────
    let render_start = Instant::now();
    let raster = render::render(&fragment, config, host).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {}x{} px in {}ms",
        raster.width(),
        raster.height(),
        render_duration_ms
    );

    // ── Step 3: Paginate ─────────────────────────────────────────────────
    let pagination = paginate::paginate(raster.width(), raster.height(), &PageGeometry::LETTER)?;
    debug!(
        "Scaled height {:.1}pt over {} pages",
        pagination.scaled_height_pt,
        pagination.page_count()
    );

    // ── Step 4: Assemble PDF ─────────────────────────────────────────────
    let assemble_start = Instant::now();
    let (raster_width, raster_height) = (raster.width(), raster.height());
    let scaled_height_pt = pagination.scaled_height_pt as f32;
    let page_count = pagination.page_count();
    let metadata = fragment.metadata.clone();
    let mode = config.slice_mode;
    let callback = config.progress_callback.clone();
    let pdf = tokio::task::spawn_blocking(move || {
        assemble::assemble(&raster, &pagination, &metadata, mode, callback.as_ref())
    })
    .await
    .map_err(|e| Docx2PdfError::Internal(format!("Assembly task panicked: {}", e)))??;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    // ── Step 5: Compute stats ────────────────────────────────────────────
    let stats = ConversionStats {
        page_count,
        raster_width,
        raster_height,
        scaled_height_pt,
        pdf_bytes: pdf.len(),
        extract_duration_ms,
        render_duration_ms,
        assemble_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} pages, {} bytes, {}ms total",
        stats.page_count, stats.pdf_bytes, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        pdf,
        metadata: fragment.metadata,
        stats,
        warnings: fragment.warnings,
    })
}

/// Read a DOCX file from disk and [`convert`] it.
pub async fn convert_file(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2PdfError> {
    let bytes = read_input(input.as_ref()).await?;
    convert(&bytes, config).await
}

/// Convert a DOCX file and write the PDF directly to `output_path`.
///
/// Uses an atomic write (temp file in the target directory, then persist)
/// so a failed conversion never leaves a partial PDF behind.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Docx2PdfError> {
    let output = convert_file(input, config).await?;
    let path = output_path.as_ref().to_path_buf();

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| write_failed(&path, e))?;

    let pdf = output.pdf;
    let target = path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), Docx2PdfError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_failed(&target, e))?;
        tmp.write_all(&pdf).map_err(|e| write_failed(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| write_failed(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Docx2PdfError::Internal(format!("Write task panicked: {}", e)))??;

    info!("Wrote {}", path.display());
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Docx2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(bytes, config))
}

/// Read document properties and structural counts without rendering.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentMetadata, Docx2PdfError> {
    let bytes = read_input(input.as_ref()).await?;
    tokio::task::spawn_blocking(move || extract::extract_metadata(&bytes))
        .await
        .map_err(|e| Docx2PdfError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Run only the extraction stage, with the style-mapping rules of `config`.
///
/// The fragment is the one [`convert`] would render for the same config.
pub fn extract_html(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<MarkupFragment, Docx2PdfError> {
    extract::extract(bytes, &style_map(config)?)
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) async fn extract_fragment(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<MarkupFragment, Docx2PdfError> {
    let map = style_map(config)?;
    let bytes = bytes.to_vec();
    let callback = config.progress_callback.clone();
    tokio::task::spawn_blocking(move || {
        ProgressReporter::new(callback.as_ref()).stage(Stage::Extract);
        extract::extract(&bytes, &map)
    })
    .await
    .map_err(|e| Docx2PdfError::Internal(format!("Extract task panicked: {}", e)))?
}

fn style_map(config: &ConversionConfig) -> Result<StyleMap, Docx2PdfError> {
    StyleMap::new(&config.style_map, config.include_default_style_map)
        .map_err(|e| Docx2PdfError::InvalidConfig(format!("style map: {}", e)))
}

pub(crate) async fn read_input(path: &Path) -> Result<Vec<u8>, Docx2PdfError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Docx2PdfError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => Docx2PdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Docx2PdfError::Internal(format!("reading {}: {}", path.display(), e)),
    })
}

fn write_failed(path: &Path, source: std::io::Error) -> Docx2PdfError {
    Docx2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
