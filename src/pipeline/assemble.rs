//! PDF assembly from a raster and its [`Pagination`].
//!
//! Every page is an image-only page of the configured geometry. In
//! [`SliceMode::Shift`] the raster is embedded once and each page draws it
//! shifted up by the page's offset, letting the media box clip the rest. In
//! [`SliceMode::Crop`] each page gets its own band of rows.

use crate::config::SliceMode;
use crate::error::Docx2PdfError;
use crate::output::DocumentMetadata;
use crate::pipeline::paginate::Pagination;
use crate::pipeline::render::RasterImage;
use crate::progress::{ProgressCallback, ProgressReporter, Stage};
use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};
use tracing::debug;

const IMAGE_NAME: &[u8] = b"Im1";
const DEFLATE_LEVEL: u8 = 6;

/// Value of the `/Producer` entry.
pub const PRODUCER: &str = concat!("docx2pdf ", env!("CARGO_PKG_VERSION"));

/// Build the PDF for `raster` laid out as `pagination`.
///
/// `progress` receives one checkpoint and one page event per placed page.
pub fn assemble(
    raster: &RasterImage,
    pagination: &Pagination,
    metadata: &DocumentMetadata,
    mode: SliceMode,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<u8>, Docx2PdfError> {
    let mut reporter = ProgressReporter::new(progress);
    assemble_with(raster, pagination, metadata, mode, &mut reporter)
}

pub(crate) fn assemble_with(
    raster: &RasterImage,
    pagination: &Pagination,
    metadata: &DocumentMetadata,
    mode: SliceMode,
    progress: &mut ProgressReporter<'_>,
) -> Result<Vec<u8>, Docx2PdfError> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(Docx2PdfError::AssemblyFailed {
            detail: format!(
                "cannot place a {}x{} raster",
                raster.width(),
                raster.height()
            ),
        });
    }
    if pagination.pages.is_empty() {
        return Err(Docx2PdfError::AssemblyFailed {
            detail: "pagination has no pages".into(),
        });
    }
    progress.stage(Stage::Assemble);

    let mut pdf = Pdf::new();
    let mut next_id = 1i32;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };

    let catalog_id = alloc();
    let pages_id = alloc();
    let info_id = alloc();
    let total = pagination.page_count();
    let page_ids: Vec<Ref> = (0..total).map(|_| alloc()).collect();
    let content_ids: Vec<Ref> = (0..total).map(|_| alloc()).collect();

    let page_w = pagination.page.width_pt;
    let page_h = pagination.page.height_pt;

    // Shift mode shares one XObject; crop mode allocates one per page.
    let shared_image = match mode {
        SliceMode::Shift => {
            let id = alloc();
            write_image(&mut pdf, id, raster, 0, raster.height());
            Some(id)
        }
        SliceMode::Crop => None,
    };

    for (i, placement) in pagination.pages.iter().enumerate() {
        let mut content = Content::new();
        content.save_state();
        let image_id = match shared_image {
            Some(id) => {
                let scaled = pagination.scaled_height_pt as f32;
                let offset = placement.offset_pt as f32;
                content.transform([page_w, 0.0, 0.0, scaled, 0.0, page_h - scaled + offset]);
                id
            }
            None => {
                let (top, rows) = pagination.band_rows(i, raster.height());
                let id = alloc();
                write_image(&mut pdf, id, raster, top, rows);
                let band_h = (f64::from(rows.max(1)) / pagination.px_per_pt) as f32;
                content.transform([page_w, 0.0, 0.0, band_h, 0.0, page_h - band_h]);
                id
            }
        };
        content.x_object(Name(IMAGE_NAME));
        content.restore_state();

        let compressed = compress_to_vec_zlib(&content.finish(), DEFLATE_LEVEL);
        pdf.stream(content_ids[i], &compressed)
            .filter(Filter::FlateDecode);

        let mut page = pdf.page(page_ids[i]);
        page.media_box(Rect::new(0.0, 0.0, page_w, page_h))
            .parent(pages_id)
            .contents(content_ids[i]);
        page.resources()
            .x_objects()
            .pair(Name(IMAGE_NAME), image_id);
        page.finish();

        debug!(
            "Placed page {}/{} at offset {:.2}pt",
            i + 1,
            total,
            placement.offset_pt
        );
        progress.report(pagination.progress_after(i));
        progress.page_placed(i + 1, total);
    }

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(total as i32);

    let mut info = pdf.document_info(info_id);
    if let Some(title) = &metadata.title {
        info.title(TextStr(title));
    }
    if let Some(author) = &metadata.creator {
        info.author(TextStr(author));
    }
    if let Some(subject) = &metadata.subject {
        info.subject(TextStr(subject));
    }
    if let Some(keywords) = &metadata.keywords {
        info.keywords(TextStr(keywords));
    }
    info.producer(TextStr(PRODUCER));
    info.finish();

    Ok(pdf.finish())
}

/// Write rows `top..top + rows` of `raster` as a Flate RGB image XObject.
fn write_image(pdf: &mut Pdf, id: Ref, raster: &RasterImage, top: u32, rows: u32) {
    let rows = rows.max(1).min(raster.height().saturating_sub(top).max(1));
    let top = top.min(raster.height() - rows);
    let compressed = compress_to_vec_zlib(&raster.rgb_rows(top, rows), DEFLATE_LEVEL);
    let mut image = pdf.image_xobject(id, &compressed);
    image.filter(Filter::FlateDecode);
    image.width(raster.width() as i32);
    image.height(rows as i32);
    image.color_space().device_rgb();
    image.bits_per_component(8);
}
