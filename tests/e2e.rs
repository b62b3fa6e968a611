//! End-to-end integration tests for docx2pdf.
//!
//! DOCX fixtures are assembled in memory with `zip`; produced PDFs are
//! parsed back with `lopdf`. Tests that rasterise text need an installed
//! sans-serif font and print a SKIP line when none is available.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use docx2pdf::pipeline::render::FontSet;
use docx2pdf::{
    convert, convert_stream, convert_to_file, convert_with_host, extract_html, inspect,
    ConversionConfig, ConversionEvent, ConversionProgressCallback, ErrorKind, RenderHost,
    SliceMode, Stage,
};
use futures::StreamExt;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

const NAMESPACES: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\" \
xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"";

const STYLES: &str = r#"<?xml version="1.0"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
  <w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/></w:style>
</w:styles>"#;

const CORE: &str = r#"<?xml version="1.0"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
  xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Quarterly Report</dc:title>
  <dc:creator>Finance Team</dc:creator>
</cp:coreProperties>"#;

const IMAGE_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
</Relationships>"#;

fn docx(body: &str, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let opts = SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).unwrap();
        write!(
            zip,
            "<?xml version=\"1.0\"?><w:document {NAMESPACES}><w:body>{body}</w:body></w:document>"
        )
        .unwrap();
        zip.start_file("word/styles.xml", opts).unwrap();
        zip.write_all(STYLES.as_bytes()).unwrap();
        zip.start_file("docProps/core.xml", opts).unwrap();
        zip.write_all(CORE.as_bytes()).unwrap();
        for (name, data) in extra {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

fn para(style: Option<&str>, text: &str) -> String {
    let ppr = style
        .map(|s| format!("<w:pPr><w:pStyle w:val=\"{s}\"/></w:pPr>"))
        .unwrap_or_default();
    format!("<w:p>{ppr}<w:r><w:t>{text}</w:t></w:r></w:p>")
}

fn image_para() -> String {
    "<w:p><w:r><w:drawing><wp:inline><wp:docPr id=\"1\" name=\"Picture\" descr=\"Chart\"/>\
     <a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">\
     <a:blip r:embed=\"rId5\"/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"
        .to_string()
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([30, 90, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn short_document() -> Vec<u8> {
    let body = [
        para(Some("Title"), "Quarterly Report"),
        para(Some("Heading1"), "Summary"),
        para(None, "Revenue grew in every region."),
        para(Some("Heading2"), "Details"),
        para(None, "See the table below."),
    ]
    .concat();
    docx(&body, &[])
}

fn long_document(paragraphs: usize) -> Vec<u8> {
    let body: String = (0..paragraphs)
        .map(|i| {
            para(
                None,
                &format!("Paragraph {i}: the quick brown fox jumps over the lazy dog again and again."),
            )
        })
        .collect();
    docx(&body, &[])
}

fn page_count(pdf: &[u8]) -> usize {
    lopdf::Document::load_mem(pdf)
        .expect("output must parse as PDF")
        .get_pages()
        .len()
}

/// Skip this test when no system font can be resolved.
macro_rules! require_fonts {
    () => {{
        if FontSet::discover(&[]).is_err() {
            println!("SKIP: no sans-serif font installed");
            return;
        }
    }};
}

#[derive(Default)]
struct Recorder {
    values: Mutex<Vec<f32>>,
    stages: Mutex<Vec<Stage>>,
    pages: Mutex<Vec<(usize, usize)>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_progress(&self, percent: f32) {
        self.values.lock().unwrap().push(percent);
    }
    fn on_stage(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }
    fn on_page_placed(&self, page_num: usize, total_pages: usize) {
        self.pages.lock().unwrap().push((page_num, total_pages));
    }
}

// ── Extraction (no font needed) ──────────────────────────────────────────────

#[test]
fn heading_paragraphs_become_top_level_h1() {
    let body = [
        para(Some("Heading1"), "One"),
        para(None, "text"),
        para(Some("Heading1"), "Two"),
        para(Some("Heading1"), "Three"),
    ]
    .concat();
    let fragment = extract_html(&docx(&body, &[]), &ConversionConfig::default()).unwrap();
    assert_eq!(fragment.html.matches("<h1>").count(), 3);
    assert_eq!(fragment.metadata.heading_count, 3);
    assert_eq!(fragment.metadata.title.as_deref(), Some("Quarterly Report"));
}

#[test]
fn extract_html_follows_configured_style_rules() {
    let body = [para(Some("Title"), "Cover"), para(Some("Heading1"), "One")].concat();
    let config = ConversionConfig::builder()
        .style_rule("p[style-name='Title'] => h2.cover:fresh")
        .include_default_style_map(false)
        .build()
        .unwrap();
    let fragment = extract_html(&docx(&body, &[]), &config).unwrap();
    assert_eq!(fragment.html, "<h2 class=\"cover\">Cover</h2><h1>One</h1>");
    assert!(fragment.warnings.is_empty(), "{:?}", fragment.warnings);
}

#[tokio::test]
async fn inspect_reads_core_properties() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.docx");
    std::fs::write(&path, short_document()).unwrap();

    let meta = inspect(&path).await.unwrap();
    assert_eq!(meta.title.as_deref(), Some("Quarterly Report"));
    assert_eq!(meta.creator.as_deref(), Some("Finance Team"));
    assert_eq!(meta.heading_count, 3);
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_docx_input_is_a_parse_error() {
    let host = RenderHost::new();
    let err = convert_with_host(b"%PDF-1.7 not a docx", &ConversionConfig::default(), &host)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(host.attached_count(), 0);
}

#[tokio::test]
async fn strict_images_fail_during_render_and_detach() {
    let bytes = docx(
        &image_para(),
        &[
            ("word/_rels/document.xml.rels", IMAGE_RELS.as_bytes()),
            ("word/media/image1.png", &b"\x89PNG-truncated"[..]),
        ],
    );
    let config = ConversionConfig::builder()
        .allow_taint(false)
        .build()
        .unwrap();
    let host = RenderHost::new();
    let err = convert_with_host(&bytes, &config, &host).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(host.attached_count(), 0);
}

// ── Full conversions (font needed) ───────────────────────────────────────────

#[tokio::test]
async fn short_document_fits_one_letter_page() {
    require_fonts!();
    let host = RenderHost::new();
    let output = convert_with_host(&short_document(), &ConversionConfig::default(), &host)
        .await
        .unwrap();

    assert!(output.pdf.starts_with(b"%PDF-"));
    assert_eq!(output.page_count(), 1);
    assert_eq!(page_count(&output.pdf), 1);
    assert_eq!(output.stats.raster_width, 1632);
    assert_eq!(host.attached_count(), 0);

    let doc = lopdf::Document::load_mem(&output.pdf).unwrap();
    let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
    let page = doc.get_dictionary(page_id).unwrap();
    let media_box: Vec<f32> = page
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_float().unwrap())
        .collect();
    assert_eq!(media_box, vec![0.0, 0.0, 612.0, 792.0]);
}

#[tokio::test]
async fn long_document_spans_ceil_pages() {
    require_fonts!();
    let output = convert(&long_document(120), &ConversionConfig::default())
        .await
        .unwrap();
    let scaled = f64::from(output.stats.scaled_height_pt);
    let expected = ((scaled - 0.01) / 792.0).ceil().max(1.0) as usize;
    assert!(expected > 1, "fixture should overflow one page");
    assert_eq!(output.page_count(), expected);
    assert_eq!(page_count(&output.pdf), expected);
}

#[tokio::test]
async fn progress_is_monotone_and_complete() {
    require_fonts!();
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let output = convert(&long_document(80), &config).await.unwrap();

    let values = recorder.values.lock().unwrap().clone();
    assert_eq!(values.first().copied(), Some(10.0));
    assert!(values.contains(&70.0));
    assert_eq!(values.last().copied(), Some(100.0));
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));

    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![Stage::Extract, Stage::Render, Stage::Assemble]
    );
    let pages = recorder.pages.lock().unwrap().clone();
    assert_eq!(pages.len(), output.page_count());
    assert_eq!(pages.last(), Some(&(output.page_count(), output.page_count())));
}

#[tokio::test]
async fn crop_and_shift_modes_agree_on_page_count() {
    require_fonts!();
    let bytes = long_document(100);
    let shift = convert(&bytes, &ConversionConfig::default()).await.unwrap();
    let crop_config = ConversionConfig::builder()
        .slice_mode(SliceMode::Crop)
        .build()
        .unwrap();
    let crop = convert(&bytes, &crop_config).await.unwrap();
    assert_eq!(shift.page_count(), crop.page_count());
    assert_eq!(page_count(&crop.pdf), crop.page_count());
}

#[tokio::test]
async fn embedded_images_and_tables_render() {
    require_fonts!();
    let table = "<w:tbl>\
        <w:tr><w:trPr><w:tblHeader/></w:trPr>\
          <w:tc><w:p><w:r><w:t>Region</w:t></w:r></w:p></w:tc>\
          <w:tc><w:p><w:r><w:t>Revenue</w:t></w:r></w:p></w:tc></w:tr>\
        <w:tr><w:tc><w:p><w:r><w:t>North</w:t></w:r></w:p></w:tc>\
          <w:tc><w:p><w:r><w:t>42</w:t></w:r></w:p></w:tc></w:tr>\
        </w:tbl>";
    let body = format!("{}{}{}", para(Some("Heading1"), "Figures"), image_para(), table);
    let image = png(400, 200);
    let bytes = docx(
        &body,
        &[
            ("word/_rels/document.xml.rels", IMAGE_RELS.as_bytes()),
            ("word/media/image1.png", &image),
        ],
    );
    let output = convert(&bytes, &ConversionConfig::default()).await.unwrap();
    assert_eq!(output.metadata.image_count, 1);
    assert_eq!(output.metadata.table_count, 1);
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(page_count(&output.pdf), output.page_count());
}

#[tokio::test]
async fn broken_image_is_tolerated_by_default() {
    require_fonts!();
    let bytes = docx(
        &format!("{}{}", para(None, "Before"), image_para()),
        &[
            ("word/_rels/document.xml.rels", IMAGE_RELS.as_bytes()),
            ("word/media/image1.png", &b"\x89PNG-truncated"[..]),
        ],
    );
    let output = convert(&bytes, &ConversionConfig::default()).await.unwrap();
    assert!(output.pdf.starts_with(b"%PDF-"));
}

#[tokio::test]
async fn convert_to_file_writes_atomically() {
    require_fonts!();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.docx");
    let output = dir.path().join("nested/out/report.pdf");
    std::fs::write(&input, short_document()).unwrap();

    let stats = convert_to_file(&input, &output, &ConversionConfig::default())
        .await
        .unwrap();
    let written = std::fs::read(&output).unwrap();
    assert!(written.starts_with(b"%PDF-"));
    assert_eq!(written.len(), stats.pdf_bytes);

    let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path() != output)
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[tokio::test]
async fn stream_ends_with_finished_output() {
    require_fonts!();
    let events: Vec<ConversionEvent> =
        convert_stream(short_document(), &ConversionConfig::default())
            .collect()
            .await;

    let progress: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            ConversionEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.first().copied(), Some(10.0));
    assert_eq!(progress.last().copied(), Some(100.0));

    match events.last() {
        Some(ConversionEvent::Finished(result)) => match &**result {
            Ok(output) => assert!(output.pdf.starts_with(b"%PDF-")),
            Err(e) => panic!("conversion failed: {e}"),
        },
        other => panic!("expected Finished, got {other:?}"),
    }
}
