//! Rasterisation: HTML fragment → one tall RGBA bitmap.
//!
//! ## Why spawn_blocking?
//!
//! Font loading, layout and painting are CPU-bound and can take hundreds of
//! milliseconds on long documents. `tokio::task::spawn_blocking` moves the
//! work onto the blocking pool so Tokio worker threads stay responsive.
//!
//! ## Sequence
//!
//! 1. build a [`RenderSurface`] and attach it to the [`RenderHost`]
//! 2. report 10%
//! 3. clone the attached surface (shadows stripped) for capture
//! 4. resolve fonts and decode images
//! 5. lay out at CSS-pixel resolution, paint at `scale` device pixels per CSS pixel
//! 6. report 70%, detach
//!
//! The surface is attached through a guard, so step 6's detach also happens
//! when any earlier step fails or panics.

use crate::config::ConversionConfig;
use crate::error::Docx2PdfError;
use crate::pipeline::extract::MarkupFragment;
use crate::pipeline::layout::{
    self, Bounds, DisplayItem, DisplayList, FaceStyle, LayoutParams, MarkerShape, TextMeasure,
};
use crate::pipeline::surface::{ImageSource, RenderHost, RenderSurface};
use crate::progress::{ProgressReporter, Stage, PROGRESS_RASTER_DONE, PROGRESS_RENDER_START};
use crate::stylesheet;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Families tried in order before falling back to any installed face.
const PREFERRED_FAMILIES: &[&str] = &[
    "Arial",
    "Helvetica",
    "Liberation Sans",
    "Arimo",
    "DejaVu Sans",
];

// ── Raster image ─────────────────────────────────────────────────────────

/// The rendered document: fixed width, variable height, opaque.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.pixels
    }

    /// Packed 8-bit RGB samples for rows `top..top + rows`, clamped to the
    /// image.
    pub fn rgb_rows(&self, top: u32, rows: u32) -> Vec<u8> {
        let top = top.min(self.height());
        let end = top.saturating_add(rows).min(self.height());
        let w = self.width() as usize;
        let mut out = Vec::with_capacity(w * (end - top) as usize * 3);
        for y in top..end {
            for x in 0..self.width() {
                let p = self.pixels.get_pixel(x, y).0;
                out.extend_from_slice(&[p[0], p[1], p[2]]);
            }
        }
        out
    }

    /// Packed 8-bit RGB samples of the whole image.
    pub fn rgb_bytes(&self) -> Vec<u8> {
        self.rgb_rows(0, self.height())
    }
}

// ── Fonts ────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct LoadedFace {
    font: Arc<FontVec>,
    synthetic_bold: bool,
}

impl LoadedFace {
    /// Scale at which one em equals `size_px` pixels.
    fn px_scale(&self, size_px: f32) -> PxScale {
        let upem = self.font.units_per_em().unwrap_or(1000.0);
        PxScale::from(size_px * self.font.height_unscaled() / upem)
    }
}

/// Regular, bold, italic and bold-italic faces used for all text.
#[derive(Clone)]
pub struct FontSet {
    regular: LoadedFace,
    bold: LoadedFace,
    italic: LoadedFace,
    bold_italic: LoadedFace,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("synthetic_bold", &self.bold.synthetic_bold)
            .finish_non_exhaustive()
    }
}

impl FontSet {
    /// Resolve faces from `font_dirs` when they contain any font, otherwise
    /// from the system font directories.
    pub fn discover(font_dirs: &[PathBuf]) -> Result<Self, Docx2PdfError> {
        if !font_dirs.is_empty() {
            let mut db = Database::new();
            for dir in font_dirs {
                db.load_fonts_dir(dir);
            }
            if !db.is_empty() {
                debug!("Loaded {} faces from font dirs", db.len());
                return Self::from_database(&db);
            }
            warn!(
                "No fonts found in {:?}; falling back to system fonts",
                font_dirs
            );
        }
        let mut db = Database::new();
        db.load_system_fonts();
        debug!("Loaded {} system font faces", db.len());
        Self::from_database(&db)
    }

    pub fn from_database(db: &Database) -> Result<Self, Docx2PdfError> {
        let mut cache: HashMap<fontdb::ID, Arc<FontVec>> = HashMap::new();
        let mut load = |bold: bool, italic: bool| -> Result<LoadedFace, Docx2PdfError> {
            let id = query_face(db, bold, italic).ok_or(Docx2PdfError::FontUnavailable)?;
            let heavy = db.face(id).is_some_and(|f| f.weight.0 >= 600);
            let font = match cache.get(&id) {
                Some(f) => Arc::clone(f),
                None => {
                    let font = db
                        .with_face_data(id, |data, index| {
                            FontVec::try_from_vec_and_index(data.to_vec(), index)
                        })
                        .and_then(Result::ok)
                        .map(Arc::new)
                        .ok_or(Docx2PdfError::FontUnavailable)?;
                    cache.insert(id, Arc::clone(&font));
                    font
                }
            };
            Ok(LoadedFace {
                font,
                synthetic_bold: bold && !heavy,
            })
        };

        let regular = load(false, false)?;
        let bold = load(true, false)?;
        let italic = load(false, true)?;
        let bold_italic = load(true, true)?;
        if bold.synthetic_bold {
            debug!("No bold face installed; using synthetic bold");
        }
        Ok(Self {
            regular,
            bold,
            italic,
            bold_italic,
        })
    }

    /// Use a single font file for every face; bold is synthesised.
    pub fn from_font_data(data: Vec<u8>) -> Result<Self, Docx2PdfError> {
        let font = Arc::new(FontVec::try_from_vec(data).map_err(|_| Docx2PdfError::FontUnavailable)?);
        let regular = LoadedFace {
            font: Arc::clone(&font),
            synthetic_bold: false,
        };
        let bold = LoadedFace {
            font,
            synthetic_bold: true,
        };
        Ok(Self {
            italic: regular.clone(),
            bold_italic: bold.clone(),
            regular,
            bold,
        })
    }

    fn face(&self, style: FaceStyle) -> &LoadedFace {
        match (style.bold, style.italic) {
            (false, false) => &self.regular,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (true, true) => &self.bold_italic,
        }
    }
}

fn query_face(db: &Database, bold: bool, italic: bool) -> Option<fontdb::ID> {
    let mut families: Vec<Family> = PREFERRED_FAMILIES.iter().map(|f| Family::Name(f)).collect();
    families.push(Family::SansSerif);
    let query = Query {
        families: &families,
        weight: if bold { Weight::BOLD } else { Weight::NORMAL },
        stretch: Stretch::Normal,
        style: if italic { Style::Italic } else { Style::Normal },
    };
    db.query(&query)
        .or_else(|| {
            db.faces()
                .find(|f| (f.weight.0 >= 600) == bold && (f.style != Style::Normal) == italic)
                .map(|f| f.id)
        })
        .or_else(|| db.faces().next().map(|f| f.id))
}

impl TextMeasure for FontSet {
    fn text_width(&self, text: &str, size: f32, face: FaceStyle) -> f32 {
        let loaded = self.face(face);
        let scaled = loaded.font.as_scaled(loaded.px_scale(size));
        let mut width = 0.0;
        let mut prev = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(p) = prev {
                width += scaled.kern(p, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    fn vertical_metrics(&self, face: FaceStyle) -> (f32, f32) {
        let font = &self.face(face).font;
        let upem = font.units_per_em().unwrap_or(1000.0);
        (font.ascent_unscaled() / upem, -font.descent_unscaled() / upem)
    }
}

// ── Images ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum DecodedImage {
    Pixels(RgbaImage),
    /// Undecodable image drawn as a grey box.
    Placeholder,
}

impl DecodedImage {
    fn css_size(&self) -> (f32, f32) {
        match self {
            DecodedImage::Pixels(p) => (p.width() as f32, p.height() as f32),
            DecodedImage::Placeholder => stylesheet::PLACEHOLDER_PX,
        }
    }
}

fn decode_images(
    surface: &RenderSurface,
    allow_taint: bool,
) -> Result<Vec<DecodedImage>, Docx2PdfError> {
    surface
        .images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let failure = match &img.source {
                ImageSource::Embedded { data, mime } => match image::load_from_memory(data) {
                    Ok(decoded) => return Ok(DecodedImage::Pixels(decoded.to_rgba8())),
                    Err(e) => format!("image {} ({}): {}", i + 1, mime, e),
                },
                ImageSource::Remote(url) => format!("image {}: external source {} is not fetched", i + 1, url),
                ImageSource::Invalid(reason) => format!("image {}: {}", i + 1, reason),
            };
            if allow_taint {
                warn!("Replacing undecodable {} with a placeholder", failure);
                Ok(DecodedImage::Placeholder)
            } else {
                Err(Docx2PdfError::ImageDecode { detail: failure })
            }
        })
        .collect()
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Rasterise a markup fragment.
///
/// This runs inside `spawn_blocking` since layout and painting are CPU-bound.
pub async fn render(
    fragment: &MarkupFragment,
    config: &ConversionConfig,
    host: &Arc<RenderHost>,
) -> Result<RasterImage, Docx2PdfError> {
    let html = fragment.html.clone();
    let config = config.clone();
    let host = Arc::clone(host);

    tokio::task::spawn_blocking(move || {
        let mut progress = ProgressReporter::new(config.progress_callback.as_ref());
        render_blocking(&html, &config, &host, &mut progress)
    })
    .await
    .map_err(|e| Docx2PdfError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`render`].
pub(crate) fn render_blocking(
    html: &str,
    config: &ConversionConfig,
    host: &Arc<RenderHost>,
    progress: &mut ProgressReporter<'_>,
) -> Result<RasterImage, Docx2PdfError> {
    progress.stage(Stage::Render);
    let attached = host.attach(RenderSurface::from_html(html));
    progress.report(PROGRESS_RENDER_START);

    let capture = attached.capture_clone(config.strip_shadows);
    let fonts = FontSet::discover(&config.font_dirs)?;
    let images = decode_images(&capture, config.allow_taint)?;
    let sizes: Vec<(f32, f32)> = images.iter().map(DecodedImage::css_size).collect();

    let params = LayoutParams {
        page_width: stylesheet::PAGE_WIDTH_PX,
        padding: stylesheet::PAGE_PADDING_PX,
    };
    let list = layout::layout(&capture, &params, &fonts, &sizes);
    debug!(
        "Layout: {} display items, {:.1} css px tall",
        list.items.len(),
        list.height
    );

    let raster = paint(&list, &images, &fonts, config)?;
    info!("Rasterised {}x{} px", raster.width(), raster.height());
    progress.report(PROGRESS_RASTER_DONE);

    drop(attached);
    Ok(raster)
}

// ── Painting ─────────────────────────────────────────────────────────────

fn paint(
    list: &DisplayList,
    images: &[DecodedImage],
    fonts: &FontSet,
    config: &ConversionConfig,
) -> Result<RasterImage, Docx2PdfError> {
    let width = config.raster_width();
    let height = (list.height * config.scale).ceil().max(1.0) as u32;
    if height > config.max_raster_height {
        return Err(Docx2PdfError::RasterTooLarge {
            height,
            limit: config.max_raster_height,
        });
    }
    if width == 0 {
        return Err(Docx2PdfError::RasterisationFailed {
            detail: "raster width is zero".into(),
        });
    }

    let [r, g, b] = stylesheet::PAGE_BACKGROUND;
    let mut painter = Painter {
        canvas: RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])),
        scale: config.scale,
        fonts,
        images,
    };
    for item in &list.items {
        painter.item(item);
    }
    Ok(RasterImage::from_rgba(painter.canvas))
}

fn rgba([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

struct Painter<'a> {
    canvas: RgbaImage,
    scale: f32,
    fonts: &'a FontSet,
    images: &'a [DecodedImage],
}

impl Painter<'_> {
    fn px(&self, css: f32) -> i32 {
        (css * self.scale).round() as i32
    }

    /// Device-pixel rectangle covering `bounds`; at least one pixel each way.
    fn device_rect(&self, bounds: Bounds) -> Rect {
        let x0 = self.px(bounds.x);
        let y0 = self.px(bounds.y);
        let x1 = self.px(bounds.x + bounds.w).max(x0 + 1);
        let y1 = self.px(bounds.y + bounds.h).max(y0 + 1);
        Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32)
    }

    fn fill(&mut self, bounds: Bounds, color: [u8; 3]) {
        let rect = self.device_rect(bounds);
        draw_filled_rect_mut(&mut self.canvas, rect, rgba(color));
    }

    /// Border centred on each edge so neighbouring cells share one line.
    fn stroke(&mut self, bounds: Bounds, width: f32, color: [u8; 3]) {
        let t = ((width * self.scale).round() as i32).max(1);
        let half = t / 2;
        let x0 = self.px(bounds.x) - half;
        let y0 = self.px(bounds.y) - half;
        let x1 = self.px(bounds.x + bounds.w) - half;
        let y1 = self.px(bounds.y + bounds.h) - half;
        let w = (x1 - x0 + t).max(1) as u32;
        let h = (y1 - y0 + t).max(1) as u32;
        let c = rgba(color);
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x0, y0).of_size(w, t as u32), c);
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x0, y1).of_size(w, t as u32), c);
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x0, y0).of_size(t as u32, h), c);
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x1, y0).of_size(t as u32, h), c);
    }

    fn text(&mut self, x: f32, baseline: f32, text: &str, size: f32, face: FaceStyle, color: [u8; 3]) {
        let loaded = self.fonts.face(face);
        let scale = loaded.px_scale(size * self.scale);
        let ascent = loaded.font.as_scaled(scale).ascent();
        let left = self.px(x);
        let top = (baseline * self.scale - ascent).round() as i32;
        let font: &FontVec = &loaded.font;
        draw_text_mut(&mut self.canvas, rgba(color), left, top, scale, font, text);
        if loaded.synthetic_bold {
            let offset = ((size * self.scale) / 24.0).round().max(1.0) as i32;
            draw_text_mut(&mut self.canvas, rgba(color), left + offset, top, scale, font, text);
        }
    }

    fn image(&mut self, id: usize, bounds: Bounds) {
        match self.images.get(id) {
            Some(DecodedImage::Pixels(pixels)) => {
                let rect = self.device_rect(bounds);
                let resized = imageops::resize(
                    pixels,
                    rect.width(),
                    rect.height(),
                    imageops::FilterType::Triangle,
                );
                imageops::overlay(
                    &mut self.canvas,
                    &resized,
                    i64::from(rect.left()),
                    i64::from(rect.top()),
                );
            }
            Some(DecodedImage::Placeholder) | None => {
                self.fill(bounds, stylesheet::PLACEHOLDER_FILL);
                self.stroke(bounds, 1.0, stylesheet::PLACEHOLDER_BORDER);
            }
        }
    }

    fn item(&mut self, item: &DisplayItem) {
        match item {
            DisplayItem::Text {
                x,
                baseline,
                text,
                size,
                face,
                shadow,
            } => {
                if let Some(s) = shadow {
                    self.text(x + s.dx, baseline + s.dy, text, *size, *face, s.color);
                }
                self.text(*x, *baseline, text, *size, *face, stylesheet::TEXT_COLOR);
            }
            DisplayItem::Fill { bounds, color } => self.fill(*bounds, *color),
            DisplayItem::Stroke {
                bounds,
                width,
                color,
            } => self.stroke(*bounds, *width, *color),
            DisplayItem::Image { id, bounds } => self.image(*id, *bounds),
            DisplayItem::Bullet {
                cx,
                cy,
                radius,
                shape,
            } => {
                let center = (self.px(*cx), self.px(*cy));
                let r = self.px(*radius).max(1);
                let color = rgba(stylesheet::TEXT_COLOR);
                match shape {
                    MarkerShape::Disc => draw_filled_circle_mut(&mut self.canvas, center, r, color),
                    MarkerShape::Circle => draw_hollow_circle_mut(&mut self.canvas, center, r, color),
                    MarkerShape::Square => draw_filled_rect_mut(
                        &mut self.canvas,
                        Rect::at(center.0 - r, center.1 - r).of_size(2 * r as u32, 2 * r as u32),
                        color,
                    ),
                }
            }
            DisplayItem::BoxShadow { bounds, shadow } => {
                let shifted = Bounds {
                    x: bounds.x + shadow.dx,
                    y: bounds.y + shadow.dy,
                    ..*bounds
                };
                self.fill(shifted, shadow.color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn system_fonts() -> Option<FontSet> {
        match FontSet::discover(&[]) {
            Ok(f) => Some(f),
            Err(_) => {
                eprintln!("SKIP: no system font installed");
                None
            }
        }
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn rgb_rows_clamp_to_image() {
        let mut px = RgbaImage::from_pixel(2, 3, Rgba([1, 2, 3, 255]));
        px.put_pixel(0, 2, Rgba([9, 9, 9, 255]));
        let raster = RasterImage::from_rgba(px);
        assert_eq!(raster.rgb_bytes().len(), 2 * 3 * 3);
        assert_eq!(raster.rgb_rows(2, 10), vec![9, 9, 9, 1, 2, 3]);
        assert!(raster.rgb_rows(5, 1).is_empty());
    }

    #[test]
    fn undecodable_images_become_placeholders_when_tainting_allowed() {
        let surface = RenderSurface::from_html(
            "<p><img src=\"data:image/png;base64,AAAA\" /><img src=\"http://x/y.png\" /></p>",
        );
        let decoded = decode_images(&surface, true).unwrap();
        assert!(decoded
            .iter()
            .all(|d| matches!(d, DecodedImage::Placeholder)));

        let err = decode_images(&surface, false).unwrap_err();
        assert!(matches!(err, Docx2PdfError::ImageDecode { .. }));
    }

    #[test]
    fn valid_images_decode_to_pixels() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let html = format!(
            "<p><img src=\"data:image/png;base64,{}\" /></p>",
            STANDARD.encode(png_bytes(4, 2))
        );
        let surface = RenderSurface::from_html(&html);
        let decoded = decode_images(&surface, false).unwrap();
        assert_eq!(decoded[0].css_size(), (4.0, 2.0));
    }

    #[test]
    fn failed_render_leaves_host_clean() {
        let host = RenderHost::new();
        let config = ConversionConfig::builder()
            .allow_taint(false)
            .build()
            .unwrap();
        let seen: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: crate::progress::ProgressCallback =
            Arc::new(move |p: f32| sink.lock().unwrap().push(p));
        let mut progress = ProgressReporter::new(Some(&cb));

        // Fails either on font discovery or on the broken image.
        let result = render_blocking(
            "<p>x<img src=\"data:image/png;base64,AAAA\" /></p>",
            &config,
            &host,
            &mut progress,
        );
        assert!(result.is_err());
        assert_eq!(host.attached_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![PROGRESS_RENDER_START]);
    }

    #[test]
    fn paints_text_and_reports_checkpoints() {
        let Some(_) = system_fonts() else { return };
        let host = RenderHost::new();
        let config = ConversionConfig::default();
        let mut progress = ProgressReporter::silent();
        let raster =
            render_blocking("<h1>Heading</h1><p>Body text</p>", &config, &host, &mut progress)
                .unwrap();
        assert_eq!(raster.width(), 1632);
        assert!(raster.height() > 2 * 192);
        assert_eq!(progress.last(), PROGRESS_RASTER_DONE);
        assert_eq!(host.attached_count(), 0);
        let dark = raster.pixels().pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 0, "expected some painted text");
    }

    #[test]
    fn raster_height_cap_is_enforced() {
        let Some(fonts) = system_fonts() else { return };
        let config = ConversionConfig::builder()
            .max_raster_height(100)
            .build()
            .unwrap();
        let list = DisplayList {
            items: Vec::new(),
            width: 816.0,
            height: 400.0,
        };
        let err = paint(&list, &[], &fonts, &config).unwrap_err();
        assert!(matches!(
            err,
            Docx2PdfError::RasterTooLarge {
                height: 800,
                limit: 100
            }
        ));
    }

    #[test]
    fn paints_fills_strokes_and_placeholders() {
        let Some(fonts) = system_fonts() else { return };
        let list = DisplayList {
            items: vec![
                DisplayItem::Fill {
                    bounds: Bounds { x: 10.0, y: 10.0, w: 20.0, h: 20.0 },
                    color: [0, 0, 255],
                },
                DisplayItem::Stroke {
                    bounds: Bounds { x: 100.0, y: 10.0, w: 50.0, h: 50.0 },
                    width: 1.0,
                    color: [0, 0, 0],
                },
                DisplayItem::Image {
                    id: 0,
                    bounds: Bounds { x: 200.0, y: 10.0, w: 40.0, h: 40.0 },
                },
            ],
            width: 816.0,
            height: 100.0,
        };
        let raster = paint(
            &list,
            &[DecodedImage::Placeholder],
            &fonts,
            &ConversionConfig::default(),
        )
        .unwrap();
        assert_eq!(raster.height(), 200);
        let px = |x, y| raster.pixels().get_pixel(x, y).0;
        assert_eq!(px(40, 40), [0, 0, 255, 255]);
        assert_eq!(px(200, 60), [0, 0, 0, 255]);
        assert_eq!(px(250, 60), [255, 255, 255, 255]);
        let [r, g, b] = stylesheet::PLACEHOLDER_FILL;
        assert_eq!(px(440, 60), [r, g, b, 255]);
    }
}
