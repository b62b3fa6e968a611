//! Render surface: the parsed, styled tree that gets rasterised.
//!
//! An HTML fragment is parsed with `scraper` and reduced to the handful of
//! block and inline shapes the painter understands. Inline `style`
//! declarations are read only for the properties that affect rendering here
//! (`box-shadow`, `text-shadow`, `width`, `max-width`); every other source
//! style is overridden by [`crate::stylesheet`].
//!
//! A surface is only rendered while attached to a [`RenderHost`]. Attachment
//! returns an [`AttachedSurface`] guard that detaches on drop, so the host is
//! left clean on success, on error and while unwinding.

use crate::stylesheet::HeadingVariant;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ── Style values ─────────────────────────────────────────────────────────

/// A single `box-shadow` / `text-shadow` layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub dx: f32,
    pub dy: f32,
    pub blur: f32,
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f32),
    Percent(f32),
}

impl Length {
    /// Resolve against the containing block width.
    pub fn resolve(self, container: f32) -> f32 {
        match self {
            Length::Px(px) => px,
            Length::Percent(p) => container * p / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    #[default]
    Normal,
    Super,
    Sub,
}

/// Inherited text properties.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub script: Script,
    pub shadow: Option<Shadow>,
}

// ── Tree ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String, TextStyle),
    Break,
    /// Index into [`RenderSurface::images`].
    Image(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Bytes carried inline in a `data:` URI.
    Embedded { mime: String, data: Vec<u8> },
    /// Anything else; never fetched.
    Remote(String),
    /// A `data:` URI that could not be decoded.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBox {
    pub source: ImageSource,
    pub alt: Option<String>,
    pub width: Option<Length>,
    pub max_width: Option<Length>,
    pub box_shadow: Option<Shadow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub header: bool,
    pub colspan: u32,
    /// Cells carrying the `border` class get borders and padding.
    pub bordered: bool,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// `w-full`: stretch to the containing width.
    pub full_width: bool,
    pub rows: Vec<Vec<TableCell>>,
}

impl Table {
    /// Number of grid columns, counting spans.
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().map(|c| c.colspan.max(1) as usize).sum::<usize>())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Heading {
        level: u8,
        variant: HeadingVariant,
        inlines: Vec<Inline>,
    },
    Paragraph(Vec<Inline>),
    /// Inline content sitting directly in a container (anonymous block).
    Text(Vec<Inline>),
    List {
        ordered: bool,
        items: Vec<Vec<Block>>,
    },
    Table(Table),
    Chart(Vec<Block>),
    Division(Vec<Block>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub box_shadow: Option<Shadow>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            box_shadow: None,
        }
    }
}

/// The styled container handed to the layout engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSurface {
    pub blocks: Vec<Block>,
    pub images: Vec<ImageBox>,
}

impl RenderSurface {
    /// Parse an HTML fragment.
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_fragment(html);
        let mut builder = Builder { images: Vec::new() };
        let blocks = builder.blocks(doc.root_element(), TextStyle::default());
        let surface = Self {
            blocks,
            images: builder.images,
        };
        debug!(
            "Surface built: {} top-level blocks, {} images",
            surface.blocks.len(),
            surface.images.len()
        );
        surface
    }

    /// Remove every box and text shadow in place.
    pub fn strip_shadows(&mut self) {
        for img in &mut self.images {
            img.box_shadow = None;
        }
        strip_blocks(&mut self.blocks);
    }

    /// A copy of this surface with all shadows removed.
    pub fn without_shadows(&self) -> Self {
        let mut clone = self.clone();
        clone.strip_shadows();
        clone
    }

    pub fn has_shadows(&self) -> bool {
        self.images.iter().any(|i| i.box_shadow.is_some()) || blocks_have_shadows(&self.blocks)
    }
}

fn strip_inlines(inlines: &mut [Inline]) {
    for inline in inlines {
        if let Inline::Text(_, style) = inline {
            style.shadow = None;
        }
    }
}

fn strip_blocks(blocks: &mut [Block]) {
    for block in blocks {
        block.box_shadow = None;
        match &mut block.kind {
            BlockKind::Heading { inlines, .. } => strip_inlines(inlines),
            BlockKind::Paragraph(inlines) | BlockKind::Text(inlines) => strip_inlines(inlines),
            BlockKind::List { items, .. } => items.iter_mut().for_each(|i| strip_blocks(i)),
            BlockKind::Table(t) => t
                .rows
                .iter_mut()
                .flatten()
                .for_each(|c| strip_blocks(&mut c.blocks)),
            BlockKind::Chart(b) | BlockKind::Division(b) => strip_blocks(b),
        }
    }
}

fn inlines_have_shadows(inlines: &[Inline]) -> bool {
    inlines
        .iter()
        .any(|i| matches!(i, Inline::Text(_, s) if s.shadow.is_some()))
}

fn blocks_have_shadows(blocks: &[Block]) -> bool {
    blocks.iter().any(|b| {
        b.box_shadow.is_some()
            || match &b.kind {
                BlockKind::Heading { inlines, .. } => inlines_have_shadows(inlines),
                BlockKind::Paragraph(i) | BlockKind::Text(i) => inlines_have_shadows(i),
                BlockKind::List { items, .. } => items.iter().any(|i| blocks_have_shadows(i)),
                BlockKind::Table(t) => t.rows.iter().flatten().any(|c| blocks_have_shadows(&c.blocks)),
                BlockKind::Chart(b) | BlockKind::Division(b) => blocks_have_shadows(b),
            }
    })
}

// ── HTML → tree ──────────────────────────────────────────────────────────

const BLOCK_ELEMENTS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "ul", "ol", "li", "table", "div", "blockquote",
    "section", "article", "header", "footer", "figure", "pre",
];

const IGNORED_ELEMENTS: &[&str] = &["style", "script", "head", "title"];

struct Builder {
    images: Vec<ImageBox>,
}

impl Builder {
    /// Children of a container; runs of inline content become anonymous
    /// `Text` blocks.
    fn blocks(&mut self, parent: ElementRef, style: TextStyle) -> Vec<Block> {
        let mut out = Vec::new();
        let mut pending = Vec::new();
        for child in parent.children() {
            if let Some(text) = child.value().as_text() {
                pending.push(Inline::Text(text.to_string(), style));
                continue;
            }
            let Some(el) = ElementRef::wrap(child) else {
                continue;
            };
            let name = el.value().name();
            if IGNORED_ELEMENTS.contains(&name) {
                continue;
            }
            if BLOCK_ELEMENTS.contains(&name) {
                flush_anonymous(&mut pending, &mut out);
                out.push(self.block(el, style));
            } else {
                self.inline(el, style, &mut pending);
            }
        }
        flush_anonymous(&mut pending, &mut out);
        out
    }

    fn block(&mut self, el: ElementRef, inherited: TextStyle) -> Block {
        let decls = Declarations::of(el);
        let mut style = inherited;
        if let Some(shadow) = decls.text_shadow {
            style.shadow = shadow;
        }
        let name = el.value().name();

        let kind = match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse().unwrap_or(1);
                let variant = if has_class(el, "title") {
                    HeadingVariant::Title
                } else if has_class(el, "subtitle") {
                    HeadingVariant::Subtitle
                } else {
                    HeadingVariant::Plain
                };
                BlockKind::Heading {
                    level,
                    variant,
                    inlines: self.inline_children(el, style),
                }
            }
            "p" => BlockKind::Paragraph(self.inline_children(el, style)),
            "ul" | "ol" => {
                let items = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .map(|child| self.blocks(child, style))
                    .collect();
                BlockKind::List {
                    ordered: name == "ol",
                    items,
                }
            }
            "table" => BlockKind::Table(self.table(el, style)),
            "div" if has_class(el, "chart-container") => BlockKind::Chart(self.blocks(el, style)),
            _ => BlockKind::Division(self.blocks(el, style)),
        };

        Block {
            kind,
            box_shadow: decls.box_shadow.flatten(),
        }
    }

    fn table(&mut self, el: ElementRef, style: TextStyle) -> Table {
        let mut rows = Vec::new();
        for child in el.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "tr" => rows.push(self.row(child, style)),
                "thead" | "tbody" | "tfoot" => {
                    for tr in child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|c| c.value().name() == "tr")
                    {
                        rows.push(self.row(tr, style));
                    }
                }
                _ => {}
            }
        }
        let width = Declarations::of(el).width;
        Table {
            full_width: has_class(el, "w-full") || width == Some(Length::Percent(100.0)),
            rows,
        }
    }

    fn row(&mut self, tr: ElementRef, style: TextStyle) -> Vec<TableCell> {
        tr.children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .map(|cell| {
                let header = cell.value().name() == "th";
                let cell_style = TextStyle {
                    bold: style.bold || header,
                    ..style
                };
                TableCell {
                    header,
                    colspan: cell
                        .value()
                        .attr("colspan")
                        .and_then(|v| v.trim().parse::<u32>().ok())
                        .filter(|&n| n > 0)
                        .unwrap_or(1),
                    bordered: has_class(cell, "border"),
                    blocks: self.blocks(cell, cell_style),
                }
            })
            .collect()
    }

    fn inline_children(&mut self, el: ElementRef, style: TextStyle) -> Vec<Inline> {
        let mut out = Vec::new();
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                out.push(Inline::Text(text.to_string(), style));
            } else if let Some(child_el) = ElementRef::wrap(child) {
                self.inline(child_el, style, &mut out);
            }
        }
        out
    }

    fn inline(&mut self, el: ElementRef, inherited: TextStyle, out: &mut Vec<Inline>) {
        let mut style = inherited;
        match el.value().name() {
            "br" => {
                out.push(Inline::Break);
                return;
            }
            "img" => {
                let id = self.image(el);
                out.push(Inline::Image(id));
                return;
            }
            n if IGNORED_ELEMENTS.contains(&n) => return,
            "strong" | "b" => style.bold = true,
            "em" | "i" => style.italic = true,
            "u" | "ins" | "a" => style.underline = true,
            "s" | "strike" | "del" => style.strike = true,
            "sup" => style.script = Script::Super,
            "sub" => style.script = Script::Sub,
            _ => {}
        }
        if let Some(shadow) = Declarations::of(el).text_shadow {
            style.shadow = shadow;
        }
        out.extend(self.inline_children(el, style));
    }

    fn image(&mut self, el: ElementRef) -> usize {
        let decls = Declarations::of(el);
        let attr_width = el
            .value()
            .attr("width")
            .and_then(|w| w.trim().trim_end_matches("px").parse::<f32>().ok())
            .map(Length::Px);
        self.images.push(ImageBox {
            source: parse_image_source(el.value().attr("src").unwrap_or("")),
            alt: el.value().attr("alt").map(str::to_string),
            width: decls.width.or(attr_width),
            max_width: decls.max_width,
            box_shadow: decls.box_shadow.flatten(),
        });
        self.images.len() - 1
    }
}

fn flush_anonymous(pending: &mut Vec<Inline>, out: &mut Vec<Block>) {
    if pending.is_empty() {
        return;
    }
    let inlines = std::mem::take(pending);
    let blank = inlines
        .iter()
        .all(|i| matches!(i, Inline::Text(t, _) if t.trim().is_empty()));
    if !blank {
        out.push(Block::new(BlockKind::Text(inlines)));
    }
}

fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn parse_image_source(src: &str) -> ImageSource {
    let Some(rest) = src.trim().strip_prefix("data:") else {
        return if src.trim().is_empty() {
            ImageSource::Invalid("empty src".into())
        } else {
            ImageSource::Remote(src.to_string())
        };
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        return ImageSource::Invalid("data URI without payload".into());
    };
    let mime = meta.split(';').next().unwrap_or("").to_string();
    if meta.ends_with(";base64") {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        match STANDARD.decode(cleaned.as_bytes()) {
            Ok(data) => ImageSource::Embedded { mime, data },
            Err(e) => ImageSource::Invalid(format!("bad base64 payload: {e}")),
        }
    } else {
        ImageSource::Embedded {
            mime,
            data: payload.as_bytes().to_vec(),
        }
    }
}

// ── Inline style declarations ────────────────────────────────────────────

static COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rgba?\([^)]*\)|#[0-9a-f]{3,8}\b|\b(black|white|gray|grey|silver|red|green|blue)\b")
        .unwrap()
});

/// The subset of an element's `style` attribute this renderer reads.
///
/// Shadow fields are `Some(None)` for an explicit `none`.
#[derive(Debug, Default, PartialEq)]
struct Declarations {
    box_shadow: Option<Option<Shadow>>,
    text_shadow: Option<Option<Shadow>>,
    width: Option<Length>,
    max_width: Option<Length>,
}

impl Declarations {
    fn of(el: ElementRef) -> Self {
        el.value().attr("style").map(Self::parse).unwrap_or_default()
    }

    fn parse(style: &str) -> Self {
        let mut decls = Self::default();
        for decl in style.split(';') {
            let Some((prop, value)) = decl.split_once(':') else {
                continue;
            };
            let value = value.replace("!important", "");
            let value = value.trim();
            match prop.trim().to_ascii_lowercase().as_str() {
                "box-shadow" => decls.box_shadow = Some(parse_shadow(value)),
                "text-shadow" => decls.text_shadow = Some(parse_shadow(value)),
                "width" => decls.width = parse_length(value),
                "max-width" => decls.max_width = parse_length(value),
                _ => {}
            }
        }
        decls
    }
}

fn parse_length(value: &str) -> Option<Length> {
    let v = value.trim();
    if let Some(p) = v.strip_suffix('%') {
        return p.trim().parse().ok().map(Length::Percent);
    }
    if let Some(px) = v.strip_suffix("px") {
        return px.trim().parse().ok().map(Length::Px);
    }
    if let Some(pt) = v.strip_suffix("pt") {
        return pt
            .trim()
            .parse::<f32>()
            .ok()
            .map(|n| Length::Px(crate::stylesheet::pt(n)));
    }
    if v == "0" {
        return Some(Length::Px(0.0));
    }
    None
}

/// First layer of a shadow list. `none` and unparseable values yield `None`.
fn parse_shadow(value: &str) -> Option<Shadow> {
    if value.eq_ignore_ascii_case("none") {
        return None;
    }
    let mut depth = 0usize;
    let first = value
        .split(|c| {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            c == ',' && depth == 0
        })
        .next()
        .unwrap_or("");

    let color = COLOR_RE
        .find(first)
        .and_then(|m| parse_color(m.as_str()))
        .unwrap_or([0, 0, 0]);
    let without_color = COLOR_RE.replace_all(first, " ");
    let lengths: Vec<f32> = without_color
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("inset"))
        .filter_map(|t| match parse_length(t) {
            Some(Length::Px(px)) => Some(px),
            _ => None,
        })
        .collect();
    if lengths.len() < 2 {
        return None;
    }
    Some(Shadow {
        dx: lengths[0],
        dy: lengths[1],
        blur: lengths.get(2).copied().unwrap_or(0.0),
        color,
    })
}

fn parse_color(s: &str) -> Option<[u8; 3]> {
    let s = s.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok();
        return match hex.len() {
            3 | 4 => Some([digit(0)? * 17, digit(1)? * 17, digit(2)? * 17]),
            6 | 8 => Some([
                u8::from_str_radix(&hex[0..2], 16).ok()?,
                u8::from_str_radix(&hex[2..4], 16).ok()?,
                u8::from_str_radix(&hex[4..6], 16).ok()?,
            ]),
            _ => None,
        };
    }
    if let Some(args) = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))
        .and_then(|a| a.strip_suffix(')'))
    {
        let parts: Vec<u8> = args
            .split([',', ' ', '/'])
            .filter(|p| !p.is_empty())
            .take(3)
            .filter_map(|p| p.trim().parse::<f32>().ok())
            .map(|n| n.clamp(0.0, 255.0) as u8)
            .collect();
        return (parts.len() == 3).then(|| [parts[0], parts[1], parts[2]]);
    }
    match s.as_str() {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "gray" | "grey" => Some([128, 128, 128]),
        "silver" => Some([192, 192, 192]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        _ => None,
    }
}

// ── Host attachment ──────────────────────────────────────────────────────

/// Registry of surfaces currently attached for rendering.
#[derive(Debug, Default)]
pub struct RenderHost {
    attached: Mutex<Vec<u64>>,
    next_id: AtomicU64,
}

impl RenderHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `surface`; it stays attached until the guard is dropped.
    pub fn attach(self: &Arc<Self>, surface: RenderSurface) -> AttachedSurface {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry().push(id);
        debug!("Surface {} attached", id);
        AttachedSurface {
            host: Arc::clone(self),
            id,
            surface,
        }
    }

    /// Surfaces attached right now.
    pub fn attached_count(&self) -> usize {
        self.registry().len()
    }

    fn detach(&self, id: u64) {
        self.registry().retain(|&a| a != id);
        debug!("Surface {} detached", id);
    }

    // A poisoned lock still holds a valid list of ids.
    fn registry(&self) -> std::sync::MutexGuard<'_, Vec<u64>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A surface attached to a [`RenderHost`]. Detaches on drop.
#[derive(Debug)]
pub struct AttachedSurface {
    host: Arc<RenderHost>,
    id: u64,
    surface: RenderSurface,
}

impl AttachedSurface {
    /// The copy that gets captured. The attached surface itself is never
    /// modified.
    pub fn capture_clone(&self, strip_shadows: bool) -> RenderSurface {
        if strip_shadows {
            self.surface.without_shadows()
        } else {
            self.surface.clone()
        }
    }
}

impl Deref for AttachedSurface {
    type Target = RenderSurface;

    fn deref(&self) -> &RenderSurface {
        &self.surface
    }
}

impl Drop for AttachedSurface {
    fn drop(&mut self) {
        self.host.detach(self.id);
    }
}
