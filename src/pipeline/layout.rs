//! Block and inline layout: [`RenderSurface`] → [`DisplayList`].
//!
//! Coordinates are CSS pixels with the origin at the top-left corner of the
//! virtual page. The painter multiplies by the device scale.
//!
//! The model is a small subset of CSS 2 flow layout:
//! - blocks stack vertically; adjacent sibling margins collapse
//! - inline content breaks greedily at spaces and `<br>`
//! - lines are sized by the block strut plus the tallest inline box
//! - tables use the automatic algorithm (min/max content widths)
//! - table cell content is vertically centred

use crate::pipeline::surface::{
    Block, BlockKind, ImageBox, Inline, RenderSurface, Script, Shadow, Table, TextStyle,
};
use crate::stylesheet::{self, BlockStyle};
use std::ops::Range;

/// Regular / bold / italic selection for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FaceStyle {
    pub bold: bool,
    pub italic: bool,
}

/// Font metrics needed by the layout engine.
pub trait TextMeasure {
    /// Advance width of `text` at `size` CSS px.
    fn text_width(&self, text: &str, size: f32, face: FaceStyle) -> f32;

    /// Ascent and descent as positive fractions of the font size.
    fn vertical_metrics(&self, face: FaceStyle) -> (f32, f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShape {
    Disc,
    Circle,
    Square,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    Text {
        x: f32,
        baseline: f32,
        text: String,
        size: f32,
        face: FaceStyle,
        shadow: Option<Shadow>,
    },
    Fill {
        bounds: Bounds,
        color: [u8; 3],
    },
    Stroke {
        bounds: Bounds,
        width: f32,
        color: [u8; 3],
    },
    /// Index into [`RenderSurface::images`].
    Image {
        id: usize,
        bounds: Bounds,
    },
    Bullet {
        cx: f32,
        cy: f32,
        radius: f32,
        shape: MarkerShape,
    },
    BoxShadow {
        bounds: Bounds,
        shadow: Shadow,
    },
}

impl DisplayItem {
    fn shift(&mut self, dy: f32) {
        match self {
            DisplayItem::Text { baseline, .. } => *baseline += dy,
            DisplayItem::Fill { bounds, .. }
            | DisplayItem::Stroke { bounds, .. }
            | DisplayItem::Image { bounds, .. }
            | DisplayItem::BoxShadow { bounds, .. } => bounds.y += dy,
            DisplayItem::Bullet { cy, .. } => *cy += dy,
        }
    }
}

/// Laid-out page content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub items: Vec<DisplayItem>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Width of the virtual page, CSS px.
    pub page_width: f32,
    /// Padding on every side, CSS px.
    pub padding: f32,
}

/// Lay out `surface`. `image_sizes[i]` is the intrinsic size of
/// `surface.images[i]` in CSS px; missing entries use the placeholder size.
pub fn layout<M: TextMeasure + ?Sized>(
    surface: &RenderSurface,
    params: &LayoutParams,
    measure: &M,
    image_sizes: &[(f32, f32)],
) -> DisplayList {
    let mut engine = Engine {
        measure,
        images: &surface.images,
        image_sizes,
        items: Vec::new(),
        pending_marker: None,
    };
    let content_width = (params.page_width - 2.0 * params.padding).max(0.0);
    let content_height = engine.blocks(
        &surface.blocks,
        params.padding,
        params.padding,
        content_width,
        Ctx::default(),
    );
    DisplayList {
        items: engine.items,
        width: params.page_width,
        height: content_height + 2.0 * params.padding,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    list_depth: usize,
    in_chart: bool,
    /// Inside a header cell.
    bold: bool,
}

#[derive(Debug, Clone)]
enum MarkerKind {
    Bullet(MarkerShape),
    Ordinal(String),
}

#[derive(Debug, Clone)]
struct PendingMarker {
    kind: MarkerKind,
    content_x: f32,
}

#[derive(Debug, Clone)]
enum Atom {
    Text {
        text: String,
        style: TextStyle,
        size: f32,
        face: FaceStyle,
        width: f32,
    },
    Image {
        id: usize,
        w: f32,
        h: f32,
    },
}

impl Atom {
    fn width(&self) -> f32 {
        match self {
            Atom::Text { width, .. } => *width,
            Atom::Image { w, .. } => *w,
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    /// Unbreakable run of atoms.
    Word(Vec<Atom>),
    Space {
        width: f32,
        style: TextStyle,
        size: f32,
    },
    Break,
}

#[derive(Debug, Clone)]
enum Placed {
    Atom(f32, Atom),
    /// Inter-word space; only its decorations are drawn.
    Space {
        x: f32,
        width: f32,
        style: TextStyle,
        size: f32,
    },
}

struct Engine<'a, M: ?Sized> {
    measure: &'a M,
    images: &'a [ImageBox],
    image_sizes: &'a [(f32, f32)],
    items: Vec<DisplayItem>,
    pending_marker: Option<PendingMarker>,
}

fn block_margins(block: &Block, ctx: Ctx) -> (f32, f32) {
    match &block.kind {
        BlockKind::Heading { level, variant, .. } => {
            let s = stylesheet::heading(*level, *variant);
            (s.margin_top, s.margin_bottom)
        }
        BlockKind::Paragraph(_) => (
            stylesheet::PARAGRAPH.margin_top,
            stylesheet::PARAGRAPH.margin_bottom,
        ),
        BlockKind::List { .. } if ctx.list_depth == 0 => {
            (stylesheet::LIST_MARGIN_PX, stylesheet::LIST_MARGIN_PX)
        }
        _ => (0.0, 0.0),
    }
}

impl<M: TextMeasure + ?Sized> Engine<'_, M> {
    /// Stack `blocks` from `y`; returns the height used including the outer
    /// margins of the first and last block.
    fn blocks(&mut self, blocks: &[Block], x: f32, y: f32, width: f32, ctx: Ctx) -> f32 {
        let mut cursor = y;
        let mut prev_bottom: Option<f32> = None;
        for block in blocks {
            let (top, bottom) = block_margins(block, ctx);
            cursor += match prev_bottom {
                Some(prev) => prev.max(top),
                None => top,
            };
            let start = self.items.len();
            let h = self.block(block, x, cursor, width, ctx);
            if let Some(shadow) = block.box_shadow {
                self.items.insert(
                    start,
                    DisplayItem::BoxShadow {
                        bounds: Bounds {
                            x,
                            y: cursor,
                            w: width,
                            h,
                        },
                        shadow,
                    },
                );
            }
            cursor += h;
            prev_bottom = Some(bottom);
        }
        cursor += prev_bottom.unwrap_or(0.0);
        cursor - y
    }

    /// Border-box height of one block, margins excluded.
    fn block(&mut self, block: &Block, x: f32, y: f32, width: f32, ctx: Ctx) -> f32 {
        match &block.kind {
            BlockKind::Heading {
                level,
                variant,
                inlines,
            } => {
                let style = stylesheet::heading(*level, *variant);
                self.inline_block(inlines, x, y, width, style, ctx)
            }
            BlockKind::Paragraph(inlines) => {
                self.inline_block(inlines, x, y, width, stylesheet::PARAGRAPH, ctx)
            }
            BlockKind::Text(inlines) => {
                self.inline_block(inlines, x, y, width, stylesheet::BODY, ctx)
            }
            BlockKind::List { ordered, items } => self.list(*ordered, items, x, y, width, ctx),
            BlockKind::Table(table) => self.table(table, x, y, width, ctx),
            BlockKind::Chart(children) => {
                let chart_ctx = Ctx {
                    in_chart: true,
                    ..ctx
                };
                self.blocks(children, x, y, width, chart_ctx)
            }
            BlockKind::Division(children) => self.blocks(children, x, y, width, ctx),
        }
    }

    fn list(
        &mut self,
        ordered: bool,
        items: &[Vec<Block>],
        x: f32,
        y: f32,
        width: f32,
        ctx: Ctx,
    ) -> f32 {
        let content_x = x + stylesheet::LIST_INDENT_PX;
        let content_w = (width - stylesheet::LIST_INDENT_PX).max(0.0);
        let inner = Ctx {
            list_depth: ctx.list_depth + 1,
            ..ctx
        };
        let mut cursor = y;
        for (i, item) in items.iter().enumerate() {
            let kind = if ordered {
                MarkerKind::Ordinal(format!("{}.", i + 1))
            } else {
                MarkerKind::Bullet(match ctx.list_depth {
                    0 => MarkerShape::Disc,
                    1 => MarkerShape::Circle,
                    _ => MarkerShape::Square,
                })
            };
            self.pending_marker = Some(PendingMarker { kind, content_x });
            let h = self.blocks(item, content_x, cursor, content_w, inner);
            if let Some(marker) = self.pending_marker.take() {
                // Item without a line box: marker sits on an empty body line.
                let body = stylesheet::BODY;
                let (above, below) = self.strut(body, FaceStyle::default());
                self.emit_marker(marker, cursor + above, body.font_size, ctx.bold);
                cursor += (above + below).max(h);
            } else {
                cursor += h;
            }
        }
        cursor - y
    }

    fn emit_marker(&mut self, marker: PendingMarker, baseline: f32, size: f32, bold: bool) {
        match marker.kind {
            MarkerKind::Bullet(shape) => self.items.push(DisplayItem::Bullet {
                cx: marker.content_x - size * 0.9,
                cy: baseline - size * 0.3,
                radius: size * 0.17,
                shape,
            }),
            MarkerKind::Ordinal(label) => {
                let face = FaceStyle {
                    bold,
                    italic: false,
                };
                let label = format!("{label} ");
                let w = self.measure.text_width(&label, size, face);
                self.items.push(DisplayItem::Text {
                    x: marker.content_x - w,
                    baseline,
                    text: label,
                    size,
                    face,
                    shadow: None,
                });
            }
        }
    }

    // ── Inline formatting ────────────────────────────────────────────────

    /// Ascent and descent of the block strut, half-leading included.
    fn strut(&self, style: BlockStyle, face: FaceStyle) -> (f32, f32) {
        let (a, d) = self.measure.vertical_metrics(face);
        let s = style.font_size;
        let half = (s * style.line_height - (a + d) * s) / 2.0;
        (half + a * s, half + d * s)
    }

    fn image_extent(&self, id: usize, avail: f32, ctx: Ctx) -> (f32, f32) {
        let (nw, nh) = self
            .image_sizes
            .get(id)
            .copied()
            .unwrap_or(stylesheet::PLACEHOLDER_PX);
        let Some(img) = self.images.get(id) else {
            return (nw, nh);
        };
        let mut w = if ctx.in_chart {
            avail
        } else {
            img.width.map_or(nw, |l| l.resolve(avail))
        };
        if let Some(max) = img.max_width {
            w = w.min(max.resolve(avail));
        }
        let h = if nw > 0.0 { nh * w / nw } else { nh };
        (w.max(0.0), h.max(0.0))
    }

    fn tokens(&self, inlines: &[Inline], style: BlockStyle, avail: f32, ctx: Ctx) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut word: Vec<Atom> = Vec::new();
        let flush = |word: &mut Vec<Atom>, tokens: &mut Vec<Token>| {
            if !word.is_empty() {
                tokens.push(Token::Word(std::mem::take(word)));
            }
        };

        for inline in inlines {
            match inline {
                Inline::Break => {
                    flush(&mut word, &mut tokens);
                    tokens.push(Token::Break);
                }
                Inline::Image(id) => {
                    flush(&mut word, &mut tokens);
                    let (w, h) = self.image_extent(*id, avail, ctx);
                    tokens.push(Token::Word(vec![Atom::Image { id: *id, w, h }]));
                }
                Inline::Text(text, ts) => {
                    let face = FaceStyle {
                        bold: style.bold || ctx.bold || ts.bold,
                        italic: ts.italic,
                    };
                    let size = match ts.script {
                        Script::Normal => style.font_size,
                        _ => style.font_size * stylesheet::SCRIPT_SCALE,
                    };
                    for (is_space, chunk) in split_whitespace_runs(text) {
                        if is_space {
                            flush(&mut word, &mut tokens);
                            if !matches!(tokens.last(), Some(Token::Space { .. })) {
                                tokens.push(Token::Space {
                                    width: self.measure.text_width(" ", size, face),
                                    style: *ts,
                                    size,
                                });
                            }
                        } else {
                            word.push(Atom::Text {
                                text: chunk.to_string(),
                                style: *ts,
                                size,
                                face,
                                width: self.measure.text_width(chunk, size, face),
                            });
                        }
                    }
                }
            }
        }
        flush(&mut word, &mut tokens);
        tokens
    }

    fn inline_block(
        &mut self,
        inlines: &[Inline],
        x: f32,
        y: f32,
        width: f32,
        style: BlockStyle,
        ctx: Ctx,
    ) -> f32 {
        let tokens = self.tokens(inlines, style, width, ctx);

        let mut lines: Vec<Vec<Placed>> = Vec::new();
        let mut line: Vec<Placed> = Vec::new();
        let mut cursor = 0.0f32;
        let mut pending_space: Option<(f32, TextStyle, f32)> = None;
        let mut saw_content = false;

        for token in tokens {
            match token {
                Token::Word(atoms) => {
                    let w: f32 = atoms.iter().map(Atom::width).sum();
                    let mut space = if line.is_empty() { None } else { pending_space };
                    let space_w = space.map_or(0.0, |s| s.0);
                    if !line.is_empty() && cursor + space_w + w > width {
                        lines.push(std::mem::take(&mut line));
                        cursor = 0.0;
                        space = None;
                    }
                    if let Some((sw, st, size)) = space {
                        line.push(Placed::Space {
                            x: cursor,
                            width: sw,
                            style: st,
                            size,
                        });
                        cursor += sw;
                    }
                    for atom in atoms {
                        let aw = atom.width();
                        line.push(Placed::Atom(cursor, atom));
                        cursor += aw;
                    }
                    pending_space = None;
                    saw_content = true;
                }
                Token::Space { width, style, size } => {
                    if !line.is_empty() {
                        pending_space = Some((width, style, size));
                    }
                }
                Token::Break => {
                    lines.push(std::mem::take(&mut line));
                    cursor = 0.0;
                    pending_space = None;
                    saw_content = true;
                }
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
        if !saw_content {
            return 0.0;
        }

        let base_face = FaceStyle {
            bold: style.bold || ctx.bold,
            italic: false,
        };
        let (strut_above, strut_below) = self.strut(style, base_face);
        let mut top = y;
        for placed in lines {
            let mut above = strut_above;
            let mut below = strut_below;
            for p in &placed {
                let (ts, size, face) = match p {
                    Placed::Atom(_, Atom::Image { h, .. }) => {
                        above = above.max(*h);
                        continue;
                    }
                    Placed::Atom(_, Atom::Text { style, size, face, .. }) => (style, *size, *face),
                    Placed::Space { style, size, .. } => (style, *size, base_face),
                };
                let (a, d) = self.measure.vertical_metrics(face);
                let half = (size * style.line_height - (a + d) * size) / 2.0;
                let raise = script_raise(ts.script, style.font_size);
                above = above.max(half + a * size + raise);
                below = below.max(half + d * size - raise);
            }
            let baseline = top + above;
            if let Some(marker) = self.pending_marker.take() {
                self.emit_marker(marker, baseline, style.font_size, base_face.bold);
            }
            for p in placed {
                self.emit_placed(p, x, baseline, style.font_size);
            }
            top += above + below;
        }
        top - y
    }

    fn emit_placed(&mut self, placed: Placed, x: f32, baseline: f32, parent_size: f32) {
        match placed {
            Placed::Atom(px, Atom::Image { id, w, h }) => {
                let bounds = Bounds {
                    x: x + px,
                    y: baseline - h,
                    w,
                    h,
                };
                if let Some(shadow) = self.images.get(id).and_then(|i| i.box_shadow) {
                    self.items.push(DisplayItem::BoxShadow { bounds, shadow });
                }
                self.items.push(DisplayItem::Image { id, bounds });
            }
            Placed::Atom(
                px,
                Atom::Text {
                    text,
                    style,
                    size,
                    face,
                    width,
                },
            ) => {
                let b = baseline - script_raise(style.script, parent_size);
                self.decorations(x + px, width, b, size, style);
                self.items.push(DisplayItem::Text {
                    x: x + px,
                    baseline: b,
                    text,
                    size,
                    face,
                    shadow: style.shadow,
                });
            }
            Placed::Space {
                x: px,
                width,
                style,
                size,
            } => {
                let b = baseline - script_raise(style.script, parent_size);
                self.decorations(x + px, width, b, size, style);
            }
        }
    }

    fn decorations(&mut self, x: f32, w: f32, baseline: f32, size: f32, style: TextStyle) {
        let thickness = (size / 15.0).max(1.0);
        if style.underline {
            self.items.push(DisplayItem::Fill {
                bounds: Bounds {
                    x,
                    y: baseline + size * 0.1,
                    w,
                    h: thickness,
                },
                color: stylesheet::TEXT_COLOR,
            });
        }
        if style.strike {
            self.items.push(DisplayItem::Fill {
                bounds: Bounds {
                    x,
                    y: baseline - size * 0.3,
                    w,
                    h: thickness,
                },
                color: stylesheet::TEXT_COLOR,
            });
        }
    }

    // ── Tables ───────────────────────────────────────────────────────────

    fn table(&mut self, table: &Table, x: f32, y: f32, avail: f32, ctx: Ctx) -> f32 {
        let ncols = table.column_count();
        if ncols == 0 {
            return 0.0;
        }

        let mut col_min = vec![0.0f32; ncols];
        let mut col_max = vec![0.0f32; ncols];
        let mut spanning = Vec::new();
        for row in &table.rows {
            let mut col = 0usize;
            for cell in row {
                let span = (cell.colspan.max(1) as usize).min(ncols - col.min(ncols));
                if span == 0 {
                    break;
                }
                let cell_ctx = Ctx {
                    bold: ctx.bold || cell.header,
                    ..ctx
                };
                let (mn, mx) = self.blocks_extent(&cell.blocks, cell_ctx);
                let extra = cell_extra(cell.bordered);
                if span == 1 {
                    col_min[col] = col_min[col].max(mn + extra);
                    col_max[col] = col_max[col].max(mx + extra);
                } else {
                    spanning.push((col..col + span, mn + extra, mx + extra));
                }
                col += span;
            }
        }
        for (range, mn, mx) in spanning {
            spread(&mut col_min, range.clone(), mn);
            spread(&mut col_max, range, mx);
        }
        for (mx, mn) in col_max.iter_mut().zip(&col_min) {
            *mx = mx.max(*mn);
        }

        let sum_max: f32 = col_max.iter().sum();
        let table_w = if table.full_width {
            avail
        } else {
            sum_max.min(avail)
        };
        let widths = distribute(&col_min, &col_max, table_w);

        let mut cursor = y;
        for row in &table.rows {
            let mut col = 0usize;
            let mut cells: Vec<(Bounds, Range<usize>, f32, bool, bool)> = Vec::new();
            let mut row_h = 0.0f32;
            for cell in row {
                let span = (cell.colspan.max(1) as usize).min(ncols.saturating_sub(col));
                if span == 0 {
                    break;
                }
                let cx = x + widths[..col].iter().sum::<f32>();
                let cw: f32 = widths[col..col + span].iter().sum();
                let pad = if cell.bordered {
                    stylesheet::TABLE_CELL_PADDING_PX + stylesheet::TABLE_BORDER_PX / 2.0
                } else {
                    0.0
                };
                let cell_ctx = Ctx {
                    bold: ctx.bold || cell.header,
                    list_depth: 0,
                    ..ctx
                };
                let start = self.items.len();
                let content_h = self.blocks(
                    &cell.blocks,
                    cx + pad,
                    cursor + pad,
                    (cw - 2.0 * pad).max(0.0),
                    cell_ctx,
                );
                let end = self.items.len();
                row_h = row_h.max(content_h + 2.0 * pad);
                cells.push((
                    Bounds {
                        x: cx,
                        y: cursor,
                        w: cw,
                        h: 0.0,
                    },
                    start..end,
                    content_h + 2.0 * pad,
                    cell.header,
                    cell.bordered,
                ));
                col += span;
            }

            // Paint order: backgrounds under content, borders on top.
            let mut inserted = 0usize;
            for (mut bounds, range, used_h, header, bordered) in cells {
                bounds.h = row_h;
                let range = range.start + inserted..range.end + inserted;
                let dy = (row_h - used_h) / 2.0;
                if dy > 0.0 {
                    for item in &mut self.items[range.clone()] {
                        item.shift(dy);
                    }
                }
                if header {
                    self.items.insert(
                        range.start,
                        DisplayItem::Fill {
                            bounds,
                            color: stylesheet::TABLE_HEADER_BACKGROUND,
                        },
                    );
                    inserted += 1;
                }
                if bordered {
                    self.items.push(DisplayItem::Stroke {
                        bounds,
                        width: stylesheet::TABLE_BORDER_PX,
                        color: stylesheet::TABLE_BORDER_COLOR,
                    });
                }
            }
            cursor += row_h;
        }
        cursor - y
    }

    /// Min-content and max-content widths of block content.
    fn blocks_extent(&self, blocks: &[Block], ctx: Ctx) -> (f32, f32) {
        let mut min = 0.0f32;
        let mut max = 0.0f32;
        for block in blocks {
            let (mn, mx) = match &block.kind {
                BlockKind::Heading {
                    level,
                    variant,
                    inlines,
                } => self.inline_extent(inlines, stylesheet::heading(*level, *variant), ctx),
                BlockKind::Paragraph(i) => self.inline_extent(i, stylesheet::PARAGRAPH, ctx),
                BlockKind::Text(i) => self.inline_extent(i, stylesheet::BODY, ctx),
                BlockKind::List { items, .. } => {
                    let inner = Ctx {
                        list_depth: ctx.list_depth + 1,
                        ..ctx
                    };
                    let (mn, mx) = items
                        .iter()
                        .map(|i| self.blocks_extent(i, inner))
                        .fold((0.0f32, 0.0f32), |a, b| (a.0.max(b.0), a.1.max(b.1)));
                    (
                        mn + stylesheet::LIST_INDENT_PX,
                        mx + stylesheet::LIST_INDENT_PX,
                    )
                }
                BlockKind::Table(t) => t
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter().fold((0.0f32, 0.0f32), |acc, cell| {
                            let (mn, mx) = self.blocks_extent(&cell.blocks, ctx);
                            let extra = cell_extra(cell.bordered);
                            (acc.0 + mn + extra, acc.1 + mx + extra)
                        })
                    })
                    .fold((0.0f32, 0.0f32), |a, b| (a.0.max(b.0), a.1.max(b.1))),
                BlockKind::Chart(b) => {
                    let chart_ctx = Ctx {
                        in_chart: true,
                        ..ctx
                    };
                    self.blocks_extent(b, chart_ctx)
                }
                BlockKind::Division(b) => self.blocks_extent(b, ctx),
            };
            min = min.max(mn);
            max = max.max(mx);
        }
        (min, max)
    }

    fn inline_extent(&self, inlines: &[Inline], style: BlockStyle, ctx: Ctx) -> (f32, f32) {
        // Percentage widths resolve against nothing while measuring.
        let tokens = self.tokens(inlines, style, 0.0, ctx);
        let mut min = 0.0f32;
        let mut max = 0.0f32;
        let mut line = 0.0f32;
        let mut pending = 0.0f32;
        for token in &tokens {
            match token {
                Token::Word(atoms) => {
                    let w: f32 = atoms.iter().map(Atom::width).sum();
                    min = min.max(w);
                    if line > 0.0 {
                        line += pending;
                    }
                    line += w;
                    pending = 0.0;
                }
                Token::Space { width, .. } => pending = *width,
                Token::Break => {
                    max = max.max(line);
                    line = 0.0;
                    pending = 0.0;
                }
            }
        }
        (min, max.max(line))
    }
}

fn cell_extra(bordered: bool) -> f32 {
    if bordered {
        2.0 * stylesheet::TABLE_CELL_PADDING_PX + stylesheet::TABLE_BORDER_PX
    } else {
        0.0
    }
}

fn script_raise(script: Script, parent_size: f32) -> f32 {
    match script {
        Script::Normal => 0.0,
        Script::Super => parent_size * 0.33,
        Script::Sub => -parent_size * 0.2,
    }
}

/// Grow the columns in `range` evenly until they sum to at least `target`.
fn spread(cols: &mut [f32], range: Range<usize>, target: f32) {
    let current: f32 = cols[range.clone()].iter().sum();
    if current >= target || range.is_empty() {
        return;
    }
    let add = (target - current) / range.len() as f32;
    for c in &mut cols[range] {
        *c += add;
    }
}

/// Column widths summing to `total`, following the automatic table layout:
/// extra space goes proportionally to max-content widths, a shortfall is
/// taken from the slack between min- and max-content.
fn distribute(min: &[f32], max: &[f32], total: f32) -> Vec<f32> {
    let n = min.len();
    let sum_min: f32 = min.iter().sum();
    let sum_max: f32 = max.iter().sum();
    if n == 0 {
        return Vec::new();
    }
    if sum_max <= 0.0 {
        return vec![total / n as f32; n];
    }
    if sum_max <= total {
        let extra = total - sum_max;
        return max.iter().map(|m| m + extra * m / sum_max).collect();
    }
    if sum_min >= total {
        if sum_min <= 0.0 {
            return vec![total / n as f32; n];
        }
        return min.iter().map(|m| total * m / sum_min).collect();
    }
    let slack = sum_max - sum_min;
    let room = total - sum_min;
    min.iter()
        .zip(max)
        .map(|(mn, mx)| mn + room * (mx - mn) / slack)
        .collect()
}

/// Split text into alternating whitespace / non-whitespace runs.
fn split_whitespace_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    let mut current: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        match current {
            Some(prev) if prev == ws => {}
            Some(prev) => {
                runs.push((prev, &text[start..i]));
                start = i;
                current = Some(ws);
            }
            None => current = Some(ws),
        }
    }
    if let Some(prev) = current {
        runs.push((prev, &text[start..]));
    }
    runs
}

/// Monospace metrics for tests: every character advances half the font size.
#[cfg(test)]
pub(crate) struct FixedMetrics;

#[cfg(test)]
impl TextMeasure for FixedMetrics {
    fn text_width(&self, text: &str, size: f32, _face: FaceStyle) -> f32 {
        text.chars().count() as f32 * size * 0.5
    }

    fn vertical_metrics(&self, _face: FaceStyle) -> (f32, f32) {
        (0.8, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: LayoutParams = LayoutParams {
        page_width: 816.0,
        padding: 96.0,
    };

    fn run(html: &str, params: &LayoutParams, sizes: &[(f32, f32)]) -> DisplayList {
        let surface = RenderSurface::from_html(html);
        layout(&surface, params, &FixedMetrics, sizes)
    }

    fn texts(list: &DisplayList) -> Vec<(&str, f32, f32)> {
        list.items
            .iter()
            .filter_map(|i| match i {
                DisplayItem::Text {
                    text, x, baseline, ..
                } => Some((text.as_str(), *x, *baseline)),
                _ => None,
            })
            .collect()
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn single_paragraph_height() {
        let list = run("<p>hello</p>", &LETTER, &[]);
        // padding + margin + one 24px line + margin + padding
        assert!(approx(list.height, 96.0 + 16.0 + 24.0 + 16.0 + 96.0), "{}", list.height);
        let t = texts(&list);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].0, "hello");
        assert!(approx(t[0].1, 96.0));
        // baseline = top + half-leading + ascent
        assert!(approx(t[0].2, 96.0 + 16.0 + 4.0 + 12.8));
    }

    #[test]
    fn empty_surface_is_just_padding() {
        let list = run("", &LETTER, &[]);
        assert_eq!(list.height, 192.0);
        assert!(list.items.is_empty());
    }

    #[test]
    fn words_wrap_at_spaces() {
        let params = LayoutParams {
            page_width: 100.0,
            padding: 10.0,
        };
        // 8px per char: "aaaa bbbb" = 72px fits in 80, "cccc" wraps.
        let list = run("<p>aaaa bbbb cccc</p>", &params, &[]);
        let t = texts(&list);
        assert_eq!(t.len(), 3);
        assert!(approx(t[0].2, t[1].2));
        assert!(approx(t[2].2 - t[0].2, 24.0));
        assert!(approx(t[2].1, 10.0));
        assert!(approx(t[1].1, 10.0 + 40.0));
    }

    #[test]
    fn line_breaks_start_new_lines() {
        let list = run("<p>a<br />b</p>", &LETTER, &[]);
        let t = texts(&list);
        assert!(approx(t[1].2 - t[0].2, 24.0));
        assert!(approx(t[1].1, 96.0));
    }

    #[test]
    fn sibling_margins_collapse() {
        let list = run("<h1>T</h1><p>x</p>", &LETTER, &[]);
        let t = texts(&list);
        // h1: 24 top margin, 32px at 1.2 → 38.4 line; gap max(12, 16) = 16.
        let h1_line_top = 96.0 + 24.0;
        let p_line_top = h1_line_top + 38.4 + 16.0;
        assert!(approx(t[1].2, p_line_top + 16.8), "{:?}", t);
        assert!(approx(list.height, p_line_top + 24.0 + 16.0 + 96.0));
    }

    #[test]
    fn bold_comes_from_headings_and_strong() {
        let list = run("<h2>H</h2><p>a<strong>b</strong></p>", &LETTER, &[]);
        let faces: Vec<bool> = list
            .items
            .iter()
            .filter_map(|i| match i {
                DisplayItem::Text { face, .. } => Some(face.bold),
                _ => None,
            })
            .collect();
        assert_eq!(faces, vec![true, false, true]);
    }

    #[test]
    fn underline_and_strike_produce_fills() {
        let list = run("<p><u>a b</u> <s>c</s></p>", &LETTER, &[]);
        let fills = list
            .items
            .iter()
            .filter(|i| matches!(i, DisplayItem::Fill { .. }))
            .count();
        // "a", the space, "b", then "c"
        assert_eq!(fills, 4);
    }

    #[test]
    fn wide_images_are_capped_at_content_width() {
        let html = "<p><img src=\"data:image/png;base64,AA==\" style=\"max-width: 100%; height: auto;\" /></p>";
        let list = run(html, &LETTER, &[(2000.0, 1000.0)]);
        let img = list
            .items
            .iter()
            .find_map(|i| match i {
                DisplayItem::Image { bounds, .. } => Some(*bounds),
                _ => None,
            })
            .unwrap();
        assert!(approx(img.w, 624.0));
        assert!(approx(img.h, 312.0));
        assert!(approx(img.x, 96.0));
    }

    #[test]
    fn chart_images_fill_the_width() {
        let html = "<div class=\"chart-container\"><img src=\"data:image/png;base64,AA==\" /></div>";
        let list = run(html, &LETTER, &[(100.0, 50.0)]);
        let img = list
            .items
            .iter()
            .find_map(|i| match i {
                DisplayItem::Image { bounds, .. } => Some(*bounds),
                _ => None,
            })
            .unwrap();
        assert!(approx(img.w, 624.0));
        assert!(approx(img.h, 312.0));
    }

    #[test]
    fn missing_sizes_use_placeholder() {
        let html = "<p><img src=\"x.png\" /></p>";
        let list = run(html, &LETTER, &[]);
        assert!(list.items.iter().any(|i| matches!(
            i,
            DisplayItem::Image { bounds, .. } if approx(bounds.w, 96.0) && approx(bounds.h, 96.0)
        )));
    }

    #[test]
    fn list_markers() {
        let list = run("<ul><li>a</li><li>b</li></ul><ol><li>c</li></ol>", &LETTER, &[]);
        let bullets = list
            .items
            .iter()
            .filter(|i| matches!(i, DisplayItem::Bullet { shape: MarkerShape::Disc, .. }))
            .count();
        assert_eq!(bullets, 2);
        let t = texts(&list);
        let ordinal = t.iter().find(|(s, _, _)| *s == "1. ").unwrap();
        let c = t.iter().find(|(s, _, _)| *s == "c").unwrap();
        assert!(approx(ordinal.1 + 24.0, c.1));
        assert!(approx(c.1, 96.0 + 40.0));
    }

    #[test]
    fn nested_lists_use_circles() {
        let list = run("<ul><li>a<ul><li>b</li></ul></li></ul>", &LETTER, &[]);
        assert!(list
            .items
            .iter()
            .any(|i| matches!(i, DisplayItem::Bullet { shape: MarkerShape::Circle, .. })));
    }

    #[test]
    fn full_width_table_geometry() {
        let html = "<table class=\"w-full\"><tr><th class=\"border\">A</th><th class=\"border\">B</th></tr>\
                    <tr><td class=\"border\">x</td><td class=\"border\">y</td></tr></table>";
        let list = run(html, &LETTER, &[]);
        let strokes: Vec<Bounds> = list
            .items
            .iter()
            .filter_map(|i| match i {
                DisplayItem::Stroke { bounds, .. } => Some(*bounds),
                _ => None,
            })
            .collect();
        assert_eq!(strokes.len(), 4);
        let row_w: f32 = strokes[..2].iter().map(|b| b.w).sum();
        assert!(approx(row_w, 624.0));
        // one 24px line plus 2 × 8.5 padding
        assert!(approx(strokes[0].h, 41.0));
        assert!(approx(strokes[2].y, strokes[0].y + 41.0));

        let header_fills = list
            .items
            .iter()
            .filter(|i| matches!(i, DisplayItem::Fill { color, .. } if *color == stylesheet::TABLE_HEADER_BACKGROUND))
            .count();
        assert_eq!(header_fills, 2);
    }

    #[test]
    fn cell_content_is_centred_vertically() {
        let html = "<table><tr><td>a<br />b<br />c</td><td>x</td></tr></table>";
        let list = run(html, &LETTER, &[]);
        let t = texts(&list);
        let a = t.iter().find(|e| e.0 == "a").unwrap().2;
        let c = t.iter().find(|e| e.0 == "c").unwrap().2;
        let x = t.iter().find(|e| e.0 == "x").unwrap().2;
        assert!(approx(x, (a + c) / 2.0));
    }

    #[test]
    fn box_shadow_paints_first() {
        let list = run("<div style=\"box-shadow: 2px 2px 0 gray\"><p>t</p></div>", &LETTER, &[]);
        assert!(matches!(list.items[0], DisplayItem::BoxShadow { .. }));
    }

    #[test]
    fn distribute_follows_content() {
        let w = distribute(&[10.0, 10.0], &[30.0, 90.0], 240.0);
        assert!(approx(w[0], 60.0) && approx(w[1], 180.0));
        let w = distribute(&[10.0, 30.0], &[50.0, 70.0], 80.0);
        assert!(approx(w[0], 30.0) && approx(w[1], 50.0));
        let w = distribute(&[40.0, 60.0], &[50.0, 70.0], 50.0);
        assert!(approx(w[0], 20.0) && approx(w[1], 30.0));
    }

    #[test]
    fn whitespace_runs() {
        assert_eq!(
            split_whitespace_runs(" ab\t c"),
            vec![(true, " "), (false, "ab"), (true, "\t "), (false, "c")]
        );
        assert!(split_whitespace_runs("").is_empty());
    }
}
