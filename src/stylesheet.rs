//! The fixed style sheet applied to every render surface.
//!
//! All lengths are CSS pixels (96 per inch). Point sizes are converted with
//! [`pt`]. Source-document colours never reach the page: text is always
//! black on white and element backgrounds are transparent, with the single
//! exception of table header cells.

/// CSS pixels per inch.
pub const CSS_DPI: f32 = 96.0;

/// CSS pixels per point.
pub const PX_PER_PT: f32 = CSS_DPI / 72.0;

/// Width of the virtual page: 8.5in.
pub const PAGE_WIDTH_PX: f32 = 8.5 * CSS_DPI;

/// Padding on every side of the virtual page: 1in.
pub const PAGE_PADDING_PX: f32 = CSS_DPI;

/// Convert points to CSS pixels.
pub const fn pt(points: f32) -> f32 {
    points * PX_PER_PT
}

pub const TEXT_COLOR: [u8; 3] = [0, 0, 0];
pub const PAGE_BACKGROUND: [u8; 3] = [255, 255, 255];
pub const TABLE_BORDER_COLOR: [u8; 3] = [0, 0, 0];
pub const TABLE_HEADER_BACKGROUND: [u8; 3] = [0xf3, 0xf4, 0xf6];
pub const PLACEHOLDER_FILL: [u8; 3] = [0xe5, 0xe7, 0xeb];
pub const PLACEHOLDER_BORDER: [u8; 3] = [0x9c, 0xa3, 0xaf];

pub const TABLE_BORDER_PX: f32 = 1.0;
pub const TABLE_CELL_PADDING_PX: f32 = 8.0;

/// Indentation of list content; markers hang in this gutter.
pub const LIST_INDENT_PX: f32 = 40.0;

/// Size of the box drawn for an image that could not be decoded.
pub const PLACEHOLDER_PX: (f32, f32) = (96.0, 96.0);

/// Relative size of superscript and subscript text.
pub const SCRIPT_SCALE: f32 = 0.83;

/// Typography and vertical spacing of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStyle {
    pub font_size: f32,
    /// Multiplier of `font_size`.
    pub line_height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub bold: bool,
}

/// `p`, `li`, `td` and anonymous text.
pub const BODY: BlockStyle = BlockStyle {
    font_size: pt(12.0),
    line_height: 1.5,
    margin_top: 0.0,
    margin_bottom: 0.0,
    bold: false,
};

/// `p` elements keep the user-agent 1em vertical margins.
pub const PARAGRAPH: BlockStyle = BlockStyle {
    margin_top: pt(12.0),
    margin_bottom: pt(12.0),
    ..BODY
};

/// Top-level lists; nested lists have no vertical margin.
pub const LIST_MARGIN_PX: f32 = pt(12.0);

const HEADINGS: [BlockStyle; 6] = [
    heading_style(24.0, 24.0, 12.0, 1.2),
    heading_style(20.0, 20.0, 10.0, 1.3),
    heading_style(16.0, 16.0, 8.0, 1.4),
    heading_style(14.0, 14.0, 7.0, 1.4),
    heading_style(12.0, 12.0, 6.0, 1.4),
    heading_style(11.0, 11.0, 5.5, 1.4),
];

const fn heading_style(size_pt: f32, top: f32, bottom: f32, line_height: f32) -> BlockStyle {
    BlockStyle {
        font_size: pt(size_pt),
        line_height,
        margin_top: top,
        margin_bottom: bottom,
        bold: true,
    }
}

/// Variant of a heading selected by its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadingVariant {
    #[default]
    Plain,
    Title,
    Subtitle,
}

/// Style of `h1`..`h6`, with `.title` / `.subtitle` overrides applied.
///
/// Levels outside 1..=6 are clamped.
pub fn heading(level: u8, variant: HeadingVariant) -> BlockStyle {
    let base = HEADINGS[usize::from(level.clamp(1, 6)) - 1];
    match variant {
        HeadingVariant::Plain => base,
        HeadingVariant::Title => BlockStyle {
            font_size: pt(28.0),
            margin_bottom: 12.0,
            ..base
        },
        HeadingVariant::Subtitle => BlockStyle {
            font_size: pt(18.0),
            bold: false,
            margin_top: 0.0,
            margin_bottom: 24.0,
            ..base
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_conversion() {
        assert_eq!(pt(12.0), 16.0);
        assert_eq!(pt(72.0), 96.0);
    }

    #[test]
    fn heading_sizes_descend() {
        let sizes: Vec<f32> = (1..=6)
            .map(|l| heading(l, HeadingVariant::Plain).font_size)
            .collect();
        assert_eq!(sizes, vec![32.0, pt(20.0), pt(16.0), pt(14.0), 16.0, pt(11.0)]);
        assert!(sizes.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(heading(6, HeadingVariant::Plain).margin_bottom, 5.5);
    }

    #[test]
    fn title_and_subtitle_overrides() {
        let title = heading(1, HeadingVariant::Title);
        assert_eq!(title.font_size, pt(28.0));
        assert_eq!(title.margin_top, 24.0);
        assert_eq!(title.margin_bottom, 12.0);
        assert!(title.bold);

        let subtitle = heading(2, HeadingVariant::Subtitle);
        assert_eq!(subtitle.font_size, 24.0);
        assert!(!subtitle.bold);
        assert_eq!(subtitle.margin_top, 0.0);
        assert_eq!(subtitle.margin_bottom, 24.0);
    }

    #[test]
    fn out_of_range_levels_clamp() {
        assert_eq!(heading(0, HeadingVariant::Plain), heading(1, HeadingVariant::Plain));
        assert_eq!(heading(9, HeadingVariant::Plain), heading(6, HeadingVariant::Plain));
    }
}
