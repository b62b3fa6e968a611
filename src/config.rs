//! Configuration types for DOCX-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The style sheet itself is not
//! configurable (see [`crate::stylesheet`]), and neither is the geometry:
//! content is laid out on an 8.5in page with 1in padding and written to US
//! Letter pages. The knobs here cover supersampling, style-mapping rules and
//! failure tolerance.

use crate::error::Docx2PdfError;
use crate::progress::ProgressCallback;
use crate::stylesheet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a DOCX-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2pdf::{ConversionConfig, SliceMode};
///
/// let config = ConversionConfig::builder()
///     .scale(1.5)
///     .slice_mode(SliceMode::Crop)
///     .build()
///     .unwrap();
/// assert_eq!(config.raster_width(), 1224);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Pixel-density multiplier applied on top of the CSS pixel grid. Range: 0.5–4.0. Default: 2.0.
    pub scale: f32,

    /// Extra style-mapping rules, tried before the built-in ones.
    ///
    /// Each rule uses the `selector => target` syntax, e.g.
    /// `p[style-name='Quote'] => p.quote:fresh`.
    pub style_map: Vec<String>,

    /// Append the default mapping rules after the explicit ones. Default: true.
    pub include_default_style_map: bool,

    /// Replace undecodable images with a placeholder instead of failing. Default: true.
    pub allow_taint: bool,

    /// Strip `box-shadow` / `text-shadow` from the captured clone. Default: true.
    pub strip_shadows: bool,

    /// How bands of the raster are placed on PDF pages. Default: [`SliceMode::Shift`].
    pub slice_mode: SliceMode,

    /// Additional directories scanned for font files.
    pub font_dirs: Vec<PathBuf>,

    /// Hard cap on raster height in device pixels. Default: 120 000.
    ///
    /// At the default scale one letter page of content is roughly 2 100 px,
    /// so the cap allows documents of about 55 pages.
    pub max_raster_height: u32,

    /// Receives progress checkpoints.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            style_map: Vec::new(),
            include_default_style_map: true,
            allow_taint: true,
            strip_shadows: true,
            slice_mode: SliceMode::default(),
            font_dirs: Vec::new(),
            max_raster_height: 120_000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("scale", &self.scale)
            .field("style_map", &self.style_map)
            .field("include_default_style_map", &self.include_default_style_map)
            .field("allow_taint", &self.allow_taint)
            .field("strip_shadows", &self.strip_shadows)
            .field("slice_mode", &self.slice_mode)
            .field("font_dirs", &self.font_dirs)
            .field("max_raster_height", &self.max_raster_height)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Width of the raster image in device pixels (1632 at the default scale).
    pub fn raster_width(&self) -> u32 {
        (stylesheet::PAGE_WIDTH_PX * self.scale).round() as u32
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    /// Add one style-mapping rule ahead of the built-in rules.
    pub fn style_rule(mut self, rule: impl Into<String>) -> Self {
        self.config.style_map.push(rule.into());
        self
    }

    pub fn include_default_style_map(mut self, v: bool) -> Self {
        self.config.include_default_style_map = v;
        self
    }

    pub fn allow_taint(mut self, v: bool) -> Self {
        self.config.allow_taint = v;
        self
    }

    pub fn strip_shadows(mut self, v: bool) -> Self {
        self.config.strip_shadows = v;
        self
    }

    pub fn slice_mode(mut self, mode: SliceMode) -> Self {
        self.config.slice_mode = mode;
        self
    }

    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dirs.push(dir.into());
        self
    }

    pub fn max_raster_height(mut self, px: u32) -> Self {
        self.config.max_raster_height = px;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Docx2PdfError> {
        let c = &self.config;
        if !(0.5..=4.0).contains(&c.scale) {
            return Err(Docx2PdfError::InvalidConfig(format!(
                "scale must be 0.5–4.0, got {}",
                c.scale
            )));
        }
        if c.max_raster_height == 0 {
            return Err(Docx2PdfError::InvalidConfig(
                "max raster height must be ≥ 1".into(),
            ));
        }
        for rule in &c.style_map {
            crate::pipeline::stylemap::StyleRule::parse(rule)
                .map_err(|e| Docx2PdfError::InvalidConfig(format!("style rule {rule:?}: {e}")))?;
        }
        Ok(self.config)
    }
}

// ── Geometry & enums ─────────────────────────────────────────────────────

/// Page size in PDF points (1/72 inch). Output pages are always
/// [`PageGeometry::LETTER`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageGeometry {
    /// US Letter, portrait.
    pub const LETTER: PageGeometry = PageGeometry {
        width_pt: 612.0,
        height_pt: 792.0,
    };
}

/// How the raster is distributed over PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SliceMode {
    /// Embed the full image once; every page draws it shifted up by the
    /// cumulative page height and the page box clips the rest. (default)
    #[default]
    Shift,
    /// Embed one cropped band per page.
    Crop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_letter_at_double_density() {
        let c = ConversionConfig::default();
        assert_eq!(stylesheet::PAGE_WIDTH_PX, 816.0);
        assert_eq!(stylesheet::PAGE_PADDING_PX, 96.0);
        assert_eq!(c.raster_width(), 1632);
        assert_eq!(c.slice_mode, SliceMode::Shift);
    }

    #[test]
    fn builder_rejects_out_of_range_scale() {
        assert!(ConversionConfig::builder().scale(8.0).build().is_err());
        assert!(ConversionConfig::builder().scale(0.1).build().is_err());
        assert!(ConversionConfig::builder().scale(1.0).build().is_ok());
    }

    #[test]
    fn builder_validates_style_rules() {
        assert!(ConversionConfig::builder()
            .style_rule("p[style-name='Quote'] => p.quote:fresh")
            .build()
            .is_ok());
        assert!(ConversionConfig::builder()
            .style_rule("this is not a rule")
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let c = ConversionConfig::builder()
            .progress_callback(std::sync::Arc::new(|_: f32| {}))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ConversionProgressCallback>"));
    }
}
