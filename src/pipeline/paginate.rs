//! Page placement: how one tall raster is spread over fixed-size pages.
//!
//! The raster is scaled so its width equals the page width. Page `k`
//! (zero-based) shows the band starting `k * page_height` points below the
//! top of the scaled image. Pages are added while unplaced height remains,
//! so an exact multiple of the page height yields no trailing blank page.

use crate::config::PageGeometry;
use crate::error::Docx2PdfError;
use crate::progress::{PROGRESS_DONE, PROGRESS_RASTER_DONE};
use serde::Serialize;

/// Remaining heights at or below this many points do not start a new page.
///
/// Absorbs the rounding left over when the raster height is an exact
/// multiple of the page height in device pixels.
pub const PAGE_EPSILON_PT: f64 = 0.01;

/// One page of the output document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PagePlacement {
    /// Zero-based page index.
    pub index: usize,
    /// Distance from the top of the scaled image to the top of this page.
    pub offset_pt: f64,
    /// Height of the image band visible on this page.
    pub visible_pt: f64,
}

/// Placement of a raster over pages of one geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: PageGeometry,
    /// Always the page width.
    pub image_width_pt: f64,
    /// Raster height after scaling to `image_width_pt`.
    pub scaled_height_pt: f64,
    /// Device pixels per point of the scaled image.
    pub px_per_pt: f64,
    pub pages: Vec<PagePlacement>,
}

/// Place a `raster_width` × `raster_height` pixel image on pages of `page`.
pub fn paginate(
    raster_width: u32,
    raster_height: u32,
    page: &PageGeometry,
) -> Result<Pagination, Docx2PdfError> {
    if raster_width == 0 {
        return Err(Docx2PdfError::AssemblyFailed {
            detail: "raster has zero width".into(),
        });
    }
    let page_w = f64::from(page.width_pt);
    let page_h = f64::from(page.height_pt);
    let scaled = f64::from(raster_height) * page_w / f64::from(raster_width);

    let visible = |offset: f64| (scaled - offset).clamp(0.0, page_h);
    let mut pages = vec![PagePlacement {
        index: 0,
        offset_pt: 0.0,
        visible_pt: visible(0.0),
    }];
    let mut remaining = scaled - page_h;
    while remaining > PAGE_EPSILON_PT {
        let index = pages.len();
        let offset_pt = index as f64 * page_h;
        pages.push(PagePlacement {
            index,
            offset_pt,
            visible_pt: visible(offset_pt),
        });
        remaining -= page_h;
    }

    Ok(Pagination {
        page: *page,
        image_width_pt: page_w,
        scaled_height_pt: scaled,
        px_per_pt: f64::from(raster_width) / page_w,
        pages,
    })
}

impl Pagination {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Progress to report once page `index` has been placed.
    pub fn progress_after(&self, index: usize) -> f32 {
        if self.scaled_height_pt <= 0.0 {
            return PROGRESS_DONE;
        }
        let page_h = f64::from(self.page.height_pt);
        let consumed = ((index + 1) as f64 * page_h).min(self.scaled_height_pt);
        let span = f64::from(PROGRESS_DONE - PROGRESS_RASTER_DONE);
        PROGRESS_RASTER_DONE + (span * consumed / self.scaled_height_pt) as f32
    }

    /// Raster rows `(top, count)` shown on page `index`, clamped to
    /// `raster_height`.
    pub fn band_rows(&self, index: usize, raster_height: u32) -> (u32, u32) {
        let Some(p) = self.pages.get(index) else {
            return (raster_height, 0);
        };
        let to_px = |pt: f64| ((pt * self.px_per_pt).round() as u32).min(raster_height);
        let top = to_px(p.offset_pt);
        let bottom = to_px(p.offset_pt + p.visible_pt);
        (top, bottom.saturating_sub(top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 1632;

    #[test]
    fn short_raster_fits_one_page() {
        let p = paginate(W, 1000, &PageGeometry::LETTER).unwrap();
        assert_eq!(p.page_count(), 1);
        assert_eq!(p.pages[0].offset_pt, 0.0);
        assert!((p.scaled_height_pt - 375.0).abs() < 1e-9);
        assert!((p.pages[0].visible_pt - 375.0).abs() < 1e-9);
        assert_eq!(p.progress_after(0), 100.0);
    }

    #[test]
    fn two_and_a_half_pages() {
        // 1980pt scaled = 2.5 × 792.
        let p = paginate(W, 5280, &PageGeometry::LETTER).unwrap();
        assert_eq!(p.page_count(), 3);
        let offsets: Vec<f64> = p.pages.iter().map(|pg| pg.offset_pt).collect();
        assert_eq!(offsets, vec![0.0, 792.0, 1584.0]);
        assert!((p.pages[2].visible_pt - 396.0).abs() < 1e-9);
        assert_eq!(p.band_rows(2, 5280), (4224, 1056));
        assert!((p.progress_after(0) - 82.0).abs() < 1e-4);
        assert!((p.progress_after(1) - 94.0).abs() < 1e-4);
        assert_eq!(p.progress_after(2), 100.0);
    }

    #[test]
    fn exact_multiple_has_no_blank_trailing_page() {
        let p = paginate(W, 4224, &PageGeometry::LETTER).unwrap();
        assert_eq!(p.page_count(), 2);
        assert_eq!(p.band_rows(1, 4224), (2112, 2112));
    }

    #[test]
    fn one_pixel_overflow_adds_a_page() {
        // One extra pixel is 0.375pt of overflow, which still needs a page.
        let p = paginate(W, 4225, &PageGeometry::LETTER).unwrap();
        assert_eq!(p.page_count(), 3);
    }

    #[test]
    fn bands_cover_every_row_once() {
        let h = 7777;
        let p = paginate(W, h, &PageGeometry::LETTER).unwrap();
        let mut next = 0;
        for i in 0..p.page_count() {
            let (top, rows) = p.band_rows(i, h);
            assert_eq!(top, next);
            next = top + rows;
        }
        assert_eq!(next, h);
    }

    #[test]
    fn progress_is_monotone() {
        let p = paginate(W, 20_000, &PageGeometry::LETTER).unwrap();
        let values: Vec<f32> = (0..p.page_count()).map(|i| p.progress_after(i)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| (70.0..=100.0).contains(v)));
        assert_eq!(values.last().copied(), Some(100.0));
    }

    #[test]
    fn zero_width_is_rejected() {
        assert!(matches!(
            paginate(0, 10, &PageGeometry::LETTER),
            Err(Docx2PdfError::AssemblyFailed { .. })
        ));
    }
}
