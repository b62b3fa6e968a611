//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages.
//!
//! Percentages follow fixed checkpoints: 10 when rasterisation begins, 70 once
//! the raster exists, then 70→100 in proportion to the image height placed on
//! pages. Within one conversion the reported values never decrease.
//!
//! Callbacks run synchronously on the conversion task. A panicking callback
//! aborts the conversion.
//!
//! # Example
//!
//! ```rust
//! use docx2pdf::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::Arc;
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(|percent: f32| eprintln!("{percent:.0}%")))
//!     .build()
//!     .unwrap();
//! # let _ = config;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Checkpoint reported when rasterisation begins.
pub const PROGRESS_RENDER_START: f32 = 10.0;
/// Checkpoint reported when the raster image is complete.
pub const PROGRESS_RASTER_DONE: f32 = 70.0;
/// Upper bound of every reported percentage.
pub const PROGRESS_DONE: f32 = 100.0;

/// Pipeline stage announced through [`ConversionProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Extract,
    Render,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extracting",
            Stage::Render => "rendering",
            Stage::Assemble => "assembling",
        };
        f.write_str(s)
    }
}

/// Called by the conversion pipeline as it progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The trait is `Send + Sync` because the CPU-bound
/// stages run on tokio's blocking pool.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called at each percentage checkpoint, `0.0..=100.0`.
    fn on_progress(&self, percent: f32) {
        let _ = percent;
    }

    /// Called when a pipeline stage starts.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each PDF page has been placed.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: total pages the document will have
    fn on_page_placed(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }
}

/// Plain closures receive percentage checkpoints only.
impl<F> ConversionProgressCallback for F
where
    F: Fn(f32) + Send + Sync,
{
    fn on_progress(&self, percent: f32) {
        self(percent)
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Forwards events to an optional callback, clamping percentages into
/// `[0, 100]` and suppressing values lower than one already reported.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a dyn ConversionProgressCallback>,
    last: f32,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            callback: callback.map(|cb| cb.as_ref()),
            last: 0.0,
        }
    }

    pub(crate) fn silent() -> Self {
        Self {
            callback: None,
            last: 0.0,
        }
    }

    pub(crate) fn report(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, PROGRESS_DONE).max(self.last);
        self.last = percent;
        if let Some(cb) = self.callback {
            cb.on_progress(percent);
        }
    }

    pub(crate) fn stage(&self, stage: Stage) {
        if let Some(cb) = self.callback {
            cb.on_stage(stage);
        }
    }

    pub(crate) fn page_placed(&self, page_num: usize, total_pages: usize) {
        if let Some(cb) = self.callback {
            cb.on_page_placed(page_num, total_pages);
        }
    }

    pub(crate) fn last(&self) -> f32 {
        self.last
    }
}
