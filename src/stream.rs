//! Streaming conversion API: observe a conversion as a stream of events.
//!
//! [`convert_stream`] spawns the conversion on the runtime and returns
//! immediately. Progress checkpoints, stage changes and page placements
//! arrive as [`ConversionEvent`]s; the last item is always
//! [`ConversionEvent::Finished`] carrying the output or the error.
//!
//! A progress callback already present in the config still fires; the
//! stream sees the same events.

use crate::config::ConversionConfig;
use crate::convert::{convert_with_host, default_host};
use crate::error::Docx2PdfError;
use crate::output::ConversionOutput;
use crate::progress::{ConversionProgressCallback, ProgressCallback, Stage};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// One observation of a running conversion.
#[derive(Debug)]
pub enum ConversionEvent {
    Stage(Stage),
    /// Percentage checkpoint, non-decreasing within one conversion.
    Progress(f32),
    PagePlaced {
        page_num: usize,
        total_pages: usize,
    },
    /// Terminal event.
    Finished(Box<Result<ConversionOutput, Docx2PdfError>>),
}

/// A boxed stream of conversion events.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ConversionEvent> + Send>>;

/// Forwards callback events into the stream channel and to the caller's own
/// callback, if any.
struct ChannelCallback {
    tx: UnboundedSender<ConversionEvent>,
    inner: Option<ProgressCallback>,
}

impl ConversionProgressCallback for ChannelCallback {
    fn on_progress(&self, percent: f32) {
        if let Some(cb) = &self.inner {
            cb.on_progress(percent);
        }
        let _ = self.tx.send(ConversionEvent::Progress(percent));
    }

    fn on_stage(&self, stage: Stage) {
        if let Some(cb) = &self.inner {
            cb.on_stage(stage);
        }
        let _ = self.tx.send(ConversionEvent::Stage(stage));
    }

    fn on_page_placed(&self, page_num: usize, total_pages: usize) {
        if let Some(cb) = &self.inner {
            cb.on_page_placed(page_num, total_pages);
        }
        let _ = self.tx.send(ConversionEvent::PagePlaced {
            page_num,
            total_pages,
        });
    }
}

/// Convert DOCX bytes, streaming events as the conversion proceeds.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use docx2pdf::{convert_stream, ConversionConfig, ConversionEvent};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("report.docx")?;
/// let mut events = convert_stream(bytes, &ConversionConfig::default());
/// while let Some(event) = events.next().await {
///     match event {
///         ConversionEvent::Progress(p) => eprintln!("{p:.0}%"),
///         ConversionEvent::Finished(result) => {
///             std::fs::write("report.pdf", &(*result)?.pdf)?;
///         }
///         _ => {}
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(bytes: impl Into<Vec<u8>>, config: &ConversionConfig) -> ProgressStream {
    let bytes = bytes.into();
    let (tx, rx) = mpsc::unbounded_channel();

    let mut config = config.clone();
    let forward: ProgressCallback = Arc::new(ChannelCallback {
        tx: tx.clone(),
        inner: config.progress_callback.take(),
    });
    config.progress_callback = Some(forward);

    info!("Starting streaming conversion: {} bytes", bytes.len());
    tokio::spawn(async move {
        let result = convert_with_host(&bytes, &config, default_host()).await;
        let _ = tx.send(ConversionEvent::Finished(Box::new(result)));
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn failed_conversion_ends_with_finished_error() {
        let events: Vec<ConversionEvent> =
            convert_stream(b"not a docx".to_vec(), &ConversionConfig::default())
                .collect()
                .await;
        assert!(matches!(
            events.first(),
            Some(ConversionEvent::Stage(Stage::Extract))
        ));
        match events.last() {
            Some(ConversionEvent::Finished(result)) => match &**result {
                Err(err) => assert_eq!(err.kind(), crate::error::ErrorKind::Parse),
                Ok(_) => panic!("garbage input converted"),
            },
            other => panic!("expected Finished, got {other:?}"),
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, ConversionEvent::Progress(_))));
    }
}
