//! Streaming anchor extraction built on `lol_html`.

use futures_util::StreamExt;
use lol_html::{element, HtmlRewriter, OutputSink, Settings};
use reqwest::Response;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Incremental collector of `href` values, fed chunk by chunk.
///
/// The `transform` closure runs for every `href`; returning `Some(T)` keeps the value, `None` skips
/// it. Only accepted entries count against `limit`.
pub struct LinkCollector<T> {
    rewriter: HtmlRewriter<'static, NoopSink>,
    values: Arc<Mutex<Vec<T>>>,
}

impl<T: 'static> LinkCollector<T> {
    /// Creates a collector that keeps at most `limit` transformed links.
    pub fn new<F>(limit: usize, transform: F) -> Self
    where
        F: Fn(&str) -> Option<T> + 'static,
    {
        let values: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
        let values_handle = Arc::clone(&values);

        let handler = element!("a[href]", move |el| {
            let mut entries = values_handle.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.len() >= limit {
                return Ok(());
            }

            if let Some(href) = el.get_attribute("href") {
                if let Some(mapped) = transform(&href) {
                    entries.push(mapped);
                }
            }
            Ok(())
        });

        let rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![handler],
                ..Settings::default()
            },
            NoopSink,
        );

        Self { rewriter, values }
    }

    /// Feeds one chunk of markup.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), HtmlStreamError> {
        self.rewriter.write(chunk).map_err(HtmlStreamError::Rewrite)
    }

    /// Ends the document and returns the collected links in document order.
    pub fn finish(self) -> Result<Vec<T>, HtmlStreamError> {
        let LinkCollector { rewriter, values } = self;
        rewriter.end().map_err(HtmlStreamError::Rewrite)?;

        let collected = Arc::try_unwrap(values)
            .map_err(|_| HtmlStreamError::CollectorInUse)?
            .into_inner()
            .map_err(|_| HtmlStreamError::CollectorPoisoned)?;
        Ok(collected)
    }
}

/// Streams anchor tags from an HTTP response, transforming matching `href` values with `transform`.
pub async fn stream_links<T, F>(
    response: Response,
    limit: usize,
    transform: F,
) -> Result<Vec<T>, HtmlStreamError>
where
    T: 'static,
    F: Fn(&str) -> Option<T> + 'static,
{
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut collector = LinkCollector::new(limit, transform);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(HtmlStreamError::Http)?;
        collector.write(&chunk)?;
    }
    collector.finish()
}

/// Errors surfaced while streaming HTML.
#[derive(Debug, Error)]
pub enum HtmlStreamError {
    /// Reading the response stream failed.
    #[error("http stream error: {0}")]
    Http(#[source] reqwest::Error),
    /// The HTML rewriter encountered malformed markup.
    #[error("html rewrite error: {0}")]
    Rewrite(#[source] lol_html::errors::RewritingError),
    /// Internal buffer still had outstanding references.
    #[error("link collector still in use")]
    CollectorInUse,
    /// Collector mutex was poisoned while draining results.
    #[error("link collector mutex poisoned")]
    CollectorPoisoned,
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}
