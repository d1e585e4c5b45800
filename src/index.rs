//! Crawl index discovery and URL-pattern queries.
//!
//! The index service lists one endpoint per dated snapshot. Each endpoint
//! answers `{api}-index?url={pattern}&output=json` with one JSON object per
//! matching capture. Responses are persisted verbatim, one file per
//! (pattern, endpoint), so an interrupted search can be resumed.

use crate::html::{stream_links, HtmlStreamError};
use reqwest::{Client, StatusCode};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Listing page of the public crawl index.
pub const DEFAULT_INDEX_ROOT: &str = "https://index.commoncrawl.org/";
/// Prefix under which snapshot endpoints are served.
pub const DEFAULT_API_HEAD: &str = "https://index.commoncrawl.org/";

const SNAPSHOT_PREFIX: &str = "CC-MAIN";
const OVERLOAD_MARKER: &str = "Internal Error: 503";
const ERROR_BODY_PREVIEW: usize = 200;

/// One dated crawl-index snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEndpoint {
    /// Snapshot identifier, e.g. `CC-MAIN-2024-30`.
    pub id: String,
    /// Base URL the `-index` query suffix is appended to.
    pub api_url: String,
}

impl IndexEndpoint {
    /// Builds the endpoint for `id` under `api_head`.
    pub fn new(api_head: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            api_url: format!("{}/{id}", api_head.trim_end_matches('/')),
        }
    }

    /// Query URL for a URL pattern such as `*.example.com`.
    pub fn query_url(&self, pattern: &str) -> Result<Url, IndexError> {
        let mut url = Url::parse(&format!("{}-index", self.api_url))?;
        url.query_pairs_mut()
            .append_pair("url", pattern)
            .append_pair("output", "json");
        Ok(url)
    }
}

/// One line of an index query result: a byte range inside a capture file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Captured URL.
    #[serde(default)]
    pub url: String,
    /// Object-store key of the compressed capture file.
    pub filename: String,
    /// Byte offset of the record inside `filename`.
    #[serde(deserialize_with = "number_or_string")]
    pub offset: u64,
    /// Compressed record length in bytes.
    #[serde(deserialize_with = "number_or_string")]
    pub length: u64,
    /// Capture timestamp (`YYYYMMDDhhmmss`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Declared MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// HTTP status of the capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Payload digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl SearchRecord {
    /// Parses one JSON line of an index response.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Inclusive `(first, last)` byte positions requested from the object store.
    pub fn byte_range(&self) -> (u64, u64) {
        (self.offset, self.offset.saturating_add(self.length))
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(de::Error::custom),
    }
}

/// Retry schedule applied only to index overload responses.
///
/// Overload is retried without limit; the delay doubles from `initial` and
/// then stays at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverloadRetry {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Largest delay between retries.
    pub ceiling: Duration,
}

impl OverloadRetry {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.initial.saturating_mul(factor).min(self.ceiling)
    }
}

impl Default for OverloadRetry {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            ceiling: Duration::from_secs(600),
        }
    }
}

/// Where the index lives and how overload is handled.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Listing page scraped for snapshot ids.
    pub index_root: String,
    /// Prefix snapshot ids are appended to when querying.
    pub api_head: String,
    /// Overload retry schedule.
    pub retry: OverloadRetry,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index_root: DEFAULT_INDEX_ROOT.to_string(),
            api_head: DEFAULT_API_HEAD.to_string(),
            retry: OverloadRetry::default(),
        }
    }
}

/// Counters for one `search_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Endpoints listed by the index root.
    pub endpoints: usize,
    /// Endpoints actually queried.
    pub queried: usize,
    /// Endpoints skipped because their result file already existed.
    pub skipped: usize,
    /// Non-empty result lines written.
    pub records: usize,
}

/// Errors surfaced while talking to the index service.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Transport-level failure.
    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The listing page could not be scanned.
    #[error("failed to read index listing: {0}")]
    Listing(#[from] HtmlStreamError),
    /// A configured URL is malformed.
    #[error("invalid index url: {0}")]
    Url(#[from] url::ParseError),
    /// The endpoint answered with a non-retryable status.
    #[error("index endpoint {endpoint} answered {status}: {body}")]
    Status {
        /// Snapshot id.
        endpoint: String,
        /// HTTP status received.
        status: StatusCode,
        /// Start of the response body.
        body: String,
    },
    /// Persisting a response failed.
    #[error("failed to write {path:?}: {source}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum QueryOutcome {
    Records(String),
    NoCaptures,
    Overloaded,
    Failed(StatusCode, String),
}

fn classify(status: StatusCode, body: String) -> QueryOutcome {
    if status == StatusCode::SERVICE_UNAVAILABLE || body.contains(OVERLOAD_MARKER) {
        QueryOutcome::Overloaded
    } else if status.is_success() {
        QueryOutcome::Records(body)
    } else if status == StatusCode::NOT_FOUND {
        QueryOutcome::NoCaptures
    } else {
        QueryOutcome::Failed(status, body)
    }
}

/// Client for endpoint discovery and pattern queries.
#[derive(Clone)]
pub struct IndexClient {
    client: Client,
    settings: IndexSettings,
}

impl IndexClient {
    /// Wraps a configured HTTP client.
    pub fn new(client: Client, settings: IndexSettings) -> Self {
        Self { client, settings }
    }

    /// Lists snapshot endpoints in the order the index root shows them.
    pub async fn discover_endpoints(&self) -> Result<Vec<IndexEndpoint>, IndexError> {
        let response = self
            .client
            .get(&self.settings.index_root)
            .send()
            .await?
            .error_for_status()?;
        let ids = stream_links(response, usize::MAX, |href| {
            snapshot_id(href).map(str::to_string)
        })
        .await?;

        let mut endpoints: Vec<IndexEndpoint> = Vec::with_capacity(ids.len());
        for id in ids {
            if endpoints.iter().all(|endpoint| endpoint.id != id) {
                endpoints.push(IndexEndpoint::new(&self.settings.api_head, &id));
            }
        }
        debug!(count = endpoints.len(), "discovered index endpoints");
        Ok(endpoints)
    }

    /// Queries one endpoint and returns the raw JSON-lines body.
    ///
    /// Overload responses are retried indefinitely under the configured
    /// [`OverloadRetry`]; every other failure is returned at once.
    pub async fn search(&self, pattern: &str, endpoint: &IndexEndpoint) -> Result<String, IndexError> {
        let url = endpoint.query_url(pattern)?;
        let mut attempt = 0u32;
        loop {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            let body = response.text().await?;
            match classify(status, body) {
                QueryOutcome::Records(body) => return Ok(body),
                QueryOutcome::NoCaptures => {
                    debug!(endpoint = %endpoint.id, pattern, "no captures");
                    return Ok(String::new());
                }
                QueryOutcome::Overloaded => {
                    let delay = self.settings.retry.delay(attempt);
                    warn!(
                        endpoint = %endpoint.id,
                        attempt,
                        delay_secs = delay.as_secs_f32(),
                        "index overloaded, retrying"
                    );
                    sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                QueryOutcome::Failed(status, body) => {
                    return Err(IndexError::Status {
                        endpoint: endpoint.id.clone(),
                        status,
                        body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
                    });
                }
            }
        }
    }

    /// Queries every endpoint and persists each response under `out_dir`.
    pub async fn search_all(
        &self,
        pattern: &str,
        out_dir: &Path,
        skip_existing: bool,
    ) -> Result<SearchSummary, IndexError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| IndexError::Write {
                path: out_dir.to_path_buf(),
                source,
            })?;

        let endpoints = self.discover_endpoints().await?;
        let mut summary = SearchSummary {
            endpoints: endpoints.len(),
            ..SearchSummary::default()
        };
        for endpoint in &endpoints {
            let path = out_dir.join(result_file_name(pattern, &endpoint.id));
            if skip_existing && path.exists() {
                debug!(path = %path.display(), "result already present");
                summary.skipped += 1;
                continue;
            }

            info!(pattern, endpoint = %endpoint.api_url, "fetching query");
            let body = self.search(pattern, endpoint).await?;
            tokio::fs::write(&path, &body)
                .await
                .map_err(|source| IndexError::Write {
                    path: path.clone(),
                    source,
                })?;
            summary.queried += 1;
            summary.records += body.lines().filter(|line| !line.trim().is_empty()).count();
        }
        Ok(summary)
    }
}

/// Extracts `CC-MAIN-YYYY-WW` from a listing `href`.
fn snapshot_id(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?.trim_matches('/');
    let id = path.split('/').next()?;
    let id = id.strip_suffix("-index").unwrap_or(id);
    id.starts_with(SNAPSHOT_PREFIX).then_some(id)
}

/// File name used for the responses of `pattern` against endpoint `endpoint_id`.
pub fn result_file_name(pattern: &str, endpoint_id: &str) -> String {
    format!("{}_{endpoint_id}.json", sanitize_pattern(pattern))
}

/// Drops wildcards and dots, and flattens path separators.
pub fn sanitize_pattern(pattern: &str) -> String {
    pattern
        .chars()
        .filter(|ch| !matches!(ch, '*' | '.'))
        .map(|ch| if matches!(ch, '/' | '\\' | ':') { '_' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_query_url() {
        let endpoint = IndexEndpoint::new("https://index.commoncrawl.org/", "CC-MAIN-2024-30");
        let url = endpoint.query_url("*.example.com").unwrap();

        assert_eq!(
            url.as_str(),
            "https://index.commoncrawl.org/CC-MAIN-2024-30-index?url=*.example.com&output=json"
        );
    }

    #[test]
    fn reads_snapshot_ids_from_hrefs() {
        assert_eq!(snapshot_id("/CC-MAIN-2024-30/"), Some("CC-MAIN-2024-30"));
        assert_eq!(snapshot_id("/CC-MAIN-2024-30-index"), Some("CC-MAIN-2024-30"));
        assert_eq!(
            snapshot_id("/CC-MAIN-2024-30-index?url=x&output=json"),
            Some("CC-MAIN-2024-30")
        );
        assert_eq!(snapshot_id("/collinfo.json"), None);
        assert_eq!(snapshot_id("https://commoncrawl.org/"), None);
    }

    #[test]
    fn sanitizes_pattern_for_file_names() {
        assert_eq!(sanitize_pattern("*.example.com"), "examplecom");
        assert_eq!(sanitize_pattern("example.com/blog/*"), "examplecom_blog_");
        assert_eq!(
            result_file_name("*.nl", "CC-MAIN-2024-30"),
            "nl_CC-MAIN-2024-30.json"
        );
    }

    #[test]
    fn classifies_index_responses() {
        assert_eq!(
            classify(StatusCode::OK, "{}\n".into()),
            QueryOutcome::Records("{}\n".into())
        );
        assert_eq!(classify(StatusCode::NOT_FOUND, String::new()), QueryOutcome::NoCaptures);
        assert_eq!(
            classify(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            QueryOutcome::Overloaded
        );
        assert_eq!(
            classify(StatusCode::OK, "<h1>Internal Error: 503</h1>".into()),
            QueryOutcome::Overloaded
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "bad".into()),
            QueryOutcome::Failed(StatusCode::BAD_REQUEST, "bad".into())
        );
    }

    #[test]
    fn overload_delay_doubles_up_to_ceiling() {
        let retry = OverloadRetry {
            initial: Duration::from_secs(5),
            ceiling: Duration::from_secs(60),
        };
        let delays: Vec<u64> = (0..6).map(|attempt| retry.delay(attempt).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
        assert_eq!(retry.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn parses_string_encoded_offsets() {
        let line = r#"{"urlkey": "com,example)/", "timestamp": "20240722120756", "url": "https://example.com/", "mime": "text/html", "status": "200", "digest": "DCNY", "length": "689", "offset": "3499", "filename": "crawl-data/CC-MAIN-2024-30/segments/1/warc/x.warc.gz"}"#;
        let record = SearchRecord::parse_line(line).unwrap();

        assert_eq!(record.offset, 3499);
        assert_eq!(record.length, 689);
        assert_eq!(record.byte_range(), (3499, 4188));
        assert_eq!(record.status.as_deref(), Some("200"));
    }

    #[test]
    fn accepts_numeric_offsets_and_rejects_missing_fields() {
        let record =
            SearchRecord::parse_line(r#"{"filename": "f.warc.gz", "offset": 10, "length": 5}"#)
                .unwrap();
        assert_eq!(record.byte_range(), (10, 15));
        assert!(record.url.is_empty());

        assert!(SearchRecord::parse_line(r#"{"url": "https://example.com/"}"#).is_err());
        assert!(SearchRecord::parse_line(r#"{"filename": "f", "offset": "x", "length": 1}"#).is_err());
    }
}
