//! Byte-range retrieval of single capture records from the object store.

use crate::index::SearchRecord;
use flate2::read::GzDecoder;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Public HTTP front of the corpus object store.
pub const DEFAULT_OBJECT_STORE: &str = "https://data.commoncrawl.org/";

const PARTIAL_SUFFIX: &str = "part";

/// Counters for one fetched search-result file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Records fetched and written.
    pub records: usize,
    /// Decompressed bytes written.
    pub bytes: u64,
    /// Lines that were not a usable search record.
    pub skipped_lines: usize,
}

/// Errors that abort fetching one work item.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure.
    #[error("range request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The object store refused or ignored the range.
    #[error("range request for {url} answered {status}")]
    Status {
        /// Requested object.
        url: String,
        /// HTTP status received.
        status: StatusCode,
    },
    /// The returned segment is not a gzip member.
    #[error("failed to decompress segment of {url}: {source}")]
    Decompress {
        /// Requested object.
        url: String,
        /// Decoder error.
        source: io::Error,
    },
    /// Reading the search file or writing the capture file failed.
    #[error("i/o error on {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Fetches and decompresses individual records.
#[derive(Clone)]
pub struct SegmentFetcher {
    client: Client,
    object_store: String,
}

impl SegmentFetcher {
    /// Creates a fetcher against `object_store` (e.g. [`DEFAULT_OBJECT_STORE`]).
    pub fn new(client: Client, object_store: impl Into<String>) -> Self {
        Self {
            client,
            object_store: object_store.into(),
        }
    }

    /// Object URL holding `record`.
    pub fn record_url(&self, record: &SearchRecord) -> String {
        format!(
            "{}/{}",
            self.object_store.trim_end_matches('/'),
            record.filename.trim_start_matches('/')
        )
    }

    /// Retrieves exactly the record's byte range and gunzips it.
    ///
    /// Only `206 Partial Content` is accepted.
    pub async fn fetch(&self, record: &SearchRecord) -> Result<Vec<u8>, FetchError> {
        let url = self.record_url(record);
        let response = self
            .client
            .get(&url)
            .header(RANGE, range_header(record))
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(FetchError::Status { url, status });
        }
        let body = response.bytes().await?;
        gunzip(&body).map_err(|source| FetchError::Decompress { url, source })
    }

    /// Fetches every record listed in a search-result file into one capture file.
    ///
    /// Bytes are written verbatim to `{output}.part`, which is renamed to
    /// `output` once every record succeeded. Any failure removes the partial
    /// file, so a later run retries the whole item.
    pub async fn fetch_search_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<FetchSummary, FetchError> {
        let listing = tokio::fs::read_to_string(input)
            .await
            .map_err(|source| io_error(input, source))?;
        let partial = partial_path(output);
        let mut file = File::create(&partial)
            .await
            .map_err(|source| io_error(&partial, source))?;

        let result = self.write_records(&listing, &mut file, &partial).await;
        drop(file);
        let summary = match result {
            Ok(summary) => summary,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        tokio::fs::rename(&partial, output)
            .await
            .map_err(|source| io_error(output, source))?;
        info!(
            input = %input.display(),
            records = summary.records,
            bytes = summary.bytes,
            "fetched search file"
        );
        Ok(summary)
    }

    async fn write_records(
        &self,
        listing: &str,
        file: &mut File,
        partial: &Path,
    ) -> Result<FetchSummary, FetchError> {
        let mut summary = FetchSummary::default();
        for (idx, line) in listing.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = match SearchRecord::parse_line(line) {
                Ok(record) => record,
                Err(err) => {
                    debug!(line = idx + 1, %err, "skipping unusable search line");
                    summary.skipped_lines += 1;
                    continue;
                }
            };
            let bytes = self.fetch(&record).await?;
            file.write_all(&bytes)
                .await
                .map_err(|source| io_error(partial, source))?;
            summary.records += 1;
            summary.bytes += bytes.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| io_error(partial, source))?;
        Ok(summary)
    }
}

/// `Range` header value for the record's inclusive byte range.
pub fn range_header(record: &SearchRecord) -> String {
    let (first, last) = record.byte_range();
    format!("bytes={first}-{last}")
}

/// Decompresses the first gzip member; bytes after it are ignored.
pub fn gunzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn io_error(path: &Path, source: io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn record(offset: u64, length: u64) -> SearchRecord {
        SearchRecord {
            url: "https://example.com/".into(),
            filename: "crawl-data/CC-MAIN-2024-30/segments/1/warc/a.warc.gz".into(),
            offset,
            length,
            timestamp: None,
            mime: None,
            status: None,
            digest: None,
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn requests_inclusive_range() {
        assert_eq!(range_header(&record(3499, 689)), "bytes=3499-4188");
    }

    #[test]
    fn joins_object_store_and_filename() {
        let fetcher = SegmentFetcher::new(Client::new(), "https://data.commoncrawl.org/");
        assert_eq!(
            fetcher.record_url(&record(0, 1)),
            "https://data.commoncrawl.org/crawl-data/CC-MAIN-2024-30/segments/1/warc/a.warc.gz"
        );
    }

    #[test]
    fn gunzip_ignores_trailing_byte_of_next_member() {
        let mut segment = gzip(b"WARC/1.0\r\n");
        segment.push(0x1f);

        assert_eq!(gunzip(&segment).unwrap(), b"WARC/1.0\r\n".to_vec());
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        assert!(gunzip(b"not gzip at all").is_err());
    }

    #[test]
    fn partial_file_sits_next_to_output() {
        assert_eq!(
            partial_path(Path::new("out/nl_CC-MAIN-2024-30.json")),
            PathBuf::from("out/nl_CC-MAIN-2024-30.json.part")
        );
    }
}
