//! Split decompressed Common Crawl capture streams into record triplets.
//!
//! A capture stream is a run of WARC records laid out back to back. Each
//! record is read as three blocks: the capture header (opened by the
//! `WARC/1.0` line), the HTTP transport header, and the payload. Blocks are
//! found from line markers alone; record-length fields are never consulted.

use serde::Serialize;
use std::str;

mod splitter;

pub use splitter::{RecordSplitter, SplitError, SplitState};

/// Prefix every capture header line block must start with.
pub const CAPTURE_PREFIX: &str = "WARC";

/// Prefix the first transport header line must start with.
pub const TRANSPORT_PREFIX: &str = "HTTP";

/// Line that ends a payload and opens the next capture header.
pub const SENTINEL: &str = "WARC/1.0";

const TARGET_URI_HEADER: &str = "WARC-Target-URI:";

/// One line of a capture stream with its terminator removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedLine {
    /// Decoded text without `\n` / `\r\n`.
    pub text: String,
    /// True when the raw bytes were not valid UTF-8 and were decoded as ISO-8859-1.
    pub fallback: bool,
}

impl DecodedLine {
    /// Wraps already decoded text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fallback: false,
        }
    }

    /// Decodes one raw line, trailing terminator included or not.
    ///
    /// Strict UTF-8 is tried first. Anything else is read as ISO-8859-1, which
    /// maps every byte to exactly one char, so no line is ever dropped.
    ///
    /// ```
    /// use capture_parser::DecodedLine;
    ///
    /// let line = DecodedLine::decode(b"caf\xe9\r\n");
    /// assert_eq!(line.text, "café");
    /// assert!(line.fallback);
    /// ```
    pub fn decode(raw: &[u8]) -> Self {
        let raw = strip_terminator(raw);
        match str::from_utf8(raw) {
            Ok(text) => Self::new(text),
            Err(_) => Self {
                text: raw.iter().map(|&byte| char::from(byte)).collect(),
                fallback: true,
            },
        }
    }

    /// Blank lines terminate header blocks.
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

fn strip_terminator(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// One (capture header, transport header, payload) unit of a capture stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Triplet {
    /// Capture metadata lines, starting with the `WARC/1.0` line, blank terminator excluded.
    pub capture_header: Vec<DecodedLine>,
    /// Transport (HTTP) header lines, blank terminator excluded.
    pub transport_header: Vec<DecodedLine>,
    /// Payload lines. The sentinel that ended the payload is not part of it;
    /// it opens the next triplet's capture header instead.
    pub payload: Vec<DecodedLine>,
    /// False when the payload ran into end-of-stream instead of a sentinel.
    pub ends_at_boundary: bool,
}

impl Triplet {
    /// Payload lines joined back into one markup document.
    pub fn payload_text(&self) -> String {
        self.payload
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Target URI named in the capture header, if present.
    pub fn target_uri(&self) -> Option<&str> {
        self.capture_header.iter().find_map(|line| {
            line.text
                .strip_prefix(TARGET_URI_HEADER)
                .map(|value| value.trim())
        })
    }

    /// Number of lines across all blocks that needed the fallback decoder.
    pub fn fallback_lines(&self) -> usize {
        self.capture_header
            .iter()
            .chain(&self.transport_header)
            .chain(&self.payload)
            .filter(|line| line.fallback)
            .count()
    }
}

/// Splits an in-memory capture stream into triplets.
///
/// ```
/// let stream = b"WARC/1.0\nWARC-Type: response\n\nHTTP/1.1 200 OK\n\n<p>hi</p>\n";
/// let triplets = capture_parser::split_bytes(stream).unwrap();
/// assert_eq!(triplets.len(), 1);
/// assert_eq!(triplets[0].payload_text(), "<p>hi</p>");
/// ```
pub fn split_bytes(bytes: &[u8]) -> Result<Vec<Triplet>, SplitError> {
    RecordSplitter::new(bytes).collect()
}
