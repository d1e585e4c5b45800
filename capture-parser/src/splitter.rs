//! Line-driven state machine turning a capture stream into triplets.

use crate::{DecodedLine, Triplet, CAPTURE_PREFIX, SENTINEL, TRANSPORT_PREFIX};
use std::io::{self, BufRead};
use thiserror::Error;

/// Where the splitter currently is inside a triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitState {
    /// Next line must open a capture header.
    AwaitingCaptureHeader,
    /// Collecting capture header lines until a blank line.
    ReadingCaptureHeader,
    /// Collecting transport header lines until a blank line.
    ReadingTransportHeader,
    /// Collecting payload lines until the sentinel.
    ReadingPayload,
    /// No further triplets will be produced.
    EndOfStream,
}

/// Errors surfaced while splitting a capture stream.
#[derive(Debug, Error)]
pub enum SplitError {
    /// A capture header was expected but the line does not start with `WARC`.
    #[error("line {line}: expected a capture header, found {found:?}")]
    MissingCaptureHeader {
        /// 1-based line number of the offending line.
        line: usize,
        /// The offending line.
        found: String,
    },
    /// The block after the capture header does not start with `HTTP`.
    #[error("line {line}: expected a transport header, found {found:?}")]
    MissingTransportHeader {
        /// 1-based line number of the offending line.
        line: usize,
        /// The offending line.
        found: String,
    },
    /// Reading the underlying stream failed.
    #[error("failed to read capture stream: {0}")]
    Io(#[from] io::Error),
}

impl SplitError {
    /// True for malformed-stream errors, false for I/O failures.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingCaptureHeader { .. } | Self::MissingTransportHeader { .. }
        )
    }
}

/// Streaming splitter over any buffered reader.
///
/// Holds at most one line of lookahead: the sentinel that closes a payload is
/// kept as the pending line and opens the next capture header.
pub struct RecordSplitter<R> {
    reader: R,
    state: SplitState,
    pending: Option<DecodedLine>,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> RecordSplitter<R> {
    /// Creates a splitter positioned before the first capture header.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: SplitState::AwaitingCaptureHeader,
            pending: None,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Creates a splitter whose first capture header line was already read elsewhere.
    pub fn with_pending(reader: R, pending: DecodedLine) -> Self {
        let mut splitter = Self::new(reader);
        splitter.pending = Some(pending);
        splitter
    }

    /// Current state.
    pub fn state(&self) -> SplitState {
        self.state
    }

    /// Number of lines consumed from the reader so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Advances until one full triplet is read.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. A triplet cut off inside
    /// its headers is discarded; a payload cut off by end-of-stream is complete.
    pub fn next_triplet(&mut self) -> Result<Option<Triplet>, SplitError> {
        let mut triplet = Triplet::default();
        loop {
            match self.state {
                SplitState::AwaitingCaptureHeader => {
                    let line = match self.pending.take() {
                        Some(line) => Some(line),
                        None => self.read_line()?,
                    };
                    let Some(line) = line else {
                        self.state = SplitState::EndOfStream;
                        continue;
                    };
                    if !line.text.starts_with(CAPTURE_PREFIX) {
                        self.state = SplitState::EndOfStream;
                        return Err(SplitError::MissingCaptureHeader {
                            line: self.line_no,
                            found: line.text,
                        });
                    }
                    triplet.capture_header.push(line);
                    self.state = SplitState::ReadingCaptureHeader;
                }
                SplitState::ReadingCaptureHeader => match self.read_line()? {
                    Some(line) if line.is_blank() => {
                        self.state = SplitState::ReadingTransportHeader;
                    }
                    Some(line) => triplet.capture_header.push(line),
                    None => self.state = SplitState::EndOfStream,
                },
                SplitState::ReadingTransportHeader => match self.read_line()? {
                    Some(line)
                        if triplet.transport_header.is_empty()
                            && !line.text.starts_with(TRANSPORT_PREFIX) =>
                    {
                        self.state = SplitState::EndOfStream;
                        return Err(SplitError::MissingTransportHeader {
                            line: self.line_no,
                            found: line.text,
                        });
                    }
                    Some(line) if line.is_blank() => self.state = SplitState::ReadingPayload,
                    Some(line) => triplet.transport_header.push(line),
                    None => self.state = SplitState::EndOfStream,
                },
                SplitState::ReadingPayload => match self.read_line()? {
                    Some(line) if line.text == SENTINEL => {
                        self.pending = Some(line);
                        self.state = SplitState::AwaitingCaptureHeader;
                        triplet.ends_at_boundary = true;
                        return Ok(Some(triplet));
                    }
                    Some(line) => triplet.payload.push(line),
                    None => {
                        self.state = SplitState::EndOfStream;
                        return Ok(Some(triplet));
                    }
                },
                SplitState::EndOfStream => return Ok(None),
            }
        }
    }

    fn read_line(&mut self) -> Result<Option<DecodedLine>, SplitError> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => Ok(None),
            Ok(_) => {
                self.line_no += 1;
                Ok(Some(DecodedLine::decode(&self.buf)))
            }
            Err(err) => {
                self.state = SplitState::EndOfStream;
                Err(SplitError::Io(err))
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordSplitter<R> {
    type Item = Result<Triplet, SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_triplet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordSplitter, SplitError, SplitState};
    use crate::{split_bytes, DecodedLine, SENTINEL};
    use pretty_assertions::assert_eq;

    fn record(uri: &str, payload: &[&str]) -> String {
        let mut out = format!(
            "WARC/1.0\r\nWARC-Type: response\r\nWARC-Target-URI: {uri}\r\n\r\n\
             HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n"
        );
        for line in payload {
            out.push_str(line);
            out.push_str("\r\n");
        }
        out.push_str("\r\n\r\n");
        out
    }

    fn texts(lines: &[DecodedLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn yields_one_triplet_per_record() {
        let uris = ["https://a.example/", "https://b.example/", "https://c.example/"];
        let stream: String = uris
            .iter()
            .map(|uri| record(uri, &["<html>", "<p>body</p>", "</html>"]))
            .collect();

        let triplets = split_bytes(stream.as_bytes()).unwrap();

        assert_eq!(triplets.len(), 3);
        for (triplet, uri) in triplets.iter().zip(uris) {
            assert!(!triplet.capture_header.is_empty());
            assert!(!triplet.transport_header.is_empty());
            assert_eq!(triplet.target_uri(), Some(uri));
        }
    }

    #[test]
    fn reproduces_blocks_line_for_line() {
        let stream = format!(
            "{}{}",
            record("https://a.example/", &["<p>one</p>", "<p>two</p>"]),
            record("https://b.example/", &["<p>three</p>"])
        );

        let triplets = split_bytes(stream.as_bytes()).unwrap();

        assert_eq!(
            texts(&triplets[0].capture_header),
            vec!["WARC/1.0", "WARC-Type: response", "WARC-Target-URI: https://a.example/"]
        );
        assert_eq!(
            texts(&triplets[0].transport_header),
            vec!["HTTP/1.1 200 OK", "Content-Type: text/html"]
        );
        assert_eq!(
            texts(&triplets[0].payload),
            vec!["<p>one</p>", "<p>two</p>", "", ""]
        );
        assert_eq!(texts(&triplets[1].payload), vec!["<p>three</p>", "", ""]);
    }

    #[test]
    fn carries_sentinel_into_next_header_exactly_once() {
        let stream = format!(
            "{}{}",
            record("https://a.example/", &["<p>one</p>"]),
            record("https://b.example/", &["<p>two</p>"])
        );

        let triplets = split_bytes(stream.as_bytes()).unwrap();

        assert!(triplets[0].ends_at_boundary);
        assert!(!triplets[1].ends_at_boundary);
        assert!(triplets
            .iter()
            .all(|triplet| triplet.payload.iter().all(|line| line.text != SENTINEL)));
        assert_eq!(triplets[1].capture_header[0].text, SENTINEL);
        let sentinels = triplets
            .iter()
            .flat_map(|triplet| &triplet.capture_header)
            .filter(|line| line.text == SENTINEL)
            .count();
        assert_eq!(sentinels, 2);
    }

    #[test]
    fn drops_triplet_cut_off_inside_headers() {
        let stream = format!(
            "{}WARC/1.0\r\nWARC-Type: response\r\n",
            record("https://a.example/", &["<p>one</p>"])
        );
        let mut splitter = RecordSplitter::new(stream.as_bytes());

        assert!(splitter.next_triplet().unwrap().is_some());
        assert!(splitter.next_triplet().unwrap().is_none());
        assert_eq!(splitter.state(), SplitState::EndOfStream);
    }

    #[test]
    fn reports_missing_capture_header_as_structural() {
        let mut splitter = RecordSplitter::new(&b"HTTP/1.1 200 OK\n\n<p>x</p>\n"[..]);

        let err = splitter.next_triplet().unwrap_err();
        assert!(err.is_structural());
        match err {
            SplitError::MissingCaptureHeader { line, found } => {
                assert_eq!(line, 1);
                assert_eq!(found, "HTTP/1.1 200 OK");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(splitter.next_triplet().unwrap().is_none());
    }

    #[test]
    fn reports_missing_transport_header_as_structural() {
        let stream = format!(
            "{}WARC/1.0\r\nWARC-Type: metadata\r\n\r\nfetchTimeMs: 120\r\n\r\n",
            record("https://a.example/", &["<p>one</p>"])
        );
        let mut splitter = RecordSplitter::new(stream.as_bytes());

        assert!(splitter.next_triplet().unwrap().is_some());
        let err = splitter.next_triplet().unwrap_err();
        assert!(err.is_structural());
        match err {
            SplitError::MissingTransportHeader { line, found } => {
                assert_eq!(line, 14);
                assert_eq!(found, "fetchTimeMs: 120");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(splitter.next_triplet().unwrap().is_none());
    }

    #[test]
    fn empty_stream_has_no_triplets() {
        assert!(split_bytes(b"").unwrap().is_empty());
    }

    #[test]
    fn accepts_pending_first_line() {
        let rest = b"WARC-Type: response\n\nHTTP/1.1 200 OK\n\n<p>x</p>\n";
        let mut splitter =
            RecordSplitter::with_pending(&rest[..], DecodedLine::new(SENTINEL));

        let triplet = splitter.next_triplet().unwrap().unwrap();
        assert_eq!(
            texts(&triplet.capture_header),
            vec!["WARC/1.0", "WARC-Type: response"]
        );
        assert_eq!(texts(&triplet.payload), vec!["<p>x</p>"]);
        assert_eq!(splitter.lines_read(), 5);
    }

    #[test]
    fn keeps_line_count_when_bytes_are_not_utf8() {
        let mut stream = b"WARC/1.0\nWARC-Type: response\n\nHTTP/1.1 200 OK\n\n".to_vec();
        stream.extend_from_slice(b"<p>caf\xe9</p>\n<p>ok</p>\n<p>na\xefve</p>\n");

        let triplets = split_bytes(&stream).unwrap();

        assert_eq!(
            texts(&triplets[0].payload),
            vec!["<p>café</p>", "<p>ok</p>", "<p>naïve</p>"]
        );
        assert_eq!(triplets[0].fallback_lines(), 2);
    }
}
