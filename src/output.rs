//! Writers for the annotated and plain-text extraction artifacts.

use capture_parser::Triplet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const PLAIN_SUFFIX: &str = "txt";

/// The two artifacts produced for one capture file.
///
/// The annotated artifact repeats both header blocks before the retained
/// text of each triplet; the plain artifact holds the retained text only.
/// Every block is followed by a blank line.
pub struct OutputPair<W: Write> {
    annotated: W,
    plain: W,
    written: usize,
}

impl OutputPair<BufWriter<File>> {
    /// Creates `annotated` and its `.txt` sibling, truncating both.
    pub fn create(annotated: &Path) -> io::Result<Self> {
        Ok(Self::new(
            BufWriter::new(File::create(annotated)?),
            BufWriter::new(File::create(plain_path(annotated))?),
        ))
    }
}

impl<W: Write> OutputPair<W> {
    /// Wraps two writers.
    pub fn new(annotated: W, plain: W) -> Self {
        Self {
            annotated,
            plain,
            written: 0,
        }
    }

    /// Appends one triplet's retained lines to both artifacts.
    ///
    /// An empty `retained` slice writes nothing.
    pub fn write_triplet(&mut self, triplet: &Triplet, retained: &[String]) -> io::Result<()> {
        if retained.is_empty() {
            return Ok(());
        }
        for line in &triplet.capture_header {
            writeln!(self.annotated, "{}", line.text)?;
        }
        writeln!(self.annotated)?;
        for line in &triplet.transport_header {
            writeln!(self.annotated, "{}", line.text)?;
        }
        writeln!(self.annotated)?;
        for line in retained {
            writeln!(self.annotated, "{line}")?;
            writeln!(self.plain, "{line}")?;
        }
        writeln!(self.annotated)?;
        writeln!(self.plain)?;
        self.written += 1;
        Ok(())
    }

    /// Triplets written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes both writers and hands them back.
    pub fn finish(mut self) -> io::Result<(W, W)> {
        self.annotated.flush()?;
        self.plain.flush()?;
        Ok((self.annotated, self.plain))
    }
}

/// Path of the plain-text artifact that accompanies `annotated`.
pub fn plain_path(annotated: &Path) -> PathBuf {
    let mut name = annotated.as_os_str().to_owned();
    name.push(".");
    name.push(PLAIN_SUFFIX);
    PathBuf::from(name)
}
