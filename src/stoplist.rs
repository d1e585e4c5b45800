//! Stopword lists used by boilerplate classification.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding one `<lang>.txt` list per language.
pub const DEFAULT_STOPLIST_DIR: &str = "stoplists";

/// Errors surfaced while loading a stopword list.
#[derive(Debug, Error)]
pub enum StoplistError {
    /// The list file could not be read.
    #[error("failed to read stoplist {path:?}: {source}")]
    Read {
        /// List file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The list exists but holds no words.
    #[error("stoplist {0:?} is empty")]
    Empty(PathBuf),
}

/// Lowercased stopwords for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    /// Builds a set from arbitrary words; they are trimmed and lowercased.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Self { words }
    }

    /// Parses list text: one word per line, `#` starts a comment.
    pub fn parse(text: &str) -> Self {
        Self::from_words(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or_default()),
        )
    }

    /// Loads `{dir}/{language}.txt`.
    pub fn load(dir: &Path, language: &str) -> Result<Self, StoplistError> {
        let path = list_path(dir, language);
        Self::load_file(&path)
    }

    /// Loads a single list file.
    pub fn load_file(path: &Path) -> Result<Self, StoplistError> {
        let text = fs::read_to_string(path).map_err(|source| StoplistError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::parse(&text);
        if set.is_empty() {
            return Err(StoplistError::Empty(path.to_path_buf()));
        }
        Ok(set)
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, word: &str) -> bool {
        if self.words.contains(word) {
            return true;
        }
        self.words.contains(&word.to_lowercase())
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when the set holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Path of the list for `language` inside `dir`.
pub fn list_path(dir: &Path, language: &str) -> PathBuf {
    dir.join(format!("{language}.txt"))
}
