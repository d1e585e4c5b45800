//! Boilerplate removal and language filtering over split capture files.

use crate::boilerplate::{BoilerplateRemover, JustextConfig, ParagraphClassifier};
use crate::language::{load_language_model, LanguageFilter, DEFAULT_LANGUAGE_MODEL_DIR};
use crate::output::{plain_path, OutputPair};
use crate::stoplist::{StoplistError, StopwordSet, DEFAULT_STOPLIST_DIR};
use capture_parser::{DecodedLine, RecordSplitter, SplitError};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Inputs needed to build an [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Directory holding `<lang>.txt` stopword lists.
    pub stoplist_dir: PathBuf,
    /// Stopword language; `None` classifies with an empty set.
    pub stoplist_lang: Option<String>,
    /// Language model directory.
    pub language_model: PathBuf,
    /// Keep lines identified as this language.
    pub lang_include: Option<String>,
    /// Keep lines not identified as this language.
    pub lang_exclude: Option<String>,
    /// Paragraph classification thresholds.
    pub justext: JustextConfig,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            stoplist_dir: PathBuf::from(DEFAULT_STOPLIST_DIR),
            stoplist_lang: None,
            language_model: PathBuf::from(DEFAULT_LANGUAGE_MODEL_DIR),
            lang_include: None,
            lang_exclude: None,
            justext: JustextConfig::default(),
        }
    }
}

/// Counters for one extracted capture file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Triplets read from the capture file.
    pub triplets: usize,
    /// Triplets with retained text.
    pub retained: usize,
    /// Triplets that contributed nothing.
    pub dropped: usize,
    /// Lines decoded with the ISO-8859-1 fallback.
    pub fallback_lines: usize,
    /// The file stopped at a structural error.
    pub truncated: bool,
}

/// Errors that fail one extraction work item.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The configured stopword list is unusable.
    #[error(transparent)]
    Stoplist(#[from] StoplistError),
    /// Reading the capture file failed mid-stream.
    #[error("failed to read {path:?}: {source}")]
    Split {
        /// Capture file.
        path: PathBuf,
        /// Splitter error.
        source: SplitError,
    },
    /// Opening input or writing output failed.
    #[error("i/o error on {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Turns capture payloads into retained text lines.
///
/// Built once per run and shared read-only by every worker.
pub struct Extractor {
    stopwords: StopwordSet,
    remover: Arc<dyn BoilerplateRemover>,
    justext: JustextConfig,
    filter: LanguageFilter,
}

impl Extractor {
    /// Assembles an extractor from explicit collaborators.
    pub fn new(
        stopwords: StopwordSet,
        remover: Arc<dyn BoilerplateRemover>,
        justext: JustextConfig,
        filter: LanguageFilter,
    ) -> Self {
        Self {
            stopwords,
            remover,
            justext,
            filter,
        }
    }

    /// Loads stopwords and, when a language filter is requested, the model.
    ///
    /// A missing stopword list is an error; a missing model only disables
    /// language filtering.
    pub fn from_settings(settings: &ExtractSettings) -> Result<Self, ExtractError> {
        let stopwords = match settings.stoplist_lang.as_deref() {
            Some(lang) => StopwordSet::load(&settings.stoplist_dir, lang)?,
            None => StopwordSet::default(),
        };
        let filtering = settings.lang_include.is_some() || settings.lang_exclude.is_some();
        let model = if filtering {
            load_language_model(&settings.language_model)
        } else {
            None
        };
        let filter = LanguageFilter::new(
            settings.lang_include.clone(),
            settings.lang_exclude.clone(),
            model,
        );
        debug!(
            stopwords = stopwords.len(),
            filtering = filter.is_active(),
            "extractor ready"
        );
        Ok(Self::new(
            stopwords,
            Arc::new(ParagraphClassifier),
            settings.justext,
            filter,
        ))
    }

    /// Retained text lines for one payload, in document order.
    pub fn extract(&self, payload: &[DecodedLine]) -> Vec<String> {
        let html = payload
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let paragraphs = match self.remover.classify(&html, &self.stopwords, &self.justext) {
            Ok(paragraphs) => paragraphs,
            Err(err) => {
                debug!(%err, "boilerplate removal failed, dropping payload");
                return Vec::new();
            }
        };

        paragraphs
            .iter()
            .filter(|paragraph| !paragraph.is_boilerplate())
            .flat_map(|paragraph| paragraph.text.lines())
            .filter(|line| self.filter.retains(line))
            .map(str::to_string)
            .collect()
    }

    /// Splits `input`, extracts every triplet and writes the artifacts at
    /// `output` and `output.txt`.
    ///
    /// A structural split error ends the file early with `truncated` set.
    /// I/O errors remove both artifacts.
    pub fn extract_file(&self, input: &Path, output: &Path) -> Result<ExtractSummary, ExtractError> {
        let result = self.write_artifacts(input, output);
        if result.is_err() {
            let _ = fs::remove_file(output);
            let _ = fs::remove_file(plain_path(output));
        }
        result
    }

    fn write_artifacts(&self, input: &Path, output: &Path) -> Result<ExtractSummary, ExtractError> {
        let file = File::open(input).map_err(|source| io_error(input, source))?;
        let mut splitter = RecordSplitter::new(BufReader::new(file));
        let mut artifacts = OutputPair::create(output).map_err(|source| io_error(output, source))?;
        let mut summary = ExtractSummary::default();

        loop {
            let triplet = match splitter.next_triplet() {
                Ok(Some(triplet)) => triplet,
                Ok(None) => break,
                Err(err) if err.is_structural() => {
                    warn!(input = %input.display(), %err, "stopping at malformed record");
                    summary.truncated = true;
                    break;
                }
                Err(source) => {
                    return Err(ExtractError::Split {
                        path: input.to_path_buf(),
                        source,
                    })
                }
            };

            summary.triplets += 1;
            let fallback_lines = triplet.fallback_lines();
            if fallback_lines > 0 {
                debug!(
                    input = %input.display(),
                    uri = triplet.target_uri().unwrap_or("-"),
                    lines = fallback_lines,
                    "decoded lines as ISO-8859-1"
                );
            }
            summary.fallback_lines += fallback_lines;
            let retained = self.extract(&triplet.payload);
            if retained.is_empty() {
                summary.dropped += 1;
                continue;
            }
            artifacts
                .write_triplet(&triplet, &retained)
                .map_err(|source| io_error(output, source))?;
            summary.retained += 1;
        }

        artifacts
            .finish()
            .map_err(|source| io_error(output, source))?;
        info!(
            input = %input.display(),
            triplets = summary.triplets,
            retained = summary.retained,
            fallback_lines = summary.fallback_lines,
            truncated = summary.truncated,
            "extracted capture file"
        );
        Ok(summary)
    }
}

fn io_error(path: &Path, source: io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}
