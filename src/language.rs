//! Per-line language identification and the include/exclude filter.

use crate::stoplist::{StoplistError, StopwordSet};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Directory scanned for language profiles when none is configured.
pub const DEFAULT_LANGUAGE_MODEL_DIR: &str = "stoplists";

const PROFILE_EXTENSION: &str = "txt";

/// Predicted language of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguagePrediction {
    /// Short language code, e.g. `nl`.
    pub code: String,
    /// Share of the line's words that supported the prediction.
    pub confidence: f32,
}

/// Predicts the language of a single line of text.
pub trait LanguageIdentifier: Send + Sync {
    /// Returns `None` when the line carries no usable signal.
    fn identify(&self, line: &str) -> Option<LanguagePrediction>;
}

/// Errors surfaced while loading a language model.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// The model directory could not be listed.
    #[error("failed to read language model directory {path:?}: {source}")]
    Directory {
        /// Model directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// One profile failed to load.
    #[error(transparent)]
    Profile(#[from] StoplistError),
    /// No profiles were found.
    #[error("no language profiles in {0:?}")]
    NoProfiles(PathBuf),
}

/// Stopword-frequency language model.
///
/// Each `<code>.txt` file in the model directory is one profile. A line is
/// assigned to the profile matching the most of its words; ties go to the
/// alphabetically first code.
#[derive(Debug, Clone, Default)]
pub struct StopwordLanguageModel {
    profiles: BTreeMap<String, StopwordSet>,
}

impl StopwordLanguageModel {
    /// Builds a model from in-memory profiles.
    pub fn from_profiles<I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = (String, StopwordSet)>,
    {
        Self {
            profiles: profiles.into_iter().collect(),
        }
    }

    /// Loads every `*.txt` profile under `dir`.
    pub fn load(dir: &Path) -> Result<Self, LanguageModelError> {
        let entries = fs::read_dir(dir).map_err(|source| LanguageModelError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut profiles = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| LanguageModelError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            let Some(code) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            profiles.insert(code.to_string(), StopwordSet::load_file(&path)?);
        }
        if profiles.is_empty() {
            return Err(LanguageModelError::NoProfiles(dir.to_path_buf()));
        }
        Ok(Self { profiles })
    }

    /// Language codes known to the model, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl LanguageIdentifier for StopwordLanguageModel {
    fn identify(&self, line: &str) -> Option<LanguagePrediction> {
        let words: Vec<String> = line
            .split(|ch: char| !ch.is_alphabetic() && ch != '\'')
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&str, usize)> = None;
        for (code, profile) in &self.profiles {
            let hits = words.iter().filter(|word| profile.contains(word)).count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((code.as_str(), hits));
            }
        }
        best.map(|(code, hits)| LanguagePrediction {
            code: code.to_string(),
            confidence: hits as f32 / words.len() as f32,
        })
    }
}

/// Loads the model at `dir`, or logs a warning and returns `None`.
pub fn load_language_model(dir: &Path) -> Option<Arc<dyn LanguageIdentifier>> {
    match StopwordLanguageModel::load(dir) {
        Ok(model) => {
            info!(
                path = %dir.display(),
                languages = model.profiles.len(),
                "loaded language model"
            );
            Some(Arc::new(model))
        }
        Err(err) => {
            warn!(path = %dir.display(), %err, "language model unavailable, filtering disabled");
            None
        }
    }
}

/// Keeps or drops lines by predicted language.
///
/// With both codes set a line survives when it matches `include` or differs
/// from `exclude`. Lines the model cannot place count as matching neither.
#[derive(Clone, Default)]
pub struct LanguageFilter {
    include: Option<String>,
    exclude: Option<String>,
    model: Option<Arc<dyn LanguageIdentifier>>,
}

impl LanguageFilter {
    /// Creates a filter; without a model every line is retained.
    pub fn new(
        include: Option<String>,
        exclude: Option<String>,
        model: Option<Arc<dyn LanguageIdentifier>>,
    ) -> Self {
        Self {
            include,
            exclude,
            model,
        }
    }

    /// A filter that retains everything.
    pub fn pass_through() -> Self {
        Self::default()
    }

    /// True when lines are actually inspected.
    pub fn is_active(&self) -> bool {
        self.model.is_some() && (self.include.is_some() || self.exclude.is_some())
    }

    /// Decides whether `line` is retained.
    pub fn retains(&self, line: &str) -> bool {
        let Some(model) = self.model.as_ref() else {
            return true;
        };
        if self.include.is_none() && self.exclude.is_none() {
            return true;
        }
        let code = model.identify(line).map(|prediction| prediction.code);
        let included = matches!(
            (&self.include, &code),
            (Some(wanted), Some(code)) if wanted == code
        );
        let not_excluded = match (&self.exclude, &code) {
            (Some(unwanted), Some(code)) => unwanted != code,
            (Some(_), None) => true,
            (None, _) => false,
        };
        included || not_excluded
    }
}

impl fmt::Debug for LanguageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageFilter")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("model", &self.model.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model() -> StopwordLanguageModel {
        StopwordLanguageModel::from_profiles([
            (
                "en".to_string(),
                StopwordSet::from_words(["the", "and", "is", "of", "a"]),
            ),
            (
                "nl".to_string(),
                StopwordSet::from_words(["de", "het", "en", "is", "een", "van"]),
            ),
        ])
    }

    fn filter(include: Option<&str>, exclude: Option<&str>) -> LanguageFilter {
        LanguageFilter::new(
            include.map(str::to_string),
            exclude.map(str::to_string),
            Some(Arc::new(model())),
        )
    }

    const ENGLISH: &str = "The cat is on the roof of a house";
    const DUTCH: &str = "De kat zit op het dak van een huis";

    #[test]
    fn identifies_by_stopword_hits() {
        let model = model();
        assert_eq!(model.identify(ENGLISH).unwrap().code, "en");
        assert_eq!(model.identify(DUTCH).unwrap().code, "nl");
        assert_eq!(model.identify("1234 5678"), None);
        assert_eq!(model.identify("xyzzy plugh"), None);
    }

    #[test]
    fn ties_go_to_first_code() {
        let prediction = model().identify("is").unwrap();
        assert_eq!(prediction.code, "en");
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn include_keeps_only_matching_lines() {
        let filter = filter(Some("nl"), None);
        assert!(filter.retains(DUTCH));
        assert!(!filter.retains(ENGLISH));
        assert!(!filter.retains("xyzzy"));
    }

    #[test]
    fn exclude_drops_only_matching_lines() {
        let filter = filter(None, Some("en"));
        assert!(filter.retains(DUTCH));
        assert!(!filter.retains(ENGLISH));
        assert!(filter.retains("xyzzy"));
    }

    #[test]
    fn include_and_exclude_combine_with_or() {
        let filter = filter(Some("nl"), Some("nl"));
        assert!(filter.retains(DUTCH));
        assert!(filter.retains(ENGLISH));

        let filter = self::filter(Some("en"), Some("en"));
        assert!(filter.retains(ENGLISH));
        assert!(filter.retains(DUTCH));
    }

    #[test]
    fn without_codes_or_model_everything_passes() {
        assert!(filter(None, None).retains(ENGLISH));
        let no_model = LanguageFilter::new(Some("nl".into()), None, None);
        assert!(!no_model.is_active());
        assert!(no_model.retains(ENGLISH));
        assert!(LanguageFilter::pass_through().retains(DUTCH));
    }

    #[test]
    fn loads_profiles_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en.txt"), "the\nand\n").unwrap();
        fs::write(dir.path().join("nl.txt"), "de\nhet\n").unwrap();
        fs::write(dir.path().join("README"), "not a profile").unwrap();

        let model = StopwordLanguageModel::load(dir.path()).unwrap();
        assert_eq!(model.languages().collect::<Vec<_>>(), vec!["en", "nl"]);
    }

    #[test]
    fn missing_model_disables_filtering() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StopwordLanguageModel::load(dir.path()),
            Err(LanguageModelError::NoProfiles(_))
        ));
        assert!(load_language_model(&dir.path().join("absent")).is_none());
    }
}
