#![warn(missing_docs)]
//! Locate, fetch and extract clean text from web-crawl archive captures.
//!
//! The pipeline has three stages, each driven by one `ccsieve` subcommand:
//! index search ([`index`]), byte-range fetching ([`fetch`]) and text
//! extraction ([`extract`]). Capture files are split into records by the
//! `capture-parser` workspace crate.

pub mod batch;
pub mod boilerplate;
pub mod controls;
pub mod extract;
pub mod fetch;
pub mod html;
pub mod index;
pub mod language;
pub mod logging;
pub mod output;
pub mod runtime;
pub mod stoplist;

pub use batch::{collect_work_items, run_in_chunks, BatchReport, ItemFailure, WorkItem};
pub use boilerplate::{
    BoilerplateError, BoilerplateRemover, JustextConfig, Paragraph, ParagraphClass,
    ParagraphClassifier,
};
pub use capture_parser::{DecodedLine, RecordSplitter, SplitError, Triplet};
pub use controls::{Cli, Command};
pub use extract::{ExtractError, ExtractSettings, ExtractSummary, Extractor};
pub use fetch::{FetchError, FetchSummary, SegmentFetcher};
pub use index::{
    IndexClient, IndexEndpoint, IndexError, IndexSettings, OverloadRetry, SearchRecord,
    SearchSummary,
};
pub use language::{
    LanguageFilter, LanguageIdentifier, LanguageModelError, LanguagePrediction,
    StopwordLanguageModel,
};
pub use runtime::run;
pub use stoplist::{StoplistError, StopwordSet};
