//! Command-line surface and the settings derived from it.

use crate::boilerplate::JustextConfig;
use crate::extract::ExtractSettings;
use crate::fetch::DEFAULT_OBJECT_STORE;
use crate::index::{IndexSettings, OverloadRetry, DEFAULT_API_HEAD, DEFAULT_INDEX_ROOT};
use crate::language::DEFAULT_LANGUAGE_MODEL_DIR;
use crate::stoplist::DEFAULT_STOPLIST_DIR;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line interface of the `ccsieve` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ccsieve",
    version,
    about = "Search, fetch and extract text from web-crawl archives"
)]
pub struct Cli {
    /// Stage to run
    #[command(subcommand)]
    pub command: Command,

    /// Index listing page scanned for snapshot endpoints
    #[arg(long, global = true, env = "CCSIEVE_INDEX_ROOT", default_value = DEFAULT_INDEX_ROOT)]
    pub index_root: String,

    /// Prefix snapshot ids are appended to when querying
    #[arg(long, global = true, env = "CCSIEVE_API_HEAD", default_value = DEFAULT_API_HEAD)]
    pub api_head: String,

    /// Object store holding the compressed capture files
    #[arg(long, global = true, env = "CCSIEVE_OBJECT_STORE", default_value = DEFAULT_OBJECT_STORE)]
    pub object_store: String,

    /// Directory with `<lang>.txt` stopword lists
    #[arg(long, global = true, env = "CCSIEVE_STOPLIST_DIR", default_value = DEFAULT_STOPLIST_DIR)]
    pub stoplist_dir: PathBuf,

    /// Language model directory used by --lang-include / --lang-exclude
    #[arg(
        long,
        global = true,
        env = "CCSIEVE_LANGUAGE_MODEL",
        default_value = DEFAULT_LANGUAGE_MODEL_DIR
    )]
    pub language_model: PathBuf,

    /// First delay after an index overload response
    #[arg(long, global = true, env = "CCSIEVE_OVERLOAD_INITIAL_SECS", default_value_t = 30)]
    pub overload_initial_secs: u64,

    /// Largest delay between overload retries
    #[arg(long, global = true, env = "CCSIEVE_OVERLOAD_CEILING_SECS", default_value_t = 600)]
    pub overload_ceiling_secs: u64,

    /// Per-request HTTP timeout
    #[arg(long, global = true, env = "CCSIEVE_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    /// Log at debug level unless CCSIEVE_LOG / RUST_LOG say otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Pipeline stages; exactly one runs per invocation.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Query every index snapshot for a URL pattern
    Search(SearchArgs),
    /// Fetch the records listed in search results
    Fetch(FetchArgs),
    /// Extract filtered text from fetched capture files
    Extract(ExtractArgs),
}

/// Arguments of `ccsieve search`.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// URL pattern, e.g. `*.nl`
    pub pattern: String,
    /// Directory receiving one result file per snapshot
    pub out_dir: PathBuf,
    /// Keep result files from an earlier run
    #[arg(long)]
    pub skip_existing: bool,
}

/// Arguments of `ccsieve fetch`.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Directory of search result files
    pub search_dir: PathBuf,
    /// Directory receiving one capture file per result file
    pub out_dir: PathBuf,
    /// Files processed concurrently
    #[arg(default_value_t = 1)]
    pub parallelism: usize,
    /// Keep capture files from an earlier run
    #[arg(long)]
    pub skip_existing: bool,
}

/// Arguments of `ccsieve extract`.
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Directory of fetched capture files
    pub fetch_dir: PathBuf,
    /// Directory receiving the annotated and `.txt` artifacts
    pub out_dir: PathBuf,
    /// Files processed concurrently
    #[arg(default_value_t = 1)]
    pub parallelism: usize,
    /// Stopword list used for paragraph classification
    #[arg(long, env = "CCSIEVE_STOPLIST_LANG")]
    pub stoplist_lang: Option<String>,
    /// Keep lines identified as this language
    #[arg(long, env = "CCSIEVE_LANG_INCLUDE")]
    pub lang_include: Option<String>,
    /// Keep lines not identified as this language
    #[arg(long, env = "CCSIEVE_LANG_EXCLUDE")]
    pub lang_exclude: Option<String>,
    /// Keep artifacts from an earlier run
    #[arg(long)]
    pub skip_existing: bool,
}

impl Cli {
    /// Index location and overload policy.
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            index_root: self.index_root.clone(),
            api_head: self.api_head.clone(),
            retry: OverloadRetry {
                initial: Duration::from_secs(self.overload_initial_secs),
                ceiling: Duration::from_secs(
                    self.overload_ceiling_secs.max(self.overload_initial_secs),
                ),
            },
        }
    }

    /// Extraction settings for `args`.
    pub fn extract_settings(&self, args: &ExtractArgs) -> ExtractSettings {
        ExtractSettings {
            stoplist_dir: self.stoplist_dir.clone(),
            stoplist_lang: args.stoplist_lang.clone(),
            language_model: self.language_model.clone(),
            lang_include: args.lang_include.clone(),
            lang_exclude: args.lang_exclude.clone(),
            justext: JustextConfig::default(),
        }
    }

    /// Per-request HTTP timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
