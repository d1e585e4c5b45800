//! Chunked parallel execution of per-file work items.

use futures_util::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = ".part";

/// One input file and the output it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// File name shared by input and output.
    pub label: String,
    /// Input file.
    pub input: PathBuf,
    /// Output file.
    pub output: PathBuf,
}

/// Work items found in a directory.
#[derive(Debug, Default)]
pub struct WorkList {
    /// Items to run, sorted by label.
    pub items: Vec<WorkItem>,
    /// Items skipped because their output already existed.
    pub skipped: usize,
}

/// Lists the regular files of `input_dir` as work items writing to
/// `{output_dir}/{name}`.
///
/// Leftover partial downloads are ignored. With `skip_existing`, items whose
/// output is present are counted but not returned.
pub fn collect_work_items(
    input_dir: &Path,
    output_dir: &Path,
    skip_existing: bool,
) -> io::Result<WorkList> {
    let mut list = WorkList::default();
    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(label) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "skipping non-utf8 file name");
            continue;
        };
        if label.ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        let output = output_dir.join(&label);
        if skip_existing && output.exists() {
            debug!(path = %output.display(), "output already present");
            list.skipped += 1;
            continue;
        }
        list.items.push(WorkItem {
            label,
            input: entry.path(),
            output,
        });
    }
    list.items.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(list)
}

/// A work item that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Item label.
    pub label: String,
    /// Error or panic description.
    pub message: String,
}

/// Outcome of a chunked run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Size of every chunk, in execution order.
    pub chunk_sizes: Vec<usize>,
    /// Labels of items that finished successfully.
    pub completed: Vec<String>,
    /// Items that failed or panicked.
    pub failures: Vec<ItemFailure>,
    /// Items skipped before the run.
    pub skipped: usize,
}

impl BatchReport {
    /// Prints a run summary to stdout.
    pub fn report(&self, stage: &str, elapsed: Duration) {
        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        let done = self.completed.len();
        println!("--- {stage} summary ({secs:.2}s) ---");
        println!("chunks: {}", self.chunk_sizes.len());
        println!("items completed: {done}");
        println!("items/sec: {:.2}", done as f32 / secs);
        println!("items skipped: {}", self.skipped);
        println!("items failed: {}", self.failures.len());
        for failure in &self.failures {
            println!("  {}: {}", failure.label, failure.message);
        }
    }
}

/// Runs `op` over `items` in contiguous chunks of `parallelism`.
///
/// Every item of a chunk runs as its own task; the next chunk starts once
/// the whole chunk has finished. Failures are recorded and never cancel
/// sibling items or later chunks.
pub async fn run_in_chunks<F, Fut, E>(
    items: Vec<WorkItem>,
    parallelism: usize,
    op: F,
) -> BatchReport
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let chunk_size = parallelism.max(1);
    let mut report = BatchReport::default();
    let total_chunks = items.len().div_ceil(chunk_size);

    for (index, chunk) in items.chunks(chunk_size).enumerate() {
        info!(chunk = index + 1, of = total_chunks, items = chunk.len(), "starting chunk");
        report.chunk_sizes.push(chunk.len());

        let handles: Vec<_> = chunk
            .iter()
            .map(|item| tokio::spawn(op(item.clone())))
            .collect();
        let results = join_all(handles).await;

        for (item, result) in chunk.iter().zip(results) {
            match result {
                Ok(Ok(())) => report.completed.push(item.label.clone()),
                Ok(Err(err)) => {
                    warn!(item = %item.label, %err, "work item failed");
                    report.failures.push(ItemFailure {
                        label: item.label.clone(),
                        message: err.to_string(),
                    });
                }
                Err(join_err) => {
                    warn!(item = %item.label, %join_err, "work item panicked");
                    report.failures.push(ItemFailure {
                        label: item.label.clone(),
                        message: format!("task failed: {join_err}"),
                    });
                }
            }
        }
    }
    report
}
