//! Stage runner: builds the runtime and HTTP client, then drives one stage.

use crate::batch::{collect_work_items, run_in_chunks, BatchReport, WorkItem};
use crate::controls::{Cli, Command, ExtractArgs, FetchArgs, SearchArgs};
use crate::extract::Extractor;
use crate::fetch::SegmentFetcher;
use crate::index::IndexClient;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("ccsieve/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 5;

/// Runs the stage selected on the command line to completion.
///
/// Fails when the stage cannot start or when any work item failed; the
/// summary is printed either way.
pub fn run(cli: Cli) -> Result<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Search(args) => run_search(&cli, args).await,
        Command::Fetch(args) => run_fetch(&cli, args).await,
        Command::Extract(args) => run_extract(&cli, args).await,
    }
}

/// HTTP client shared by every request of a run.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

async fn run_search(cli: &Cli, args: &SearchArgs) -> Result<()> {
    let start = Instant::now();
    let index = IndexClient::new(build_client(cli.timeout())?, cli.index_settings());
    let summary = index
        .search_all(&args.pattern, &args.out_dir, args.skip_existing)
        .await
        .with_context(|| format!("search for {:?} failed", args.pattern))?;

    let secs = start.elapsed().as_secs_f32();
    println!("--- search summary ({secs:.2}s) ---");
    println!("endpoints: {}", summary.endpoints);
    println!("queried: {}", summary.queried);
    println!("skipped: {}", summary.skipped);
    println!("records: {}", summary.records);
    println!("done, results in {}; run `ccsieve fetch` next", args.out_dir.display());
    Ok(())
}

async fn run_fetch(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let start = Instant::now();
    let (items, skipped) =
        prepare_items(&args.search_dir, &args.out_dir, args.skip_existing).await?;
    let fetcher = SegmentFetcher::new(build_client(cli.timeout())?, cli.object_store.as_str());

    let mut report = run_in_chunks(items, args.parallelism, |item: WorkItem| {
        let fetcher = fetcher.clone();
        async move {
            info!(input = %item.input.display(), output = %item.output.display(), "fetching");
            fetcher
                .fetch_search_file(&item.input, &item.output)
                .await
                .map(|_| ())
        }
    })
    .await;
    report.skipped = skipped;
    finish("fetch", &report, start.elapsed())
}

async fn run_extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let start = Instant::now();
    let settings = cli.extract_settings(args);
    let extractor = Arc::new(
        Extractor::from_settings(&settings).context("failed to prepare extraction")?,
    );
    let (items, skipped) =
        prepare_items(&args.fetch_dir, &args.out_dir, args.skip_existing).await?;

    let mut report = run_in_chunks(items, args.parallelism, |item: WorkItem| {
        let extractor = Arc::clone(&extractor);
        async move {
            info!(input = %item.input.display(), output = %item.output.display(), "extracting");
            let summary = tokio::task::spawn_blocking(move || {
                extractor.extract_file(&item.input, &item.output)
            })
            .await
            .context("extraction task failed")??;
            if summary.truncated {
                debug!(triplets = summary.triplets, "capture file ended at a malformed record");
            }
            Ok::<(), anyhow::Error>(())
        }
    })
    .await;
    report.skipped = skipped;
    finish("extract", &report, start.elapsed())
}

async fn prepare_items(
    input_dir: &Path,
    output_dir: &Path,
    skip_existing: bool,
) -> Result<(Vec<WorkItem>, usize)> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create {:?}", output_dir))?;
    let list = collect_work_items(input_dir, output_dir, skip_existing)
        .with_context(|| format!("failed to list {:?}", input_dir))?;
    info!(
        items = list.items.len(),
        skipped = list.skipped,
        input = %input_dir.display(),
        "collected work items"
    );
    Ok((list.items, list.skipped))
}

fn finish(stage: &str, report: &BatchReport, elapsed: Duration) -> Result<()> {
    report.report(stage, elapsed);
    if !report.failures.is_empty() {
        let attempted = report.failures.len() + report.completed.len();
        bail!("{} of {attempted} {stage} items failed", report.failures.len());
    }
    Ok(())
}
