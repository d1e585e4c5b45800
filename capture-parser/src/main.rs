use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use capture_parser::{RecordSplitter, Triplet};
use clap::Parser;
use serde::Serialize;

/// Print one JSON summary line per (capture header, transport header, payload) triplet.
#[derive(Parser, Debug)]
#[command(name = "capture-parser", version, about)]
struct Args {
    /// Decompressed capture file, or `-` for stdin
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Also print the decoded payload text
    #[arg(long)]
    payload: bool,
}

#[derive(Serialize)]
struct TripletSummary<'a> {
    index: usize,
    target_uri: Option<&'a str>,
    capture_header_lines: usize,
    transport_header_lines: usize,
    payload_lines: usize,
    fallback_lines: usize,
    ends_at_boundary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

impl<'a> TripletSummary<'a> {
    fn new(index: usize, triplet: &'a Triplet, with_payload: bool) -> Self {
        Self {
            index,
            target_uri: triplet.target_uri(),
            capture_header_lines: triplet.capture_header.len(),
            transport_header_lines: triplet.transport_header.len(),
            payload_lines: triplet.payload.len(),
            fallback_lines: triplet.fallback_lines(),
            ends_at_boundary: triplet.ends_at_boundary,
            payload: with_payload.then(|| triplet.payload_text()),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.input.as_os_str() == "-" {
        return summarize(io::stdin().lock(), args.payload);
    }
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {:?}", args.input))?;
    summarize(BufReader::new(file), args.payload)
}

fn summarize<R: BufRead>(reader: R, with_payload: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    for (index, triplet) in RecordSplitter::new(reader).enumerate() {
        let triplet = triplet?;
        let json = serde_json::to_string(&TripletSummary::new(index, &triplet, with_payload))?;
        writeln!(out, "{json}").context("failed to write stdout")?;
    }
    Ok(())
}
