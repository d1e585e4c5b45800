use anyhow::Result;
use ccsieve::{logging, Cli};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    ccsieve::run(cli)
}
