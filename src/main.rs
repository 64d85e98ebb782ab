use std::process::ExitCode;

use anyhow::Result;
use bursar::cli::{Cli, init_logger};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if cli.run().await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
