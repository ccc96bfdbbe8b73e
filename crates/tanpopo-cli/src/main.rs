mod bootstrap_helpers;
mod cli_args;
mod runtime_setup;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;

use crate::{bootstrap_helpers::init_tracing, cli_args::Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let report = runtime_setup::run(cli).await?;
    info!(
        pairs = report.outcomes.len(),
        failed = report.failed_pairs(),
        preconditions = report.precondition_failures.len(),
        "finished"
    );
    if report.is_failure() {
        if let Some(first) = report.precondition_failures.first() {
            bail!("{first}");
        }
        bail!(
            "all {} task applications failed",
            report.outcomes.len()
        );
    }
    Ok(())
}
