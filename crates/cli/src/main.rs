//! `pdca`: run configured PDCA pipelines from the terminal.
//!
//! Pipelines, executors and global settings are read from the `.pdca/`
//! directory of the project root.

mod commands;
mod logging;
mod render;

use clap::{Parser, Subcommand};
use commands::run::RunArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pdca",
    version,
    about = "Plan-do-check-act pipeline orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the pipelines and executors defined under `.pdca/`.
    List {
        /// Project root containing `.pdca/` (defaults to the current directory).
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Run a pipeline to completion.
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    logging::init();

    let cli = Cli::parse();
    let succeeded = match cli.command {
        Command::List { root } => {
            commands::list::execute(root).await?;
            true
        }
        Command::Run(args) => commands::run::execute(args).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
