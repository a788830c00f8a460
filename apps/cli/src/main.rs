//! Rewritex CLI: ingest source articles and publish model-assisted rewrites.
//!
//! Pulls articles from the source site, finds reference articles for each,
//! and stores an improved derivative next to every original.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    match commands::run(cli).await {
        Err(report) => match commands::client_error(&report) {
            Some(err) => {
                eprintln!("error: {err}");
                std::process::exit(commands::CLIENT_ERROR_EXIT)
            }
            None => Err(report),
        },
        done => done,
    }
}
