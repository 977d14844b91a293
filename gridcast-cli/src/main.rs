//! Binary crate for the `gridcast` command-line tool and HTTP service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving the forecast routes over HTTP
//! - Interactive provider configuration
//! - Human-friendly output formatting

use clap::Parser;

mod cli;
mod logging;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    logging::init(cmd.log_json);
    cmd.run().await
}
