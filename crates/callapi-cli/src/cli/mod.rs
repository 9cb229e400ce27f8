//! CLI for callapi: send retrying HTTP calls from the shell.

mod commands;

use anyhow::Result;
use callapi_core::config;
use clap::{Parser, Subcommand};

use commands::{run_config, run_get, run_send, SendArgs};

/// Top-level CLI for callapi.
#[derive(Debug, Parser)]
#[command(name = "callapi")]
#[command(about = "callapi: cancellable HTTP calls with exponential backoff on 429/5xx", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start a call, print its final state. Ctrl-C cancels it.
    Send {
        /// HTTP method (GET, POST, PUT, ...).
        method: String,
        /// Target URL.
        url: String,
        /// Request header as "Name: value". Repeatable.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
        /// Request body; "@path" reads it from a file.
        #[arg(short = 'd', long)]
        data: Option<String>,
        /// Cancel the call if it has not stopped after SECS seconds.
        #[arg(long, value_name = "SECS")]
        cancel_after: Option<f64>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// GET a URL and wait for the result (retries on 429/5xx).
    Get {
        /// Target URL.
        url: String,
        /// Request header as "Name: value". Repeatable.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Show the config file path and effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Send {
                method,
                url,
                headers,
                data,
                cancel_after,
                json,
            } => {
                let args = SendArgs {
                    method,
                    url,
                    headers,
                    data,
                    cancel_after,
                    json,
                };
                run_send(&cfg, args).await?
            }
            CliCommand::Get { url, headers } => run_get(&cfg, &url, &headers).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}
