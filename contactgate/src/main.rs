//! contactgate command-line tool.
//!
//! Runs one guardrailed tool call against the contact and configuration
//! databases and prints the JSON response.
//!
//! # Security Guarantees
//! - Every value reaches a database as a bound parameter
//! - Sensitive columns are redacted before printing
//! - Connection strings are sanitized in every log line and error

use anyhow::Context;
use clap::Parser;
use contactgate::{Cli, Command, read_tool_arguments, tool_listing};
use contactgate_core::logging::init_logging;
use contactgate_core::ToolRouter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_json)
        .context("Failed to initialize logging")?;

    match &cli.command {
        Command::Tools => {
            for line in tool_listing() {
                println!("{line}");
            }
            Ok(())
        }
        Command::Check => {
            info!("Testing backend connections...");
            let engine = cli.engine.connect().context("Failed to configure backends")?;
            engine.test_connections().await.map_err(|e| {
                error!("Connection test failed: {}", e);
                e
            })?;
            println!("Primary and configuration backends reachable");
            Ok(())
        }
        Command::Call(args) => {
            let arguments = read_tool_arguments(args)?;
            let engine = cli.engine.connect().context("Failed to configure backends")?;
            let router = ToolRouter::new(engine);

            let response = router.respond(&args.tool, arguments).await;
            let rendered = if args.pretty {
                serde_json::to_string_pretty(&response)
            } else {
                serde_json::to_string(&response)
            }
            .context("Failed to render response")?;
            println!("{rendered}");

            if response.get("error").is_some() {
                std::process::exit(2);
            }
            Ok(())
        }
    }
}
