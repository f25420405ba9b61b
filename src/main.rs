// bio-mcp-bwa - Main Entry Point
//
// Runs the BWA aligner behind an MCP stdio server, or drives single
// operations from the command line. Stdout belongs to the protocol (or the
// printed result), so all logging goes to stderr.

use anyhow::{Context, Result};
use bio_mcp_bwa::config::{Config, LoggingConfig};
use bio_mcp_bwa::mcp::{tool_list, McpServer};
use bio_mcp_bwa::metrics_server;
use bio_mcp_bwa::tools::ToolDispatcher;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// MCP server for the BWA short-read aligner
#[derive(Parser, Debug)]
#[command(name = "bio-mcp-bwa")]
#[command(version)]
#[command(about = "Expose BWA index/mem/aln/samse/sampe as MCP tools", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Command to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,
    /// Print the tool catalog as JSON
    Tools,
    /// Run a single operation and print its result as JSON
    Call {
        /// Operation name, e.g. bwa_mem
        operation: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let (logging, rejected) = LoggingConfig::parse_env();
    init_tracing(&logging, args.verbose)?;
    for message in rejected {
        warn!("{message}");
    }

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Tools => print_tools(),
        Commands::Call { operation, args } => call(&operation, &args).await,
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        logging.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

async fn serve() -> Result<()> {
    info!("bio-mcp-bwa v{} starting", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(Config::resolve().context("Failed to resolve configuration")?);

    if let Some(port) = config.server.metrics_port {
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let max_concurrent = config.server.max_concurrent;
    McpServer::new(ToolDispatcher::new(config), max_concurrent)
        .serve_stdio()
        .await
}

fn print_tools() -> Result<()> {
    let tools = serde_json::to_string_pretty(&tool_list()).context("Failed to render tools")?;
    println!("{tools}");
    Ok(())
}

async fn call(operation: &str, raw_args: &str) -> Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(raw_args).context("--args must be valid JSON")?;
    let config = Arc::new(Config::resolve().context("Failed to resolve configuration")?);

    let result = ToolDispatcher::new(config).dispatch(operation, &arguments).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to render result")?
    );

    if !result.is_success() {
        anyhow::bail!("{}", result.summary());
    }
    Ok(())
}
