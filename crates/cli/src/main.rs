//! hybridrag CLI, the main entry point.
//!
//! Commands:
//! - `query`        Answer one question for one user
//! - `tools`        List the tool catalog
//! - `doctor`       Check config, secrets and backend health
//! - `init-schema`  Create graph indexes and constraints
//! - `config`       Print the default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "hybridrag",
    about = "hybridrag: question answering over a document graph and relational tables",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question using the graph and relational tools
    Query {
        /// E-mail address of the caller; scopes every graph lookup
        #[arg(short, long, env = "HYBRIDRAG_USER")]
        user: String,

        /// The question
        question: String,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tools offered to the reasoning model
    Tools {
        /// Load definitions from this directory instead of the configured one
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Diagnose configuration and backend health
    Doctor,

    /// Create graph indexes and constraints
    InitSchema,

    /// Print the default configuration as TOML
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Query { user, question, json } => {
            let code = commands::query::run(&user, &question, json).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Tools { dir } => commands::tools::run(dir).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::InitSchema => commands::doctor::init_schema().await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
