//! Tapline CLI - query and inspect data service catalogs.
//!
//! Every command works on a service catalog file. `query` and `stream` run
//! SQL against it in-process; `services`, `explain` and `validate` only
//! inspect it.

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tapline data service tool.
///
/// Runs SQL queries against the services of a catalog and checks catalogs
/// for mistakes.
#[derive(Parser)]
#[command(name = "tapline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Service catalog (JSON)
    #[arg(long, short, global = true, default_value = "services.json")]
    catalog: PathBuf,

    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Suppress info messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Output format options.
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Limits and parameters shared by the query commands.
#[derive(clap::Args)]
struct QueryArgs {
    /// SQL query, e.g. "SELECT * FROM people WHERE age > 30"
    sql: String,

    /// Maximum rows to read from the service (0 = unlimited)
    #[arg(long)]
    max_rows: Option<u64>,

    /// Time limit in milliseconds (0 = unlimited)
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Pipeline parameter, as NAME=VALUE (repeatable)
    #[arg(long = "param", short = 'p', value_parser = commands::parse_param)]
    params: Vec<(String, String)>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List the services of the catalog
    Services,

    /// Run a query and print the rows
    Query(QueryArgs),

    /// Show what each optimization would do for a query
    Explain(QueryArgs),

    /// Check the catalog for mistakes
    Validate,

    /// Run a query and write the binary result stream
    Stream {
        #[command(flatten)]
        query: QueryArgs,

        /// Output file; standard output when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with query output.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else if !cli.quiet {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let ctx = commands::Context {
        catalog: cli.catalog,
        config: cli.config,
        format: cli.format,
        quiet: cli.quiet,
    };
    let result = match cli.command {
        Commands::Services => commands::services::run(&ctx),
        Commands::Query(args) => commands::query::run(&ctx, &args),
        Commands::Explain(args) => commands::explain::run(&ctx, &args),
        Commands::Validate => commands::validate::run(&ctx),
        Commands::Stream { query, output } => commands::stream::run(&ctx, &query, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
