//! Grove CLI entry point

use clap::{Parser, Subcommand};
use grove_core::Language;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Build a code graph of a TypeScript, JavaScript, PHP or Ruby repository", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Flags that override `grove.toml`.
#[derive(clap::Args, Debug, Default)]
pub struct ParseArgs {
    /// Walk dependency directories (node_modules, vendor, ...)
    #[arg(long)]
    include_node_modules: bool,

    /// Include test files
    #[arg(long)]
    include_tests: bool,

    /// Emit edges for type-only imports
    #[arg(long)]
    include_type_imports: bool,

    /// Maximum directory depth; files in the root are depth 1
    #[arg(long)]
    max_depth: Option<usize>,

    /// Glob of repo-relative paths to exclude (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Skip detection and use this language's backend
    #[arg(long)]
    language: Option<Language>,

    /// Concurrent interpreter processes
    #[arg(long)]
    jobs: Option<usize>,

    /// Per-file interpreter timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(long, value_name = "PATH")]
    php_bin: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    ruby_bin: Option<PathBuf>,

    /// Composer autoloader providing nikic/php-parser
    #[arg(long, value_name = "PATH")]
    php_autoload: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a repository and print its code graph as JSON
    Parse {
        /// Repository root
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        args: ParseArgs,

        /// Print `{ success, data | message }` instead of failing
        #[arg(long)]
        safe: bool,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,

        /// Write the JSON to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect the dominant language of a repository
    Detect {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        safe: bool,
    },
    /// Report which parser runtimes are installed
    Probe,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "grove={log_level},grove_core={log_level},grove_indexer={log_level}"
        ))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Parse {
            path,
            args,
            safe,
            pretty,
            output,
        } => commands::parse(path, args, safe, pretty, output).await,
        Commands::Detect { path, safe } => commands::detect(path, safe),
        Commands::Probe => commands::probe(),
        Commands::Version => {
            println!("Grove v{} ({})", env!("CARGO_PKG_VERSION"), grove_core::PARSER_VERSION);
            Ok(())
        }
    }
}
