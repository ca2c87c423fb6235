//! fetchstack CLI - Command-line interface
//!
//! Downloads a set of URLs concurrently as one stack.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use fetchstack::logging::default_log_dir;

use commands::get::{self, GetArgs, Outcome, DEFAULT_STACK_NAME};

/// Exit code after Ctrl-C, following the shell convention for SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "fetchstack")]
#[command(version, about = "Concurrent HTTP downloads grouped into stacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download URLs concurrently as one stack
    Get {
        /// URLs to download (http or https)
        #[arg(required = true)]
        urls: Vec<String>,

        /// Name of the stack
        #[arg(long, default_value = DEFAULT_STACK_NAME)]
        stack: String,

        /// Collect the URLs in a queue first, then perform the queue
        #[arg(long)]
        queue: bool,

        /// Directory to write response bodies to (not written if omitted)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Maximum concurrent downloads (0 for unlimited)
        #[arg(long)]
        max_active: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the log file
        #[arg(long, default_value = default_log_dir())]
        log_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Get {
            urls,
            stack,
            queue,
            output_dir,
            max_active,
            timeout,
            config,
            log_dir,
        } => get::run(GetArgs {
            urls,
            stack,
            queue,
            output_dir,
            max_active,
            timeout,
            config,
            log_dir,
        }),
    };

    match result {
        Ok(Outcome::Completed { failed: 0 }) => {}
        Ok(Outcome::Completed { .. }) => process::exit(1),
        Ok(Outcome::Cancelled) => process::exit(EXIT_INTERRUPTED),
        Err(e) => e.exit(),
    }
}
