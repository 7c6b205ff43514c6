//! Globeview CLI - inspect globe viewports and stream their tiles
//!
//! ```text
//! globeview viewport --lng 13.4 --lat 52.5 --zoom 6
//! globeview fetch --lng 13.4 --lat 52.5 --zoom 6 --output-dir tiles/
//! globeview config list
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use globeview::logging::{init_logging, LoggingConfig};

use commands::common::ViewportArgs;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "globeview", version, about = "Globe viewport and tile streaming tools")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to a daily file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the visible region and tile box for a camera
    Viewport {
        #[command(flatten)]
        viewport: ViewportArgs,
    },

    /// Load the tiles one frame needs from the configured provider
    Fetch {
        #[command(flatten)]
        viewport: ViewportArgs,

        /// Write best-available tile images here as PNG
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Give up waiting for loads after this many seconds
        #[arg(long, default_value_t = 60)]
        max_wait: u64,
    },

    /// View or edit the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    logging.log_dir = cli.log_dir;
    // Dropping the guard flushes the file writer, so hold it until exit.
    let _guard = init_logging(&logging)?;

    match cli.command {
        Commands::Viewport { viewport } => commands::viewport::run(viewport),
        Commands::Fetch {
            viewport,
            output_dir,
            max_wait,
        } => commands::fetch::run(FetchArgs {
            viewport,
            output_dir,
            max_wait_secs: max_wait,
        }),
        Commands::Config { command } => commands::config::run(command),
    }
}
