//! CLI error type.

use std::fmt;

use globeview::config::ConfigError;
use globeview::logging::LoggingError;
use globeview::provider::ProviderError;
use globeview::viewport::ViewportError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad or unreadable configuration
    Config(String),
    /// Viewport arguments violate a camera constraint
    Viewport(ViewportError),
    /// Provider could not be created
    Provider(ProviderError),
    /// Logging setup failed
    Logging(String),
    /// Async runtime could not start
    Runtime(String),
    /// Writing output files failed
    Output(std::io::Error),
    /// One or more tiles failed to load
    TilesFailed(usize),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Viewport(_) => 3,
            CliError::Provider(_) | CliError::TilesFailed(_) => 4,
            CliError::Logging(_) | CliError::Runtime(_) | CliError::Output(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Viewport(e) => write!(f, "Invalid viewport: {}", e),
            CliError::Provider(e) => write!(f, "Provider error: {}", e),
            CliError::Logging(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to start async runtime: {}", msg),
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
            CliError::TilesFailed(n) => write!(f, "{} tile(s) failed to load", n),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ViewportError> for CliError {
    fn from(e: ViewportError) -> Self {
        CliError::Viewport(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Provider(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Output(e)
    }
}
