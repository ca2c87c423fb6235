//! CLI error handling with user-friendly messages.

use std::fmt;
use std::path::PathBuf;
use std::process;

use fetchstack::{ConfigError, DownloadError, TransportError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be used
    Config(ConfigError),
    /// Failed to create the Tokio runtime
    Runtime(std::io::Error),
    /// Failed to create the HTTP transport
    Transport(TransportError),
    /// A URL argument was rejected or the batch could not start
    Download(DownloadError),
    /// Failed to create the output directory
    OutputDir { path: PathBuf, error: std::io::Error },
    /// Failed to install the Ctrl-C handler
    Signal(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Download(DownloadError::DuplicateStack { .. }) = self {
            eprintln!();
            eprintln!("Each stack name may only be in flight once; pick another --stack.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to create Tokio runtime: {}", e),
            CliError::Transport(e) => write!(f, "Failed to create HTTP transport: {}", e),
            CliError::Download(e) => write!(f, "{}", e),
            CliError::OutputDir { path, error } => {
                write!(
                    f,
                    "Failed to create output directory '{}': {}",
                    path.display(),
                    error
                )
            }
            CliError::Signal(msg) => write!(f, "Failed to install Ctrl-C handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Download(e) => Some(e),
            CliError::OutputDir { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}
