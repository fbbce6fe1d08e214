//! Error types for replflash

// This warning is a false positive from thiserror macro expansion
#![allow(unused_assignments)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::remote::RemotePath;
use crate::transport::RemoteError;

/// Result type alias for replflash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for replflash
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String, help: String },

    /// A local source file or directory could not be read
    #[error("Failed to read {path}: {source}")]
    #[diagnostic(help("Check that the file exists and is readable"))]
    LocalIo {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remote statement failed outside of a file transfer
    #[error("Remote error: {0}")]
    #[diagnostic(help("Re-run the same command; directory creation and erasure are idempotent"))]
    Remote(#[from] RemoteError),

    /// A remote statement failed while a file was being transferred
    #[error("Failed to transfer {local} to {remote}: {source}")]
    #[diagnostic(help(
        "The remote file may be partially written. Re-run the deployment to overwrite it"
    ))]
    Transfer {
        local: Utf8PathBuf,
        remote: RemotePath,
        #[source]
        source: RemoteError,
    },

    /// The request was rejected before any session was opened
    #[error("Invalid request: {message}")]
    Precondition { message: String, help: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a local I/O error for `path`
    pub fn local_io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Create a transfer error for the file in flight
    pub fn transfer(
        local: impl Into<Utf8PathBuf>,
        remote: &RemotePath,
        source: RemoteError,
    ) -> Self {
        Self::Transfer {
            local: local.into(),
            remote: remote.clone(),
            source,
        }
    }

    /// Whether this error was raised before touching the device
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}
