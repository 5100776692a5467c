//! Error types for nsleuth

use thiserror::Error;

/// nsleuth error types
///
/// Only three situations end a discovery run: the root network namespace
/// cannot be resolved, the process table cannot be listed, or the original
/// mount namespace cannot be restored after a switch. Everything else is
/// handled where it happens and never surfaces as one of these.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The root network namespace identity could not be resolved
    #[error("Root namespace error: {message}")]
    RootNamespace {
        /// Error message
        message: String,
    },

    /// The process table could not be read at all
    #[error("Process table error: {message}")]
    ProcessTable {
        /// Error message
        message: String,
    },

    /// Mount namespace switching failed in a way the run cannot survive
    #[error("Mount namespace error: {message}")]
    MountNamespace {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

/// Result type alias for nsleuth operations
pub type Result<T> = std::result::Result<T, Error>;
