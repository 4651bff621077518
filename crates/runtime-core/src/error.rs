//! Error types for the distributed training runtime

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the distributed training runtime
#[derive(Error, Debug)]
pub enum Error {
    // Communication errors
    #[error("Communication error: {message}")]
    Communication { message: String },

    #[error("Invalid root rank {root} for group of size {size}")]
    InvalidRoot { root: usize, size: usize },

    #[error("Invalid rank {rank} for group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("Scatter count mismatch: counts describe {expected} elements, got {actual}")]
    ScatterCountMismatch { expected: usize, actual: usize },

    #[error("Communication group poisoned by a failed rank")]
    GroupPoisoned,

    // Filesystem errors
    #[error("Directory unreadable: {path:?} - {reason}")]
    DirectoryUnreadable { path: PathBuf, reason: String },

    #[error("Shard unreadable: {path:?} - {reason}")]
    ShardUnreadable { path: PathBuf, reason: String },

    // Data errors
    #[error("Malformed shard {path:?} at line {line}: {message}")]
    DataFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Label {value} in row {row} is not a class index")]
    InvalidLabel { row: usize, value: f32 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Parallelism configuration is locked")]
    ParallelismLocked,

    #[error("Finish signal already set")]
    FinishSignalAlreadySet,

    // Model errors
    #[error("Model error: {message}")]
    Model { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidRoot { .. }
                | Error::InvalidRank { .. }
                | Error::ScatterCountMismatch { .. }
                | Error::GroupPoisoned
                | Error::DataFormat { .. }
                | Error::ShapeMismatch { .. }
                | Error::InvalidLabel { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }

    /// Returns true if a root-local failure of this kind is downgraded to an
    /// empty result so that the group's collectives still complete
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::DirectoryUnreadable { .. } | Error::ShardUnreadable { .. } | Error::Io(_)
        )
    }
}

/// Errors are cloned when one rank's failure is reported to the whole
/// group. `Io` keeps its kind and message but not its source.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Communication { message } => Error::Communication {
                message: message.clone(),
            },
            Error::InvalidRoot { root, size } => Error::InvalidRoot {
                root: *root,
                size: *size,
            },
            Error::InvalidRank { rank, size } => Error::InvalidRank {
                rank: *rank,
                size: *size,
            },
            Error::ScatterCountMismatch { expected, actual } => Error::ScatterCountMismatch {
                expected: *expected,
                actual: *actual,
            },
            Error::GroupPoisoned => Error::GroupPoisoned,
            Error::DirectoryUnreadable { path, reason } => Error::DirectoryUnreadable {
                path: path.clone(),
                reason: reason.clone(),
            },
            Error::ShardUnreadable { path, reason } => Error::ShardUnreadable {
                path: path.clone(),
                reason: reason.clone(),
            },
            Error::DataFormat {
                path,
                line,
                message,
            } => Error::DataFormat {
                path: path.clone(),
                line: *line,
                message: message.clone(),
            },
            Error::ShapeMismatch {
                context,
                expected,
                actual,
            } => Error::ShapeMismatch {
                context: context.clone(),
                expected: *expected,
                actual: *actual,
            },
            Error::InvalidLabel { row, value } => Error::InvalidLabel {
                row: *row,
                value: *value,
            },
            Error::InvalidConfig { message } => Error::InvalidConfig {
                message: message.clone(),
            },
            Error::ParallelismLocked => Error::ParallelismLocked,
            Error::FinishSignalAlreadySet => Error::FinishSignalAlreadySet,
            Error::Model { message } => Error::Model {
                message: message.clone(),
            },
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Serialization(message) => Error::Serialization(message.clone()),
            Error::Internal { message } => Error::Internal {
                message: message.clone(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
