// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for system-level operations
///
/// Variants that concern a backend carry its display identity (usually the
/// path) and, where relevant, the absolute sector involved.
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Cannot open {backend}: {source}")]
    OpenFailed {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} is not open")]
    NotOpen { backend: String },

    #[error("{count} sectors at offset {offset} are outside the {length} sectors of {backend}")]
    BoundsViolation {
        backend: String,
        offset: i64,
        count: i64,
        length: i64,
    },

    #[error("I/O error on {backend} at sector {sector}: {source}")]
    SectorIo {
        backend: String,
        sector: i64,
        #[source]
        source: std::io::Error,
    },

    #[error("Short {op} on {backend} at sector {sector}: {actual} of {expected} bytes")]
    ShortTransfer {
        backend: String,
        op: &'static str,
        sector: i64,
        expected: usize,
        actual: usize,
    },

    #[error("Length mismatch: {requested} sectors requested, source holds {available}")]
    LengthMismatch { requested: i64, available: i64 },

    #[error("Operation cancelled after {sectors_transferred} sectors")]
    Cancelled { sectors_transferred: i64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid mountinfo line: {0}")]
    InvalidMountInfoLine(String),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Required tool not found: {0}")]
    ToolMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Coarse classification of a `SysError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    OpenFailure,
    BoundsViolation,
    IoFailure,
    LengthMismatch,
    Cancelled,
    Other,
}

impl SysError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PermissionDenied(_) | Self::DeviceNotFound(_) | Self::OpenFailed { .. } => {
                ErrorClass::OpenFailure
            }
            Self::BoundsViolation { .. } => ErrorClass::BoundsViolation,
            Self::Io(_) | Self::SectorIo { .. } | Self::ShortTransfer { .. } => {
                ErrorClass::IoFailure
            }
            Self::LengthMismatch { .. } => ErrorClass::LengthMismatch,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
            _ => ErrorClass::Other,
        }
    }

    /// Map an `open(2)` failure for `backend` onto the matching variant.
    pub(crate) fn from_open(backend: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                SysError::PermissionDenied(format!("Cannot open {backend}"))
            }
            std::io::ErrorKind::NotFound => SysError::DeviceNotFound(backend.to_string()),
            _ => SysError::OpenFailed {
                backend: backend.to_string(),
                source: error,
            },
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
