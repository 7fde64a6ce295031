//! Unified error handling for Pifan
//!
//! This crate provides the single error type shared by the fan controller,
//! its hardware adapters and the `pifand` binary.

use std::io;
use std::path::PathBuf;

/// Result type alias using PifanError
pub type Result<T> = std::result::Result<T, PifanError>;

/// Unified error type for all Pifan operations
#[derive(thiserror::Error, Debug)]
pub enum PifanError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("Failed to read duty file {path}: {source}")]
    DutyRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Invalid duty file {path}: {reason}")]
    DutyParse {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write status file {path}: {source}")]
    StatusWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Not connected to GPIO hardware: {0}")]
    NotConnected(String),

    #[error("Hardware {op} failed on GPIO {pin}: {reason}")]
    Hardware {
        op: &'static str,
        pin: u8,
        reason: String,
    },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    // ============================================================================
    // Settings Errors
    // ============================================================================
    #[error("Failed to read settings {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: String,
    },
}

impl PifanError {
    /// Create a hardware error for an operation on a pin
    pub fn hardware(op: &'static str, pin: u8, reason: impl ToString) -> Self {
        Self::Hardware {
            op,
            pin,
            reason: reason.to_string(),
        }
    }

    /// Create a duty parse error
    pub fn duty_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DutyParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid setting error
    pub fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
