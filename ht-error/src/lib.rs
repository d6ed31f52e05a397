//! Unified error handling for hw-tagger
//!
//! This crate provides a single error type used across all hw-tagger components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using HwTaggerError
pub type Result<T> = std::result::Result<T, HwTaggerError>;

/// Unified error type for all hw-tagger operations
#[derive(thiserror::Error, Debug)]
pub enum HwTaggerError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("No usable cluster credentials: {0}")]
    Credentials(String),

    // ============================================================================
    // Device Subsystem Errors
    // ============================================================================
    #[error("Failed to enumerate {subsystem} devices: {reason}")]
    DeviceEnumeration {
        subsystem: String,
        reason: String,
    },

    #[error("Failed to open device monitor for {subsystem}: {reason}")]
    MonitorSocket {
        subsystem: String,
        reason: String,
    },

    #[error("Device monitor for {subsystem} failed: {reason}")]
    MonitorReceive {
        subsystem: String,
        reason: String,
    },

    #[error("Device watch on subsystem {0} finished")]
    MonitorClosed(String),

    // ============================================================================
    // Label Store Errors
    // ============================================================================
    #[error("Failed to fetch labels of {host}: {reason}")]
    LabelFetch {
        host: String,
        reason: String,
    },

    #[error("Failed to update labels of {host}: {reason}")]
    LabelUpdate {
        host: String,
        reason: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl HwTaggerError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn enumeration(subsystem: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceEnumeration {
            subsystem: subsystem.into(),
            reason: reason.to_string(),
        }
    }

    pub fn monitor_socket(subsystem: impl Into<String>, reason: impl ToString) -> Self {
        Self::MonitorSocket {
            subsystem: subsystem.into(),
            reason: reason.to_string(),
        }
    }

    pub fn monitor_receive(subsystem: impl Into<String>, reason: impl ToString) -> Self {
        Self::MonitorReceive {
            subsystem: subsystem.into(),
            reason: reason.to_string(),
        }
    }

    pub fn label_fetch(host: impl Into<String>, reason: impl ToString) -> Self {
        Self::LabelFetch {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    pub fn label_update(host: impl Into<String>, reason: impl ToString) -> Self {
        Self::LabelUpdate {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    /// Which collaborator the error originated from, for log fields
    pub fn source_kind(&self) -> &'static str {
        match self {
            Self::DeviceEnumeration { .. }
            | Self::MonitorSocket { .. }
            | Self::MonitorReceive { .. }
            | Self::MonitorClosed(_) => "device",
            Self::LabelFetch { .. } | Self::LabelUpdate { .. } => "label-store",
            Self::Config(_)
            | Self::InvalidConfig { .. }
            | Self::MissingConfig(_)
            | Self::Credentials(_)
            | Self::JsonParse(_) => "config",
            Self::Io(_) | Self::FileRead { .. } | Self::Generic(_) | Self::Task(_) => "internal",
        }
    }
}

// Allow converting from String to HwTaggerError
impl From<String> for HwTaggerError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to HwTaggerError
impl From<&str> for HwTaggerError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_closed_display() {
        let err = HwTaggerError::MonitorClosed("block".to_string());
        assert_eq!(err.to_string(), "Device watch on subsystem block finished");
        assert_eq!(err.source_kind(), "device");
    }

    #[test]
    fn test_label_update_display() {
        let err = HwTaggerError::label_update("node-1", "409 Conflict");
        assert_eq!(err.to_string(), "Failed to update labels of node-1: 409 Conflict");
        assert_eq!(err.source_kind(), "label-store");
    }

    #[test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "test");
        let err: HwTaggerError = io_err.into();
        assert!(matches!(err, HwTaggerError::Io(_)));
    }
}
