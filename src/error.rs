//! Error handling for scopecore
//!
//! This module defines the crate-wide error type and a Result alias. Most
//! failures at this layer are recoverable: callers log them and degrade
//! (skip a stream, skip a filter, retry an arm) rather than unwinding the
//! whole session.

use thiserror::Error;

/// Main error type for scopecore operations
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Malformed waveform body or sample buffer
    #[error("Codec error: {0}")]
    Codec(String),

    /// Waveform format tag not understood by this version
    #[error("Unknown waveform format \"{0}\"")]
    UnknownFormat(String),

    /// A waveform whose sample arrays disagree in length
    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors (session documents, metadata)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An instrument rejected or failed a command
    #[error("Instrument {nickname}: {message}")]
    Instrument { nickname: String, message: String },

    /// A secondary instrument never confirmed arming
    #[error("Timeout waiting for instrument {nickname} to arm")]
    ArmTimeout { nickname: String },

    /// The filter graph contains a dependency cycle
    #[error("Cycle detected in filter graph involving {filters:?}")]
    CycleDetected { filters: Vec<String> },

    /// No factory registered for a filter protocol name
    #[error("Unknown filter protocol \"{0}\"")]
    UnknownFilter(String),

    /// A filter parameter name not recognised by the filter
    #[error("Unknown parameter \"{name}\" for filter {protocol}")]
    UnknownParameter { protocol: String, name: String },

    /// A session document referenced an id with no object behind it
    #[error("Unresolved session reference {0}")]
    UnresolvedReference(u32),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScopeError>,
    },
}

impl ScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build an instrument error
    pub fn instrument(nickname: impl Into<String>, message: impl Into<String>) -> Self {
        ScopeError::Instrument {
            nickname: nickname.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for ScopeError {
    fn from(err: serde_yaml::Error) -> Self {
        ScopeError::Serialization(err.to_string())
    }
}

/// Result type alias for scopecore operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ScopeError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ScopeError::Io(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScopeError::UnknownFormat("sparsev9".to_string());
        assert_eq!(err.to_string(), "Unknown waveform format \"sparsev9\"");
    }

    #[test]
    fn test_error_with_context() {
        let err = ScopeError::Codec("short buffer".to_string());
        let with_ctx = err.with_context("Failed to load channel_0.bin");
        assert!(with_ctx.to_string().contains("Failed to load channel_0.bin"));
        assert!(with_ctx.to_string().contains("short buffer"));
    }

    #[test]
    fn test_io_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = res.context("opening body").unwrap_err();
        assert!(err.to_string().starts_with("opening body"));
    }

    #[test]
    fn test_arm_timeout_names_instrument() {
        let err = ScopeError::ArmTimeout {
            nickname: "scope2".to_string(),
        };
        assert!(err.to_string().contains("scope2"));
    }
}
