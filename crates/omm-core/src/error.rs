//! Typed error definitions for the OMM access layer.
//!
//! [`OmmError`] separates usage errors (raised synchronously at the offending
//! call) from handle errors and allocation failures. All variants implement
//! `std::error::Error` via `thiserror`, so they compose with `anyhow::Result`
//! in binaries.

use thiserror::Error;

/// Sub-classification of [`OmmError::InvalidUsage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageErrorCode {
    /// A request or message carried an invalid field.
    InvalidArgument,
    /// The operation is not supported on this kind of stream.
    InvalidOperation,
    /// Internal resource exhaustion (e.g. no stream id left).
    InternalError,
    /// No channel is available to carry the message.
    NoActiveChannel,
    /// The transport refused the submit.
    FailureOperation,
}

impl std::fmt::Display for UsageErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "InvalidArgument"),
            Self::InvalidOperation => write!(f, "InvalidOperation"),
            Self::InternalError => write!(f, "InternalError"),
            Self::NoActiveChannel => write!(f, "NoActiveChannel"),
            Self::FailureOperation => write!(f, "FailureOperation"),
        }
    }
}

/// Domain-specific errors for the OMM access layer.
#[derive(Debug, Error)]
pub enum OmmError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The caller used the API incorrectly.
    #[error("invalid usage ({code}): {text}")]
    InvalidUsage { text: String, code: UsageErrorCode },

    /// The handle does not refer to a live item.
    #[error("invalid handle {handle}: {text}")]
    InvalidHandle { handle: u64, text: String },

    /// A core object could not be created. Not recoverable. Reserved for
    /// embedders whose allocators can fail; nothing in this workspace raises it.
    #[error("memory exhaustion: {0}")]
    MemoryExhaustion(String),

    /// The transport rejected a submit or is not connected.
    #[error("transport error: {0}")]
    Transport(String),
}

impl OmmError {
    pub fn usage(text: impl Into<String>, code: UsageErrorCode) -> Self {
        Self::InvalidUsage { text: text.into(), code }
    }

    pub fn invalid_handle(handle: u64, text: impl Into<String>) -> Self {
        Self::InvalidHandle { handle, text: text.into() }
    }

    /// Usage error code, if this is a usage error.
    pub fn usage_code(&self) -> Option<UsageErrorCode> {
        match self {
            Self::InvalidUsage { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Error text without the variant prefix.
    pub fn text(&self) -> &str {
        match self {
            Self::Config(t) | Self::MemoryExhaustion(t) | Self::Transport(t) => t,
            Self::InvalidUsage { text, .. } | Self::InvalidHandle { text, .. } => text,
        }
    }
}

/// Result alias used throughout the library crates.
pub type OmmResult<T> = Result<T, OmmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_error_display() {
        let e = OmmError::usage("Invalid attempt to close batch stream. ", UsageErrorCode::InvalidOperation);
        assert_eq!(e.to_string(), "invalid usage (InvalidOperation): Invalid attempt to close batch stream. ");
        assert_eq!(e.usage_code(), Some(UsageErrorCode::InvalidOperation));
    }

    #[test]
    fn handle_error_text() {
        let e = OmmError::invalid_handle(42, "Attempt to use invalid Handle on reissue(). ");
        assert_eq!(e.text(), "Attempt to use invalid Handle on reissue(). ");
        assert!(e.usage_code().is_none());
        assert!(e.to_string().starts_with("invalid handle 42"));
    }
}
