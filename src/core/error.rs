use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom error types for the ECHONET Lite engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Short message while reading {stage}: need {needed} bytes, {remaining} left")]
    ShortMessage {
        /// Frame section that could not be read
        stage: &'static str,
        /// Bytes the section requires
        needed: usize,
        /// Bytes that were still available
        remaining: usize,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedFrame(msg.into())
    }

    /// Creates a new short message error for the given stage
    pub fn short(stage: &'static str, needed: usize, remaining: usize) -> Self {
        Error::ShortMessage {
            stage,
            needed,
            remaining,
        }
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true for errors produced while decoding a single frame.
    ///
    /// These never affect anything beyond the discarded frame.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::MalformedFrame(_) | Error::ShortMessage { .. })
    }

    /// Returns true if this is a request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::protocol("test error");
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: test error");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_short_message_names_stage() {
        let err = Error::short("property data", 3, 1);
        assert!(err.is_decode_error());
        assert_eq!(
            err.to_string(),
            "Short message while reading property data: need 3 bytes, 1 left"
        );
    }

    #[test]
    fn test_timeout_is_distinct() {
        let err = Error::Timeout(Duration::from_millis(500));
        assert!(err.is_timeout());
        assert!(!err.is_decode_error());
        assert!(!Error::network("down").is_timeout());
    }
}
