//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

/// Installs a formatting subscriber writing to stderr
///
/// Returns false when a global subscriber is already set, in which case
/// the existing one stays in place.
pub fn init_logging(level: tracing::Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging(tracing::Level::DEBUG);
        assert!(!init_logging(tracing::Level::TRACE));
    }
}
