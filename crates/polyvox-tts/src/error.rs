//! Error taxonomy shared by all synthesis backends

use std::time::Duration;
use thiserror::Error;

/// Synthesis error taxonomy.
///
/// Variants carry owned strings (no source errors) so a single failure
/// can be cloned out to every waiter attached to a deduplicated queue
/// entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// Engine unreachable or not installed
    #[error("Synthesis backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend quota exhausted; retry is a caller decision
    #[error("Rate limited by synthesis backend")]
    RateLimited {
        /// Backend-suggested wait, when it reported one
        retry_after: Option<Duration>,
    },

    /// Voice missing, malformed, or not translatable to the target engine
    #[error("Invalid voice: {0}")]
    InvalidVoice(String),

    /// Backend call exceeded its deadline
    #[error("Synthesis timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Text rejected before reaching any backend
    #[error("Invalid text input: {0}")]
    InvalidInput(String),

    /// Waiter detached, or the entry was cleared from the queue
    #[error("Request cancelled")]
    Cancelled,
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_clone_for_fanout() {
        let err = SynthesisError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        let copies: Vec<SynthesisError> = (0..3).map(|_| err.clone()).collect();
        assert!(copies.iter().all(|e| *e == err));
    }

    #[test]
    fn display_names_the_reason() {
        let err = SynthesisError::InvalidVoice("no faithful translation".into());
        assert!(err.to_string().contains("Invalid voice"));
    }
}
