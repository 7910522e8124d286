//! Failure taxonomy for a generation run.
//!
//! Every failure surfaced to a caller is one of these kinds. A raised error
//! is terminal for the invocation; retrying is the caller's decision.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// The staged diff was empty. Checked before any provider call.
    #[error("no staged changes found; modify or stage files before generating a commit message")]
    NoChanges,

    /// No credential configured for a cloud provider. Checked before any
    /// network call; the message names the missing environment variable.
    #[error("{0}")]
    ApiKeyMissing(String),

    /// The provider rejected the configured credential.
    #[error("{0}")]
    ApiKeyInvalid(String),

    /// The provider reported a rate or quota limit.
    #[error("{0}")]
    QuotaExceeded(String),

    /// Catch-all: network failures, malformed or empty responses, and
    /// provider errors that match no known pattern.
    #[error("{0}")]
    Request(String),
}

impl GenerateError {
    /// Process exit code for the CLI, one per failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            GenerateError::NoChanges => 3,
            GenerateError::ApiKeyMissing(_) => 10,
            GenerateError::ApiKeyInvalid(_) => 11,
            GenerateError::QuotaExceeded(_) => 12,
            GenerateError::Request(_) => 13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            GenerateError::NoChanges,
            GenerateError::ApiKeyMissing(String::new()),
            GenerateError::ApiKeyInvalid(String::new()),
            GenerateError::QuotaExceeded(String::new()),
            GenerateError::Request(String::new()),
        ];
        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
