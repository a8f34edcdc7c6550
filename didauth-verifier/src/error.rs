//! Error types for authorization response verification.

use std::time::Duration;

use didauth_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerificationError {
    /// The payload is not a decodable authorization response.
    #[error("malformed authorization response: {0}")]
    Malformed(#[from] ProtocolError),

    /// The response was decoded and checked, and it does not hold.
    #[error("authorization response rejected: {0}")]
    Rejected(String),

    /// The verifier could not reach a decision (network, RPC, key loading).
    #[error("verifier unavailable: {0}")]
    Unavailable(String),

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
}

impl VerificationError {
    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            VerificationError::Malformed(_) => "MALFORMED_RESPONSE",
            VerificationError::Rejected(_) => "VERIFICATION_FAILED",
            VerificationError::Unavailable(_) => "VERIFIER_UNAVAILABLE",
            VerificationError::Timeout(_) => "VERIFIER_TIMEOUT",
        }
    }

    /// Whether the session stays open for another callback.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationError::Malformed(_) | VerificationError::Unavailable(_)
        )
    }
}
