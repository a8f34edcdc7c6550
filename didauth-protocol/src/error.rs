//! Error types for message construction and token decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A compact token must be `header.payload.proof`.
    #[error("token must have 3 dot-separated segments, found {0}")]
    TokenSegments(usize),

    #[error("token {segment} is not valid base64url: {source}")]
    Encoding {
        segment: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("token {segment} is not valid json: {source}")]
    Json {
        segment: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported token media type '{0}'")]
    MediaType(String),

    #[error("invalid proof request: {0}")]
    ProofRequest(String),
}

impl ProtocolError {
    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::TokenSegments(_) => "TOKEN_SEGMENTS",
            ProtocolError::Encoding { .. } => "TOKEN_ENCODING",
            ProtocolError::Json { .. } => "TOKEN_JSON",
            ProtocolError::MediaType(_) => "TOKEN_MEDIA_TYPE",
            ProtocolError::ProofRequest(_) => "PROOF_REQUEST_INVALID",
        }
    }
}
