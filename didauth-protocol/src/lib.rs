//! didauth-protocol
//!
//! Message model for the DID authorization flow used by the sign-in relay.
//!
//! The relay never proves or verifies anything itself. It only needs to build
//! authorization requests, attach a proof-request descriptor to them, and
//! decode the envelope of the wallet's response far enough to bind it back to
//! the request it answers. Everything cryptographic is left to the verifier.

pub mod error;
pub mod message;
pub mod proof_request;
pub mod token;

pub use error::ProtocolError;
pub use message::{
    create_authorization_request, AuthorizationRequestBody, AuthorizationRequestMessage,
    AuthorizationResponseBody, AuthorizationResponseMessage, ZeroKnowledgeProofResponse,
    AUTHORIZATION_REQUEST_MESSAGE_TYPE, AUTHORIZATION_RESPONSE_MESSAGE_TYPE, MEDIA_TYPE_PLAIN,
    MEDIA_TYPE_ZKP,
};
pub use proof_request::{
    circuits, ProofRequestBuilder, ZeroKnowledgeProofRequest, DEFAULT_KYC_CONTEXT,
};
pub use token::{JwzHeader, JwzToken};
