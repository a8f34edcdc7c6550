//! Authorization request and response messages.
//!
//! Field names follow the iden3comm JSON encoding so wallets can consume the
//! issued requests unchanged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proof_request::ZeroKnowledgeProofRequest;

pub const AUTHORIZATION_REQUEST_MESSAGE_TYPE: &str =
    "https://iden3-communication.io/authorization/1.0/request";
pub const AUTHORIZATION_RESPONSE_MESSAGE_TYPE: &str =
    "https://iden3-communication.io/authorization/1.0/response";

/// Media type of an unsigned, unencrypted message.
pub const MEDIA_TYPE_PLAIN: &str = "application/iden3comm-plain-json";
/// Media type of a zero-knowledge-proof wrapped token.
pub const MEDIA_TYPE_ZKP: &str = "application/iden3-zkp-json";

/// Message asking a holder to authenticate and present the proofs in `scope`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequestMessage {
    pub id: String,
    pub typ: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "thid")]
    pub thread_id: String,
    pub body: AuthorizationRequestBody,
    /// Audience: the verifier's DID.
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequestBody {
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub scope: Vec<ZeroKnowledgeProofRequest>,
}

impl AuthorizationRequestMessage {
    /// Attach a proof request to the message scope.
    pub fn with_scope(mut self, request: ZeroKnowledgeProofRequest) -> Self {
        self.body.scope.push(request);
        self
    }
}

/// Build a basic authorization request with fresh request and thread IDs.
///
/// `audience` is the verifier DID placed in `from`; `callback_url` is where the
/// wallet posts its response.
pub fn create_authorization_request(
    reason: &str,
    audience: &str,
    callback_url: &str,
) -> AuthorizationRequestMessage {
    AuthorizationRequestMessage {
        id: Uuid::new_v4().to_string(),
        typ: MEDIA_TYPE_PLAIN.to_string(),
        message_type: AUTHORIZATION_REQUEST_MESSAGE_TYPE.to_string(),
        thread_id: Uuid::new_v4().to_string(),
        body: AuthorizationRequestBody {
            callback_url: callback_url.to_string(),
            reason: reason.to_string(),
            message: None,
            scope: Vec::new(),
        },
        from: audience.to_string(),
        to: None,
    }
}

/// The holder's answer to an [`AuthorizationRequestMessage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponseMessage {
    pub id: String,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "thid", default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub body: AuthorizationResponseBody,
    /// Holder DID.
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub scope: Vec<ZeroKnowledgeProofResponse>,
}

/// One proof answering a requested scope entry. The proof itself is opaque here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZeroKnowledgeProofResponse {
    pub id: u32,
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(default)]
    pub proof: serde_json::Value,
    #[serde(default)]
    pub pub_signals: Vec<String>,
}
