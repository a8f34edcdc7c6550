//! didauth-verifier
//!
//! The seam between the sign-in relay and the proof verifier.
//!
//! Proof checking, identity-state resolution against the ledger, and key
//! loading all happen behind [`AuthVerifier`]. The relay hands over the raw
//! token, the request it issued, and a [`VerificationPolicy`], and gets back
//! either the holder's DID with its claims or a [`VerificationError`].
//!
//! [`RemoteVerifier`] delegates to an external verification service over HTTP
//! after running the local [`check_binding`] checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use didauth_protocol::{AuthorizationRequestMessage, JwzToken};

pub mod binding;
pub mod error;
pub mod policy;
pub mod remote;

pub use binding::check_binding;
pub use error::VerificationError;
pub use policy::{did_network, StateResolverConfig, VerificationPolicy};
pub use remote::RemoteVerifier;

/// A successfully verified holder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifiedHolder {
    /// Holder DID.
    pub did: String,
    /// Claims disclosed by the verifier, if any.
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl VerifiedHolder {
    pub fn new(did: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            claims: Map::new(),
        }
    }
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verify `token` as the answer to `request` under `policy`.
    async fn full_verify(
        &self,
        token: &str,
        request: &AuthorizationRequestMessage,
        policy: &VerificationPolicy,
    ) -> Result<VerifiedHolder, VerificationError>;
}

/// Used when no verification service is configured. Responses are decoded and
/// bound to their request, then reported as unverifiable.
#[derive(Clone, Debug, Default)]
pub struct UnconfiguredVerifier;

#[async_trait]
impl AuthVerifier for UnconfiguredVerifier {
    async fn full_verify(
        &self,
        token: &str,
        request: &AuthorizationRequestMessage,
        _policy: &VerificationPolicy,
    ) -> Result<VerifiedHolder, VerificationError> {
        let token = JwzToken::parse(token)?;
        check_binding(&token.message, request)?;
        Err(VerificationError::Unavailable(
            "no verification service configured".to_string(),
        ))
    }
}
