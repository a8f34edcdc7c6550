//! HTTP client for an external verification service.
//!
//! The service receives `{ token, request, policy }` and answers
//! `{ from, claims }` on success. Any 4xx is a rejection of the response;
//! 5xx, transport errors and unreadable answers mean the verifier could not
//! decide.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use didauth_protocol::{AuthorizationRequestMessage, JwzToken};

use crate::binding::check_binding;
use crate::error::VerificationError;
use crate::policy::VerificationPolicy;
use crate::{AuthVerifier, VerifiedHolder};

/// Longest rejection reason carried into the error.
const MAX_REASON_LEN: usize = 256;

#[derive(Clone, Debug)]
pub struct RemoteVerifier {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

#[derive(Serialize)]
struct VerifyCall<'a> {
    token: &'a str,
    request: &'a AuthorizationRequestMessage,
    policy: &'a VerificationPolicy,
}

#[derive(Deserialize)]
struct VerifyVerdict {
    from: String,
    #[serde(default)]
    claims: Map<String, Value>,
}

impl RemoteVerifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, VerificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerificationError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AuthVerifier for RemoteVerifier {
    async fn full_verify(
        &self,
        token: &str,
        request: &AuthorizationRequestMessage,
        policy: &VerificationPolicy,
    ) -> Result<VerifiedHolder, VerificationError> {
        let parsed = JwzToken::parse(token).map_err(|err| {
            debug!(error_code = err.error_code(), error = %err, "undecodable authorization response");
            err
        })?;
        check_binding(&parsed.message, request).map_err(|err| {
            debug!(thid = %request.thread_id, error_code = err.error_code(), error = %err, "binding check failed");
            err
        })?;

        if policy.resolver_for(&parsed.message.from).is_none() {
            return Err(VerificationError::Rejected(format!(
                "no state resolver for network of {}",
                parsed.message.from
            )));
        }

        debug!(
            endpoint = %self.endpoint,
            thid = %request.thread_id,
            state_transition_delay = ?policy.accepted_state_transition_delay(),
            "delegating proof verification"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&VerifyCall {
                token,
                request,
                policy,
            })
            .send()
            .await
            .map_err(|e| {
                let err = if e.is_timeout() {
                    VerificationError::Timeout(self.timeout)
                } else {
                    VerificationError::Unavailable(format!("request failed: {e}"))
                };
                warn!(endpoint = %self.endpoint, error_code = err.error_code(), error = %e, "verification service unreachable");
                err
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let reason: String = body.chars().take(MAX_REASON_LEN).collect();
            debug!(%status, %reason, "verification service rejected response");
            return Err(VerificationError::Rejected(if reason.is_empty() {
                format!("verification service answered {status}")
            } else {
                reason
            }));
        }
        if !status.is_success() {
            let err =
                VerificationError::Unavailable(format!("verification service answered {status}"));
            warn!(%status, error_code = err.error_code(), "verification service error");
            return Err(err);
        }

        let verdict: VerifyVerdict = response
            .json()
            .await
            .map_err(|e| VerificationError::Unavailable(format!("unreadable verdict: {e}")))?;

        if verdict.from != parsed.message.from {
            return Err(VerificationError::Rejected(format!(
                "verified holder {} does not match response sender {}",
                verdict.from, parsed.message.from
            )));
        }

        Ok(VerifiedHolder {
            did: verdict.from,
            claims: verdict.claims,
        })
    }
}
