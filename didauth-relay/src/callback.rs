//! Callback processor.
//!
//! A wallet posts its JWZ token to the callback URL it was issued. The session
//! is claimed before verification starts so a second callback cannot race the
//! first, and the outcome is committed from a spawned task so a caller that
//! hangs up mid-verification still leaves the session resolved.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use didauth_verifier::{VerificationError, VerifiedHolder};

use crate::{
    error::ApiError,
    session::{FailureReason, Resolution, SessionError, SessionId, SessionStore},
    AppState,
};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("malformed callback: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("verification task did not complete")]
    Task,
}

impl CallbackError {
    pub fn error_code(&self) -> &'static str {
        ApiError::from(self).code()
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    /// Verified holder DID.
    pub id: String,
}

/// Verify `payload` against the request issued for `session_id` and commit
/// the outcome.
pub async fn process_callback(
    state: &AppState,
    session_id: &SessionId,
    payload: String,
) -> Result<VerifiedHolder, CallbackError> {
    let request = state.sessions().claim(session_id)?;

    let sessions = state.sessions().clone();
    let verifier = state.verifier.clone();
    let config = state.config.clone();
    let id = session_id.clone();

    let task = tokio::spawn(async move {
        let verdict = match timeout(
            config.verify_timeout,
            verifier.full_verify(&payload, &request, &config.policy),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(_) => Err(VerificationError::Timeout(config.verify_timeout)),
        };
        commit(&sessions, &id, verdict)
    });

    match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "verification task failed");
            if let Err(err) = state.sessions().release(session_id) {
                warn!(session_id = %session_id, error = %err, "failed to release session");
            }
            Err(CallbackError::Task)
        }
    }
}

fn commit(
    sessions: &SessionStore,
    id: &SessionId,
    verdict: Result<VerifiedHolder, VerificationError>,
) -> Result<VerifiedHolder, CallbackError> {
    let err = match verdict {
        Ok(holder) => {
            sessions.resolve(id, Resolution::Verified(holder.clone()))?;
            return Ok(holder);
        }
        Err(err) => err,
    };

    if err.is_retryable() {
        debug!(
            session_id = %id,
            error_code = err.error_code(),
            error = %err,
            "verification inconclusive, session stays pending"
        );
        if let Err(store_err) = sessions.release(id) {
            warn!(session_id = %id, error = %store_err, "failed to release session");
        }
    } else {
        let reason = match err {
            VerificationError::Timeout(_) => FailureReason::TimedOut,
            _ => FailureReason::Rejected,
        };
        if let Err(store_err) = sessions.resolve(id, Resolution::Failed(reason)) {
            warn!(
                session_id = %id,
                error_code = err.error_code(),
                error = %store_err,
                "failed to record failed session"
            );
        }
    }
    Err(err.into())
}

/// `POST /api/callback?sessionId=<id>`
pub async fn callback(
    State(state): State<AppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let session_id = params
        .ok()
        .and_then(|Query(params)| params.session_id)
        .as_deref()
        .and_then(SessionId::parse)
        .ok_or_else(|| ApiError::malformed("missing or invalid sessionId"))?;

    let payload = read_payload(body).map_err(|err| {
        warn!(session_id = %session_id, error_code = err.error_code(), error = %err, "rejected callback");
        ApiError::from(&err)
    })?;

    match process_callback(&state, &session_id, payload).await {
        Ok(holder) => {
            info!(session_id = %session_id, holder = %holder.did, "session verified");
            Ok(Json(CallbackResponse { id: holder.did }))
        }
        Err(err) => {
            warn!(session_id = %session_id, error_code = err.error_code(), error = %err, "callback failed");
            Err(ApiError::from(&err))
        }
    }
}

fn read_payload(body: Result<Bytes, BytesRejection>) -> Result<String, CallbackError> {
    let bytes = body.map_err(|_| CallbackError::Malformed("unreadable body"))?;
    let payload =
        String::from_utf8(bytes.to_vec()).map_err(|_| CallbackError::Malformed("body is not UTF-8"))?;
    if payload.trim().is_empty() {
        return Err(CallbackError::Malformed("empty body"));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use didauth_protocol::{create_authorization_request, AuthorizationRequestMessage};
    use didauth_verifier::{AuthVerifier, VerificationPolicy};

    use crate::{config::RelayConfig, issuer::issue_request, session::SessionStatus};

    /// Accepts every token after `delay`.
    struct SlowVerifier {
        delay: Duration,
    }

    #[async_trait]
    impl AuthVerifier for SlowVerifier {
        async fn full_verify(
            &self,
            _token: &str,
            _request: &AuthorizationRequestMessage,
            _policy: &VerificationPolicy,
        ) -> Result<VerifiedHolder, VerificationError> {
            tokio::time::sleep(self.delay).await;
            Ok(VerifiedHolder::new("did:example:holder"))
        }
    }

    fn slow_state(session_ttl: Duration, delay: Duration) -> AppState {
        let mut config = RelayConfig::default();
        config.session_ttl = session_ttl;
        config.resolved_session_ttl = session_ttl;
        AppState::with_components(config, Arc::new(SlowVerifier { delay }))
    }

    fn claimed_store() -> (SessionStore, SessionId) {
        let store = SessionStore::default();
        let id = SessionId::parse("session-1").unwrap();
        let request = create_authorization_request("test flow", "did:example:v", "http://relay/cb");
        store.insert_pending(id.clone(), request).unwrap();
        store.claim(&id).unwrap();
        (store, id)
    }

    #[test]
    fn accepted_verdict_marks_verified() {
        let (store, id) = claimed_store();
        let holder = commit(&store, &id, Ok(VerifiedHolder::new("did:example:holder"))).unwrap();
        assert_eq!(holder.did, "did:example:holder");

        let session = store.get(&id).unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Verified);
        assert_eq!(session.holder().unwrap().did, "did:example:holder");
    }

    #[test]
    fn rejection_and_timeout_fail_the_session() {
        let (store, id) = claimed_store();
        let err = commit(&store, &id, Err(VerificationError::Rejected("bad proof".into()))).unwrap_err();
        assert_eq!(err.error_code(), "VERIFICATION_FAILED");
        assert_eq!(store.get(&id).unwrap().unwrap().status(), SessionStatus::Failed);

        let (store, id) = claimed_store();
        let err = commit(&store, &id, Err(VerificationError::Timeout(Duration::from_secs(1)))).unwrap_err();
        assert_eq!(err.error_code(), "VERIFIER_TIMEOUT");
        assert_eq!(store.get(&id).unwrap().unwrap().status(), SessionStatus::Failed);
    }

    #[test]
    fn unavailable_verifier_releases_the_claim() {
        let (store, id) = claimed_store();
        let err = commit(&store, &id, Err(VerificationError::Unavailable("rpc down".into()))).unwrap_err();
        assert_eq!(err.error_code(), "VERIFIER_UNAVAILABLE");
        assert_eq!(store.get(&id).unwrap().unwrap().status(), SessionStatus::Pending);
        // Claimable again.
        assert!(store.claim(&id).is_ok());
    }

    #[test]
    fn payload_must_be_non_empty_utf8() {
        assert!(read_payload(Ok(Bytes::from_static(b"a.b.c"))).is_ok());
        assert!(matches!(
            read_payload(Ok(Bytes::from_static(b"  \n"))),
            Err(CallbackError::Malformed(_))
        ));
        assert!(matches!(
            read_payload(Ok(Bytes::from_static(&[0xff, 0xfe]))),
            Err(CallbackError::Malformed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_still_resolves_session() {
        let state = slow_state(Duration::from_secs(60), Duration::from_millis(200));
        let issued = issue_request(&state).unwrap();

        let caller = process_callback(&state, &issued.session_id, "a.b.c".to_string());
        assert!(tokio::time::timeout(Duration::from_millis(20), caller)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let session = state.sessions().get(&issued.session_id).unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Verified);
        assert_eq!(session.holder().unwrap().did, "did:example:holder");
    }

    #[tokio::test(start_paused = true)]
    async fn verification_may_outlast_pending_ttl() {
        let state = slow_state(Duration::from_millis(100), Duration::from_millis(200));
        let issued = issue_request(&state).unwrap();

        let holder = process_callback(&state, &issued.session_id, "a.b.c".to_string())
            .await
            .unwrap();
        assert_eq!(holder.did, "did:example:holder");

        let session = state.sessions().get(&issued.session_id).unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Verified);
    }
}
