//! Request issuer: mints a session and the authorization request bound to it.

use axum::{extract::State, response::IntoResponse, Json};
use tracing::{info, warn};

use didauth_protocol::{create_authorization_request, AuthorizationRequestMessage};

use crate::{
    error::ApiError,
    session::{SessionError, SessionId},
    AppState,
};

/// Response header carrying the session ID of a freshly issued request.
pub const SESSION_ID_HEADER: &str = "x-id";

#[derive(Clone, Debug)]
pub struct IssuedRequest {
    pub session_id: SessionId,
    pub request: AuthorizationRequestMessage,
}

/// Create a pending session and the request the wallet should answer. The
/// stored request is the one returned.
pub fn issue_request(state: &AppState) -> Result<IssuedRequest, SessionError> {
    let config = state.config();
    let session_id = SessionId::generate(config.session_id_bytes);
    let callback_url = config.callback_url(&session_id);

    let request =
        create_authorization_request(&config.reason, &config.audience, callback_url.as_str())
            .with_scope(config.proof_request.clone());

    state
        .sessions()
        .insert_pending(session_id.clone(), request.clone())?;

    Ok(IssuedRequest {
        session_id,
        request,
    })
}

/// `GET|POST /api/sign-in`
pub async fn sign_in(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let issued = issue_request(&state).map_err(|err| {
        let api = ApiError::from(&err);
        warn!(error = %err, error_code = api.code(), "failed to issue authorization request");
        api
    })?;

    info!(
        session_id = %issued.session_id,
        thid = %issued.request.thread_id,
        "issued authorization request"
    );

    Ok((
        [(SESSION_ID_HEADER, issued.session_id.to_string())],
        Json(issued.request),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::RelayConfig, session::SessionStatus};

    #[test]
    fn issued_request_is_stored_pending() {
        let state = AppState::from_config(RelayConfig::default()).unwrap();
        let issued = issue_request(&state).unwrap();

        let session = state.sessions().get(&issued.session_id).unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Pending);

        let stored = state.sessions().claim(&issued.session_id).unwrap();
        assert_eq!(stored, issued.request);
        assert_eq!(stored.body.scope.len(), 1);
    }

    #[test]
    fn callback_url_names_the_session() {
        let state = AppState::from_config(RelayConfig::default()).unwrap();
        let issued = issue_request(&state).unwrap();
        assert!(issued
            .request
            .body
            .callback_url
            .ends_with(&format!("/api/callback?sessionId={}", issued.session_id)));
    }

    #[test]
    fn every_issue_gets_fresh_identifiers() {
        let state = AppState::from_config(RelayConfig::default()).unwrap();
        let a = issue_request(&state).unwrap();
        let b = issue_request(&state).unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_ne!(a.request.id, b.request.id);
        assert_ne!(a.request.thread_id, b.request.thread_id);
    }
}
