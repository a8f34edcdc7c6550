//! Status query service. Reads only.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    error::ApiError,
    session::{SessionError, SessionId, SessionStatus, SessionStore},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    /// Holder DID, present once verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

impl StatusResponse {
    fn unknown() -> Self {
        Self {
            status: SessionStatus::Unknown,
            id: None,
            claims: None,
        }
    }
}

pub fn query_status(sessions: &SessionStore, id: &SessionId) -> Result<StatusResponse, SessionError> {
    let Some(session) = sessions.get(id)? else {
        return Ok(StatusResponse::unknown());
    };

    let holder = session.holder();
    Ok(StatusResponse {
        status: session.status(),
        id: holder.map(|h| h.did.clone()),
        claims: holder
            .filter(|h| !h.claims.is_empty())
            .map(|h| h.claims.clone()),
    })
}

/// `GET /api/status?id=<id>`
pub async fn status(
    State(state): State<AppState>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let session_id = params
        .ok()
        .and_then(|Query(params)| params.id)
        .as_deref()
        .and_then(SessionId::parse)
        .ok_or_else(|| ApiError::malformed("missing or invalid id"))?;

    let body = query_status(state.sessions(), &session_id).map_err(|err| {
        let api = ApiError::from(&err);
        warn!(session_id = %session_id, error_code = api.code(), "status lookup failed");
        api
    })?;

    let code = if body.status == SessionStatus::Unknown {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((code, Json(body)).into_response())
}
