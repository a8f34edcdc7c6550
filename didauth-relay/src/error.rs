//! HTTP error mapping.
//!
//! Every failure leaves the relay as `{ "error": ..., "error_code": ... }`.
//! Messages are generic; verifier diagnostics stay in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use didauth_verifier::VerificationError;

use crate::{callback::CallbackError, session::SessionError};

pub const CODE_MALFORMED_REQUEST: &str = "MALFORMED_REQUEST";
pub const CODE_SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
pub const CODE_SESSION_ALREADY_RESOLVED: &str = "SESSION_ALREADY_RESOLVED";
pub const CODE_SESSION_BUSY: &str = "SESSION_BUSY";
pub const CODE_VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";
pub const CODE_VERIFIER_UNAVAILABLE: &str = "VERIFIER_UNAVAILABLE";
pub const CODE_VERIFIER_TIMEOUT: &str = "VERIFIER_TIMEOUT";
pub const CODE_SESSION_STORE_UNAVAILABLE: &str = "SESSION_STORE_UNAVAILABLE";
pub const CODE_INTERNAL: &str = "INTERNAL_ERROR";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, CODE_MALFORMED_REQUEST, message)
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            CODE_INTERNAL,
            "internal error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            error_code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<&SessionError> for ApiError {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                CODE_SESSION_NOT_FOUND,
                "session not found",
            ),
            SessionError::AlreadyResolved => Self::new(
                StatusCode::CONFLICT,
                CODE_SESSION_ALREADY_RESOLVED,
                "session already resolved",
            ),
            SessionError::Busy => Self::new(
                StatusCode::CONFLICT,
                CODE_SESSION_BUSY,
                "session verification in progress",
            ),
            SessionError::Unavailable => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_SESSION_STORE_UNAVAILABLE,
                "session store unavailable",
            ),
            // Only reachable if a claim was lost; treated as a server fault.
            SessionError::NotClaimed => Self::internal(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::from(&err)
    }
}

impl From<&VerificationError> for ApiError {
    fn from(err: &VerificationError) -> Self {
        match err {
            VerificationError::Malformed(_) => {
                Self::malformed("payload is not a valid authorization response")
            }
            VerificationError::Rejected(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                CODE_VERIFICATION_FAILED,
                "verification failed",
            ),
            VerificationError::Unavailable(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                CODE_VERIFIER_UNAVAILABLE,
                "verifier unavailable, try again",
            ),
            VerificationError::Timeout(_) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                CODE_VERIFIER_TIMEOUT,
                "verification timed out",
            ),
        }
    }
}

impl From<&CallbackError> for ApiError {
    fn from(err: &CallbackError) -> Self {
        match err {
            CallbackError::Malformed(message) => Self::malformed(*message),
            CallbackError::Session(err) => err.into(),
            CallbackError::Verification(err) => err.into(),
            CallbackError::Task => Self::internal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn session_errors_map_to_codes() {
        let cases = [
            (SessionError::NotFound, StatusCode::NOT_FOUND, CODE_SESSION_NOT_FOUND),
            (
                SessionError::AlreadyResolved,
                StatusCode::CONFLICT,
                CODE_SESSION_ALREADY_RESOLVED,
            ),
            (SessionError::Busy, StatusCode::CONFLICT, CODE_SESSION_BUSY),
            (
                SessionError::Unavailable,
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_SESSION_STORE_UNAVAILABLE,
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(&err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn verifier_diagnostics_are_not_exposed() {
        let err = VerificationError::Rejected("issuer key 0xdead revoked".into());
        let api = ApiError::from(&err);
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!api.message.contains("0xdead"));

        let api = ApiError::from(&VerificationError::Timeout(Duration::from_secs(30)));
        assert_eq!(api.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(api.code(), CODE_VERIFIER_TIMEOUT);
    }
}
