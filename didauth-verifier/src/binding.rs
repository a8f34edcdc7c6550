//! Checks that bind a decoded response to the request it claims to answer.
//!
//! These run before any proof is looked at. A response produced for another
//! session carries that session's thread ID and fails here.

use std::collections::HashMap;

use didauth_protocol::{
    AuthorizationRequestMessage, AuthorizationResponseMessage, AUTHORIZATION_RESPONSE_MESSAGE_TYPE,
};

use crate::error::VerificationError;

pub fn check_binding(
    response: &AuthorizationResponseMessage,
    request: &AuthorizationRequestMessage,
) -> Result<(), VerificationError> {
    if response.message_type != AUTHORIZATION_RESPONSE_MESSAGE_TYPE {
        return Err(VerificationError::Rejected(format!(
            "unexpected message type '{}'",
            response.message_type
        )));
    }

    match response.thread_id.as_deref() {
        Some(thid) if thid == request.thread_id => {}
        Some(thid) => {
            return Err(VerificationError::Rejected(format!(
                "thread id mismatch: expected {}, got {}",
                request.thread_id, thid
            )))
        }
        None => {
            return Err(VerificationError::Rejected(
                "response carries no thread id".to_string(),
            ))
        }
    }

    if let Some(to) = response.to.as_deref() {
        if to != request.from {
            return Err(VerificationError::Rejected(format!(
                "audience mismatch: expected {}, got {}",
                request.from, to
            )));
        }
    }

    if !response.from.starts_with("did:") {
        return Err(VerificationError::Rejected(
            "response sender is not a DID".to_string(),
        ));
    }

    let requested: HashMap<u32, &str> = request
        .body
        .scope
        .iter()
        .map(|scope| (scope.id, scope.circuit_id.as_str()))
        .collect();

    for answer in &response.body.scope {
        match requested.get(&answer.id) {
            Some(circuit) if *circuit == answer.circuit_id => {}
            Some(circuit) => {
                return Err(VerificationError::Rejected(format!(
                    "scope {} answered with circuit {}, expected {}",
                    answer.id, answer.circuit_id, circuit
                )))
            }
            None => {
                return Err(VerificationError::Rejected(format!(
                    "scope {} was not requested",
                    answer.id
                )))
            }
        }
    }

    for scope in request.body.scope.iter().filter(|s| !s.is_optional()) {
        if !response.body.scope.iter().any(|answer| answer.id == scope.id) {
            return Err(VerificationError::Rejected(format!(
                "required scope {} was not answered",
                scope.id
            )));
        }
    }

    Ok(())
}
