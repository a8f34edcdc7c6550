//! JWZ envelope decoding.
//!
//! A JWZ token is `base64url(header).base64url(payload).base64url(proof)`. The
//! relay decodes the header and payload so it can bind the response to the
//! request it answers. The proof segment is kept opaque for the verifier.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::{AuthorizationResponseMessage, MEDIA_TYPE_ZKP};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JwzHeader {
    pub alg: String,
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(default)]
    pub crit: Vec<String>,
    pub typ: String,
}

#[derive(Clone, Debug)]
pub struct JwzToken {
    pub header: JwzHeader,
    pub message: AuthorizationResponseMessage,
    pub proof: serde_json::Value,
}

impl JwzToken {
    /// Decode a compact token. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let segments: Vec<&str> = raw.trim().split('.').collect();
        if segments.len() != 3 {
            return Err(ProtocolError::TokenSegments(segments.len()));
        }

        let header: JwzHeader = decode_segment("header", segments[0])?;
        if header.typ != MEDIA_TYPE_ZKP {
            return Err(ProtocolError::MediaType(header.typ));
        }
        let message = decode_segment("payload", segments[1])?;
        let proof = decode_segment("proof", segments[2])?;

        Ok(Self {
            header,
            message,
            proof,
        })
    }

    /// Encode the three parts into compact form.
    pub fn compact(
        header: &JwzHeader,
        message: &AuthorizationResponseMessage,
        proof: &serde_json::Value,
    ) -> Result<String, ProtocolError> {
        Ok(format!(
            "{}.{}.{}",
            encode_segment("header", header)?,
            encode_segment("payload", message)?,
            encode_segment("proof", proof)?,
        ))
    }
}

fn decode_segment<T: DeserializeOwned>(
    segment: &'static str,
    encoded: &str,
) -> Result<T, ProtocolError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|source| ProtocolError::Encoding { segment, source })?;
    serde_json::from_slice(&bytes).map_err(|source| ProtocolError::Json { segment, source })
}

fn encode_segment<T: Serialize>(segment: &'static str, value: &T) -> Result<String, ProtocolError> {
    let bytes =
        serde_json::to_vec(value).map_err(|source| ProtocolError::Json { segment, source })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AuthorizationResponseBody, AUTHORIZATION_RESPONSE_MESSAGE_TYPE};
    use crate::proof_request::circuits;

    fn header() -> JwzHeader {
        JwzHeader {
            alg: "groth16".into(),
            circuit_id: circuits::AUTH_V2.into(),
            crit: vec!["circuitId".into()],
            typ: MEDIA_TYPE_ZKP.into(),
        }
    }

    fn message() -> AuthorizationResponseMessage {
        AuthorizationResponseMessage {
            id: "resp-1".into(),
            typ: Some(MEDIA_TYPE_ZKP.into()),
            message_type: AUTHORIZATION_RESPONSE_MESSAGE_TYPE.into(),
            thread_id: Some("thread-1".into()),
            body: AuthorizationResponseBody::default(),
            from: "did:example:holder".into(),
            to: Some("did:example:verifier".into()),
        }
    }

    #[test]
    fn parses_compact_token() {
        let proof = serde_json::json!({ "pi_a": ["1", "2"], "protocol": "groth16" });
        let raw = JwzToken::compact(&header(), &message(), &proof).unwrap();

        let token = JwzToken::parse(&format!("  {raw}\n")).unwrap();
        assert_eq!(token.header, header());
        assert_eq!(token.message, message());
        assert_eq!(token.proof["protocol"], "groth16");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = JwzToken::parse("abc.def").unwrap_err();
        assert!(matches!(err, ProtocolError::TokenSegments(2)));
    }

    #[test]
    fn rejects_non_base64_payload() {
        let raw = JwzToken::compact(&header(), &message(), &serde_json::Value::Null).unwrap();
        let mut parts: Vec<&str> = raw.split('.').collect();
        parts[1] = "not*base64";
        let err = JwzToken::parse(&parts.join(".")).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding { segment: "payload", .. }));
    }

    #[test]
    fn rejects_plain_media_type() {
        let mut plain = header();
        plain.typ = crate::message::MEDIA_TYPE_PLAIN.into();
        let raw = JwzToken::compact(&plain, &message(), &serde_json::Value::Null).unwrap();
        let err = JwzToken::parse(&raw).unwrap_err();
        assert_eq!(err.error_code(), "TOKEN_MEDIA_TYPE");
    }
}
