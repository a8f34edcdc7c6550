//! Proof-request descriptors: what the holder is asked to prove.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Circuit identifiers understood by the verification service.
pub mod circuits {
    pub const AUTH_V2: &str = "authV2";
    pub const CREDENTIAL_ATOMIC_QUERY_MTP_V2: &str = "credentialAtomicQueryMTPV2";
    pub const CREDENTIAL_ATOMIC_QUERY_SIG_V2: &str = "credentialAtomicQuerySigV2";
}

/// JSON-LD context of the demo KYC credential schema.
pub const DEFAULT_KYC_CONTEXT: &str =
    "https://raw.githubusercontent.com/iden3/claim-schema-vocab/main/schemas/json-ld/kyc-v3.json-ld";

/// A single entry of an authorization request's `scope`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZeroKnowledgeProofRequest {
    pub id: u32,
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default)]
    pub query: Map<String, Value>,
}

impl ZeroKnowledgeProofRequest {
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Structural checks applied to descriptors loaded from configuration.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.circuit_id.trim().is_empty() {
            return Err(ProtocolError::ProofRequest("circuitId must not be empty".into()));
        }
        match self.query.get("type") {
            Some(Value::String(t)) if !t.trim().is_empty() => {}
            _ => {
                return Err(ProtocolError::ProofRequest(
                    "query.type must name a credential type".into(),
                ))
            }
        }
        if !self.query.contains_key("allowedIssuers") {
            return Err(ProtocolError::ProofRequest(
                "query.allowedIssuers is required".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ZeroKnowledgeProofRequest`].
#[derive(Clone, Debug)]
pub struct ProofRequestBuilder {
    id: u32,
    circuit_id: String,
    optional: Option<bool>,
    allowed_issuers: Vec<String>,
    credential_type: Option<String>,
    context: Option<String>,
    subject: Map<String, Value>,
}

impl ProofRequestBuilder {
    pub fn new(id: u32, circuit_id: impl Into<String>) -> Self {
        Self {
            id,
            circuit_id: circuit_id.into(),
            optional: None,
            allowed_issuers: vec!["*".to_string()],
            credential_type: None,
            context: None,
            subject: Map::new(),
        }
    }

    /// The demo request: a merkle-tree-proof that the holder was born before 2000.
    pub fn kyc_age(id: u32) -> Self {
        Self::new(id, circuits::CREDENTIAL_ATOMIC_QUERY_MTP_V2)
            .credential_type("KYCAgeCredential")
            .context(DEFAULT_KYC_CONTEXT)
            .subject_condition("birthday", "$lt", 20000101)
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn allowed_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    pub fn credential_type(mut self, credential_type: impl Into<String>) -> Self {
        self.credential_type = Some(credential_type.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add `credentialSubject.<field>.<operator> = value`.
    pub fn subject_condition(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let mut condition = Map::new();
        condition.insert(operator.into(), value.into());
        self.subject.insert(field.into(), Value::Object(condition));
        self
    }

    pub fn build(self) -> ZeroKnowledgeProofRequest {
        let mut query = Map::new();
        query.insert(
            "allowedIssuers".to_string(),
            Value::from(self.allowed_issuers),
        );
        if let Some(credential_type) = self.credential_type {
            query.insert("type".to_string(), Value::String(credential_type));
        }
        if let Some(context) = self.context {
            query.insert("context".to_string(), Value::String(context));
        }
        if !self.subject.is_empty() {
            query.insert("credentialSubject".to_string(), Value::Object(self.subject));
        }

        ZeroKnowledgeProofRequest {
            id: self.id,
            circuit_id: self.circuit_id,
            optional: self.optional,
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kyc_age_request_shape() {
        let request = ProofRequestBuilder::kyc_age(1).build();
        assert_eq!(request.id, 1);
        assert_eq!(request.circuit_id, circuits::CREDENTIAL_ATOMIC_QUERY_MTP_V2);
        assert!(!request.is_optional());

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["circuitId"], "credentialAtomicQueryMTPV2");
        assert_eq!(value["query"]["type"], "KYCAgeCredential");
        assert_eq!(value["query"]["allowedIssuers"][0], "*");
        assert_eq!(value["query"]["credentialSubject"]["birthday"]["$lt"], 20000101);
        assert!(value.get("optional").is_none());
        request.validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_type() {
        let request = ProofRequestBuilder::new(2, circuits::CREDENTIAL_ATOMIC_QUERY_SIG_V2).build();
        let err = request.validate().unwrap_err();
        assert_eq!(err.error_code(), "PROOF_REQUEST_INVALID");
    }

    #[test]
    fn loads_descriptor_from_json() {
        let json = r#"{
            "id": 7,
            "circuitId": "credentialAtomicQuerySigV2",
            "optional": true,
            "query": {
                "allowedIssuers": ["did:example:issuer"],
                "type": "KYCCountryOfResidenceCredential",
                "credentialSubject": { "countryCode": { "$nin": [840] } }
            }
        }"#;
        let request: ZeroKnowledgeProofRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.id, 7);
        assert!(request.is_optional());
        request.validate().unwrap();
    }
}
