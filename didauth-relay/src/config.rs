//! Relay configuration, read from the environment at startup.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use url::Url;

use didauth_protocol::{ProofRequestBuilder, ProtocolError, ZeroKnowledgeProofRequest};
use didauth_verifier::{policy, StateResolverConfig, VerificationPolicy};

use crate::session::{
    SessionId, DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS, MIN_SESSION_ID_BYTES,
};

// Environment variables
const LISTEN_ADDR_ENV: &str = "DIDAUTH_LISTEN_ADDR";
const PUBLIC_URL_ENV: &str = "DIDAUTH_PUBLIC_URL";
const CALLBACK_PATH_ENV: &str = "DIDAUTH_CALLBACK_PATH";
const AUDIENCE_ENV: &str = "DIDAUTH_AUDIENCE";
const REASON_ENV: &str = "DIDAUTH_REASON";
const SESSION_TTL_ENV: &str = "DIDAUTH_SESSION_TTL_SECS";
const RESOLVED_SESSION_TTL_ENV: &str = "DIDAUTH_RESOLVED_SESSION_TTL_SECS";
const PURGE_INTERVAL_ENV: &str = "DIDAUTH_PURGE_INTERVAL_SECS";
const SESSION_ID_BYTES_ENV: &str = "DIDAUTH_SESSION_ID_BYTES";
const VERIFY_TIMEOUT_ENV: &str = "DIDAUTH_VERIFY_TIMEOUT_SECS";
const VERIFIER_URL_ENV: &str = "DIDAUTH_VERIFIER_URL";
const RPC_URL_ENV: &str = "DIDAUTH_RPC_URL";
const STATE_CONTRACT_ENV: &str = "DIDAUTH_STATE_CONTRACT";
const RESOLVER_PREFIX_ENV: &str = "DIDAUTH_RESOLVER_PREFIX";
const KEYS_DIR_ENV: &str = "DIDAUTH_KEYS_DIR";
const IPFS_GATEWAY_ENV: &str = "DIDAUTH_IPFS_GATEWAY";
const STATE_TRANSITION_DELAY_ENV: &str = "DIDAUTH_STATE_TRANSITION_DELAY_SECS";
const PROOF_REQUEST_PATH_ENV: &str = "DIDAUTH_PROOF_REQUEST_PATH";
const STATIC_DIR_ENV: &str = "DIDAUTH_STATIC_DIR";
const ENABLE_CORS_ENV: &str = "DIDAUTH_ENABLE_CORS";

// Defaults
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_CALLBACK_PATH: &str = "/api/callback";
const DEFAULT_AUDIENCE: &str =
    "did:polygonid:polygon:mumbai:2qG7bhdJKsk4tSbShiXiF2Eti2cVjUH3iTDXyyn6i7";
const DEFAULT_REASON: &str = "test flow";
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STATIC_DIR: &str = "./static";

// Upper bounds
const MAX_TTL_SECS: u64 = MAX_SESSION_TTL_SECS;
const MAX_VERIFY_TIMEOUT_SECS: u64 = 60 * 60;
pub const MAX_SESSION_ID_BYTES: u64 = 64;

/// Query parameter carrying the session ID on the callback URL.
pub const CALLBACK_SESSION_PARAM: &str = "sessionId";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid url: {source}")]
    Url {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{var} must be an integer between 1 and {max}, got '{value}'")]
    Number {
        var: &'static str,
        value: String,
        max: u64,
    },

    #[error("{var} must be a boolean, got '{value}'")]
    Bool { var: &'static str, value: String },

    #[error("failed to read proof request from {}: {source}", path.display())]
    ProofRequestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse proof request from {}: {source}", path.display())]
    ProofRequestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    ProofRequest(#[from] ProtocolError),
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// Base of every issued callback URL; the session ID is appended as a query
    /// parameter.
    pub callback_endpoint: Url,
    /// Route the callback handler is mounted on.
    pub callback_path: String,
    /// Verifier DID, sent as the request's `from`.
    pub audience: String,
    pub reason: String,
    pub session_ttl: Duration,
    pub resolved_session_ttl: Duration,
    pub purge_interval: Duration,
    pub session_id_bytes: usize,
    pub verify_timeout: Duration,
    /// External verification service. Without one every callback answers 502.
    pub verifier_url: Option<Url>,
    pub policy: VerificationPolicy,
    pub proof_request: ZeroKnowledgeProofRequest,
    pub static_dir: PathBuf,
    pub enable_cors: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None).expect("built-in defaults are valid")
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source. Unset and
    /// blank variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let public_url = get(PUBLIC_URL_ENV).unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
        let callback_path = format!(
            "/{}",
            get(CALLBACK_PATH_ENV)
                .as_deref()
                .unwrap_or(DEFAULT_CALLBACK_PATH)
                .trim()
                .trim_start_matches('/')
        );
        let callback_endpoint = Url::parse(&format!(
            "{}{}",
            public_url.trim_end_matches('/'),
            callback_path
        ))
        .map_err(|source| ConfigError::Url {
            var: PUBLIC_URL_ENV,
            source,
        })?;

        let verifier_url = get(VERIFIER_URL_ENV)
            .map(|raw| Url::parse(&raw))
            .transpose()
            .map_err(|source| ConfigError::Url {
                var: VERIFIER_URL_ENV,
                source,
            })?;

        let session_ttl_secs =
            parse_positive(&get, SESSION_TTL_ENV, DEFAULT_SESSION_TTL_SECS, MAX_TTL_SECS)?;
        let resolved_ttl_secs =
            parse_positive(&get, RESOLVED_SESSION_TTL_ENV, session_ttl_secs, MAX_TTL_SECS)?;
        let purge_interval_secs =
            parse_positive(&get, PURGE_INTERVAL_ENV, DEFAULT_SESSION_TTL_SECS, MAX_TTL_SECS)?;
        let verify_timeout_secs = parse_positive(
            &get,
            VERIFY_TIMEOUT_ENV,
            DEFAULT_VERIFY_TIMEOUT_SECS,
            MAX_VERIFY_TIMEOUT_SECS,
        )?;
        let session_id_bytes = parse_positive(
            &get,
            SESSION_ID_BYTES_ENV,
            MIN_SESSION_ID_BYTES as u64,
            MAX_SESSION_ID_BYTES,
        )? as usize;

        let mut policy = VerificationPolicy::default();
        policy.accepted_state_transition_delay_secs = parse_positive(
            &get,
            STATE_TRANSITION_DELAY_ENV,
            policy::DEFAULT_STATE_TRANSITION_DELAY_SECS,
            MAX_TTL_SECS,
        )?;
        if let Some(dir) = get(KEYS_DIR_ENV) {
            policy.key_dir = PathBuf::from(dir);
        }
        if let Some(gateway) = get(IPFS_GATEWAY_ENV) {
            policy.ipfs_gateway = Some(gateway);
        }
        let prefix = get(RESOLVER_PREFIX_ENV)
            .unwrap_or_else(|| policy::DEFAULT_RESOLVER_PREFIX.to_string());
        policy.state_resolvers.clear();
        policy.state_resolvers.insert(
            prefix,
            StateResolverConfig {
                rpc_url: get(RPC_URL_ENV).unwrap_or_else(|| policy::DEFAULT_RPC_URL.to_string()),
                contract_address: get(STATE_CONTRACT_ENV)
                    .unwrap_or_else(|| policy::DEFAULT_STATE_CONTRACT.to_string()),
            },
        );

        let proof_request = match get(PROOF_REQUEST_PATH_ENV) {
            Some(path) => load_proof_request(path)?,
            None => ProofRequestBuilder::kyc_age(1).build(),
        };

        let enable_cors = match get(ENABLE_CORS_ENV) {
            None => true,
            Some(value) => parse_bool(&value).ok_or(ConfigError::Bool {
                var: ENABLE_CORS_ENV,
                value,
            })?,
        };

        Ok(Self {
            listen_addr: get(LISTEN_ADDR_ENV).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            callback_endpoint,
            callback_path,
            audience: get(AUDIENCE_ENV).unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            reason: get(REASON_ENV).unwrap_or_else(|| DEFAULT_REASON.to_string()),
            session_ttl: Duration::from_secs(session_ttl_secs),
            resolved_session_ttl: Duration::from_secs(resolved_ttl_secs),
            purge_interval: Duration::from_secs(purge_interval_secs),
            session_id_bytes: session_id_bytes.max(MIN_SESSION_ID_BYTES),
            verify_timeout: Duration::from_secs(verify_timeout_secs),
            verifier_url,
            policy,
            proof_request,
            static_dir: PathBuf::from(
                get(STATIC_DIR_ENV).unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            ),
            enable_cors,
        })
    }

    /// The callback URL handed to the wallet for `session_id`.
    pub fn callback_url(&self, session_id: &SessionId) -> Url {
        let mut url = self.callback_endpoint.clone();
        url.query_pairs_mut()
            .append_pair(CALLBACK_SESSION_PARAM, session_id.as_str());
        url
    }
}

/// Parse an integer in `1..=max`, falling back to `default` when unset.
fn parse_positive<F>(get: &F, var: &'static str, default: u64, max: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(ConfigError::Number { var, value, max }),
        },
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn load_proof_request(path: impl AsRef<Path>) -> Result<ZeroKnowledgeProofRequest, ConfigError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ConfigError::ProofRequestRead {
        path: path.to_path_buf(),
        source,
    })?;
    let request: ZeroKnowledgeProofRequest =
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::ProofRequestParse {
            path: path.to_path_buf(),
            source,
        })?;
    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_the_demo_deployment() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.callback_endpoint.as_str(), "http://localhost:8080/api/callback");
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.resolved_session_ttl, config.session_ttl);
        assert_eq!(config.session_id_bytes, MIN_SESSION_ID_BYTES);
        assert!(config.verifier_url.is_none());
        assert!(config.enable_cors);
        assert!(config.policy.state_resolvers.contains_key("polygon:mumbai"));
        assert_eq!(config.proof_request.id, 1);
    }

    #[test]
    fn callback_url_carries_session_id() {
        let config = RelayConfig::from_lookup(lookup(&[(
            PUBLIC_URL_ENV,
            "https://relay.example.org/",
        )]))
        .unwrap();
        assert_eq!(config.callback_path, "/api/callback");
        let id = SessionId::parse("abc123").unwrap();
        assert_eq!(
            config.callback_url(&id).as_str(),
            "https://relay.example.org/api/callback?sessionId=abc123"
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = RelayConfig::from_lookup(lookup(&[
            (SESSION_TTL_ENV, "120"),
            (RESOLVED_SESSION_TTL_ENV, "86400"),
            (VERIFIER_URL_ENV, "http://127.0.0.1:9000/verify"),
            (RESOLVER_PREFIX_ENV, "polygon:amoy"),
            (RPC_URL_ENV, "https://rpc.example.org"),
            (ENABLE_CORS_ENV, "off"),
            (SESSION_ID_BYTES_ENV, "32"),
        ]))
        .unwrap();

        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(config.resolved_session_ttl, Duration::from_secs(86400));
        assert_eq!(
            config.verifier_url.as_ref().map(Url::as_str),
            Some("http://127.0.0.1:9000/verify")
        );
        let resolver = &config.policy.state_resolvers["polygon:amoy"];
        assert_eq!(resolver.rpc_url, "https://rpc.example.org");
        assert_eq!(config.policy.state_resolvers.len(), 1);
        assert!(!config.enable_cors);
        assert_eq!(config.session_id_bytes, 32);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = RelayConfig::from_lookup(lookup(&[(SESSION_TTL_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: SESSION_TTL_ENV, .. }));

        let err = RelayConfig::from_lookup(lookup(&[(VERIFIER_URL_ENV, "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::Url { var: VERIFIER_URL_ENV, .. }));

        let err = RelayConfig::from_lookup(lookup(&[(ENABLE_CORS_ENV, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Bool { .. }));
    }

    #[test]
    fn oversized_values_are_refused() {
        for var in [SESSION_TTL_ENV, RESOLVED_SESSION_TTL_ENV, PURGE_INTERVAL_ENV] {
            let err = RelayConfig::from_lookup(lookup(&[(var, "18446744073709551615")])).unwrap_err();
            assert!(matches!(err, ConfigError::Number { max: MAX_TTL_SECS, .. }));
        }

        let err = RelayConfig::from_lookup(lookup(&[(VERIFY_TIMEOUT_ENV, "3601")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: VERIFY_TIMEOUT_ENV, .. }));

        let err = RelayConfig::from_lookup(lookup(&[(SESSION_ID_BYTES_ENV, "65")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: SESSION_ID_BYTES_ENV, .. }));

        // The bounds themselves are accepted.
        let config = RelayConfig::from_lookup(lookup(&[
            (SESSION_TTL_ENV, "2592000"),
            (SESSION_ID_BYTES_ENV, "64"),
        ]))
        .unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(MAX_TTL_SECS));
        assert_eq!(config.session_id_bytes, 64);
    }

    #[test]
    fn missing_proof_request_file_is_an_error() {
        let err = RelayConfig::from_lookup(lookup(&[(
            PROOF_REQUEST_PATH_ENV,
            "/nonexistent/proof-request.json",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ProofRequestRead { .. }));
    }
}
