//! Verification policy handed to the verifier with every response.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_TRANSITION_DELAY_SECS: u64 = 5 * 60;
pub const DEFAULT_RESOLVER_PREFIX: &str = "polygon:mumbai";
pub const DEFAULT_STATE_CONTRACT: &str = "0x134B1BE34911E39A8397ec6289782989729807a4";
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_KEYS_DIR: &str = "./keys";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io";

/// Where to resolve identity state for one network namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResolverConfig {
    pub rpc_url: String,
    pub contract_address: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    /// How long a superseded identity state is still accepted.
    pub accepted_state_transition_delay_secs: u64,
    /// Directory holding the circuits' verification keys.
    pub key_dir: PathBuf,
    /// State resolvers keyed by network namespace, e.g. `polygon:mumbai`.
    pub state_resolvers: BTreeMap<String, StateResolverConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfs_gateway: Option<String>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        let mut state_resolvers = BTreeMap::new();
        state_resolvers.insert(
            DEFAULT_RESOLVER_PREFIX.to_string(),
            StateResolverConfig {
                rpc_url: DEFAULT_RPC_URL.to_string(),
                contract_address: DEFAULT_STATE_CONTRACT.to_string(),
            },
        );
        Self {
            accepted_state_transition_delay_secs: DEFAULT_STATE_TRANSITION_DELAY_SECS,
            key_dir: PathBuf::from(DEFAULT_KEYS_DIR),
            state_resolvers,
            ipfs_gateway: Some(DEFAULT_IPFS_GATEWAY.to_string()),
        }
    }
}

impl VerificationPolicy {
    pub fn accepted_state_transition_delay(&self) -> Duration {
        Duration::from_secs(self.accepted_state_transition_delay_secs)
    }

    /// The resolver responsible for `did`, looked up by its network namespace.
    pub fn resolver_for(&self, did: &str) -> Option<&StateResolverConfig> {
        did_network(did).and_then(|network| self.state_resolvers.get(&network))
    }
}

/// Extract `blockchain:network` from `did:<method>:<blockchain>:<network>:<id>`.
pub fn did_network(did: &str) -> Option<String> {
    let parts: Vec<&str> = did.split(':').collect();
    if parts.len() != 5 || parts[0] != "did" {
        return None;
    }
    if parts[2].is_empty() || parts[3].is_empty() {
        return None;
    }
    Some(format!("{}:{}", parts[2], parts[3]))
}
