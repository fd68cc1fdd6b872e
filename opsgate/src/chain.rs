//! Supported EVM chains.
//!
//! The set of chains is fixed at compile time ([`ChainName`]); their
//! connection details live in a [`ChainRegistry`] built once at start-up and
//! shared read-only afterwards. Lookups are exact and case-sensitive, and an
//! unknown name is an input error ([`ChainNotFound`]), never a panic.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// An EIP-155 chain ID (e.g., 8453 for Base).
pub type ChainId = u64;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Zora Mainnet chain ID.
pub const ZORA_MAINNET: ChainId = 7_777_777;

/// Shape Mainnet chain ID.
pub const SHAPE_MAINNET: ChainId = 360;

/// WETH on Ethereum Mainnet.
pub const WETH_ETHEREUM: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

/// WETH predeploy shared by OP-stack chains (Base, Zora, Shape).
pub const WETH_OP_STACK: Address = address!("4200000000000000000000000000000000000006");

/// A supported chain, named exactly as clients spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainName {
    /// Ethereum Mainnet.
    Ethereum,
    /// Base Mainnet.
    Base,
    /// Zora Mainnet.
    Zora,
    /// Shape Mainnet.
    Shape,
}

impl ChainName {
    /// All supported chains.
    pub const ALL: [Self; 4] = [Self::Ethereum, Self::Base, Self::Zora, Self::Shape];

    /// Returns the canonical spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "Ethereum",
            Self::Base => "Base",
            Self::Zora => "Zora",
            Self::Shape => "Shape",
        }
    }
}

impl Display for ChainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainName {
    type Err = ChainNotFound;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ChainNotFound(s.to_owned()))
    }
}

/// Returned when a chain identifier is not one of the supported chains.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid chain specified: {0}")]
pub struct ChainNotFound(pub String);

/// Connection details for one supported chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    /// The chain's name.
    pub name: ChainName,
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// RPC endpoint prefix; the RPC credential is appended to it.
    pub rpc_url_template: String,
    /// Canonical wrapped-native-token contract, needed for auctions.
    pub wrapped_native: Option<Address>,
}

impl ChainDescriptor {
    /// Renders the RPC endpoint for this chain using the given credential.
    #[must_use]
    pub fn rpc_url(&self, credential: &str) -> String {
        format!("{}{credential}", self.rpc_url_template)
    }
}

/// Immutable lookup table from [`ChainName`] to [`ChainDescriptor`].
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<ChainName, ChainDescriptor>,
    rpc_overrides: HashMap<ChainName, String>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::known()
    }
}

impl ChainRegistry {
    /// Builds the registry of all supported chains with their default endpoints.
    #[must_use]
    pub fn known() -> Self {
        let chains = known_chains()
            .into_iter()
            .map(|descriptor| (descriptor.name, descriptor))
            .collect();
        Self {
            chains,
            rpc_overrides: HashMap::new(),
        }
    }

    /// Replaces the rendered RPC endpoint of `name` with a fixed URL.
    #[must_use]
    pub fn with_rpc_override(mut self, name: ChainName, url: impl Into<String>) -> Self {
        self.rpc_overrides.insert(name, url.into());
        self
    }

    /// Resolves a client-supplied chain identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ChainNotFound`] for any identifier that is not an exact,
    /// case-sensitive match of a supported chain.
    pub fn resolve(&self, identifier: &str) -> Result<&ChainDescriptor, ChainNotFound> {
        let name = ChainName::from_str(identifier)?;
        self.get(name)
            .ok_or_else(|| ChainNotFound(identifier.to_owned()))
    }

    /// Returns the descriptor for a typed chain name.
    #[must_use]
    pub fn get(&self, name: ChainName) -> Option<&ChainDescriptor> {
        self.chains.get(&name)
    }

    /// Returns the RPC endpoint for `name`, honouring overrides.
    #[must_use]
    pub fn rpc_url(&self, name: ChainName, credential: &str) -> Option<String> {
        if let Some(url) = self.rpc_overrides.get(&name) {
            return Some(url.clone());
        }
        self.get(name).map(|descriptor| descriptor.rpc_url(credential))
    }
}

fn known_chains() -> Vec<ChainDescriptor> {
    vec![
        ChainDescriptor {
            name: ChainName::Ethereum,
            chain_id: ETHEREUM_MAINNET,
            rpc_url_template: "https://eth-mainnet.g.alchemy.com/v2/".to_owned(),
            wrapped_native: Some(WETH_ETHEREUM),
        },
        ChainDescriptor {
            name: ChainName::Base,
            chain_id: BASE_MAINNET,
            rpc_url_template: "https://base-mainnet.g.alchemy.com/v2/".to_owned(),
            wrapped_native: Some(WETH_OP_STACK),
        },
        ChainDescriptor {
            name: ChainName::Zora,
            chain_id: ZORA_MAINNET,
            rpc_url_template: "https://zora-mainnet.g.alchemy.com/v2/".to_owned(),
            wrapped_native: Some(WETH_OP_STACK),
        },
        ChainDescriptor {
            name: ChainName::Shape,
            chain_id: SHAPE_MAINNET,
            rpc_url_template: "https://shape-mainnet.g.alchemy.com/v2/".to_owned(),
            wrapped_native: Some(WETH_OP_STACK),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_chains() {
        let registry = ChainRegistry::known();
        for name in ChainName::ALL {
            let descriptor = registry.resolve(name.as_str()).unwrap();
            assert_eq!(descriptor.name, name);
            assert!(descriptor.wrapped_native.is_some());
        }
        assert_eq!(registry.resolve("Base").unwrap().chain_id, BASE_MAINNET);
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let registry = ChainRegistry::known();
        assert_eq!(
            registry.resolve("base").unwrap_err(),
            ChainNotFound("base".to_owned())
        );
        assert!(registry.resolve("ETHEREUM").is_err());
        assert!(registry.resolve("").is_err());
        assert!(registry.resolve("Polygon").is_err());
    }

    #[test]
    fn test_rpc_url_rendering() {
        let registry = ChainRegistry::known();
        assert_eq!(
            registry.rpc_url(ChainName::Base, "key123").unwrap(),
            "https://base-mainnet.g.alchemy.com/v2/key123"
        );
    }

    #[test]
    fn test_rpc_override() {
        let registry =
            ChainRegistry::known().with_rpc_override(ChainName::Zora, "http://localhost:8545");
        assert_eq!(
            registry.rpc_url(ChainName::Zora, "ignored").unwrap(),
            "http://localhost:8545"
        );
        assert!(
            registry
                .rpc_url(ChainName::Shape, "k")
                .unwrap()
                .ends_with("/v2/k")
        );
    }

    #[test]
    fn test_chain_name_serde() {
        let name: ChainName = serde_json::from_str("\"Shape\"").unwrap();
        assert_eq!(name, ChainName::Shape);
        assert!(serde_json::from_str::<ChainName>("\"shape\"").is_err());
    }
}
