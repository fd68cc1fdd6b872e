//! Server configuration.
//!
//! Loads configuration from an optional TOML file. `$VAR` and `${VAR}`
//! references anywhere in the file are expanded from the environment before
//! parsing; unresolved references are left in place and rejected later.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3001
//! bearer_token = "$BEARER_TOKEN"
//! signer_private_key = "${SIGNER_PRIVATE_KEY}"
//! funding_wallet_address = "0x1111111111111111111111111111111111111111"
//!
//! [rpc]
//! api_key = "$RPC_API_KEY"
//! rate_limit = 25
//!
//! [rpc.urls]
//! Base = "http://127.0.0.1:8545"
//!
//! [billing]
//! base_url = "https://openrouter.ai/"
//! api_key = "$BILLING_API_KEY"
//!
//! [marketplace]
//! base_url = "http://127.0.0.1:3002/"
//! api_key = "$MARKETPLACE_API_KEY"
//!
//! [settlement]
//! pool_fees_tier = 500
//! value = "0.004"
//! confirmation_timeout_secs = 120
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - `BEARER_TOKEN`, `SIGNER_PRIVATE_KEY`, `RPC_API_KEY`, `BILLING_API_KEY`,
//!   `MARKETPLACE_API_KEY`, `MARKETPLACE_URL`, `FUNDING_WALLET_ADDRESS` -
//!   fallbacks for the corresponding values when absent from the file

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::utils::parse_ether;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use opsgate::amount::DEFAULT_MAX_AMOUNT;
use opsgate::chain::{ChainName, ChainRegistry};
use opsgate::marketplace::DEFAULT_LISTING_TTL;
use opsgate_evm::builder::{FeeTier, SettlementConfig};
use opsgate_evm::executor::DEFAULT_CONFIRMATION_TIMEOUT;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`ServerConfig`].
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A required value is absent from both the file and the environment.
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),
    /// A value is present but unusable.
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Configuration key.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Top-level server configuration, as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3001`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on handling a single request, in seconds (default: `180`).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Shared secret expected as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Hex private key of the account that signs settlement transactions.
    #[serde(default)]
    pub signer_private_key: Option<String>,

    /// Wallet charges are issued for and marketplace orders are placed from.
    #[serde(default)]
    pub funding_wallet_address: Option<String>,

    /// RPC endpoints.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Billing service.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Marketplace order service.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    /// Settlement economics.
    #[serde(default)]
    pub settlement: SettlementSection,
}

/// RPC endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcConfig {
    /// Credential appended to the built-in endpoint templates.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Full endpoint URLs keyed by chain name, replacing the templates.
    #[serde(default)]
    pub urls: HashMap<String, String>,
    /// Maximum RPC requests per second.
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

/// Billing service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Base URL; the charge endpoint is resolved relative to it.
    #[serde(default = "default_billing_url")]
    pub base_url: Url,
    /// API key sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout, in seconds (default: `30`).
    #[serde(default = "default_billing_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            base_url: default_billing_url(),
            api_key: None,
            timeout_secs: default_billing_timeout_secs(),
        }
    }
}

/// Marketplace order service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    /// Base URL of the order service.
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key sent as `X-API-KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Lifetime of listings and auctions, in seconds (default: 30 days).
    #[serde(default = "default_listing_ttl_secs")]
    pub listing_ttl_secs: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            listing_ttl_secs: default_listing_ttl_secs(),
        }
    }
}

/// Settlement economics and confirmation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSection {
    /// Chain settlement transactions are sent on (default: `Base`).
    #[serde(default = "default_settlement_chain")]
    pub chain: String,
    /// Uniswap V3 pool fee tier (default: `500`).
    #[serde(default = "default_pool_fees_tier")]
    pub pool_fees_tier: u32,
    /// Native value attached to each call, in ether (default: `"0.004"`).
    #[serde(default = "default_value")]
    pub value: String,
    /// Confirmation deadline, in seconds (default: `120`).
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Confirmations to wait for (default: `1`).
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Largest amount a single funding request may ask for (default: `2000`).
    #[serde(default = "default_max_amount")]
    pub max_amount_usd: Decimal,
}

impl Default for SettlementSection {
    fn default() -> Self {
        Self {
            chain: default_settlement_chain(),
            pool_fees_tier: default_pool_fees_tier(),
            value: default_value(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmations: default_confirmations(),
            max_amount_usd: default_max_amount(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3001
}

const fn default_request_timeout_secs() -> u64 {
    180
}

fn default_billing_url() -> Url {
    Url::from_str("https://openrouter.ai/").expect("static URL is valid")
}

const fn default_billing_timeout_secs() -> u64 {
    30
}

const fn default_listing_ttl_secs() -> u64 {
    DEFAULT_LISTING_TTL.as_secs()
}

fn default_settlement_chain() -> String {
    ChainName::Base.as_str().to_owned()
}

const fn default_pool_fees_tier() -> u32 {
    500
}

fn default_value() -> String {
    "0.004".to_owned()
}

const fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
}

const fn default_confirmations() -> u64 {
    1
}

const fn default_max_amount() -> Decimal {
    DEFAULT_MAX_AMOUNT
}

/// Secrets and identities resolved from the file or the environment.
#[derive(Clone)]
pub struct Credentials {
    /// Expected bearer token.
    pub bearer_token: String,
    /// Settlement signer.
    pub signer: PrivateKeySigner,
    /// RPC credential.
    pub rpc_api_key: String,
    /// Billing API key.
    pub billing_api_key: String,
    /// Marketplace API key.
    pub marketplace_api_key: String,
    /// Marketplace order service base URL.
    pub marketplace_url: Url,
    /// Funding wallet.
    pub funding_wallet: Address,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("signer", &self.signer.address())
            .field("marketplace_url", &self.marketplace_url)
            .field("funding_wallet", &self.funding_wallet)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Loads configuration from `path` using the process environment.
    ///
    /// A missing file is treated as empty, so the server can run from
    /// environment variables alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::from_toml_str(&content, env_lookup)
    }

    /// Parses configuration from TOML, expanding variables through `lookup`.
    ///
    /// `HOST` and `PORT`, when resolvable through `lookup`, override the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the expanded text is not valid, and
    /// [`ConfigError::Invalid`] if the request timeout does not leave room for
    /// the billing call plus the confirmation wait.
    pub fn from_toml_str(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let expanded = expand_vars(content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Some(host) = lookup("HOST").and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        let funding_budget = config
            .billing
            .timeout_secs
            .saturating_add(config.settlement.confirmation_timeout_secs);
        if config.request_timeout_secs <= funding_budget {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                format!(
                    "{}s must exceed billing.timeout_secs + settlement.confirmation_timeout_secs ({funding_budget}s)",
                    config.request_timeout_secs
                ),
            ));
        }

        Ok(config)
    }

    /// Resolves required secrets from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::credentials_with`].
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.credentials_with(env_lookup)
    }

    /// Resolves required secrets, falling back to `lookup` for absent values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an absent or unresolved value and
    /// [`ConfigError::Invalid`] for a malformed key, address or URL.
    pub fn credentials_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, ConfigError> {
        let signer_key = required(self.signer_private_key.as_deref(), "SIGNER_PRIVATE_KEY", &lookup)?;
        let signer = PrivateKeySigner::from_str(&signer_key)
            .map_err(|e| ConfigError::invalid("signer_private_key", e))?;

        let funding_wallet = required(
            self.funding_wallet_address.as_deref(),
            "FUNDING_WALLET_ADDRESS",
            &lookup,
        )?;
        let funding_wallet = Address::from_str(&funding_wallet)
            .map_err(|e| ConfigError::invalid("funding_wallet_address", e))?;

        let marketplace_url = required(
            self.marketplace.base_url.as_deref(),
            "MARKETPLACE_URL",
            &lookup,
        )?;
        let marketplace_url = Url::parse(&marketplace_url)
            .map_err(|e| ConfigError::invalid("marketplace.base_url", e))?;

        Ok(Credentials {
            bearer_token: required(self.bearer_token.as_deref(), "BEARER_TOKEN", &lookup)?,
            signer,
            rpc_api_key: required(self.rpc.api_key.as_deref(), "RPC_API_KEY", &lookup)?,
            billing_api_key: required(self.billing.api_key.as_deref(), "BILLING_API_KEY", &lookup)?,
            marketplace_api_key: required(
                self.marketplace.api_key.as_deref(),
                "MARKETPLACE_API_KEY",
                &lookup,
            )?,
            marketplace_url,
            funding_wallet,
        })
    }

    /// Builds the chain registry, applying configured RPC URL overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override names an unknown chain.
    pub fn chain_registry(&self) -> Result<ChainRegistry, ConfigError> {
        self.rpc
            .urls
            .iter()
            .try_fold(ChainRegistry::known(), |registry, (name, url)| {
                let name = ChainName::from_str(name).map_err(|e| ConfigError::invalid("rpc.urls", e))?;
                Ok(registry.with_rpc_override(name, url.clone()))
            })
    }

    /// The chain settlement transactions are sent on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown chain name.
    pub fn settlement_chain(&self) -> Result<ChainName, ConfigError> {
        ChainName::from_str(&self.settlement.chain)
            .map_err(|e| ConfigError::invalid("settlement.chain", e))
    }

    /// Fee tier and value attached to settlement calls.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unsupported fee tier or an
    /// unparseable value.
    pub fn settlement_config(&self) -> Result<SettlementConfig, ConfigError> {
        let pool_fees_tier = FeeTier::try_from(self.settlement.pool_fees_tier)
            .map_err(|e| ConfigError::invalid("settlement.pool_fees_tier", e))?;
        let value = parse_ether(&self.settlement.value)
            .map_err(|e| ConfigError::invalid("settlement.value", e))?;
        Ok(SettlementConfig {
            pool_fees_tier,
            value,
        })
    }

    /// Request handling deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Confirmation deadline for settlement transactions.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement.confirmation_timeout_secs)
    }

    /// Lifetime of listings and auctions.
    #[must_use]
    pub const fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.marketplace.listing_ttl_secs)
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Returns the configured value, or the environment fallback when the value
/// is absent, blank or an unresolved `$` reference.
fn required(
    configured: Option<&str>,
    env: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let usable = |value: &str| {
        let value = value.trim();
        (!value.is_empty() && !value.starts_with('$')).then(|| value.to_owned())
    };
    configured
        .and_then(usable)
        .or_else(|| lookup(env).as_deref().and_then(usable))
        .ok_or(ConfigError::Missing(env))
}

/// Expands `$VAR` and `${VAR}` patterns in a string through `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.next_if_eq(&'{').is_some();
        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match lookup(&var_name).filter(|_| !var_name.is_empty()) {
            Some(value) => result.push_str(&value),
            None => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
