use crate::error::{CliError, Result};
use alloy_primitives::Address;
use fhe_client::{BackendMode, FheType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum_macros::Display;
use validator::Validate;

/// What a configured token contract is able to do. Variants are composed as a
/// set instead of an inheritance chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenCapability {
    /// Amounts are ciphertext handles produced through the coprocessor.
    Encrypted,
    /// Ownership and whitelist management entry points.
    Whitelist,
    /// Oracle-managed deposit/claim entry points with plain amounts.
    Deposit,
}

/// One deployed token contract.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TokenProfile {
    #[validate(length(min = 1))]
    pub name: String,
    pub address: String,
    pub fhe_type: FheType,
    #[serde(default)]
    pub capabilities: HashSet<TokenCapability>,
}

impl TokenProfile {
    pub fn token_address(&self) -> Result<Address> {
        parse_address(&self.address, "token")
    }

    pub fn has(&self, capability: TokenCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Configuration for the token CLI
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Ethereum JSON-RPC endpoint
    #[validate(length(min = 1))]
    pub chain_rpc_url: String,
    /// Hex private key of the operator wallet. The PRIVATE_KEY environment
    /// variable takes precedence over the file value.
    pub private_key: Option<String>,
    /// ACL contract governing decryption permissions
    pub acl_address: String,
    /// JSON-RPC endpoint of the FHE coprocessor
    pub coprocessor_url: Option<String>,
    /// Directory holding cached coprocessor public keys
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    /// Short-circuit coprocessor calls locally
    #[serde(default)]
    pub mock: bool,
    /// Encryption backend to load
    #[serde(default)]
    pub backend: BackendMode,
    /// Configured token contracts; the first one is the default target
    #[validate(length(min = 1))]
    pub tokens: Vec<TokenProfile>,
}

fn default_key_dir() -> PathBuf {
    PathBuf::from(".")
}

impl CliConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse config file: {e}")))?;
        config
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        // fail on malformed addresses up front, not at first use
        config.acl()?;
        for token in &config.tokens {
            token.token_address()?;
        }
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn acl(&self) -> Result<Address> {
        parse_address(&self.acl_address, "ACL")
    }

    /// Operator key with the environment override applied.
    pub fn operator_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("PRIVATE_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        self.private_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CliError::Config(
                    "no operator key: set private_key in the config file or PRIVATE_KEY"
                        .to_string(),
                )
            })
    }

    /// Profile selected by name, or the first configured token.
    pub fn token(&self, name: Option<&str>) -> Result<&TokenProfile> {
        match name {
            None => self
                .tokens
                .first()
                .ok_or_else(|| CliError::Config("no tokens configured".to_string())),
            Some(name) => self
                .tokens
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "token '{name}' is not configured (known: {})",
                        self.tokens
                            .iter()
                            .map(|t| t.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                }),
        }
    }

    /// Client configuration for the coprocessor side.
    pub fn fhe_config(&self, mock_override: bool) -> fhe_client::ClientConfig {
        fhe_client::ClientConfig {
            coprocessor_url: self.coprocessor_url.clone(),
            key_dir: self.key_dir.clone(),
            backend: self.backend,
            mock: self.mock || mock_override,
        }
    }
}

fn parse_address(value: &str, label: &str) -> Result<Address> {
    if !value.starts_with("0x") {
        return Err(CliError::Config(format!(
            "{label} address must start with 0x"
        )));
    }
    Address::from_str(value)
        .map_err(|e| CliError::Config(format!("invalid {label} address {value}: {e}")))
}
