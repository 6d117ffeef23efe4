//! Settlement engine configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax, so signing keys stay out of the file itself.
//!
//! # Example Configuration
//!
//! ```toml
//! tenant_id = "acme"
//! merchant_id = "store-1"
//!
//! [fees]
//! flat = "0.00"
//! gas_divisor = "10000"
//!
//! [chains.sepolia]
//! protocol = "evm"
//! chain_id = 11155111
//! rpc_url = "https://ethereum-sepolia-rpc.publicnode.com"
//! native_currency = "ETH"
//! signer_key = "$SEPOLIA_SIGNER_KEY"
//!
//! [chains.sepolia.tokens.USDC]
//! address = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"
//! decimals = 6
//! name = "USDC"
//! version = "2"
//!
//! [chains.solana-devnet]
//! protocol = "solana"
//! cluster = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1"
//! rpc_url = "https://api.devnet.solana.com"
//! native_currency = "SOL"
//! signer_key = "$SOLANA_FEE_PAYER_KEY"
//!
//! [chains.solana-devnet.tokens.USDC]
//! address = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
//! decimals = 6
//! ```
//!
//! # Environment Variables
//!
//! - `PAYLANE_CONFIG` — path to the configuration file (default:
//!   `paylane.toml`)
//! - Signing keys referenced by `$VAR` in the config file

use crate::error::SettleError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level settlement configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettleConfig {
    /// Tenant the settlement batches belong to.
    #[serde(default = "default_party")]
    pub tenant_id: String,

    /// Merchant the settlement batches belong to.
    #[serde(default = "default_party")]
    pub merchant_id: String,

    /// Fee schedule parameters.
    #[serde(default)]
    pub fees: FeeConfig,

    /// Chain configurations keyed by network name.
    #[serde(default)]
    pub chains: HashMap<String, ChainEntry>,
}

/// Chain family of a configured network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// EIP-155 chains settled via EIP-2612 permit + transferFrom.
    Evm,
    /// Solana clusters settled via fee-payer co-signing.
    Solana,
}

/// Per-network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Chain family this network belongs to.
    pub protocol: Protocol,

    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,

    /// EIP-155 chain id; required for `protocol = "evm"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// Genesis-hash cluster reference; required for `protocol = "solana"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Native currency symbol, for logs.
    pub native_currency: String,

    /// Spender / fee-payer signing key. Supports `$VAR` / `${VAR}`
    /// expansion from the process environment.
    pub signer_key: String,

    /// Where transfers are routed; defaults to the spender address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_address: Option<String>,

    /// Token configurations keyed by symbol.
    #[serde(default)]
    pub tokens: HashMap<String, TokenEntry>,
}

/// Per-token configuration on one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Contract address (EVM) or mint address (Solana).
    pub address: String,

    /// Token decimals.
    pub decimals: u8,

    /// EIP-712 domain name; EVM only.
    #[serde(default)]
    pub name: String,

    /// EIP-712 domain version; EVM only.
    #[serde(default = "default_token_version")]
    pub version: String,
}

/// Settlement fee parameters.
///
/// `fee = flat + gas_used / gas_divisor`, in display token units, clamped
/// to the gross amount. The default divisor of 10000 approximates the
/// observed network cost of a testnet USDC transfer; production deployments
/// set their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Flat component charged per settlement.
    #[serde(default)]
    pub flat: Decimal,

    /// Divisor applied to the observed gas usage.
    #[serde(default = "default_gas_divisor")]
    pub gas_divisor: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            flat: Decimal::ZERO,
            gas_divisor: default_gas_divisor(),
        }
    }
}

fn default_party() -> String {
    "default".to_owned()
}

fn default_token_version() -> String {
    "1".to_owned()
}

fn default_gas_divisor() -> Decimal {
    Decimal::from(10_000)
}

impl SettleConfig {
    /// Loads configuration from the path given by the `PAYLANE_CONFIG`
    /// environment variable, falling back to `paylane.toml` in the current
    /// directory. A `.env` file is loaded first so `$VAR` references can
    /// resolve against it.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Config`] if the file cannot be read or
    /// parsed.
    pub fn load() -> Result<Self, SettleError> {
        dotenvy::dotenv().ok();
        let path =
            std::env::var("PAYLANE_CONFIG").unwrap_or_else(|_| "paylane.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path. A missing file parses
    /// as an empty configuration, relying on defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Config`] if the file cannot be read or
    /// parsed.
    pub fn load_from(path: &str) -> Result<Self, SettleError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)
                .map_err(|e| SettleError::Config(format!("cannot read {path}: {e}")))?
        } else {
            String::new()
        };
        Self::from_toml(&content)
    }

    /// Parses a TOML string, expanding `$VAR` / `${VAR}` references first.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Config`] on malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, SettleError> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| SettleError::Config(e.to_string()))
    }

    /// Looks up the configured entry for a network name, case-insensitive.
    #[must_use]
    pub fn chain(&self, network: &str) -> Option<&ChainEntry> {
        let network = network.to_lowercase();
        self.chains
            .iter()
            .find(|(name, _)| name.to_lowercase() == network)
            .map(|(_, entry)| entry)
    }
}

impl ChainEntry {
    /// Looks up the configured entry for a token symbol, case-insensitive.
    #[must_use]
    pub fn token(&self, symbol: &str) -> Option<&TokenEntry> {
        let symbol = symbol.to_uppercase();
        self.tokens
            .iter()
            .find(|(name, _)| name.to_uppercase() == symbol)
            .map(|(_, entry)| entry)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment
/// variables. Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }

            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if braced {
                    if c == '}' {
                        chars.next();
                        break;
                    }
                } else if !c.is_ascii_alphanumeric() && c != '_' {
                    break;
                }
                var_name.push(c);
                chars.next();
            }

            if var_name.is_empty() {
                result.push('$');
                if braced {
                    result.push('{');
                }
            } else if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            } else {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced {
                    result.push('}');
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
