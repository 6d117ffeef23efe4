//! Handler configuration for one EVM `(network, token)` pair.

use serde::{Deserialize, Serialize};
use url::Url;

/// Everything needed to construct an [`crate::EvmTransferHandler`].
///
/// Missing or malformed fields are a construction-time error scoped to the
/// one `(network, token)` pair this config describes; other handlers remain
/// usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmHandlerConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: Url,
    /// EIP-155 chain id, e.g. 11155111 for Sepolia.
    pub chain_id: u64,
    /// Native currency symbol, for logs ("ETH", "BNB").
    pub native_currency: String,
    /// ERC-20 token contract address, 0x-prefixed.
    pub token_address: String,
    /// Token decimals, e.g. 6 for USDC.
    pub token_decimals: u8,
    /// EIP-712 domain name of the token contract.
    pub token_name: String,
    /// EIP-712 domain version of the token contract.
    pub token_version: String,
    /// Spender private key, 0x-prefixed hex. Typically expanded from an
    /// environment variable by the config loader.
    pub signer_key: String,
    /// Where `transferFrom` sends funds; defaults to the spender address
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_address: Option<String>,
}
