//! Handler configuration for one Solana `(network, token)` pair.

use serde::{Deserialize, Serialize};
use url::Url;

/// Everything needed to construct a [`crate::SolanaTransferHandler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaHandlerConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Cluster reference, the first 32 characters of the genesis hash
    /// (e.g. `EtWTRABZaYq6iMfeYKouRu166VU2xqa1` for devnet).
    pub cluster: String,
    /// SPL token mint address, base58.
    pub mint_address: String,
    /// Token decimals, e.g. 6 for USDC.
    pub token_decimals: u8,
    /// Fee-payer keypair, base58-encoded 64-byte secret. Typically expanded
    /// from an environment variable by the config loader.
    pub fee_payer_key: String,
    /// Where transfers are expected to land; defaults to the fee-payer
    /// address when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_address: Option<String>,
}
