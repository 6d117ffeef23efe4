//! Registry of supported networks, chain identifiers and asset identifiers.
//!
//! Callers address networks by a short human-readable name (`"sepolia"`,
//! `"solana-devnet"`). The ledger stores canonical CAIP-style identifiers
//! instead, so this module provides the fixed lookup tables that translate
//! between the two. Lookups are total functions over the supported set and
//! return `None` for anything else; builders treat a failed lookup as a
//! structured failure, never a panic.

/// Ethereum Sepolia testnet.
pub const SEPOLIA: &str = "sepolia";

/// Base Sepolia testnet.
pub const BASE_SEPOLIA: &str = "basesepolia";

/// BNB Chain testnet.
pub const BNB_TESTNET: &str = "bnbtestnet";

/// Solana devnet.
pub const SOLANA_DEVNET: &str = "solana-devnet";

/// CAIP-2 chain id for Ethereum Sepolia.
pub const CHAIN_SEPOLIA: &str = "eip155:11155111";

/// CAIP-2 chain id for Base Sepolia.
pub const CHAIN_BASE_SEPOLIA: &str = "eip155:84532";

/// CAIP-2 chain id for BNB Chain testnet.
pub const CHAIN_BNB_TESTNET: &str = "eip155:97";

/// CAIP-2 chain id for Solana devnet (genesis hash prefix reference).
pub const CHAIN_SOLANA_DEVNET: &str = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// `(network name, chain id, asset id, token decimals)` rows for every
/// supported network. The asset id pins the canonical USDC deployment used
/// for settlement on that chain.
const NETWORK_TABLE: &[(&str, &str, &str, u8)] = &[
    (
        SEPOLIA,
        CHAIN_SEPOLIA,
        "eip155:11155111/erc20:0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
        6,
    ),
    (
        BASE_SEPOLIA,
        CHAIN_BASE_SEPOLIA,
        "eip155:84532/erc20:0x036CbD53842c5426634e7929541eC2318f3dCF7e",
        6,
    ),
    (
        BNB_TESTNET,
        CHAIN_BNB_TESTNET,
        "eip155:97/erc20:0x64544969ed7EBf5f083679233325356EbE738930",
        6,
    ),
    (
        SOLANA_DEVNET,
        CHAIN_SOLANA_DEVNET,
        "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1/token:4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
        6,
    ),
];

/// Resolves a human-readable network name to its canonical chain id.
///
/// Matching is case-insensitive on the network name.
#[must_use]
pub fn chain_id_by_network(network: &str) -> Option<&'static str> {
    let network = network.to_ascii_lowercase();
    NETWORK_TABLE
        .iter()
        .find(|(name, ..)| *name == network)
        .map(|(_, chain_id, ..)| *chain_id)
}

/// Resolves a chain id to the settlement asset deployed on that chain.
#[must_use]
pub fn asset_id_by_chain(chain_id: &str) -> Option<&'static str> {
    NETWORK_TABLE
        .iter()
        .find(|(_, id, ..)| *id == chain_id)
        .map(|(_, _, asset_id, _)| *asset_id)
}

/// Resolves a chain id to the settlement token's decimals.
#[must_use]
pub fn token_decimals_by_chain(chain_id: &str) -> Option<u8> {
    NETWORK_TABLE
        .iter()
        .find(|(_, id, ..)| *id == chain_id)
        .map(|(.., decimals)| *decimals)
}

/// Whether the named network belongs to the Solana chain family.
#[must_use]
pub fn is_solana_network(network: &str) -> bool {
    network.to_ascii_lowercase().starts_with("solana")
}

/// Returns the names of all supported networks.
#[must_use]
pub fn supported_networks() -> Vec<&'static str> {
    NETWORK_TABLE.iter().map(|(name, ..)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_lookup_is_case_insensitive() {
        assert_eq!(chain_id_by_network("sepolia"), Some(CHAIN_SEPOLIA));
        assert_eq!(chain_id_by_network("Sepolia"), Some(CHAIN_SEPOLIA));
        assert_eq!(chain_id_by_network("SOLANA-DEVNET"), Some(CHAIN_SOLANA_DEVNET));
    }

    #[test]
    fn unknown_network_resolves_to_none() {
        assert_eq!(chain_id_by_network("mainnet-beta"), None);
        assert_eq!(asset_id_by_chain("eip155:1"), None);
        assert_eq!(token_decimals_by_chain("eip155:1"), None);
    }

    #[test]
    fn every_network_row_is_complete() {
        for name in supported_networks() {
            let chain_id = chain_id_by_network(name).unwrap();
            assert!(asset_id_by_chain(chain_id).is_some());
            assert!(token_decimals_by_chain(chain_id).is_some());
        }
    }

    #[test]
    fn solana_family_detection() {
        assert!(is_solana_network("solana-devnet"));
        assert!(is_solana_network("Solana-Mainnet"));
        assert!(!is_solana_network("sepolia"));
    }
}
