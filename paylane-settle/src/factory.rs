//! Handler factory and singleton-per-key cache.

use crate::config::{ChainEntry, Protocol, SettleConfig};
use crate::error::SettleError;
use async_trait::async_trait;
use paylane::handler::TransferHandler;
use paylane_evm::{EvmHandlerConfig, EvmTransferHandler};
use paylane_svm::{SolanaHandlerConfig, SolanaTransferHandler};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Resolves a `(network, token)` pair to a shared transfer handler.
///
/// Implemented by [`HandlerFactory`] in production and by map-backed fakes
/// in tests; callers depend on the trait so the registry is injected, never
/// reached through a global.
#[async_trait]
pub trait HandlerResolver: Send + Sync {
    /// Returns the handler for the pair, or `None` when the pair is not
    /// configured or its handler could not be constructed. A missing
    /// handler is reported, not retried, within one call.
    async fn resolve(&self, network: &str, token: &str) -> Option<Arc<dyn TransferHandler>>;
}

/// Constructs handlers from [`SettleConfig`] and caches them forever.
///
/// The cache is keyed by normalized `(lowercase network, uppercase token)`,
/// so repeated lookups for the same pair return the identical instance and
/// RPC connections are never rebuilt. Construction happens under the cache
/// lock, which keeps a concurrent first access from constructing twice.
pub struct HandlerFactory {
    config: SettleConfig,
    cache: Mutex<HashMap<(String, String), Arc<dyn TransferHandler>>>,
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HandlerFactory {
    /// Creates a factory over the given configuration.
    #[must_use]
    pub fn new(config: SettleConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn construct(
        &self,
        network: &str,
        token: &str,
    ) -> Result<Arc<dyn TransferHandler>, SettleError> {
        let entry = self
            .config
            .chain(network)
            .ok_or_else(|| SettleError::Config(format!("network {network} is not configured")))?;
        let token_entry = entry.token(token).ok_or_else(|| {
            SettleError::Config(format!("token {token} is not configured on {network}"))
        })?;
        let rpc_url = entry
            .rpc_url
            .parse::<Url>()
            .map_err(|e| SettleError::Config(format!("rpc_url for {network}: {e}")))?;

        match entry.protocol {
            Protocol::Evm => {
                let chain_id = entry.chain_id.ok_or_else(|| {
                    SettleError::Config(format!("chain_id missing for EVM network {network}"))
                })?;
                let handler = EvmTransferHandler::new(
                    network,
                    token,
                    &EvmHandlerConfig {
                        rpc_url,
                        chain_id,
                        native_currency: entry.native_currency.clone(),
                        token_address: token_entry.address.clone(),
                        token_decimals: token_entry.decimals,
                        token_name: token_entry.name.clone(),
                        token_version: token_entry.version.clone(),
                        signer_key: entry.signer_key.clone(),
                        payee_address: entry.payee_address.clone(),
                    },
                )?;
                Ok(Arc::new(handler))
            }
            Protocol::Solana => {
                let cluster = entry.cluster.clone().ok_or_else(|| {
                    SettleError::Config(format!("cluster missing for Solana network {network}"))
                })?;
                let handler = SolanaTransferHandler::new(
                    network,
                    token,
                    &SolanaHandlerConfig {
                        rpc_url,
                        cluster,
                        mint_address: token_entry.address.clone(),
                        token_decimals: token_entry.decimals,
                        fee_payer_key: entry.signer_key.clone(),
                        payee_address: entry.payee_address.clone(),
                    },
                )?;
                Ok(Arc::new(handler))
            }
        }
    }
}

#[async_trait]
impl HandlerResolver for HandlerFactory {
    async fn resolve(&self, network: &str, token: &str) -> Option<Arc<dyn TransferHandler>> {
        let key = (network.to_lowercase(), token.to_uppercase());
        let mut cache = self.cache.lock().await;
        if let Some(handler) = cache.get(&key) {
            return Some(Arc::clone(handler));
        }
        match self.construct(&key.0, &key.1) {
            Ok(handler) => {
                cache.insert(key, Arc::clone(&handler));
                Some(handler)
            }
            Err(e) => {
                tracing::error!(network = %key.0, token = %key.1, error = %e, "handler construction failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenEntry;
    use solana_keypair::Keypair;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn factory_config() -> SettleConfig {
        let mut config = SettleConfig::from_toml("").unwrap();
        config.chains.insert(
            "sepolia".to_owned(),
            ChainEntry {
                protocol: Protocol::Evm,
                rpc_url: "http://localhost:8545".to_owned(),
                chain_id: Some(11_155_111),
                cluster: None,
                native_currency: "ETH".to_owned(),
                signer_key: ANVIL_KEY.to_owned(),
                payee_address: None,
                tokens: HashMap::from([(
                    "USDC".to_owned(),
                    TokenEntry {
                        address: "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".to_owned(),
                        decimals: 6,
                        name: "USDC".to_owned(),
                        version: "2".to_owned(),
                    },
                )]),
            },
        );
        config.chains.insert(
            "solana-devnet".to_owned(),
            ChainEntry {
                protocol: Protocol::Solana,
                rpc_url: "http://localhost:8899".to_owned(),
                chain_id: None,
                cluster: Some("EtWTRABZaYq6iMfeYKouRu166VU2xqa1".to_owned()),
                native_currency: "SOL".to_owned(),
                signer_key: Keypair::new().to_base58_string(),
                payee_address: None,
                tokens: HashMap::from([(
                    "USDC".to_owned(),
                    TokenEntry {
                        address: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".to_owned(),
                        decimals: 6,
                        name: String::new(),
                        version: "1".to_owned(),
                    },
                )]),
            },
        );
        config
    }

    #[tokio::test]
    async fn same_pair_resolves_to_identical_instance() {
        let factory = HandlerFactory::new(factory_config());
        let first = factory.resolve("sepolia", "USDC").await.unwrap();
        let second = factory.resolve("sepolia", "USDC").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn key_normalization_ignores_case() {
        let factory = HandlerFactory::new(factory_config());
        let lower = factory.resolve("sepolia", "usdc").await.unwrap();
        let mixed = factory.resolve("Sepolia", "Usdc").await.unwrap();
        assert!(Arc::ptr_eq(&lower, &mixed));
    }

    #[tokio::test]
    async fn resolves_both_chain_families() {
        let factory = HandlerFactory::new(factory_config());
        let evm = factory.resolve("sepolia", "USDC").await.unwrap();
        let svm = factory.resolve("solana-devnet", "USDC").await.unwrap();
        assert_eq!(evm.network(), "sepolia");
        assert_eq!(svm.network(), "solana-devnet");
        assert!(!Arc::ptr_eq(&evm, &svm));
    }

    #[tokio::test]
    async fn unknown_pairs_resolve_to_none() {
        let factory = HandlerFactory::new(factory_config());
        assert!(factory.resolve("mainnet", "USDC").await.is_none());
        assert!(factory.resolve("sepolia", "DAI").await.is_none());
    }

    #[tokio::test]
    async fn broken_configuration_resolves_to_none() {
        let mut config = factory_config();
        config.chains.get_mut("sepolia").unwrap().signer_key = "not-a-key".to_owned();
        let factory = HandlerFactory::new(config);
        assert!(factory.resolve("sepolia", "USDC").await.is_none());
    }
}
