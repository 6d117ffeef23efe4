//! The EVM transfer handler.

use crate::config::EvmHandlerConfig;
use crate::contract::IErc20Permit;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use paylane::handler::{
    AllowanceInfo, AuthMaterial, EvmAuthorization, HandlerError, PermitCall, TransferHandler,
    TxOutcome,
};
use tokio::sync::Mutex;

/// Wei per native-currency unit, for display conversion.
const WEI_PER_NATIVE: f64 = 1e18;

/// [`TransferHandler`] for one `(network, token)` pair on an EIP-155 chain.
///
/// Owns a wallet-wired provider for the spender account. All submissions go
/// through `submit_lock`, which serializes the nonce-fetch+send sequence:
/// the spender key may be shared across concurrent sessions, and two
/// interleaved submissions would otherwise race on the pending nonce.
#[derive(Debug)]
pub struct EvmTransferHandler {
    network: String,
    token: String,
    chain_id: u64,
    native_currency: String,
    token_decimals: u8,
    spender: Address,
    payee: Address,
    provider: DynProvider,
    contract: IErc20Permit::IErc20PermitInstance<DynProvider>,
    submit_lock: Mutex<()>,
}

fn parse_address(value: &str, field: &str) -> Result<Address, HandlerError> {
    value
        .parse::<Address>()
        .map_err(|e| HandlerError::InvalidInput(format!("{field}: {e}")))
}

fn scaled_display(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(i32::from(decimals))
}

impl EvmTransferHandler {
    /// Constructs a handler from its configuration.
    ///
    /// Does not touch the network: the provider connects lazily on first
    /// RPC call, so construction only fails on malformed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Unavailable`] when the signing key or token
    /// address cannot be parsed.
    pub fn new(
        network: &str,
        token: &str,
        config: &EvmHandlerConfig,
    ) -> Result<Self, HandlerError> {
        let signer = config
            .signer_key
            .parse::<PrivateKeySigner>()
            .map_err(|e| HandlerError::Unavailable(format!("invalid signer key: {e}")))?;
        let spender = signer.address();
        let token_address = config
            .token_address
            .parse::<Address>()
            .map_err(|e| HandlerError::Unavailable(format!("invalid token address: {e}")))?;
        let payee = match &config.payee_address {
            Some(addr) => addr
                .parse::<Address>()
                .map_err(|e| HandlerError::Unavailable(format!("invalid payee address: {e}")))?,
            None => spender,
        };

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(config.rpc_url.clone())
            .erased();
        let contract = IErc20Permit::new(token_address, provider.clone());

        tracing::info!(
            network,
            token,
            chain_id = config.chain_id,
            spender = %spender,
            token_address = %token_address,
            "constructed EVM transfer handler"
        );

        Ok(Self {
            network: network.to_owned(),
            token: token.to_owned(),
            chain_id: config.chain_id,
            native_currency: config.native_currency.clone(),
            token_decimals: config.token_decimals,
            spender,
            payee,
            provider,
            contract,
            submit_lock: Mutex::new(()),
        })
    }

    fn permit_signature(call: &PermitCall) -> Result<&EvmAuthorization, HandlerError> {
        match &call.auth {
            AuthMaterial::Evm(sig) => Ok(sig),
            AuthMaterial::Solana(_) => Err(HandlerError::InvalidInput(
                "EVM handler received Solana authorization material".to_owned(),
            )),
        }
    }

    fn split_signature(sig: &EvmAuthorization) -> Result<(u8, B256, B256), HandlerError> {
        let r = sig
            .r
            .parse::<B256>()
            .map_err(|e| HandlerError::InvalidInput(format!("signature r: {e}")))?;
        let s = sig
            .s
            .parse::<B256>()
            .map_err(|e| HandlerError::InvalidInput(format!("signature s: {e}")))?;
        Ok((sig.v, r, s))
    }

    /// Reads `owner`'s token balance in base units. Advisory query for
    /// pre-flight checks and operator tooling.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Rpc`] on query failure and
    /// [`HandlerError::InvalidInput`] on a malformed address.
    pub async fn balance_of(&self, owner: &str) -> Result<u128, HandlerError> {
        let owner = parse_address(owner, "owner")?;
        let balance = self
            .contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        Ok(u128::try_from(balance).unwrap_or(u128::MAX))
    }
}

#[async_trait]
impl TransferHandler for EvmTransferHandler {
    fn network(&self) -> &str {
        &self.network
    }

    fn token(&self) -> &str {
        &self.token
    }

    fn spender_address(&self) -> String {
        self.spender.to_string()
    }

    fn payee_address(&self) -> String {
        self.payee.to_string()
    }

    async fn simulate_permit(&self, call: &PermitCall) -> Result<(), HandlerError> {
        let owner = parse_address(&call.owner, "owner")?;
        let (v, r, s) = Self::split_signature(Self::permit_signature(call)?)?;
        self.contract
            .permit(
                owner,
                self.spender,
                U256::from(call.value),
                U256::from(call.deadline),
                v,
                r,
                s,
            )
            .from(self.spender)
            .call()
            .await
            .map_err(|e| HandlerError::Simulation(e.to_string()))?;
        Ok(())
    }

    async fn execute_permit(&self, call: &PermitCall) -> Result<TxOutcome, HandlerError> {
        let owner = parse_address(&call.owner, "owner")?;
        let (v, r, s) = Self::split_signature(Self::permit_signature(call)?)?;

        // Nonce fetch and send must not interleave with another submission
        // from the same spender account.
        let _guard = self.submit_lock.lock().await;
        let nonce = self
            .provider
            .get_transaction_count(self.spender)
            .pending()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let pending = self
            .contract
            .permit(
                owner,
                self.spender,
                U256::from(call.value),
                U256::from(call.deadline),
                v,
                r,
                s,
            )
            .from(self.spender)
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(
            network = %self.network,
            owner = %owner,
            value = call.value,
            tx = %tx_hash,
            nonce,
            "permit submitted"
        );
        Ok(
            TxOutcome::pending(tx_hash.to_string(), "Permit submitted, awaiting confirmation")
                .with_detail("nonce", nonce)
                .with_detail("chain_id", self.chain_id),
        )
    }

    async fn execute_transfer_from(
        &self,
        owner: &str,
        amount: u128,
    ) -> Result<TxOutcome, HandlerError> {
        let owner_address = parse_address(owner, "owner")?;
        let allowance = self
            .contract
            .allowance(owner_address, self.spender)
            .call()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        if allowance < U256::from(amount) {
            tracing::warn!(
                network = %self.network,
                owner,
                allowance = %allowance,
                required = amount,
                "transferFrom blocked by allowance"
            );
            return Ok(TxOutcome::failed(
                "",
                format!("Insufficient allowance: have {allowance}, need {amount}"),
            ));
        }

        let _guard = self.submit_lock.lock().await;
        let nonce = self
            .provider
            .get_transaction_count(self.spender)
            .pending()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let pending = self
            .contract
            .transferFrom(owner_address, self.payee, U256::from(amount))
            .from(self.spender)
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(
            network = %self.network,
            owner,
            payee = %self.payee,
            amount,
            tx = %tx_hash,
            nonce,
            "transferFrom submitted"
        );
        Ok(TxOutcome::pending(
            tx_hash.to_string(),
            "Transfer submitted, awaiting confirmation",
        )
        .with_detail("nonce", nonce)
        .with_detail("chain_id", self.chain_id))
    }

    async fn get_transaction_status(&self, reference: &str) -> Result<TxOutcome, HandlerError> {
        let tx_hash = reference
            .parse::<B256>()
            .map_err(|e| HandlerError::InvalidInput(format!("transaction reference: {e}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let Some(receipt) = receipt else {
            // Not visible yet means still unconfirmed, never an error.
            return Ok(TxOutcome::pending(reference, "Transaction not yet confirmed"));
        };

        let mut outcome = if receipt.status() {
            TxOutcome::confirmed(reference, "Transaction confirmed")
        } else {
            TxOutcome::failed(reference, "Transaction reverted on-chain")
        };
        outcome = outcome
            .with_detail("gas_used", receipt.gas_used)
            .with_detail(
                "effective_gas_price",
                receipt.effective_gas_price.to_string(),
            );
        if let Some(block_number) = receipt.block_number {
            outcome = outcome.with_detail("block_number", block_number);
        }
        Ok(outcome)
    }

    async fn check_allowance(&self, owner: &str) -> Result<AllowanceInfo, HandlerError> {
        let owner_address = parse_address(owner, "owner")?;
        let allowance = self
            .contract
            .allowance(owner_address, self.spender)
            .call()
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;
        let amount = u128::try_from(allowance).unwrap_or(u128::MAX);
        Ok(AllowanceInfo {
            amount,
            display: scaled_display(amount, self.token_decimals),
            owner: owner.to_owned(),
            spender: self.spender.to_string(),
            note: None,
        })
    }

    async fn get_native_balance(&self, address: &str) -> f64 {
        let Ok(address) = address.parse::<Address>() else {
            tracing::warn!(address, "native balance query with malformed address");
            return 0.0;
        };
        match self.provider.get_balance(address).await {
            Ok(balance) => {
                let wei = u128::try_from(balance).unwrap_or(u128::MAX);
                wei as f64 / WEI_PER_NATIVE
            }
            Err(e) => {
                tracing::warn!(
                    address = %address,
                    currency = %self.native_currency,
                    error = %e,
                    "native balance query failed"
                );
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylane::handler::SolanaAuthorization;

    // Well-known local development key, never funded on public networks.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_KEY_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn test_config() -> EvmHandlerConfig {
        EvmHandlerConfig {
            rpc_url: "http://localhost:8545".parse().unwrap(),
            chain_id: 11_155_111,
            native_currency: "ETH".to_owned(),
            token_address: "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".to_owned(),
            token_decimals: 6,
            token_name: "USDC".to_owned(),
            token_version: "2".to_owned(),
            signer_key: TEST_KEY.to_owned(),
            payee_address: None,
        }
    }

    #[test]
    fn construction_derives_spender_from_key() {
        let handler = EvmTransferHandler::new("sepolia", "USDC", &test_config()).unwrap();
        assert_eq!(handler.spender_address(), TEST_KEY_ADDRESS);
        assert_eq!(handler.network(), "sepolia");
        assert_eq!(handler.token(), "USDC");
        // No payee configured: transfers default to the spender.
        assert_eq!(handler.payee.to_string(), TEST_KEY_ADDRESS);
    }

    #[test]
    fn construction_rejects_bad_key_and_address() {
        let mut config = test_config();
        config.signer_key = "not-a-key".to_owned();
        let err = EvmTransferHandler::new("sepolia", "USDC", &config).unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable(_)));

        let mut config = test_config();
        config.token_address = "0x123".to_owned();
        let err = EvmTransferHandler::new("sepolia", "USDC", &config).unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn simulate_rejects_solana_authorization() {
        let handler = EvmTransferHandler::new("sepolia", "USDC", &test_config()).unwrap();
        let call = PermitCall {
            owner: TEST_KEY_ADDRESS.to_owned(),
            value: 10_000,
            deadline: 2_000_000_000,
            auth: AuthMaterial::Solana(SolanaAuthorization {
                partial_tx: "AQID".to_owned(),
            }),
        };
        let err = handler.simulate_permit(&call).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn status_query_rejects_malformed_reference() {
        let handler = EvmTransferHandler::new("sepolia", "USDC", &test_config()).unwrap();
        let err = handler.get_transaction_status("not-a-hash").await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn balance_query_rejects_malformed_owner() {
        let handler = EvmTransferHandler::new("sepolia", "USDC", &test_config()).unwrap();
        let err = handler.balance_of("not-an-address").await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn native_balance_is_zero_on_bad_address() {
        let handler = EvmTransferHandler::new("sepolia", "USDC", &test_config()).unwrap();
        assert_eq!(handler.get_native_balance("garbage").await, 0.0);
    }

    #[test]
    fn display_scaling_uses_token_decimals() {
        assert!((scaled_display(1_500_000, 6) - 1.5).abs() < f64::EPSILON);
        assert!((scaled_display(0, 6)).abs() < f64::EPSILON);
    }
}
