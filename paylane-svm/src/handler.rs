//! The Solana transfer handler.

use crate::config::SolanaHandlerConfig;
use crate::tx::PartialTransaction;
use async_trait::async_trait;
use paylane::handler::{
    AllowanceInfo, AuthMaterial, HandlerError, PermitCall, SolanaAuthorization, TransferHandler,
    TxOutcome,
};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use std::str::FromStr;

/// Associated Token Account program public key.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Lamports per SOL, for display conversion.
const LAMPORTS_PER_SOL: f64 = 1e9;

/// [`TransferHandler`] for one `(network, token)` pair on a Solana cluster.
///
/// Holds the backend fee-payer keypair. The payer's authorization is an
/// entire partially signed transaction, so the permit step co-signs and
/// submits it in one atomic operation and the transfer step is a protocol
/// no-op.
pub struct SolanaTransferHandler {
    network: String,
    token: String,
    cluster: String,
    mint: Pubkey,
    token_decimals: u8,
    fee_payer: Keypair,
    payee: Pubkey,
    rpc: RpcClient,
}

impl std::fmt::Debug for SolanaTransferHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaTransferHandler")
            .field("network", &self.network)
            .field("token", &self.token)
            .field("cluster", &self.cluster)
            .field("mint", &self.mint)
            .field("fee_payer", &self.fee_payer.pubkey())
            .finish_non_exhaustive()
    }
}

fn parse_pubkey(value: &str, field: &str) -> Result<Pubkey, HandlerError> {
    Pubkey::from_str(value).map_err(|e| HandlerError::InvalidInput(format!("{field}: {e}")))
}

impl SolanaTransferHandler {
    /// Constructs a handler from its configuration.
    ///
    /// The RPC client connects lazily, so construction only fails on
    /// malformed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Unavailable`] when the fee-payer key or mint
    /// address cannot be parsed.
    pub fn new(
        network: &str,
        token: &str,
        config: &SolanaHandlerConfig,
    ) -> Result<Self, HandlerError> {
        let key_bytes = bs58::decode(config.fee_payer_key.trim())
            .into_vec()
            .map_err(|e| HandlerError::Unavailable(format!("invalid fee payer key: {e}")))?;
        let fee_payer = Keypair::try_from(key_bytes.as_slice())
            .map_err(|e| HandlerError::Unavailable(format!("invalid fee payer key: {e}")))?;
        let mint = Pubkey::from_str(&config.mint_address)
            .map_err(|e| HandlerError::Unavailable(format!("invalid mint address: {e}")))?;
        let payee = match &config.payee_address {
            Some(addr) => Pubkey::from_str(addr)
                .map_err(|e| HandlerError::Unavailable(format!("invalid payee address: {e}")))?,
            None => fee_payer.pubkey(),
        };
        let rpc = RpcClient::new(config.rpc_url.to_string());

        tracing::info!(
            network,
            token,
            cluster = %config.cluster,
            fee_payer = %fee_payer.pubkey(),
            mint = %mint,
            "constructed Solana transfer handler"
        );

        Ok(Self {
            network: network.to_owned(),
            token: token.to_owned(),
            cluster: config.cluster.clone(),
            mint,
            token_decimals: config.token_decimals,
            fee_payer,
            payee,
            rpc,
        })
    }

    fn partial_tx(call: &PermitCall) -> Result<&SolanaAuthorization, HandlerError> {
        match &call.auth {
            AuthMaterial::Solana(auth) => Ok(auth),
            AuthMaterial::Evm(_) => Err(HandlerError::InvalidInput(
                "Solana handler received EVM authorization material".to_owned(),
            )),
        }
    }

    /// Derives the associated token account of `owner` for the configured
    /// mint.
    #[must_use]
    pub fn associated_token_account(&self, owner: &Pubkey) -> Pubkey {
        let (ata, _) = Pubkey::find_program_address(
            &[owner.as_ref(), spl_token::ID.as_ref(), self.mint.as_ref()],
            &ATA_PROGRAM_PUBKEY,
        );
        ata
    }

    fn decode_and_validate(&self, call: &PermitCall) -> Result<PartialTransaction, HandlerError> {
        parse_pubkey(&call.owner, "owner")?;
        let auth = Self::partial_tx(call)?;
        let tx = PartialTransaction::from_base64(&auth.partial_tx)
            .map_err(|e| HandlerError::Simulation(e.to_string()))?;
        let fee_payer = tx.fee_payer().ok_or_else(|| {
            HandlerError::Simulation("transaction has no account keys".to_owned())
        })?;
        if fee_payer != self.fee_payer.pubkey() {
            return Err(HandlerError::Simulation(format!(
                "transaction fee payer {fee_payer} does not match handler fee payer {}",
                self.fee_payer.pubkey()
            )));
        }
        Ok(tx)
    }
}

#[async_trait]
impl TransferHandler for SolanaTransferHandler {
    fn network(&self) -> &str {
        &self.network
    }

    fn token(&self) -> &str {
        &self.token
    }

    fn spender_address(&self) -> String {
        self.fee_payer.pubkey().to_string()
    }

    fn payee_address(&self) -> String {
        self.payee.to_string()
    }

    /// Structural validation only. Solana has no local dry-run here: the
    /// transfer instruction is already embedded and signed by the payer, so
    /// validation checks decodability and the fee-payer slot.
    async fn simulate_permit(&self, call: &PermitCall) -> Result<(), HandlerError> {
        self.decode_and_validate(call)?;
        Ok(())
    }

    async fn execute_permit(&self, call: &PermitCall) -> Result<TxOutcome, HandlerError> {
        let tx = self.decode_and_validate(call)?;
        let tx = tx
            .co_sign(&self.fee_payer)
            .map_err(|e| HandlerError::Simulation(e.to_string()))?;
        if !tx.is_fully_signed() {
            tracing::warn!(network = %self.network, owner = %call.owner, "undersigned transaction");
            return Ok(TxOutcome::failed(
                "",
                "Transaction signature incomplete after fee-payer co-sign",
            ));
        }

        let signature = self
            .rpc
            .send_transaction(tx.inner())
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;

        tracing::info!(
            network = %self.network,
            owner = %call.owner,
            value = call.value,
            signature = %signature,
            "co-signed transfer submitted"
        );
        Ok(TxOutcome::pending(
            signature.to_string(),
            "Transaction submitted, awaiting confirmation",
        )
        .with_detail("cluster", self.cluster.clone()))
    }

    /// Protocol no-op: the transfer executed atomically with the
    /// authorization, so there is nothing left to move and no RPC call.
    async fn execute_transfer_from(
        &self,
        _owner: &str,
        _amount: u128,
    ) -> Result<TxOutcome, HandlerError> {
        Ok(TxOutcome::confirmed(
            "",
            "Transfer already executed with the authorization transaction",
        ))
    }

    async fn get_transaction_status(&self, reference: &str) -> Result<TxOutcome, HandlerError> {
        let signature = Signature::from_str(reference)
            .map_err(|e| HandlerError::InvalidInput(format!("transaction reference: {e}")))?;
        let response = self
            .rpc
            .get_signature_statuses(&[signature])
            .await
            .map_err(|e| HandlerError::Rpc(e.to_string()))?;

        let Some(status) = response.value.into_iter().next().flatten() else {
            // Unknown to the cluster yet: still unconfirmed, never an error.
            return Ok(TxOutcome::pending(reference, "Transaction not yet confirmed"));
        };
        if let Some(err) = status.err {
            return Ok(
                TxOutcome::failed(reference, "Transaction failed on-chain")
                    .with_detail("transaction_error", err.to_string()),
            );
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            return Ok(TxOutcome::confirmed(reference, "Transaction confirmed")
                .with_detail("slot", status.slot));
        }
        Ok(TxOutcome::pending(reference, "Transaction processed, awaiting confirmation"))
    }

    /// Solana has no allowance primitive; the owner's token-account balance
    /// is the closest stand-in and the `note` records the substitution.
    async fn check_allowance(&self, owner: &str) -> Result<AllowanceInfo, HandlerError> {
        let owner_key = parse_pubkey(owner, "owner")?;
        let ata = self.associated_token_account(&owner_key);
        let note = "token-account balance reported in place of allowance; \
                    Solana has no allowance primitive";

        match self.rpc.get_token_account_balance(&ata).await {
            Ok(balance) => {
                let amount = balance.amount.parse::<u128>().unwrap_or(0);
                Ok(AllowanceInfo {
                    amount,
                    display: balance.ui_amount.unwrap_or_else(|| {
                        amount as f64 / 10f64.powi(i32::from(self.token_decimals))
                    }),
                    owner: owner.to_owned(),
                    spender: self.spender_address(),
                    note: Some(note.to_owned()),
                })
            }
            // An absent token account means a zero balance, not a failure.
            Err(e) if e.to_string().to_lowercase().contains("could not find") => {
                Ok(AllowanceInfo {
                    amount: 0,
                    display: 0.0,
                    owner: owner.to_owned(),
                    spender: self.spender_address(),
                    note: Some(note.to_owned()),
                })
            }
            Err(e) => Err(HandlerError::Rpc(e.to_string())),
        }
    }

    async fn get_native_balance(&self, address: &str) -> f64 {
        let Ok(address) = Pubkey::from_str(address) else {
            tracing::warn!(address, "native balance query with malformed address");
            return 0.0;
        };
        match self.rpc.get_balance(&address).await {
            Ok(lamports) => lamports as f64 / LAMPORTS_PER_SOL,
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "native balance query failed");
                0.0
            }
        }
    }
}
