//! The transfer-protocol abstraction.
//!
//! Every supported chain family implements [`TransferHandler`] for a single
//! `(network, token)` pair. The orchestration layer only ever talks to
//! `Arc<dyn TransferHandler>`, so adding a chain family means implementing
//! this trait and registering a constructor with the handler factory -
//! nothing upstream changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Chain-specific signing material for one authorization, produced off-band
/// by the payer wallet.
///
/// The two variants are deliberately asymmetric: EVM permits are a detached
/// secp256k1 signature over typed data, while Solana authorizations are an
/// entire partially-signed transaction with the transfer instruction already
/// embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthMaterial {
    /// EIP-2612 permit signature components.
    Evm(EvmAuthorization),
    /// Base64-encoded partially signed Solana transaction.
    Solana(SolanaAuthorization),
}

/// The `(v, r, s)` components of an EIP-2612 permit signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmAuthorization {
    /// Recovery id, 27 or 28.
    pub v: u8,
    /// First 32 bytes of the signature, 0x-prefixed hex.
    pub r: String,
    /// Second 32 bytes of the signature, 0x-prefixed hex.
    pub s: String,
}

/// A base64-encoded Solana transaction signed by the payer but not yet by
/// the fee payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaAuthorization {
    /// Base64 serialization of the partially signed transaction.
    pub partial_tx: String,
}

/// One fully described permit invocation, passed to simulation and
/// execution alike so both operate on identical inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitCall {
    /// Token owner (payer) wallet address.
    pub owner: String,
    /// Authorized spend ceiling in base token units.
    pub value: u128,
    /// Unix deadline in seconds after which the permit is void.
    pub deadline: u64,
    /// Signing material produced by the payer wallet.
    pub auth: AuthMaterial,
}

/// Lifecycle state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Submitted but not yet confirmed, or not yet visible to the node.
    Pending,
    /// Included and executed successfully.
    Confirmed,
    /// Included but reverted, or rejected before inclusion.
    Failed,
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Uniform outcome of a handler operation.
///
/// `details` carries chain-specific observations (gas used, block number,
/// signature status) as loose JSON so the core stays chain-agnostic; the
/// settlement layer reads well-known keys from it when computing fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutcome {
    /// Whether the operation is on a successful path. A pending transaction
    /// that merely ran out of polling budget still reports `true`.
    pub success: bool,
    /// Chain-native transaction reference: tx hash on EVM, signature on
    /// Solana. Empty when nothing was submitted.
    pub tx_reference: String,
    /// Lifecycle state at the time of the report.
    pub status: TxStatus,
    /// Short human-readable summary.
    pub message: String,
    /// Chain-specific extras keyed by well-known names.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl TxOutcome {
    /// A confirmed outcome for `tx_reference`.
    #[must_use]
    pub fn confirmed(tx_reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_reference: tx_reference.into(),
            status: TxStatus::Confirmed,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// A pending outcome for `tx_reference`. Pending is a successful path:
    /// the transaction may yet confirm.
    #[must_use]
    pub fn pending(tx_reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_reference: tx_reference.into(),
            status: TxStatus::Pending,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// A failed outcome for `tx_reference`, which may be empty when the
    /// transaction never reached the chain.
    #[must_use]
    pub fn failed(tx_reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_reference: tx_reference.into(),
            status: TxStatus::Failed,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attaches a chain-specific detail, consuming and returning `self`.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Current on-chain allowance granted by an owner to the handler's spender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowanceInfo {
    /// Allowance in base token units.
    pub amount: u128,
    /// Allowance scaled by token decimals, for logs and operator display.
    pub display: f64,
    /// Token owner wallet address.
    pub owner: String,
    /// Spender the allowance is granted to.
    pub spender: String,
    /// Extra context, e.g. when the chain family has no allowance concept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Failure raised by a handler operation.
///
/// Handlers return raw failure text in these variants; classification into
/// the stable error taxonomy happens upstream in the execution service.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not be constructed or its chain is unreachable.
    #[error("handler unavailable: {0}")]
    Unavailable(String),
    /// A dry-run of the transaction failed before submission.
    #[error("simulation failed: {0}")]
    Simulation(String),
    /// Caller-supplied input could not be parsed or is out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The RPC node rejected a request or returned an error.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Uniform capability set for permit-based transfers on one
/// `(network, token)` pair.
///
/// Implementations hold their own RPC connection and signing account and
/// must be safe to share behind `Arc` across tasks.
#[async_trait]
pub trait TransferHandler: Send + Sync {
    /// Network name this handler serves.
    fn network(&self) -> &str;

    /// Token symbol this handler serves.
    fn token(&self) -> &str;

    /// Address of the spender account that permits are granted to and that
    /// submits transactions.
    fn spender_address(&self) -> String;

    /// Address transfers are routed to. Defaults to the spender account.
    fn payee_address(&self) -> String {
        self.spender_address()
    }

    /// Dry-runs the permit without submitting. `Ok(())` means submission is
    /// expected to succeed.
    async fn simulate_permit(&self, call: &PermitCall) -> Result<(), HandlerError>;

    /// Submits the permit and waits for inclusion.
    async fn execute_permit(&self, call: &PermitCall) -> Result<TxOutcome, HandlerError>;

    /// Moves `amount` base units from `owner` to the configured payee using
    /// a previously granted allowance. Chain families whose authorization
    /// already embeds the transfer report an immediate confirmed no-op.
    async fn execute_transfer_from(
        &self,
        owner: &str,
        amount: u128,
    ) -> Result<TxOutcome, HandlerError>;

    /// Looks up the lifecycle state of a previously submitted transaction.
    /// A transaction the node cannot find yet reports pending, not failure.
    async fn get_transaction_status(&self, reference: &str) -> Result<TxOutcome, HandlerError>;

    /// Reads the current allowance `owner` has granted to the spender.
    async fn check_allowance(&self, owner: &str) -> Result<AllowanceInfo, HandlerError>;

    /// Reads `address`'s native-currency balance in whole units. Advisory
    /// only: returns `0.0` on any failure rather than erroring, since a
    /// balance probe must never block a settlement.
    async fn get_native_balance(&self, address: &str) -> f64;
}
