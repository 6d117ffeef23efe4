//! Settlement ledger domain model.
//!
//! The ledger is the auditable record of every money movement the engine
//! performs: an [`Order`] captures the payer's spending intent, an
//! [`Intent`] normalizes one payer→payee transfer request, and each
//! settlement attempt closes with a [`SettlementBatch`] owning its
//! [`SettlementDetail`] rows and optional [`PayoutInstruction`] rows, with
//! [`AuditEvent`] rows appended along the way.
//!
//! This module holds the plain domain types and their status enums. The
//! `builders` submodule constructs them with validation and chain-id
//! resolution; the `store` submodule defines the persistence contract and
//! an in-memory implementation.

mod builders;
mod store;

pub use builders::{
    collect_audit_event, collect_intent, collect_payout_instruction, collect_settlement_batch,
    collect_settlement_detail, AuditEventInput, IntentInput, PayoutInput, SettlementDetailInput,
};
pub use store::{LedgerStore, MemoryLedger};

use crate::timestamp::UnixTimestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by ledger builders or stores.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A required field was empty or absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The named network is not in the supported-network table.
    #[error("unknown network: {0}")]
    UnknownChain(String),
    /// An amount failed a domain invariant, e.g. fee exceeding gross.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// The persistence collaborator rejected a write or read.
    #[error("ledger store error: {0}")]
    Store(String),
}

/// Lifecycle status of an [`Order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Success,
    Failed,
}

/// A payer's spending intent, upserted by `order_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order key; upserts replace the row with the same number.
    pub order_number: String,
    /// Payer wallet address.
    pub user_id: String,
    /// Amount actually being spent, in display units.
    pub spend_amount: Decimal,
    /// Authorization ceiling; `spend_amount <= budget`.
    pub budget: Decimal,
    /// Display currency, e.g. "USDC".
    pub currency: String,
    /// Canonical chain id the order settles on.
    pub chain: String,
    /// Authorization deadline.
    pub deadline: UnixTimestamp,
    pub status: OrderStatus,
    /// Free-text status context, e.g. the failure summary.
    pub status_message: String,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

/// Lifecycle status of an [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Settling,
    Settled,
    Failed,
}

/// A normalized payer→payee transfer request, keyed by session id.
///
/// Identity fields are immutable once created; only `status` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Session id of the settlement attempt that produced this intent.
    pub intent_id: String,
    /// CAIP-2 chain id.
    pub chain_id: String,
    /// CAIP-19 asset id of the settlement token.
    pub asset_id: String,
    pub payer_address: String,
    pub payee_address: String,
    /// Transfer amount in display units.
    pub amount: Decimal,
    pub token_decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_deadline: Option<UnixTimestamp>,
    pub status: IntentStatus,
    pub created_at: UnixTimestamp,
}

/// Lifecycle status of a [`SettlementBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementBatchStatus {
    Created,
    PendingPayout,
    PartiallyReleased,
    Released,
    Failed,
    Canceled,
}

/// A grouping of settlement operations for one tenant/merchant over a
/// period. Owns its [`SettlementDetail`] and [`PayoutInstruction`] rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub tenant_id: String,
    pub merchant_id: String,
    pub payee_address: String,
    pub chain_id: String,
    pub asset_id: String,
    pub period_start: UnixTimestamp,
    pub period_end: UnixTimestamp,
    /// Number of details in the batch.
    pub total_count: u32,
    /// Sum of detail gross amounts.
    pub total_amount: Decimal,
    /// Sum of detail fee amounts.
    pub fee_total: Decimal,
    /// Sum of detail net amounts.
    pub net_total: Decimal,
    pub settlement_status: SettlementBatchStatus,
    pub created_at: UnixTimestamp,
}

/// Lifecycle status of a [`SettlementDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementDetailStatus {
    Pending,
    Ready,
    Releasing,
    Released,
    Failed,
    Void,
}

/// The event that produced a settlement detail or audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEvent {
    TransferCompleted,
    FundsEscrowed,
    FundsReleased,
    SettlementCompleted,
}

/// A single on-chain transfer record within a batch.
///
/// Amount invariant: `net_amount == gross_amount - fee_amount`, enforced by
/// [`collect_settlement_detail`], which computes `net_amount` itself rather
/// than accepting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub intent_id: String,
    /// Chain-native transaction reference; empty when nothing was submitted.
    pub tx_hash: String,
    pub chain_id: String,
    pub payer_address: String,
    pub payee_address: String,
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub settled_at: UnixTimestamp,
    pub source_event: SourceEvent,
    pub settlement_status: SettlementDetailStatus,
}

/// Degree of irreversibility of an on-chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalityStatus {
    Pending,
    Safe,
    Finalized,
}

/// Lifecycle status of a [`PayoutInstruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Created,
    Submitted,
    Confirmed,
    Failed,
    Canceled,
}

/// An instruction to move settled funds onward from the settlement account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub to_address: String,
    pub chain_id: String,
    pub asset_id: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_fee_paid: Option<Decimal>,
    /// Empty until submitted.
    pub tx_hash: String,
    pub finality_status: FinalityStatus,
    pub status: PayoutStatus,
    pub created_at: UnixTimestamp,
}

/// Kind of an [`AuditEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TransferCompleted,
    TransactionFailed,
    FundsEscrowed,
    FundsReleased,
    SettlementCompleted,
}

/// Immutable append-only log entry. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub owner_address: String,
    pub spender_address: String,
    pub amount: Decimal,
    /// Empty when the event precedes any submission.
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Hash of the authorization signature, for correlation without
    /// storing the signature itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_hash: Option<String>,
    pub event_type: AuditEventType,
    pub created_at: UnixTimestamp,
}
