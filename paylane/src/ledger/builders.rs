//! Ledger entity builders.
//!
//! Pure validation-and-construction functions: each resolves human-readable
//! network names to canonical chain/asset identifiers through the fixed
//! lookup tables, fails fast with a structured [`LedgerError`] when a
//! required field or lookup is missing, and performs no I/O. Persistence is
//! a separate step through [`super::LedgerStore`].

use super::{
    AuditEvent, AuditEventType, Intent, IntentStatus, LedgerError, PayoutInstruction, PayoutStatus,
    FinalityStatus, SettlementBatch, SettlementBatchStatus, SettlementDetail,
    SettlementDetailStatus, SourceEvent,
};
use crate::networks;
use crate::timestamp::UnixTimestamp;
use rust_decimal::Decimal;

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::MissingField(field));
    }
    Ok(value)
}

fn resolve_chain(network: &str) -> Result<(&'static str, &'static str, u8), LedgerError> {
    let chain_id = networks::chain_id_by_network(network)
        .ok_or_else(|| LedgerError::UnknownChain(network.to_owned()))?;
    let asset_id = networks::asset_id_by_chain(chain_id)
        .ok_or_else(|| LedgerError::UnknownChain(network.to_owned()))?;
    let decimals = networks::token_decimals_by_chain(chain_id)
        .ok_or_else(|| LedgerError::UnknownChain(network.to_owned()))?;
    Ok((chain_id, asset_id, decimals))
}

/// Inputs for [`collect_intent`].
#[derive(Debug, Clone)]
pub struct IntentInput<'a> {
    pub network: &'a str,
    /// Session id of the settlement attempt.
    pub intent_id: &'a str,
    pub payer_address: &'a str,
    pub payee_address: &'a str,
    /// Transfer amount in display units.
    pub amount: Decimal,
    pub deadline: Option<UnixTimestamp>,
}

/// Builds an [`Intent`] in `Created` status from a settlement request.
pub fn collect_intent(input: &IntentInput<'_>) -> Result<Intent, LedgerError> {
    let (chain_id, asset_id, decimals) = resolve_chain(input.network)?;
    Ok(Intent {
        intent_id: required(input.intent_id, "intent_id")?.to_owned(),
        chain_id: chain_id.to_owned(),
        asset_id: asset_id.to_owned(),
        payer_address: required(input.payer_address, "payer_address")?.to_owned(),
        payee_address: required(input.payee_address, "payee_address")?.to_owned(),
        amount: input.amount,
        token_decimals: decimals,
        intent_deadline: input.deadline,
        status: IntentStatus::Created,
        created_at: UnixTimestamp::now(),
    })
}

/// Inputs for [`collect_audit_event`].
#[derive(Debug, Clone)]
pub struct AuditEventInput<'a> {
    pub owner_address: &'a str,
    pub spender_address: &'a str,
    pub amount: Decimal,
    /// May be empty when the event precedes any submission.
    pub tx_hash: &'a str,
    pub nonce: Option<u64>,
    pub signature_hash: Option<&'a str>,
    pub event_type: AuditEventType,
}

/// Builds an [`AuditEvent`] stamped with the current time.
pub fn collect_audit_event(input: &AuditEventInput<'_>) -> Result<AuditEvent, LedgerError> {
    Ok(AuditEvent {
        owner_address: required(input.owner_address, "owner_address")?.to_owned(),
        spender_address: required(input.spender_address, "spender_address")?.to_owned(),
        amount: input.amount,
        tx_hash: input.tx_hash.to_owned(),
        nonce: input.nonce,
        signature_hash: input.signature_hash.map(ToOwned::to_owned),
        event_type: input.event_type,
        created_at: UnixTimestamp::now(),
    })
}

/// Inputs for [`collect_settlement_detail`]. There is deliberately no
/// `net_amount` input; the builder computes it.
#[derive(Debug, Clone)]
pub struct SettlementDetailInput<'a> {
    pub network: &'a str,
    pub intent_id: &'a str,
    /// May be empty when nothing reached the chain.
    pub tx_hash: &'a str,
    pub payer_address: &'a str,
    pub payee_address: &'a str,
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub source_event: SourceEvent,
    pub settlement_status: SettlementDetailStatus,
}

/// Builds a [`SettlementDetail`] with `net_amount = gross_amount -
/// fee_amount`.
///
/// Rejects a negative fee and a fee exceeding the gross amount, so the net
/// amount can never go negative.
pub fn collect_settlement_detail(
    input: &SettlementDetailInput<'_>,
) -> Result<SettlementDetail, LedgerError> {
    let (chain_id, ..) = resolve_chain(input.network)?;
    if input.fee_amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "negative fee: {}",
            input.fee_amount
        )));
    }
    if input.fee_amount > input.gross_amount {
        return Err(LedgerError::InvalidAmount(format!(
            "fee {} exceeds gross {}",
            input.fee_amount, input.gross_amount
        )));
    }
    Ok(SettlementDetail {
        intent_id: required(input.intent_id, "intent_id")?.to_owned(),
        tx_hash: input.tx_hash.to_owned(),
        chain_id: chain_id.to_owned(),
        payer_address: required(input.payer_address, "payer_address")?.to_owned(),
        payee_address: required(input.payee_address, "payee_address")?.to_owned(),
        gross_amount: input.gross_amount,
        fee_amount: input.fee_amount,
        net_amount: input.gross_amount - input.fee_amount,
        settled_at: UnixTimestamp::now(),
        source_event: input.source_event,
        settlement_status: input.settlement_status,
    })
}

/// Builds a [`SettlementBatch`] closing the audit period over `details`.
///
/// Totals are derived from the details, never supplied: count, gross sum,
/// fee sum and net sum all come from the rows the batch will own.
pub fn collect_settlement_batch(
    network: &str,
    tenant_id: &str,
    merchant_id: &str,
    payee_address: &str,
    period_start: UnixTimestamp,
    details: &[SettlementDetail],
    settlement_status: SettlementBatchStatus,
) -> Result<SettlementBatch, LedgerError> {
    let (chain_id, asset_id, _) = resolve_chain(network)?;
    let total_amount: Decimal = details.iter().map(|d| d.gross_amount).sum();
    let fee_total: Decimal = details.iter().map(|d| d.fee_amount).sum();
    let net_total: Decimal = details.iter().map(|d| d.net_amount).sum();
    Ok(SettlementBatch {
        tenant_id: required(tenant_id, "tenant_id")?.to_owned(),
        merchant_id: required(merchant_id, "merchant_id")?.to_owned(),
        payee_address: required(payee_address, "payee_address")?.to_owned(),
        chain_id: chain_id.to_owned(),
        asset_id: asset_id.to_owned(),
        period_start,
        period_end: UnixTimestamp::now(),
        total_count: u32::try_from(details.len())
            .map_err(|_| LedgerError::InvalidAmount("too many details".to_owned()))?,
        total_amount,
        fee_total,
        net_total,
        settlement_status,
        created_at: UnixTimestamp::now(),
    })
}

/// Inputs for [`collect_payout_instruction`].
#[derive(Debug, Clone)]
pub struct PayoutInput<'a> {
    pub network: &'a str,
    pub to_address: &'a str,
    pub amount: Decimal,
    pub gas_estimate: Option<Decimal>,
    pub gas_fee_paid: Option<Decimal>,
    /// Empty until submitted.
    pub tx_hash: &'a str,
}

/// Builds a [`PayoutInstruction`] in `Created`/`Pending` state.
pub fn collect_payout_instruction(
    input: &PayoutInput<'_>,
) -> Result<PayoutInstruction, LedgerError> {
    let (chain_id, asset_id, _) = resolve_chain(input.network)?;
    if input.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "payout amount must be positive, got {}",
            input.amount
        )));
    }
    Ok(PayoutInstruction {
        to_address: required(input.to_address, "to_address")?.to_owned(),
        chain_id: chain_id.to_owned(),
        asset_id: asset_id.to_owned(),
        amount: input.amount,
        gas_estimate: input.gas_estimate,
        gas_fee_paid: input.gas_fee_paid,
        tx_hash: input.tx_hash.to_owned(),
        finality_status: FinalityStatus::Pending,
        status: PayoutStatus::Created,
        created_at: UnixTimestamp::now(),
    })
}
