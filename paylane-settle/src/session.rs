//! Task-scoped payment sessions.
//!
//! A [`PaymentService`] holds the state of exactly one settlement attempt
//! for one wallet: the requested payload, and the authorization material
//! once signing has happened. It is created by the service manager, driven
//! through `sign_for_payment` then `do_permit_and_transfer`, and discarded
//! when the task releases it. Nothing here is global; every collaborator
//! arrives through [`SettleContext`].

use crate::error::SettleError;
use crate::execute::{ExecutionResult, ExecutionService};
use crate::factory::HandlerResolver;
use crate::fees::FeeSchedule;
use async_trait::async_trait;
use paylane::handler::{AuthMaterial, PermitCall, TxStatus};
use paylane::ledger::{
    collect_audit_event, collect_intent, collect_settlement_batch, collect_settlement_detail,
    AuditEventInput, AuditEventType, IntentInput, LedgerStore, Order, OrderStatus,
    SettlementBatchStatus, SettlementDetailInput, SettlementDetailStatus, SourceEvent,
};
use paylane::networks;
use paylane::timestamp::UnixTimestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One settlement request as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    /// Network name, e.g. `"sepolia"`.
    pub network: String,
    /// Token symbol, e.g. `"USDC"`.
    pub token: String,
    /// Authorization ceiling in base token units.
    pub budget: u128,
    /// Amount actually transferred; must not exceed `budget`.
    pub spend_amount: u128,
    /// Unix deadline in seconds for the authorization.
    pub deadline: u64,
    /// Display currency recorded on the order.
    pub currency: String,
    /// Caller-supplied order key; the session id is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    /// Pre-built authorization material. When present, signing adopts it
    /// instead of delegating to the configured signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMaterial>,
}

/// Produces authorization material for a payload when the caller did not
/// supply any.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Signs the authorization for `wallet_address` over the payload.
    async fn sign(
        &self,
        wallet_address: &str,
        payload: &PaymentPayload,
    ) -> Result<AuthMaterial, SettleError>;
}

/// Default signer for deployments where wallets always pre-sign: any
/// request that reaches it is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresignedOnly;

#[async_trait]
impl PaymentSigner for PresignedOnly {
    async fn sign(
        &self,
        _wallet_address: &str,
        _payload: &PaymentPayload,
    ) -> Result<AuthMaterial, SettleError> {
        Err(SettleError::Signing(
            "no signer configured; authorization material must be supplied with the payload"
                .to_owned(),
        ))
    }
}

/// Shared collaborators injected into every payment session.
pub struct SettleContext {
    /// Handler registry.
    pub resolver: Arc<dyn HandlerResolver>,
    /// Simulate → submit → poll driver.
    pub execution: ExecutionService,
    /// Fallback signer for payloads without pre-built authorization.
    pub signer: Arc<dyn PaymentSigner>,
    /// Ledger persistence.
    pub ledger: Arc<dyn LedgerStore>,
    /// Fee schedule applied to settled amounts.
    pub fees: FeeSchedule,
    /// Tenant recorded on settlement batches.
    pub tenant_id: String,
    /// Merchant recorded on settlement batches.
    pub merchant_id: String,
}

impl std::fmt::Debug for SettleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettleContext")
            .field("tenant_id", &self.tenant_id)
            .field("merchant_id", &self.merchant_id)
            .field("fees", &self.fees)
            .finish_non_exhaustive()
    }
}

/// Converts a base-unit amount to display units using the network's token
/// decimals.
fn base_to_display(network: &str, amount: u128) -> Result<Decimal, SettleError> {
    let chain_id = networks::chain_id_by_network(network)
        .ok_or_else(|| SettleError::Config(format!("unsupported network: {network}")))?;
    let decimals = networks::token_decimals_by_chain(chain_id)
        .ok_or_else(|| SettleError::Config(format!("unsupported network: {network}")))?;
    let base = i128::try_from(amount)
        .map_err(|_| SettleError::Config(format!("amount out of range: {amount}")))?;
    Ok(Decimal::from_i128_with_scale(base, u32::from(decimals)))
}

/// State of one settlement attempt for one wallet.
///
/// The manager guarantees at most one live instance per session key, so
/// methods take `&mut self` without further locking.
#[derive(Debug)]
pub struct PaymentService {
    session_id: String,
    wallet_address: String,
    payload: PaymentPayload,
    sign_info: Option<AuthMaterial>,
}

impl PaymentService {
    /// Creates a session for `wallet_address` over `payload`.
    #[must_use]
    pub fn new(session_id: &str, wallet_address: &str, payload: PaymentPayload) -> Self {
        Self {
            session_id: session_id.to_owned(),
            wallet_address: wallet_address.to_owned(),
            payload,
            sign_info: None,
        }
    }

    /// Session key this service was created under.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wallet the session belongs to.
    #[must_use]
    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Whether authorization material is currently held.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.sign_info.is_some()
    }

    /// Obtains authorization material: adopts the payload's pre-built
    /// material when present, otherwise delegates to the configured signer.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Signing`] when the payload carries no
    /// material and the signer cannot produce any, or when `spend_amount`
    /// exceeds `budget`.
    pub async fn sign_for_payment(&mut self, ctx: &SettleContext) -> Result<(), SettleError> {
        if self.payload.spend_amount > self.payload.budget {
            return Err(SettleError::Signing(format!(
                "spend amount {} exceeds budget {}",
                self.payload.spend_amount, self.payload.budget
            )));
        }
        let auth = match self.payload.auth.clone() {
            Some(auth) => auth,
            None => ctx.signer.sign(&self.wallet_address, &self.payload).await?,
        };
        self.sign_info = Some(auth);
        Ok(())
    }

    /// Runs the full settlement: permit (or allowance skip), transfer, and
    /// ledger recording. Every terminal path writes an order update, a
    /// settlement detail and its batch, and an audit event.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Signing`] when called before
    /// [`Self::sign_for_payment`], [`SettleError::HandlerUnavailable`] when
    /// the pair has no handler, or a ledger error when recording fails.
    /// Chain-level failures come back inside the [`ExecutionResult`].
    pub async fn do_permit_and_transfer(
        &mut self,
        ctx: &SettleContext,
    ) -> Result<ExecutionResult, SettleError> {
        let auth = self.sign_info.clone().ok_or_else(|| {
            SettleError::Signing("session has no authorization material; sign first".to_owned())
        })?;
        let network = self.payload.network.clone();
        let token = self.payload.token.clone();
        let handler = ctx.resolver.resolve(&network, &token).await.ok_or_else(|| {
            SettleError::HandlerUnavailable {
                network: network.clone(),
                token: token.clone(),
            }
        })?;
        let spender = handler.spender_address();
        let payee = handler.payee_address();
        let period_start = UnixTimestamp::now();

        let spend_display = base_to_display(&network, self.payload.spend_amount)?;
        let budget_display = base_to_display(&network, self.payload.budget)?;

        ctx.ledger
            .insert_intent(collect_intent(&IntentInput {
                network: &network,
                intent_id: &self.session_id,
                payer_address: &self.wallet_address,
                payee_address: &payee,
                amount: spend_display,
                deadline: Some(UnixTimestamp::from_secs(self.payload.deadline)),
            })?)
            .await?;
        self.record_order(ctx, spend_display, budget_display, OrderStatus::Pending, "")
            .await?;

        let call = PermitCall {
            owner: self.wallet_address.clone(),
            value: self.payload.budget,
            deadline: self.payload.deadline,
            auth,
        };
        let permit = ctx.execution.execute_permit(&network, &token, &call).await?;
        self.record_audit(
            ctx,
            &spender,
            budget_display,
            &permit.tx_reference,
            if permit.success {
                AuditEventType::FundsEscrowed
            } else {
                AuditEventType::TransactionFailed
            },
        )
        .await?;

        if !permit.success {
            tracing::warn!(
                session = %self.session_id,
                network,
                message = %permit.message,
                "permit failed, closing settlement as failed"
            );
            self.record_settlement(
                ctx,
                &payee,
                period_start,
                spend_display,
                Decimal::ZERO,
                &permit.tx_reference,
                SourceEvent::FundsEscrowed,
                SettlementDetailStatus::Failed,
                SettlementBatchStatus::Failed,
            )
            .await?;
            self.record_order(
                ctx,
                spend_display,
                budget_display,
                OrderStatus::Failed,
                &permit.message,
            )
            .await?;
            return Ok(permit);
        }

        let transfer = ctx
            .execution
            .execute_transfer_from(&network, &token, &self.wallet_address, self.payload.spend_amount)
            .await?;
        self.record_audit(
            ctx,
            &spender,
            spend_display,
            &transfer.tx_reference,
            if transfer.success {
                AuditEventType::TransferCompleted
            } else {
                AuditEventType::TransactionFailed
            },
        )
        .await?;

        // The transfer step carries no reference of its own when the
        // authorization already executed the transfer (Solana) or the
        // allowance made the permit the only submission; the permit's
        // reference is then the on-chain record.
        let tx_reference = if transfer.tx_reference.is_empty() {
            permit.tx_reference.clone()
        } else {
            transfer.tx_reference.clone()
        };

        // Gas observations live on whichever step actually hit the chain.
        let fee_details = if transfer.details.is_empty() {
            &permit.details
        } else {
            &transfer.details
        };
        let fee = if transfer.success {
            ctx.fees.fee_for(fee_details, spend_display)
        } else {
            Decimal::ZERO
        };

        let (detail_status, batch_status, order_status) = match transfer.status {
            TxStatus::Confirmed => (
                SettlementDetailStatus::Released,
                SettlementBatchStatus::Released,
                OrderStatus::Success,
            ),
            TxStatus::Pending => (
                SettlementDetailStatus::Pending,
                SettlementBatchStatus::PendingPayout,
                OrderStatus::Pending,
            ),
            TxStatus::Failed => (
                SettlementDetailStatus::Failed,
                SettlementBatchStatus::Failed,
                OrderStatus::Failed,
            ),
        };

        self.record_settlement(
            ctx,
            &payee,
            period_start,
            spend_display,
            fee,
            &tx_reference,
            SourceEvent::TransferCompleted,
            detail_status,
            batch_status,
        )
        .await?;
        self.record_order(
            ctx,
            spend_display,
            budget_display,
            order_status,
            &transfer.message,
        )
        .await?;

        Ok(transfer)
    }

    /// Drops held authorization material. Called on release so a reused
    /// session key can never replay a stale signature.
    pub fn cleanup(&mut self) {
        self.sign_info = None;
    }

    fn order_number(&self) -> &str {
        self.payload
            .order_number
            .as_deref()
            .unwrap_or(&self.session_id)
    }

    async fn record_order(
        &self,
        ctx: &SettleContext,
        spend_display: Decimal,
        budget_display: Decimal,
        status: OrderStatus,
        status_message: &str,
    ) -> Result<(), SettleError> {
        let chain = networks::chain_id_by_network(&self.payload.network)
            .ok_or_else(|| {
                SettleError::Config(format!("unsupported network: {}", self.payload.network))
            })?
            .to_owned();
        ctx.ledger
            .upsert_order(Order {
                order_number: self.order_number().to_owned(),
                user_id: self.wallet_address.clone(),
                spend_amount: spend_display,
                budget: budget_display,
                currency: self.payload.currency.clone(),
                chain,
                deadline: UnixTimestamp::from_secs(self.payload.deadline),
                status,
                status_message: status_message.to_owned(),
                created_at: UnixTimestamp::now(),
                updated_at: UnixTimestamp::now(),
            })
            .await?;
        Ok(())
    }

    async fn record_audit(
        &self,
        ctx: &SettleContext,
        spender: &str,
        amount: Decimal,
        tx_hash: &str,
        event_type: AuditEventType,
    ) -> Result<(), SettleError> {
        ctx.ledger
            .insert_audit_event(collect_audit_event(&AuditEventInput {
                owner_address: &self.wallet_address,
                spender_address: spender,
                amount,
                tx_hash,
                nonce: None,
                signature_hash: None,
                event_type,
            })?)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_settlement(
        &self,
        ctx: &SettleContext,
        payee: &str,
        period_start: UnixTimestamp,
        gross: Decimal,
        fee: Decimal,
        tx_hash: &str,
        source_event: SourceEvent,
        detail_status: SettlementDetailStatus,
        batch_status: SettlementBatchStatus,
    ) -> Result<(), SettleError> {
        let detail = collect_settlement_detail(&SettlementDetailInput {
            network: &self.payload.network,
            intent_id: &self.session_id,
            tx_hash,
            payer_address: &self.wallet_address,
            payee_address: payee,
            gross_amount: gross,
            fee_amount: fee,
            source_event,
            settlement_status: detail_status,
        })?;
        let batch = collect_settlement_batch(
            &self.payload.network,
            &ctx.tenant_id,
            &ctx.merchant_id,
            payee,
            period_start,
            std::slice::from_ref(&detail),
            batch_status,
        )?;
        ctx.ledger.insert_settlement_batch(batch, detail).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::testing::{MapResolver, MockHandler, StaticSigner};
    use paylane::handler::EvmAuthorization;
    use paylane::ledger::MemoryLedger;
    use rust_decimal::dec;

    fn evm_auth() -> AuthMaterial {
        AuthMaterial::Evm(EvmAuthorization {
            v: 27,
            r: "0x11".to_owned(),
            s: "0x22".to_owned(),
        })
    }

    fn payload(auth: Option<AuthMaterial>) -> PaymentPayload {
        PaymentPayload {
            network: "sepolia".to_owned(),
            token: "USDC".to_owned(),
            budget: 50_000_000,
            spend_amount: 10_000_000,
            deadline: 2_000_000_000,
            currency: "USDC".to_owned(),
            order_number: None,
            auth,
        }
    }

    fn context(handler: Arc<MockHandler>, signer: Arc<dyn PaymentSigner>) -> SettleContext {
        let resolver: Arc<dyn HandlerResolver> =
            Arc::new(MapResolver::single("sepolia", "USDC", handler));
        SettleContext {
            resolver: Arc::clone(&resolver),
            execution: ExecutionService::new(resolver),
            signer,
            ledger: Arc::new(MemoryLedger::new()),
            fees: FeeSchedule::new(&FeeConfig::default()).unwrap(),
            tenant_id: "tenant-1".to_owned(),
            merchant_id: "merchant-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn payload_auth_is_adopted_without_signer() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(PresignedOnly),
        );
        let mut service = PaymentService::new("sess-1", "0xWallet", payload(Some(evm_auth())));
        service.sign_for_payment(&ctx).await.unwrap();
        assert!(service.is_signed());
    }

    #[tokio::test]
    async fn missing_auth_delegates_to_signer() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(StaticSigner(evm_auth())),
        );
        let mut service = PaymentService::new("sess-1", "0xWallet", payload(None));
        service.sign_for_payment(&ctx).await.unwrap();
        assert!(service.is_signed());
    }

    #[tokio::test]
    async fn presigned_only_rejects_unsigned_payloads() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(PresignedOnly),
        );
        let mut service = PaymentService::new("sess-1", "0xWallet", payload(None));
        let err = service.sign_for_payment(&ctx).await.unwrap_err();
        assert!(matches!(err, SettleError::Signing(_)));
        assert!(!service.is_signed());
    }

    #[tokio::test]
    async fn spend_above_budget_is_rejected_at_signing() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(PresignedOnly),
        );
        let mut bad = payload(Some(evm_auth()));
        bad.spend_amount = bad.budget + 1;
        let mut service = PaymentService::new("sess-1", "0xWallet", bad);
        assert!(matches!(
            service.sign_for_payment(&ctx).await,
            Err(SettleError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn settle_before_signing_is_an_error() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(PresignedOnly),
        );
        let mut service = PaymentService::new("sess-1", "0xWallet", payload(Some(evm_auth())));
        let err = service.do_permit_and_transfer(&ctx).await.unwrap_err();
        assert!(matches!(err, SettleError::Signing(_)));
    }

    #[tokio::test]
    async fn cleanup_drops_authorization_material() {
        let ctx = context(
            Arc::new(MockHandler::new("sepolia", "USDC")),
            Arc::new(PresignedOnly),
        );
        let mut service = PaymentService::new("sess-1", "0xWallet", payload(Some(evm_auth())));
        service.sign_for_payment(&ctx).await.unwrap();
        service.cleanup();
        assert!(!service.is_signed());
    }

    #[tokio::test]
    async fn embedded_transfer_settles_with_the_permit_reference() {
        use paylane::handler::TxOutcome;

        // The transfer step confirms with no reference of its own, the way
        // a co-signed authorization that already moved the funds does.
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_permit_outcome(TxOutcome::confirmed("0xpermit", "permit confirmed"))
                .with_transfer_outcome(TxOutcome::confirmed("", "transfer already executed")),
        );
        let ledger = Arc::new(MemoryLedger::new());
        let resolver: Arc<dyn HandlerResolver> =
            Arc::new(MapResolver::single("sepolia", "USDC", handler));
        let ctx = SettleContext {
            resolver: Arc::clone(&resolver),
            execution: ExecutionService::new(resolver),
            signer: Arc::new(PresignedOnly),
            ledger: Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            fees: FeeSchedule::new(&FeeConfig::default()).unwrap(),
            tenant_id: "tenant-1".to_owned(),
            merchant_id: "merchant-1".to_owned(),
        };

        let mut service = PaymentService::new("sess-1", "0xWallet", payload(Some(evm_auth())));
        service.sign_for_payment(&ctx).await.unwrap();
        let result = service.do_permit_and_transfer(&ctx).await.unwrap();
        assert!(result.success);

        let (_, detail) = &ledger.batches()[0];
        assert_eq!(detail.tx_hash, "0xpermit");
    }

    #[tokio::test]
    async fn amounts_scale_by_token_decimals() {
        assert_eq!(base_to_display("sepolia", 10_000_000).unwrap(), dec!(10));
        assert_eq!(base_to_display("sepolia", 123_456).unwrap(), dec!(0.123456));
        assert!(base_to_display("hyperspace", 1).is_err());
    }
}
