//! The permit/transfer execution service.
//!
//! Drives one settlement attempt through simulate → submit → poll. Each
//! attempt ends in one of three terminal states: confirmed, failed with a
//! classified error, or timed-out-pending. The last one is deliberate:
//! exhausting the poll budget means the chain has not finalized yet, not
//! that the transfer failed, so the result carries `polling_required` and
//! the caller re-queries later through [`ExecutionService::transaction_status`].

use crate::error::SettleError;
use crate::factory::HandlerResolver;
use paylane::errors::{ClassifiedError, parse_error};
use paylane::handler::{PermitCall, TransferHandler, TxOutcome, TxStatus};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Polling cadence for transaction confirmation.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Pause between status queries.
    pub interval: Duration,
    /// Number of queries before the attempt reports timed-out-pending.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// 30 attempts at 2 second intervals, about a minute of waiting.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// Terminal report of one settlement attempt.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the attempt is on a successful path. True for confirmed and
    /// for timed-out-pending outcomes.
    pub success: bool,
    /// Chain-native transaction reference; empty when nothing was
    /// submitted.
    pub tx_reference: String,
    /// Lifecycle state at the end of the attempt.
    pub status: TxStatus,
    /// Human-readable summary.
    pub message: String,
    /// Whether confirmation must continue out-of-band.
    pub polling_required: bool,
    /// Chain-specific observations (gas used, block number, slot).
    pub details: Map<String, Value>,
    /// Classified error; present exactly when the attempt failed.
    pub error: Option<ClassifiedError>,
}

impl ExecutionResult {
    fn confirmed(outcome: TxOutcome) -> Self {
        Self {
            success: true,
            tx_reference: outcome.tx_reference,
            status: TxStatus::Confirmed,
            message: outcome.message,
            polling_required: false,
            details: outcome.details,
            error: None,
        }
    }

    fn failed(tx_reference: String, technical: &str, details: Map<String, Value>) -> Self {
        let classified = parse_error(technical);
        Self {
            success: false,
            tx_reference,
            status: TxStatus::Failed,
            message: classified.user_message.clone(),
            polling_required: false,
            details,
            error: Some(classified),
        }
    }

    fn timed_out(outcome: TxOutcome) -> Self {
        Self {
            success: true,
            tx_reference: outcome.tx_reference,
            status: TxStatus::Pending,
            message: "Confirmation still pending after poll budget; re-query later".to_owned(),
            polling_required: true,
            details: outcome.details,
            error: None,
        }
    }
}

/// Orchestrates settlement attempts against resolved transfer handlers.
#[derive(Clone)]
pub struct ExecutionService {
    resolver: Arc<dyn HandlerResolver>,
    poll: PollPolicy,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    /// Creates a service over the given resolver with the default poll
    /// policy.
    #[must_use]
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            poll: PollPolicy::default(),
        }
    }

    /// Overrides the poll policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    async fn handler(
        &self,
        network: &str,
        token: &str,
    ) -> Result<Arc<dyn TransferHandler>, SettleError> {
        self.resolver.resolve(network, token).await.ok_or_else(|| {
            SettleError::HandlerUnavailable {
                network: network.to_owned(),
                token: token.to_owned(),
            }
        })
    }

    /// Executes the authorization step of a settlement.
    ///
    /// When the owner's existing allowance already covers the requested
    /// value the permit is skipped entirely and the result reports
    /// confirmed with an empty reference. Otherwise the call is dry-run,
    /// submitted and polled to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::HandlerUnavailable`] when no handler exists
    /// for the pair. Chain-level failures come back inside the result.
    pub async fn execute_permit(
        &self,
        network: &str,
        token: &str,
        call: &PermitCall,
    ) -> Result<ExecutionResult, SettleError> {
        let handler = self.handler(network, token).await?;

        match handler.check_allowance(&call.owner).await {
            Ok(allowance) if allowance.amount >= call.value => {
                tracing::info!(
                    network,
                    owner = %call.owner,
                    allowance = allowance.amount,
                    value = call.value,
                    "existing allowance covers the requested value, skipping permit"
                );
                return Ok(ExecutionResult::confirmed(TxOutcome::confirmed(
                    "",
                    "Existing allowance covers the requested value",
                )));
            }
            Ok(_) => {}
            // Advisory at this stage: a real connectivity problem will
            // surface again at submission.
            Err(e) => {
                tracing::warn!(network, owner = %call.owner, error = %e, "allowance pre-check failed");
            }
        }

        if let Err(e) = handler.simulate_permit(call).await {
            tracing::warn!(network, owner = %call.owner, error = %e, "permit simulation failed");
            return Ok(ExecutionResult::failed(
                String::new(),
                &e.to_string(),
                Map::new(),
            ));
        }

        let spender = handler.spender_address();
        let native = handler.get_native_balance(&spender).await;
        if native == 0.0 {
            tracing::warn!(network, spender, "spender native balance reads zero before submission");
        }

        let outcome = match handler.execute_permit(call).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(ExecutionResult::failed(
                    String::new(),
                    &e.to_string(),
                    Map::new(),
                ));
            }
        };
        Ok(self.poll_to_completion(handler.as_ref(), outcome).await)
    }

    /// Executes the value-transfer step of a settlement.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::HandlerUnavailable`] when no handler exists
    /// for the pair. Chain-level failures come back inside the result.
    pub async fn execute_transfer_from(
        &self,
        network: &str,
        token: &str,
        owner: &str,
        amount: u128,
    ) -> Result<ExecutionResult, SettleError> {
        let handler = self.handler(network, token).await?;
        let outcome = match handler.execute_transfer_from(owner, amount).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(ExecutionResult::failed(
                    String::new(),
                    &e.to_string(),
                    Map::new(),
                ));
            }
        };
        Ok(self.poll_to_completion(handler.as_ref(), outcome).await)
    }

    /// One-shot status re-query for a previously submitted transaction,
    /// used to continue confirmation after a timed-out-pending result.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::HandlerUnavailable`] when no handler exists
    /// for the pair, or the underlying handler error for a malformed
    /// reference.
    pub async fn transaction_status(
        &self,
        network: &str,
        token: &str,
        reference: &str,
    ) -> Result<TxOutcome, SettleError> {
        let handler = self.handler(network, token).await?;
        Ok(handler.get_transaction_status(reference).await?)
    }

    /// Polls a submitted outcome to a terminal state.
    ///
    /// Individual poll errors are swallowed and retried; only an explicit
    /// failed status or exhausting the budget ends the loop early.
    async fn poll_to_completion(
        &self,
        handler: &dyn TransferHandler,
        submitted: TxOutcome,
    ) -> ExecutionResult {
        match submitted.status {
            TxStatus::Confirmed => return ExecutionResult::confirmed(submitted),
            TxStatus::Failed => {
                return ExecutionResult::failed(
                    submitted.tx_reference.clone(),
                    &submitted.message,
                    submitted.details,
                );
            }
            TxStatus::Pending => {}
        }

        let mut last = submitted;
        for attempt in 0..self.poll.max_attempts {
            match handler.get_transaction_status(&last.tx_reference).await {
                Ok(polled) => match polled.status {
                    TxStatus::Confirmed => {
                        let mut merged = last.details;
                        merged.extend(polled.details.clone());
                        let mut result = ExecutionResult::confirmed(polled);
                        result.tx_reference = last.tx_reference;
                        result.details = merged;
                        return result;
                    }
                    TxStatus::Failed => {
                        let mut merged = last.details;
                        merged.extend(polled.details.clone());
                        return ExecutionResult::failed(
                            last.tx_reference,
                            &polled.message,
                            merged,
                        );
                    }
                    TxStatus::Pending => {}
                },
                Err(e) => {
                    tracing::debug!(
                        reference = %last.tx_reference,
                        attempt,
                        error = %e,
                        "status poll failed, retrying"
                    );
                }
            }
            sleep(self.poll.interval).await;
        }

        tracing::info!(
            reference = %last.tx_reference,
            attempts = self.poll.max_attempts,
            "poll budget exhausted, reporting pending"
        );
        last.message = String::new();
        ExecutionResult::timed_out(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MapResolver, MockHandler};
    use paylane::handler::{AuthMaterial, EvmAuthorization};
    use std::sync::atomic::Ordering;

    fn evm_call(value: u128) -> PermitCall {
        PermitCall {
            owner: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_owned(),
            value,
            deadline: 2_000_000_000,
            auth: AuthMaterial::Evm(EvmAuthorization {
                v: 27,
                r: "0x11".to_owned(),
                s: "0x22".to_owned(),
            }),
        }
    }

    fn service(handler: Arc<MockHandler>) -> ExecutionService {
        ExecutionService::new(Arc::new(MapResolver::single("sepolia", "USDC", handler)))
    }

    #[tokio::test]
    async fn unknown_pair_is_handler_unavailable() {
        let service = service(Arc::new(MockHandler::new("sepolia", "USDC")));
        let err = service
            .execute_permit("mainnet", "USDC", &evm_call(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::HandlerUnavailable { .. }));
    }

    #[tokio::test]
    async fn permit_is_skipped_when_allowance_covers_value() {
        let handler = Arc::new(MockHandler::new("sepolia", "USDC").with_allowance(10_000));
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, TxStatus::Confirmed);
        assert!(result.tx_reference.is_empty());
        assert_eq!(handler.permit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn simulation_failure_aborts_before_submission() {
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_simulate_error("execution reverted: EIP2612: invalid signature"),
        );
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status, TxStatus::Failed);
        let classified = result.error.unwrap();
        assert_eq!(classified.error_code, "110020");
        assert_eq!(handler.permit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_permit_polls_to_confirmation() {
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_permit_outcome(TxOutcome::pending("0xhash", "submitted"))
                .with_status_sequence(vec![
                    TxOutcome::pending("0xhash", "waiting"),
                    TxOutcome::pending("0xhash", "waiting"),
                    TxOutcome::confirmed("0xhash", "done").with_detail("gas_used", 60_000u64),
                ]),
        );
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, TxStatus::Confirmed);
        assert_eq!(result.tx_reference, "0xhash");
        assert_eq!(result.details["gas_used"], 60_000);
        assert_eq!(handler.status_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_poll_budget_reports_pending_not_failure() {
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_permit_outcome(TxOutcome::pending("0xhash", "submitted"))
                .with_status_sequence(vec![TxOutcome::pending("0xhash", "waiting")]),
        );
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, TxStatus::Pending);
        assert!(result.polling_required);
        assert!(result.error.is_none());
        assert_eq!(handler.status_calls.load(Ordering::SeqCst), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_are_swallowed_and_retried() {
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_permit_outcome(TxOutcome::pending("0xhash", "submitted"))
                .with_status_errors(2)
                .with_status_sequence(vec![TxOutcome::confirmed("0xhash", "done")]),
        );
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, TxStatus::Confirmed);
        assert_eq!(handler.status_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transfer_failure_is_classified() {
        let handler = Arc::new(MockHandler::new("sepolia", "USDC").with_allowance(0));
        let result = service(Arc::clone(&handler))
            .execute_transfer_from("sepolia", "USDC", "0xowner", 10_000)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status, TxStatus::Failed);
        let classified = result.error.unwrap();
        assert_eq!(classified.error_code, "110024");
        assert!(result.message.to_lowercase().contains("allowance"));
    }

    #[tokio::test]
    async fn on_chain_revert_ends_polling_as_failure() {
        let handler = Arc::new(
            MockHandler::new("sepolia", "USDC")
                .with_permit_outcome(TxOutcome::pending("0xhash", "submitted"))
                .with_status_sequence(vec![TxOutcome::failed(
                    "0xhash",
                    "execution reverted: out of gas",
                )]),
        );
        let result = service(Arc::clone(&handler))
            .execute_permit("sepolia", "USDC", &evm_call(10_000))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().error_code, "110017");
    }
}
