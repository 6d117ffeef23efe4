//! Session registry keyed by session id.
//!
//! The manager owns at most one live [`PaymentService`] per session key.
//! Operations on a key run under that session's own lock, so two tasks
//! settling the same key serialize instead of racing, while different keys
//! proceed in parallel. A release from the wrong wallet is skipped, never
//! an error, so a confused caller cannot tear down someone else's session.

use crate::error::SettleError;
use crate::execute::ExecutionResult;
use crate::session::{PaymentPayload, PaymentService, SettleContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Why a manager operation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No live session exists for the key.
    NoSession,
    /// The session exists but belongs to a different wallet.
    WalletMismatch,
}

/// Result of a manager operation that may decline to run.
#[derive(Debug)]
pub enum ManagerOutcome<T> {
    /// The operation ran and produced `T`.
    Executed(T),
    /// The operation was skipped; the registry is unchanged.
    Skipped(SkipReason),
}

/// Registry of live payment sessions.
pub struct TaskScopedServiceManager {
    ctx: Arc<SettleContext>,
    sessions: Mutex<HashMap<String, Arc<Mutex<PaymentService>>>>,
}

impl std::fmt::Debug for TaskScopedServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScopedServiceManager")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl TaskScopedServiceManager {
    /// Creates a manager over shared collaborators.
    #[must_use]
    pub fn new(ctx: Arc<SettleContext>) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live session for `session_id`, creating one from the
    /// payload when absent. An existing session is returned as-is; the new
    /// payload is not merged into it.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        wallet_address: &str,
        payload: PaymentPayload,
    ) -> Arc<Mutex<PaymentService>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(session_id.to_owned()).or_insert_with(|| {
            tracing::debug!(session = session_id, wallet = wallet_address, "creating session");
            Arc::new(Mutex::new(PaymentService::new(
                session_id,
                wallet_address,
                payload,
            )))
        }))
    }

    /// Looks up a live session without creating one.
    async fn get(&self, session_id: &str) -> Option<Arc<Mutex<PaymentService>>> {
        self.sessions.lock().await.get(session_id).map(Arc::clone)
    }

    /// Number of live sessions.
    pub async fn live_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Runs the signing step on the session for `session_id`, after
    /// verifying the caller's wallet owns it. A mismatched wallet skips
    /// without touching the session.
    ///
    /// # Errors
    ///
    /// Propagates signing failures from the session.
    pub async fn execute_sign(
        &self,
        session_id: &str,
        wallet_address: &str,
    ) -> Result<ManagerOutcome<()>, SettleError> {
        let Some(session) = self.get(session_id).await else {
            return Ok(ManagerOutcome::Skipped(SkipReason::NoSession));
        };
        let mut service = session.lock().await;
        if service.wallet_address() != wallet_address {
            tracing::warn!(
                session = session_id,
                caller = wallet_address,
                owner = service.wallet_address(),
                "sign skipped, wallet does not own the session"
            );
            return Ok(ManagerOutcome::Skipped(SkipReason::WalletMismatch));
        }
        service.sign_for_payment(&self.ctx).await?;
        Ok(ManagerOutcome::Executed(()))
    }

    /// Runs the settlement step on the session for `session_id`, after
    /// verifying the caller's wallet owns it. A mismatched wallet skips
    /// without touching the session.
    ///
    /// # Errors
    ///
    /// Propagates orchestration and ledger failures from the session.
    pub async fn execute_permit_and_transfer(
        &self,
        session_id: &str,
        wallet_address: &str,
    ) -> Result<ManagerOutcome<ExecutionResult>, SettleError> {
        let Some(session) = self.get(session_id).await else {
            return Ok(ManagerOutcome::Skipped(SkipReason::NoSession));
        };
        let mut service = session.lock().await;
        if service.wallet_address() != wallet_address {
            tracing::warn!(
                session = session_id,
                caller = wallet_address,
                owner = service.wallet_address(),
                "settlement skipped, wallet does not own the session"
            );
            return Ok(ManagerOutcome::Skipped(SkipReason::WalletMismatch));
        }
        let result = service.do_permit_and_transfer(&self.ctx).await?;
        Ok(ManagerOutcome::Executed(result))
    }

    /// Removes the session for `session_id` after verifying the caller's
    /// wallet. A mismatched wallet skips and leaves the session live.
    pub async fn release(
        &self,
        session_id: &str,
        wallet_address: &str,
    ) -> ManagerOutcome<()> {
        // The session lock may be held by a settlement in flight, so the
        // registry lock must not be held while waiting on it.
        let session = {
            let sessions = self.sessions.lock().await;
            match sessions.get(session_id) {
                Some(session) => Arc::clone(session),
                None => return ManagerOutcome::Skipped(SkipReason::NoSession),
            }
        };
        {
            let mut service = session.lock().await;
            if service.wallet_address() != wallet_address {
                tracing::warn!(
                    session = session_id,
                    caller = wallet_address,
                    owner = service.wallet_address(),
                    "release skipped, wallet does not own the session"
                );
                return ManagerOutcome::Skipped(SkipReason::WalletMismatch);
            }
            service.cleanup();
        }
        self.sessions.lock().await.remove(session_id);
        ManagerOutcome::Executed(())
    }

    /// Full settlement convenience: create the session, sign, settle, and
    /// release it on every exit path.
    ///
    /// # Errors
    ///
    /// Propagates the first failure from signing or settlement; the session
    /// is released even then.
    pub async fn settle(
        &self,
        session_id: &str,
        wallet_address: &str,
        payload: PaymentPayload,
    ) -> Result<ExecutionResult, SettleError> {
        self.get_or_create(session_id, wallet_address, payload).await;
        let result = async {
            self.execute_sign(session_id, wallet_address).await?;
            self.execute_permit_and_transfer(session_id, wallet_address).await
        }
        .await;
        self.release(session_id, wallet_address).await;
        match result? {
            ManagerOutcome::Executed(result) => Ok(result),
            // The session was created above, so a skip means the key was
            // already held by another wallet or released mid-settlement.
            ManagerOutcome::Skipped(reason) => Err(SettleError::Signing(format!(
                "session {session_id} could not be driven to settlement: {reason:?}"
            ))),
        }
    }
}
