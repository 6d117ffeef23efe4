//! Orchestration-level errors.

use paylane::handler::HandlerError;
use paylane::ledger::LedgerError;
use thiserror::Error;

/// Failure raised by the settlement orchestration layer.
///
/// Chain-level failures that belong to a settlement attempt are folded into
/// [`crate::ExecutionResult`] instead; only failures outside the uniform
/// result shape surface here.
#[derive(Debug, Error)]
pub enum SettleError {
    /// No handler could be resolved for the pair; construction failed or
    /// the pair is not configured.
    #[error("no transfer handler available for {network}/{token}")]
    HandlerUnavailable {
        /// Requested network name.
        network: String,
        /// Requested token symbol.
        token: String,
    },
    /// A handler operation failed outside the classified result path.
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// A ledger builder or store rejected a record.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// Authorization material could not be produced or adopted.
    #[error("signing failed: {0}")]
    Signing(String),
}
