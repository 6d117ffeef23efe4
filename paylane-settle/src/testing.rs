//! Shared test doubles for the orchestration layer.

use crate::error::SettleError;
use crate::factory::HandlerResolver;
use crate::session::{PaymentPayload, PaymentSigner};
use async_trait::async_trait;
use paylane::handler::{
    AllowanceInfo, AuthMaterial, HandlerError, PermitCall, TransferHandler, TxOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scriptable [`TransferHandler`] with call counters.
pub(crate) struct MockHandler {
    network: String,
    token: String,
    state: Mutex<MockState>,
    pub permit_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

struct MockState {
    allowance: u128,
    permit_outcome: TxOutcome,
    transfer_outcome: Option<TxOutcome>,
    status_script: Vec<TxOutcome>,
    status_cursor: usize,
    status_errors: u32,
    simulate_error: Option<String>,
}

impl MockHandler {
    pub fn new(network: &str, token: &str) -> Self {
        Self {
            network: network.to_owned(),
            token: token.to_owned(),
            state: Mutex::new(MockState {
                allowance: 0,
                permit_outcome: TxOutcome::confirmed("0xpermit", "permit confirmed"),
                transfer_outcome: None,
                status_script: Vec::new(),
                status_cursor: 0,
                status_errors: 0,
                simulate_error: None,
            }),
            permit_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_allowance(self, allowance: u128) -> Self {
        self.state.lock().unwrap().allowance = allowance;
        self
    }

    pub fn with_permit_outcome(self, outcome: TxOutcome) -> Self {
        self.state.lock().unwrap().permit_outcome = outcome;
        self
    }

    pub fn with_transfer_outcome(self, outcome: TxOutcome) -> Self {
        self.state.lock().unwrap().transfer_outcome = Some(outcome);
        self
    }

    /// Scripted replies for status polls; the last entry repeats once the
    /// script is exhausted.
    pub fn with_status_sequence(self, script: Vec<TxOutcome>) -> Self {
        self.state.lock().unwrap().status_script = script;
        self
    }

    /// Number of leading status polls that fail with an RPC error before
    /// the script starts answering.
    pub fn with_status_errors(self, errors: u32) -> Self {
        self.state.lock().unwrap().status_errors = errors;
        self
    }

    pub fn with_simulate_error(self, message: &str) -> Self {
        self.state.lock().unwrap().simulate_error = Some(message.to_owned());
        self
    }
}

#[async_trait]
impl TransferHandler for MockHandler {
    fn network(&self) -> &str {
        &self.network
    }

    fn token(&self) -> &str {
        &self.token
    }

    fn spender_address(&self) -> String {
        "0x000000000000000000000000000000000000faCe".to_owned()
    }

    async fn simulate_permit(&self, _call: &PermitCall) -> Result<(), HandlerError> {
        match &self.state.lock().unwrap().simulate_error {
            Some(message) => Err(HandlerError::Simulation(message.clone())),
            None => Ok(()),
        }
    }

    async fn execute_permit(&self, _call: &PermitCall) -> Result<TxOutcome, HandlerError> {
        self.permit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().permit_outcome.clone())
    }

    async fn execute_transfer_from(
        &self,
        _owner: &str,
        amount: u128,
    ) -> Result<TxOutcome, HandlerError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if let Some(outcome) = &state.transfer_outcome {
            return Ok(outcome.clone());
        }
        if state.allowance < amount {
            return Ok(TxOutcome::failed(
                "",
                format!(
                    "Insufficient allowance: have {}, need {amount}",
                    state.allowance
                ),
            ));
        }
        Ok(TxOutcome::confirmed("0xtransfer", "transfer confirmed"))
    }

    async fn get_transaction_status(&self, reference: &str) -> Result<TxOutcome, HandlerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.status_errors > 0 {
            state.status_errors -= 1;
            return Err(HandlerError::Rpc("transient poll failure".to_owned()));
        }
        if state.status_script.is_empty() {
            return Ok(TxOutcome::pending(reference, "not yet visible"));
        }
        let index = state.status_cursor.min(state.status_script.len() - 1);
        state.status_cursor += 1;
        Ok(state.status_script[index].clone())
    }

    async fn check_allowance(&self, owner: &str) -> Result<AllowanceInfo, HandlerError> {
        let state = self.state.lock().unwrap();
        Ok(AllowanceInfo {
            amount: state.allowance,
            display: state.allowance as f64 / 1e6,
            owner: owner.to_owned(),
            spender: self.spender_address(),
            note: None,
        })
    }

    async fn get_native_balance(&self, _address: &str) -> f64 {
        1.0
    }
}

/// Map-backed [`HandlerResolver`] over pre-built handlers.
pub(crate) struct MapResolver {
    handlers: HashMap<(String, String), Arc<dyn TransferHandler>>,
}

impl MapResolver {
    pub fn single(network: &str, token: &str, handler: Arc<MockHandler>) -> Self {
        let mut handlers: HashMap<(String, String), Arc<dyn TransferHandler>> = HashMap::new();
        handlers.insert(
            (network.to_lowercase(), token.to_uppercase()),
            handler as Arc<dyn TransferHandler>,
        );
        Self { handlers }
    }
}

#[async_trait]
impl HandlerResolver for MapResolver {
    async fn resolve(&self, network: &str, token: &str) -> Option<Arc<dyn TransferHandler>> {
        self.handlers
            .get(&(network.to_lowercase(), token.to_uppercase()))
            .map(Arc::clone)
    }
}

/// Signer that always returns the same pre-built authorization.
pub(crate) struct StaticSigner(pub AuthMaterial);

#[async_trait]
impl PaymentSigner for StaticSigner {
    async fn sign(
        &self,
        _wallet_address: &str,
        _payload: &PaymentPayload,
    ) -> Result<AuthMaterial, SettleError> {
        Ok(self.0.clone())
    }
}

/// Installs a test subscriber once; later calls are no-ops.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
