#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Settlement orchestration for the paylane engine.
//!
//! Ties the chain-agnostic core and the per-chain handlers together into
//! the full permit→transfer→confirm lifecycle:
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`factory`] - resolves `(network, token)` to a cached handler instance
//! - [`execute`] - the simulate→submit→poll execution service
//! - [`fees`] - configurable settlement fee schedule
//! - [`session`] - per-session payment service (sign → execute → cleanup)
//! - [`manager`] - at-most-one-live-service-per-session registry
//!
//! A caller obtains a [`session::PaymentService`] through the
//! [`manager::TaskScopedServiceManager`], asks it to sign and then to
//! execute; execution routes through the factory to the right chain
//! handler, outcomes are classified and written to the settlement ledger,
//! and the manager guarantees the session is released afterwards.

pub mod config;
pub mod error;
pub mod execute;
pub mod factory;
pub mod fees;
pub mod manager;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use config::SettleConfig;
pub use error::SettleError;
pub use execute::{ExecutionResult, ExecutionService, PollPolicy};
pub use factory::{HandlerFactory, HandlerResolver};
pub use fees::FeeSchedule;
pub use manager::{ManagerOutcome, SkipReason, TaskScopedServiceManager};
pub use session::{PaymentPayload, PaymentService, PaymentSigner, PresignedOnly, SettleContext};
