#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana transfer handler for the paylane settlement engine.
//!
//! On Solana the two-phase permit-then-transfer flow collapses into a single
//! atomic operation: the payer wallet partially signs an SPL transfer
//! transaction, leaving the fee-payer slot open, and the handler co-signs
//! and submits it. The separate transfer step is a deliberate protocol
//! no-op, and "allowance" queries report the owner's token-account balance
//! as the closest equivalent since Solana has no allowance primitive.

pub mod config;
pub mod handler;
pub mod tx;

pub use config::SolanaHandlerConfig;
pub use handler::SolanaTransferHandler;
