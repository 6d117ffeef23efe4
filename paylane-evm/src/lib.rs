#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) transfer handler for the paylane settlement engine.
//!
//! Implements the two-phase EVM settlement path: an EIP-2612 `permit`
//! transaction establishing the allowance, followed by an ERC-20
//! `transferFrom` moving the funds. The handler owns an alloy provider
//! wired to the spender signing key and serializes its nonce-fetch+send
//! sequence behind a per-handler submission lock, so concurrent settlements
//! sharing one spender account cannot race on nonces.

pub mod config;
mod contract;
pub mod handler;

pub use config::EvmHandlerConfig;
pub use handler::EvmTransferHandler;
