#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the paylane settlement engine.
//!
//! This crate provides the chain-agnostic foundation used throughout the
//! paylane workspace: the transfer-handler abstraction that every chain
//! family implements, the blockchain error taxonomy, the network/asset
//! lookup tables, and the settlement ledger (domain model, builders and
//! persistence contract).
//!
//! # Overview
//!
//! A settlement moves a bounded, time-limited budget from a payer wallet to
//! a payee through a two-phase permit-then-transfer flow. EVM chains use an
//! EIP-2612 permit followed by an ERC-20 `transferFrom`; Solana collapses
//! both phases into a single fee-payer co-signed SPL transfer. The
//! [`handler::TransferHandler`] trait hides that difference behind one
//! uniform capability set so the orchestration layer (the `paylane-settle`
//! crate) stays protocol-agnostic.
//!
//! # Modules
//!
//! - [`handler`] - The transfer-protocol abstraction and its uniform result types
//! - [`errors`] - Blockchain error classification (codes, categories, user messages)
//! - [`networks`] - Registry of supported networks, chain ids and asset ids
//! - [`ledger`] - Settlement ledger domain model, builders and store contract
//! - [`timestamp`] - Unix timestamp type used for deadlines and audit times

pub mod errors;
pub mod handler;
pub mod ledger;
pub mod networks;
pub mod timestamp;
