//! Partially signed transaction handling.
//!
//! Payer wallets deliver a base64-encoded [`VersionedTransaction`] carrying
//! the SPL transfer instruction and the payer's signature, with the
//! fee-payer signature slot left open. [`PartialTransaction`] wraps that
//! wire form with the decode, inspect and co-sign operations the handler
//! needs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

/// Failure while decoding or signing a partial transaction.
#[derive(Debug, Error)]
pub enum PartialTxError {
    /// The base64 or bincode layer could not be decoded.
    #[error("cannot decode transaction: {0}")]
    Decode(String),
    /// The signer's public key is not among the required signers.
    #[error("signer {0} is not a required signer of this transaction")]
    SignerNotRequired(Pubkey),
    /// The underlying signer failed to produce a signature.
    #[error("cannot sign transaction: {0}")]
    Signing(String),
}

/// A user-partially-signed transaction awaiting the fee-payer co-signature.
#[derive(Debug, Clone)]
pub struct PartialTransaction {
    inner: VersionedTransaction,
}

impl PartialTransaction {
    /// Decodes the wire form: base64 over bincode.
    ///
    /// # Errors
    ///
    /// Returns [`PartialTxError::Decode`] when either layer is malformed.
    pub fn from_base64(encoded: &str) -> Result<Self, PartialTxError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| PartialTxError::Decode(e.to_string()))?;
        let inner = bincode::deserialize::<VersionedTransaction>(&bytes)
            .map_err(|e| PartialTxError::Decode(e.to_string()))?;
        Ok(Self { inner })
    }

    /// The transaction's fee payer: the first static account key.
    #[must_use]
    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.inner.message.static_account_keys().first().copied()
    }

    /// Whether every required signature slot holds a real signature.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        let num_required = self.inner.message.header().num_required_signatures as usize;
        if self.inner.signatures.len() < num_required {
            return false;
        }
        let default = Signature::default();
        self.inner.signatures.iter().all(|sig| *sig != default)
    }

    /// Adds `signer`'s signature in its required-signer slot, leaving other
    /// signatures untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PartialTxError::SignerNotRequired`] when `signer` is not
    /// among the transaction's required signers.
    pub fn co_sign<S: Signer>(self, signer: &S) -> Result<Self, PartialTxError> {
        let mut tx = self.inner;
        let msg_bytes = tx.message.serialize();
        let signature = signer
            .try_sign_message(msg_bytes.as_slice())
            .map_err(|e| PartialTxError::Signing(e.to_string()))?;

        let num_required = tx.message.header().num_required_signatures as usize;
        let static_keys = tx.message.static_account_keys();
        let pos = static_keys[..num_required.min(static_keys.len())]
            .iter()
            .position(|key| *key == signer.pubkey())
            .ok_or_else(|| PartialTxError::SignerNotRequired(signer.pubkey()))?;

        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(Self { inner: tx })
    }

    /// Borrows the wrapped transaction for submission.
    #[must_use]
    pub const fn inner(&self) -> &VersionedTransaction {
        &self.inner
    }
}
