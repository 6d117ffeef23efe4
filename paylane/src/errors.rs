//! Blockchain error classification.
//!
//! Adapters surface raw failure text from RPC nodes, contract reverts and
//! signature checks. This module maps that free text onto a closed taxonomy
//! of stable error codes, each carrying a user-facing message and a retry
//! category. Classification is advisory metadata attached to failure
//! records; it never triggers a retry by itself — retry policy belongs to
//! the caller.

use serde::{Deserialize, Serialize};

/// Stable blockchain transaction error codes.
///
/// Codes occupy the `110014`–`110030` range; the lower range is reserved
/// for the payment-service error codes of the excluded front-door layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockchainErrorCode {
    /// Transaction nonce is lower than the account's current nonce.
    NonceTooLow,
    /// Transaction nonce is ahead of the account's current nonce.
    NonceTooHigh,
    /// A replacement transaction offered too low a gas price.
    ReplacementUnderpriced,
    /// Transaction ran out of gas during execution.
    OutOfGas,
    /// Offered gas price is below the node's floor.
    GasPriceTooLow,
    /// The spender account lacks native currency for gas.
    InsufficientFundsForGas,
    /// Permit signature failed verification.
    InvalidSignature,
    /// Permit signature deadline has passed.
    SignatureExpired,
    /// Permit nonce was already consumed.
    SignatureAlreadyUsed,
    /// Recovered signer does not match the owner wallet.
    WrongSigner,
    /// On-chain allowance is below the requested transfer amount.
    InsufficientAllowance,
    /// Token balance is below the requested transfer amount.
    InsufficientBalance,
    /// Allowance arithmetic would go below zero.
    AllowanceBelowZero,
    /// Could not reach the blockchain network.
    NetworkConnectionFailed,
    /// The RPC node returned an error.
    RpcError,
    /// The transaction reverted on-chain.
    TransactionReverted,
    /// A local dry-run of the transaction failed.
    SimulationFailed,
}

impl BlockchainErrorCode {
    /// Returns the stable numeric code as a string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NonceTooLow => "110014",
            Self::NonceTooHigh => "110015",
            Self::ReplacementUnderpriced => "110016",
            Self::OutOfGas => "110017",
            Self::GasPriceTooLow => "110018",
            Self::InsufficientFundsForGas => "110019",
            Self::InvalidSignature => "110020",
            Self::SignatureExpired => "110021",
            Self::SignatureAlreadyUsed => "110022",
            Self::WrongSigner => "110023",
            Self::InsufficientAllowance => "110024",
            Self::InsufficientBalance => "110025",
            Self::AllowanceBelowZero => "110026",
            Self::NetworkConnectionFailed => "110027",
            Self::RpcError => "110028",
            Self::TransactionReverted => "110029",
            Self::SimulationFailed => "110030",
        }
    }

    /// Returns the user-facing message for this code.
    ///
    /// Deliberately distinct from the raw technical error string, which is
    /// only attached when a caller opts in.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::NonceTooLow => "Transaction nonce conflict. Please try again.",
            Self::NonceTooHigh => "Transaction nonce too high. Please refresh and try again.",
            Self::ReplacementUnderpriced => "Transaction replacement gas price too low.",
            Self::OutOfGas => "Transaction ran out of gas.",
            Self::GasPriceTooLow => "Gas price too low.",
            Self::InsufficientFundsForGas => "Insufficient native balance for gas fees.",
            Self::InvalidSignature => "Permit signature is invalid. Please re-authorize.",
            Self::SignatureExpired => {
                "Permit signature has expired. Please create a new authorization."
            }
            Self::SignatureAlreadyUsed => "Permit already used. Please create a new authorization.",
            Self::WrongSigner => "Signature does not match the wallet address.",
            Self::InsufficientAllowance => {
                "Insufficient token allowance. Please authorize more tokens."
            }
            Self::InsufficientBalance => "Insufficient token balance. Please add funds.",
            Self::AllowanceBelowZero => "Invalid allowance amount.",
            Self::NetworkConnectionFailed => "Failed to connect to the blockchain network.",
            Self::RpcError => "Blockchain RPC error. Please try again later.",
            Self::TransactionReverted => "Transaction was reverted.",
            Self::SimulationFailed => "Transaction simulation failed.",
        }
    }

    /// Returns the retry category for this code.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::NonceTooLow
            | Self::NonceTooHigh
            | Self::GasPriceTooLow
            | Self::NetworkConnectionFailed
            | Self::RpcError => ErrorCategory::Retryable,
            Self::InvalidSignature
            | Self::SignatureExpired
            | Self::SignatureAlreadyUsed
            | Self::WrongSigner
            | Self::OutOfGas
            | Self::AllowanceBelowZero => ErrorCategory::NonRetryable,
            Self::InsufficientAllowance
            | Self::InsufficientBalance
            | Self::InsufficientFundsForGas
            | Self::ReplacementUnderpriced => ErrorCategory::UserActionRequired,
            Self::SimulationFailed | Self::TransactionReverted => ErrorCategory::SystemError,
        }
    }

    /// Whether a caller may reasonably re-submit after this error.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self.category(), ErrorCategory::Retryable)
    }
}

/// Coarse retry category of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient; re-submission may succeed without user involvement.
    Retryable,
    /// Permanent for this authorization; re-submission cannot succeed.
    NonRetryable,
    /// The payer must act (re-authorize, top up) before retrying.
    UserActionRequired,
    /// Unexpected condition; surfaced for operator attention.
    SystemError,
}

/// Ordered substring patterns matched against lowercased error text.
/// First match wins, so more specific patterns come first.
const ERROR_PATTERNS: &[(&str, BlockchainErrorCode)] = &[
    // Nonce
    ("nonce too low", BlockchainErrorCode::NonceTooLow),
    ("nonce too high", BlockchainErrorCode::NonceTooHigh),
    (
        "replacement transaction underpriced",
        BlockchainErrorCode::ReplacementUnderpriced,
    ),
    // Gas
    ("out of gas", BlockchainErrorCode::OutOfGas),
    ("gas too low", BlockchainErrorCode::GasPriceTooLow),
    (
        "insufficient funds for gas",
        BlockchainErrorCode::InsufficientFundsForGas,
    ),
    // Signature
    (
        "eip2612: invalid signature",
        BlockchainErrorCode::InvalidSignature,
    ),
    ("invalid signature", BlockchainErrorCode::InvalidSignature),
    ("eip2612: expired", BlockchainErrorCode::SignatureExpired),
    ("expired", BlockchainErrorCode::SignatureExpired),
    ("deadline", BlockchainErrorCode::SignatureExpired),
    // Allowance / balance
    (
        "insufficient allowance",
        BlockchainErrorCode::InsufficientAllowance,
    ),
    (
        "transfer amount exceeds allowance",
        BlockchainErrorCode::InsufficientAllowance,
    ),
    (
        "insufficient balance",
        BlockchainErrorCode::InsufficientBalance,
    ),
    (
        "transfer amount exceeds balance",
        BlockchainErrorCode::InsufficientBalance,
    ),
    // Network
    ("connection refused", BlockchainErrorCode::NetworkConnectionFailed),
    ("connection timeout", BlockchainErrorCode::NetworkConnectionFailed),
    ("network error", BlockchainErrorCode::NetworkConnectionFailed),
    ("execution reverted", BlockchainErrorCode::TransactionReverted),
    ("simulation failed", BlockchainErrorCode::SimulationFailed),
];

/// A raw error message resolved against the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Stable numeric code.
    pub error_code: String,
    /// Human-readable message suitable for end users.
    pub user_message: String,
    /// Retry category.
    pub category: ErrorCategory,
    /// Whether re-submission may succeed.
    pub is_retryable: bool,
    /// The raw technical error string; only exposed when a caller opts in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
}

impl ClassifiedError {
    /// Drops the technical error string unless `include_technical` is set.
    #[must_use]
    pub fn redacted(mut self, include_technical: bool) -> Self {
        if !include_technical {
            self.technical_error = None;
        }
        self
    }
}

/// Maps a raw error message to its taxonomy code, if any pattern matches.
#[must_use]
pub fn classify(message: &str) -> Option<BlockchainErrorCode> {
    if message.is_empty() {
        return None;
    }
    let lowered = message.to_lowercase();
    ERROR_PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, code)| *code)
}

/// Parses a raw error message into a fully populated [`ClassifiedError`].
///
/// Unmatched messages fall back to [`BlockchainErrorCode::TransactionReverted`]
/// with category [`ErrorCategory::SystemError`] and `is_retryable = false`.
#[must_use]
pub fn parse_error(message: &str) -> ClassifiedError {
    classify(message).map_or_else(
        || ClassifiedError {
            error_code: BlockchainErrorCode::TransactionReverted.code().to_owned(),
            user_message: "Transaction failed. Please try again.".to_owned(),
            category: ErrorCategory::SystemError,
            is_retryable: false,
            technical_error: Some(message.to_owned()),
        },
        |code| ClassifiedError {
            error_code: code.code().to_owned(),
            user_message: code.user_message().to_owned(),
            category: code.category(),
            is_retryable: code.is_retryable(),
            technical_error: Some(message.to_owned()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let first = classify("insufficient allowance");
        let second = classify("insufficient allowance");
        assert_eq!(first, Some(BlockchainErrorCode::InsufficientAllowance));
        assert_eq!(first, second);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        assert_eq!(
            classify("ERC20: Transfer Amount Exceeds Allowance for 0xabc"),
            Some(BlockchainErrorCode::InsufficientAllowance)
        );
        assert_eq!(
            classify("server said: Nonce too low (expected 7)"),
            Some(BlockchainErrorCode::NonceTooLow)
        );
    }

    #[test]
    fn first_match_wins_for_specific_patterns() {
        // "eip2612: expired" must hit before the bare "expired" pattern.
        assert_eq!(
            classify("eip2612: expired"),
            Some(BlockchainErrorCode::SignatureExpired)
        );
    }

    #[test]
    fn unknown_error_falls_back_to_system_error() {
        let parsed = parse_error("flux capacitor misaligned");
        assert_eq!(parsed.error_code, "110029");
        assert_eq!(parsed.category, ErrorCategory::SystemError);
        assert!(!parsed.is_retryable);
        // Same input, same output.
        assert_eq!(parsed, parse_error("flux capacitor misaligned"));
    }

    #[test]
    fn empty_message_does_not_classify() {
        assert_eq!(classify(""), None);
    }

    #[test]
    fn categories_line_up_with_codes() {
        assert!(BlockchainErrorCode::NonceTooLow.is_retryable());
        assert!(!BlockchainErrorCode::InvalidSignature.is_retryable());
        assert_eq!(
            BlockchainErrorCode::InsufficientBalance.category(),
            ErrorCategory::UserActionRequired
        );
        assert_eq!(
            BlockchainErrorCode::SimulationFailed.category(),
            ErrorCategory::SystemError
        );
    }

    #[test]
    fn technical_detail_is_opt_in() {
        let parsed = parse_error("execution reverted: boom").redacted(false);
        assert!(parsed.technical_error.is_none());
        let parsed = parse_error("execution reverted: boom").redacted(true);
        assert_eq!(
            parsed.technical_error.as_deref(),
            Some("execution reverted: boom")
        );
    }
}
