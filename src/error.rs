// =============================================================================
// Error taxonomy — typed enums instead of exception-based control flow
// =============================================================================
//
// The source betting bot used exceptions for both API failures and session
// stop conditions. Here every recoverable or terminal condition is a typed
// variant; the engine's main loop classifies each one into a `StopReason`
// (see `crate::session`) rather than propagating a panic or an opaque error.
// =============================================================================

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors the bet validator can raise before a spec reaches the API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount {amount} is below the minimum bet {min_bet}")]
    BelowMin { amount: Decimal, min_bet: Decimal },

    #[error("amount {amount} exceeds current balance {balance}")]
    ExceedsBalance { amount: Decimal, balance: Decimal },

    #[error("chance {chance} is outside (0, 100)")]
    InvalidChance { chance: Decimal },

    #[error("range [{lo}, {hi}] is invalid (must have 0 <= lo <= hi <= 9999)")]
    InvalidRange { lo: u32, hi: u32 },
}

/// Errors the API client can raise. Distinguishes the one retryable,
/// locally-correctable case (`MinimumBet`) from transient and fatal errors.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// HTTP 422 with a message containing "minimum bet" and a parsed amount.
    #[error("minimum bet is {0}")]
    MinimumBet(Decimal),

    /// HTTP 422 with a message containing "insufficient balance".
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Network error, 5xx, or timeout — safe to retry once.
    #[error("transient API error: {0}")]
    Transient(String),

    /// Any other 4xx/5xx, or a malformed response body.
    #[error("fatal API error: {0}")]
    Fatal(String),
}

impl ApiError {
    /// Whether the engine should attempt one retry for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Strategy construction / lookup errors, raised before a session starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid parameter '{field}': {reason}")]
    InvalidParam { field: String, reason: String },
}
