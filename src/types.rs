// =============================================================================
// Shared types used across the betting engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which game a `BetSpec` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Game {
    Dice,
    RangeDice,
}

/// Direction of a plain Dice bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
}

/// Side of a RangeDice bet: betting the roll lands inside or outside the
/// `[range_lo, range_hi]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    In,
    Out,
}

/// Which account balance a bet draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceKind {
    Main,
    Faucet,
}

impl std::fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Faucet => write!(f, "faucet"),
        }
    }
}

/// Closed enumeration of why a session terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    MaxBets,
    MaxDuration,
    MaxConsecutiveLosses,
    StopLoss,
    TakeProfit,
    InsufficientBalance,
    ApiError { retryable: bool },
    UserStop,
    StrategyExit { message: String },
    Completed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxBets => write!(f, "MaxBets"),
            Self::MaxDuration => write!(f, "MaxDuration"),
            Self::MaxConsecutiveLosses => write!(f, "MaxConsecutiveLosses"),
            Self::StopLoss => write!(f, "StopLoss"),
            Self::TakeProfit => write!(f, "TakeProfit"),
            Self::InsufficientBalance => write!(f, "InsufficientBalance"),
            Self::ApiError { retryable } => write!(f, "ApiError(retryable={retryable})"),
            Self::UserStop => write!(f, "UserStop"),
            Self::StrategyExit { message } => write!(f, "StrategyExit({message})"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Compare two currency codes the way the engine does when resolving the
/// starting balance: case-insensitively (`"btc"` == `"BTC"`).
pub fn currency_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_comparison_is_case_insensitive() {
        assert!(currency_eq("btc", "BTC"));
        assert!(currency_eq("Eth", "eth"));
        assert!(!currency_eq("btc", "eth"));
    }
}
