// =============================================================================
// Session engine — sequential and parallel drivers sharing one config shape
// =============================================================================

pub mod parallel;
pub mod sequential;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api_client::{DiceApiClient, PlayResponse};
use crate::bet::{dice_wins, range_dice_wins, BetResult, BetSpec};
use crate::decimal::{payout_amount, HOUSE_EDGE_FAUCET_PCT, HOUSE_EDGE_MAIN_PCT};
use crate::error::ApiError;
use crate::types::{BalanceKind, Game};

pub use parallel::ParallelEngine;
pub use sequential::SequentialEngine;

pub(super) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Resolve a dry-run roll into a `BetResult` without touching the network.
pub(super) fn simulate_result(spec: &BetSpec, current_balance: Decimal, roll: u32) -> BetResult {
    let house_edge = match spec.balance_kind {
        BalanceKind::Main => HOUSE_EDGE_MAIN_PCT,
        BalanceKind::Faucet => HOUSE_EDGE_FAUCET_PCT,
    };
    let chance = spec.chance.unwrap_or_default();
    let win = match spec.game {
        Game::Dice => dice_wins(roll, chance, spec.direction.unwrap_or(crate::types::Direction::High)),
        Game::RangeDice => range_dice_wins(
            roll,
            spec.range_lo.unwrap_or(0),
            spec.range_hi.unwrap_or(0),
            spec.side.unwrap_or(crate::types::Side::In),
        ),
    };
    let profit = if win {
        payout_amount(spec.amount, chance, house_edge) - spec.amount
    } else {
        -spec.amount
    };
    BetResult {
        win,
        roll,
        profit,
        new_balance: current_balance + profit,
        simulated: true,
        timestamp_ms: now_epoch_ms(),
        api_raw: None,
    }
}

/// Dispatch `spec` to whichever of the two play endpoints it targets.
pub(super) async fn call_api(api: &dyn DiceApiClient, spec: &BetSpec) -> Result<PlayResponse, ApiError> {
    match spec.game {
        Game::Dice => {
            api.play_dice(
                spec.amount,
                spec.chance.unwrap_or_default(),
                spec.direction.unwrap_or(crate::types::Direction::High),
                spec.balance_kind,
                spec.bonus.clone(),
            )
            .await
        }
        Game::RangeDice => {
            api.play_range_dice(
                spec.amount,
                spec.range_lo.unwrap_or(0),
                spec.range_hi.unwrap_or(0),
                spec.side.unwrap_or(crate::types::Side::In),
                spec.balance_kind,
                spec.bonus.clone(),
            )
            .await
        }
    }
}

/// Fold a successful API response into a `BetResult`.
pub(super) fn response_to_result(spec: &BetSpec, response: PlayResponse) -> BetResult {
    let new_balance = match spec.balance_kind {
        BalanceKind::Main => response.balances.main,
        BalanceKind::Faucet => response.balances.faucet,
    };
    BetResult {
        win: response.win,
        roll: response.roll,
        profit: response.profit,
        new_balance,
        simulated: false,
        timestamp_ms: now_epoch_ms(),
        api_raw: Some(response.raw),
    }
}

/// A handle the caller can use to stop a running session from outside the
/// engine loop (e.g. a signal handler or a UI "stop" button). Checked once
/// per decision by both engines; a cancelled session reports
/// `StopReason::UserStop`. Cheap to clone — every clone shares the same
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine-wide knobs that apply regardless of which driver runs the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    pub dry_run: bool,
    pub rng_seed: Option<u64>,
    pub currency: String,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    /// Parallel engine only; ignored by the sequential engine.
    pub worker_count: usize,
    /// Parallel engine only; ignored by the sequential engine.
    pub max_in_flight: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            rng_seed: None,
            currency: "btc".to_string(),
            base_delay_ms: 50,
            jitter_ms: 25,
            worker_count: 5,
            max_in_flight: 10,
        }
    }
}

impl EngineOptions {
    pub fn inter_bet_delay(&self, jitter_roll: u64) -> Duration {
        let jitter = if self.jitter_ms == 0 { 0 } else { jitter_roll % self.jitter_ms };
        Duration::from_millis(self.base_delay_ms + jitter)
    }
}

/// Hex-encoded SHA-256 digest of a strategy's canonicalized parameter JSON,
/// persisted alongside every bet event so a row can be traced back to the
/// exact parameter set that produced it without storing the params inline.
pub fn strategy_params_hash(params_json: &serde_json::Value) -> String {
    let canonical = canonicalize_json(params_json);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serialize a JSON value with object keys sorted, so semantically
/// identical parameter sets hash identically regardless of insertion order.
fn canonicalize_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                out.push_str(&canonicalize_json(&map[*key]));
            }
            out.push('}');
            out
        }
        serde_json::Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonicalize_json(item));
            }
            out.push(']');
            out
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Resolve the starting balance for `currency`, comparing currency codes
/// case-insensitively. Mismatch (no balance reported for the configured
/// currency) resolves to zero, which the caller treats as
/// `StopReason::InsufficientBalance`.
pub fn resolve_starting_balance(reported_currency: &str, configured_currency: &str, amount: Decimal) -> Decimal {
    if crate::types::currency_eq(reported_currency, configured_currency) {
        amount
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn strategy_params_hash_is_stable_under_key_reordering() {
        let a = json!({ "base_amount": 1, "multiplier": 2 });
        let b = json!({ "multiplier": 2, "base_amount": 1 });
        assert_eq!(strategy_params_hash(&a), strategy_params_hash(&b));
    }

    #[test]
    fn strategy_params_hash_differs_for_different_params() {
        let a = json!({ "base_amount": 1 });
        let b = json!({ "base_amount": 2 });
        assert_ne!(strategy_params_hash(&a), strategy_params_hash(&b));
    }

    #[test]
    fn resolve_starting_balance_is_case_insensitive() {
        assert_eq!(resolve_starting_balance("BTC", "btc", dec!(1.5)), dec!(1.5));
        assert_eq!(resolve_starting_balance("ETH", "btc", dec!(1.5)), Decimal::ZERO);
    }
}
