// =============================================================================
// streak-hunter, streak-multiplier
// =============================================================================
//
// Regression guard (BUGFIX_STREAK_HUNTER): `base_bet` is re-derived from
// `ctx.state.current_balance` on every `next_bet` call, never carried
// forward as `previous_profit * multiplier`. Carrying it forward compounds
// floating error and desyncs the stake from the account's actual size;
// re-deriving it keeps the stake a stable fraction of current balance.
// =============================================================================

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction};

use super::param_helpers::{get_bool, get_decimal, get_u32};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

fn dice_spec(amount: Decimal, chance: Decimal, is_high: bool, faucet: bool) -> BetSpec {
    let direction = if is_high { Direction::High } else { Direction::Low };
    let balance_kind = if faucet { BalanceKind::Faucet } else { BalanceKind::Main };
    BetSpec::dice(amount, chance, direction, balance_kind)
}

/// Stakes up after `trigger_streak` consecutive losses, betting that the
/// streak is due to break. `base_bet` is always `current_balance *
/// base_fraction`, recomputed fresh each call.
#[derive(Debug, Clone)]
pub struct StreakHunterStrategy {
    base_fraction: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    trigger_streak: u32,
    hunt_multiplier: Decimal,
    max_multiplier_exp: u32,
}

impl Strategy for StreakHunterStrategy {
    fn name(&self) -> &'static str {
        "streak-hunter"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_fraction",
                param_type: ParamType::Float,
                default: json!(0.0001),
                description: "Fraction of current balance used as the base stake",
            },
            ParamSpec {
                field_name: "chance",
                param_type: ParamType::Float,
                default: json!(49.5),
                description: "Win chance percent",
            },
            ParamSpec {
                field_name: "is_high",
                param_type: ParamType::Bool,
                default: json!(true),
                description: "Bet on the high half of the roll range",
            },
            ParamSpec {
                field_name: "faucet",
                param_type: ParamType::Bool,
                default: json!(false),
                description: "Draw from the faucet balance instead of main",
            },
            ParamSpec {
                field_name: "trigger_streak",
                param_type: ParamType::Int,
                default: json!(4),
                description: "Consecutive losses before the hunt stake kicks in",
            },
            ParamSpec {
                field_name: "hunt_multiplier",
                param_type: ParamType::Float,
                default: json!(2.0),
                description: "Per-extra-loss multiplier applied once hunting",
            },
            ParamSpec {
                field_name: "max_multiplier_exp",
                param_type: ParamType::Int,
                default: json!(6),
                description: "Cap on how many times hunt_multiplier compounds",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
            return Err(StrategyError::InvalidParam {
                field: "chance".to_string(),
                reason: "must be in (0, 100)".to_string(),
            });
        }
        Ok(Self {
            base_fraction: get_decimal(params, "base_fraction", dec!(0.0001))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            trigger_streak: get_u32(params, "trigger_streak", 4)?,
            hunt_multiplier: get_decimal(params, "hunt_multiplier", dec!(2.0))?,
            max_multiplier_exp: get_u32(params, "max_multiplier_exp", 6)?,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let base_bet = ctx.state.current_balance * self.base_fraction;
        let loss_streak = ctx.state.consecutive_losses;
        let amount = if loss_streak >= self.trigger_streak {
            let extra = (loss_streak - self.trigger_streak + 1).min(self.max_multiplier_exp);
            base_bet * self.hunt_multiplier.powi(extra as i64)
        } else {
            base_bet
        };
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "trigger_streak": self.trigger_streak }))
    }
}

/// Bets `base_bet * multiplier^consecutive_wins`, capped. `base_bet` is
/// re-derived from `current_balance` every call — see module doc comment.
#[derive(Debug, Clone)]
pub struct StreakMultiplierStrategy {
    base_fraction: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    multiplier: Decimal,
    max_streak_exp: u32,
}

impl Strategy for StreakMultiplierStrategy {
    fn name(&self) -> &'static str {
        "streak-multiplier"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_fraction",
                param_type: ParamType::Float,
                default: json!(0.0001),
                description: "Fraction of current balance used as the base stake",
            },
            ParamSpec {
                field_name: "chance",
                param_type: ParamType::Float,
                default: json!(49.5),
                description: "Win chance percent",
            },
            ParamSpec {
                field_name: "is_high",
                param_type: ParamType::Bool,
                default: json!(true),
                description: "Bet on the high half of the roll range",
            },
            ParamSpec {
                field_name: "faucet",
                param_type: ParamType::Bool,
                default: json!(false),
                description: "Draw from the faucet balance instead of main",
            },
            ParamSpec {
                field_name: "multiplier",
                param_type: ParamType::Float,
                default: json!(1.5),
                description: "Per-win multiplier",
            },
            ParamSpec {
                field_name: "max_streak_exp",
                param_type: ParamType::Int,
                default: json!(5),
                description: "Cap on how many times the multiplier compounds",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
            return Err(StrategyError::InvalidParam {
                field: "chance".to_string(),
                reason: "must be in (0, 100)".to_string(),
            });
        }
        Ok(Self {
            base_fraction: get_decimal(params, "base_fraction", dec!(0.0001))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            multiplier: get_decimal(params, "multiplier", dec!(1.5))?,
            max_streak_exp: get_u32(params, "max_streak_exp", 5)?,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let base_bet = ctx.state.current_balance * self.base_fraction;
        let exp = ctx.state.consecutive_wins.min(self.max_streak_exp);
        let amount = base_bet * self.multiplier.powi(exp as i64);
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}

    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::DryRunRng;
    use crate::session::{SessionLimits, SessionState};
    use parking_lot::Mutex;

    fn result(win: bool, amount: Decimal, new_balance: Decimal) -> BetResult {
        BetResult {
            win,
            roll: 0,
            profit: if win { amount } else { -amount },
            new_balance,
            simulated: true,
            timestamp_ms: 0,
            api_raw: None,
        }
    }

    #[test]
    fn streak_multiplier_rederives_base_from_balance_not_prior_profit() {
        let mut strat = StreakMultiplierStrategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));

        let mut state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let s1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s1.amount, dec!(0.1)); // 1000 * 0.0001 * 1.5^0

        state.record(&result(true, s1.amount, dec!(5000))); // balance jumps independent of profit math
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let s2 = strat.next_bet(&ctx).unwrap();
        // base re-derived from the NEW balance (5000), times multiplier^1 — not
        // s1.amount * multiplier, which the regression-guarded bug would compute.
        assert_eq!(s2.amount, dec!(5000) * dec!(0.0001) * dec!(1.5));
    }

    #[test]
    fn streak_hunter_only_escalates_past_trigger() {
        let mut strat = StreakHunterStrategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let mut state = SessionState::new(dec!(1000));

        for _ in 0..3 {
            let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
            let spec = strat.next_bet(&ctx).unwrap();
            assert_eq!(spec.amount, dec!(0.1)); // base, no escalation yet
            state.record(&result(false, spec.amount, state.current_balance - spec.amount));
        }
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let spec = strat.next_bet(&ctx).unwrap();
        assert!(spec.amount > dec!(0.1));
    }
}
