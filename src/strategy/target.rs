// =============================================================================
// target-aware
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction};

use super::param_helpers::{get_bool, get_decimal};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

/// Flat-stakes until cumulative profit reaches `target_profit` (relative to
/// the balance observed at session start), then voluntarily exits. A session
/// started with `target_profit <= 0` is considered already met and exits on
/// the very first `next_bet` with zero bets placed.
#[derive(Debug, Clone)]
pub struct TargetAwareStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    target_profit: Decimal,
    has_target: bool,
    starting_balance: Option<Decimal>,
}

impl Strategy for TargetAwareStrategy {
    fn name(&self) -> &'static str {
        "target-aware"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00001),
                description: "Flat bet amount",
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
                field_name: "target_profit",
                param_type: ParamType::Float,
                default: json!(null),
                description: "Profit at which the session exits voluntarily; unset disables the target",
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
        let has_target = params.get("target_profit").map(|v| !v.is_null()).unwrap_or(false);
        let target_profit = get_decimal(params, "target_profit", Decimal::ZERO)?;
        Ok(Self {
            base_amount: get_decimal(params, "base_amount", dec!(0.00001))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            target_profit,
            has_target,
            starting_balance: None,
        })
    }

    fn on_session_start(&mut self, ctx: &StrategyContext) {
        self.starting_balance = Some(ctx.state.current_balance);
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let baseline = self.starting_balance.unwrap_or(ctx.state.current_balance);
        let profit_so_far = ctx.state.current_balance - baseline;
        if self.has_target && profit_so_far >= self.target_profit {
            return Err(StrategyExit::new("target profit reached"));
        }
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(self.base_amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::DryRunRng;
    use crate::session::{SessionLimits, SessionState};
    use parking_lot::Mutex;
    use serde_json::json as j;

    #[test]
    fn exits_immediately_when_target_already_met() {
        let mut params = Params::new();
        params.insert("target_profit".to_string(), j(0.0));
        let mut strat = TargetAwareStrategy::with_params(&params).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        strat.on_session_start(&ctx);
        assert!(strat.next_bet(&ctx).is_err());
    }

    #[test]
    fn keeps_betting_when_no_target_configured() {
        let mut strat = TargetAwareStrategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        strat.on_session_start(&ctx);
        assert!(strat.next_bet(&ctx).is_ok());
    }

    #[test]
    fn exits_once_target_profit_reached_after_bets() {
        let mut params = Params::new();
        params.insert("target_profit".to_string(), j(10.0));
        let mut strat = TargetAwareStrategy::with_params(&params).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let mut state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        strat.on_session_start(&ctx);
        assert!(strat.next_bet(&ctx).is_ok());

        state.cumulative_profit = dec!(10);
        state.current_balance = dec!(1010);
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        assert!(strat.next_bet(&ctx).is_err());
    }
}
