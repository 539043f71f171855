// =============================================================================
// classic-martingale, anti-martingale-streak
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction};

use super::param_helpers::{get_bool, get_decimal, get_u32};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

/// Doubles the bet on every loss, resets to `base_amount` on a win.
#[derive(Debug, Clone)]
pub struct ClassicMartingaleStrategy {
    base_amount: Decimal,
    multiplier: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    current_amount: Decimal,
}

impl Strategy for ClassicMartingaleStrategy {
    fn name(&self) -> &'static str {
        "classic-martingale"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00001),
                description: "Starting/reset bet amount",
            },
            ParamSpec {
                field_name: "multiplier",
                param_type: ParamType::Float,
                default: json!(2.0),
                description: "Factor applied to the bet after a loss",
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
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let base_amount = get_decimal(params, "base_amount", dec!(0.00001))?;
        let multiplier = get_decimal(params, "multiplier", dec!(2.0))?;
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
            return Err(StrategyError::InvalidParam {
                field: "chance".to_string(),
                reason: "must be in (0, 100)".to_string(),
            });
        }
        Ok(Self {
            base_amount,
            multiplier,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            current_amount: base_amount,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(self.current_amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        self.current_amount = if result.win {
            self.base_amount
        } else {
            self.current_amount * self.multiplier
        };
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount }))
    }
}

/// Doubles the bet on every *win* (rides a streak), resets on a loss.
#[derive(Debug, Clone)]
pub struct AntiMartingaleStreakStrategy {
    base_amount: Decimal,
    multiplier: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    max_streak: u32,
    current_amount: Decimal,
    win_streak: u32,
}

impl Strategy for AntiMartingaleStreakStrategy {
    fn name(&self) -> &'static str {
        "anti-martingale-streak"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00001),
                description: "Starting/reset bet amount",
            },
            ParamSpec {
                field_name: "multiplier",
                param_type: ParamType::Float,
                default: json!(2.0),
                description: "Factor applied to the bet after a win",
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
                field_name: "max_streak",
                param_type: ParamType::Int,
                default: json!(3),
                description: "Reset to base after this many consecutive wins",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let base_amount = get_decimal(params, "base_amount", dec!(0.00001))?;
        Ok(Self {
            base_amount,
            multiplier: get_decimal(params, "multiplier", dec!(2.0))?,
            chance: get_decimal(params, "chance", dec!(49.5))?,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            max_streak: get_u32(params, "max_streak", 3)?,
            current_amount: base_amount,
            win_streak: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(self.current_amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            self.win_streak += 1;
            if self.max_streak > 0 && self.win_streak >= self.max_streak {
                self.current_amount = self.base_amount;
                self.win_streak = 0;
            } else {
                self.current_amount *= self.multiplier;
            }
        } else {
            self.win_streak = 0;
            self.current_amount = self.base_amount;
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount, "win_streak": self.win_streak }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::DryRunRng;
    use crate::session::{SessionLimits, SessionState};
    use parking_lot::Mutex;

    fn ctx_fixture() -> (SessionState, SessionLimits, Mutex<DryRunRng>) {
        (
            SessionState::new(dec!(1000)),
            SessionLimits::default(),
            Mutex::new(DryRunRng::from_seed(1)),
        )
    }

    fn result(win: bool, amount: Decimal) -> BetResult {
        BetResult {
            win,
            roll: 0,
            profit: if win { amount } else { -amount },
            new_balance: dec!(1000),
            simulated: true,
            timestamp_ms: 0,
            api_raw: None,
        }
    }

    #[test]
    fn classic_martingale_doubles_on_loss_resets_on_win() {
        let params = Params::new();
        let mut strat = ClassicMartingaleStrategy::with_params(&params).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        let spec1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec1.amount, dec!(0.00001));
        strat.on_result(&ctx, &result(false, spec1.amount));

        let spec2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec2.amount, dec!(0.00002));
        strat.on_result(&ctx, &result(false, spec2.amount));

        let spec3 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec3.amount, dec!(0.00004));
        strat.on_result(&ctx, &result(true, spec3.amount));

        let spec4 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec4.amount, dec!(0.00001));
    }

    #[test]
    fn anti_martingale_resets_at_max_streak() {
        let mut params = Params::new();
        params.insert("max_streak".to_string(), json!(2));
        let mut strat = AntiMartingaleStreakStrategy::with_params(&params).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        let spec1 = strat.next_bet(&ctx).unwrap();
        strat.on_result(&ctx, &result(true, spec1.amount));
        let spec2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec2.amount, dec!(0.00002));
        strat.on_result(&ctx, &result(true, spec2.amount));

        let spec3 = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec3.amount, dec!(0.00001));
    }
}
