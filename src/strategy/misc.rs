// =============================================================================
// kelly-capped, max-wager-flow, range-50-random, rng-analysis-strategy,
// adaptive-survival, simple-progression-40
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::decimal::payout_multiplier;
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction, Side};

use super::param_helpers::{get_bool, get_decimal, get_u32};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

fn dice_schema(base_default: f64, chance_default: f64) -> Vec<ParamSpec> {
    vec![
        ParamSpec {
            field_name: "base_amount",
            param_type: ParamType::Float,
            default: json!(base_default),
            description: "Base bet amount",
        },
        ParamSpec {
            field_name: "chance",
            param_type: ParamType::Float,
            default: json!(chance_default),
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

fn validate_chance(chance: Decimal) -> Result<(), StrategyError> {
    if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
        return Err(StrategyError::InvalidParam {
            field: "chance".to_string(),
            reason: "must be in (0, 100)".to_string(),
        });
    }
    Ok(())
}

/// Stakes the Kelly-optimal fraction of current balance for the configured
/// chance/payout, capped at `max_fraction` to bound variance.
#[derive(Debug, Clone)]
pub struct KellyCappedStrategy {
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    house_edge_pct: Decimal,
    max_fraction: Decimal,
}

impl Strategy for KellyCappedStrategy {
    fn name(&self) -> &'static str {
        "kelly-capped"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.0, 49.5);
        s.retain(|p| p.field_name != "base_amount");
        s.push(ParamSpec {
            field_name: "max_fraction",
            param_type: ParamType::Float,
            default: json!(0.02),
            description: "Upper bound on the fraction of balance staked per bet",
        });
        s
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        validate_chance(chance)?;
        Ok(Self {
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            house_edge_pct: if get_bool(params, "faucet", false)? { dec!(3.0) } else { dec!(1.0) },
            max_fraction: get_decimal(params, "max_fraction", dec!(0.02))?,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let p = self.chance / dec!(100);
        let mult = payout_multiplier(self.chance, self.house_edge_pct);
        let b = mult - Decimal::ONE;
        let kelly_fraction = if b > Decimal::ZERO {
            ((p * (b + Decimal::ONE)) - Decimal::ONE) / b
        } else {
            Decimal::ZERO
        };
        let fraction = kelly_fraction.max(Decimal::ZERO).min(self.max_fraction);
        let amount = ctx.state.current_balance * fraction;
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}
}

/// Bets a fixed fraction of current balance every round, regardless of
/// outcome, to maximize wagering turnover at a steady, bounded pace.
#[derive(Debug, Clone)]
pub struct MaxWagerFlowStrategy {
    flow_fraction: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
}

impl Strategy for MaxWagerFlowStrategy {
    fn name(&self) -> &'static str {
        "max-wager-flow"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.0, 49.5);
        s.retain(|p| p.field_name != "base_amount");
        s.push(ParamSpec {
            field_name: "flow_fraction",
            param_type: ParamType::Float,
            default: json!(0.01),
            description: "Fraction of current balance wagered every bet",
        });
        s
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        validate_chance(chance)?;
        Ok(Self {
            flow_fraction: get_decimal(params, "flow_fraction", dec!(0.01))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let amount = ctx.state.current_balance * self.flow_fraction;
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}
}

/// RangeDice bets with a randomly positioned ~50%-coverage window each round,
/// using the strategy-private RNG stream so the sequence is independent of
/// the engine's own roll RNG.
#[derive(Debug, Clone)]
pub struct Range50RandomStrategy {
    base_amount: Decimal,
    faucet: bool,
}

impl Strategy for Range50RandomStrategy {
    fn name(&self) -> &'static str {
        "range-50-random"
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
                field_name: "faucet",
                param_type: ParamType::Bool,
                default: json!(false),
                description: "Draw from the faucet balance instead of main",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        Ok(Self {
            base_amount: get_decimal(params, "base_amount", dec!(0.00001))?,
            faucet: get_bool(params, "faucet", false)?,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let lo = ctx.next_rng_u32() % 5000; // leaves room for a 5000-wide window
        let hi = lo + 4999;
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::range_dice(self.base_amount, lo, hi, Side::In, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}
}

/// Flat minimal-variance bets whose sole purpose is to accumulate a roll
/// sample for out-of-band RNG-distribution analysis; betting behaviour
/// itself is deliberately inert.
#[derive(Debug, Clone)]
pub struct RngAnalysisStrategy {
    base_amount: Decimal,
    chance: Decimal,
    samples_seen: u64,
}

impl Strategy for RngAnalysisStrategy {
    fn name(&self) -> &'static str {
        "rng-analysis-strategy"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00000001),
                description: "Flat bet amount used purely to generate rolls",
            },
            ParamSpec {
                field_name: "chance",
                param_type: ParamType::Float,
                default: json!(50.0),
                description: "Win chance percent",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(50.0))?;
        validate_chance(chance)?;
        Ok(Self {
            base_amount: get_decimal(params, "base_amount", dec!(0.00000001))?,
            chance,
            samples_seen: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        Ok(BetSpec::dice(self.base_amount, self.chance, Direction::High, BalanceKind::Main))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {
        self.samples_seen += 1;
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "samples_seen": self.samples_seen }))
    }
}

/// Shrinks the stake after losses and grows it cautiously after wins,
/// using the recent-result window exposed via `ctx.state.last_n` to gauge
/// whether the session is currently "surviving" a downswing.
#[derive(Debug, Clone)]
pub struct AdaptiveSurvivalStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    window: usize,
    current_amount: Decimal,
}

impl Strategy for AdaptiveSurvivalStrategy {
    fn name(&self) -> &'static str {
        "adaptive-survival"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.00001, 49.5);
        s.push(ParamSpec {
            field_name: "window",
            param_type: ParamType::Int,
            default: json!(20),
            description: "Recent-result window used to gauge win rate",
        });
        s
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let base_amount = get_decimal(params, "base_amount", dec!(0.00001))?;
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        validate_chance(chance)?;
        Ok(Self {
            base_amount,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            window: get_u32(params, "window", 20)? as usize,
            current_amount: base_amount,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let recent = ctx.state.last_n(self.window);
        if !recent.is_empty() {
            let wins = recent.iter().filter(|r| r.win).count();
            let win_rate = Decimal::from(wins) / Decimal::from(recent.len());
            let expected = self.chance / dec!(100);
            self.current_amount = if win_rate < expected {
                (self.current_amount * dec!(0.8)).max(self.base_amount * dec!(0.1))
            } else {
                (self.current_amount * dec!(1.05)).min(self.base_amount * dec!(10))
            };
        }
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        let balance_kind = if self.faucet { BalanceKind::Faucet } else { BalanceKind::Main };
        Ok(BetSpec::dice(self.current_amount, self.chance, direction, balance_kind))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount }))
    }
}

/// Increases the stake by a fixed 40% after a loss, resets to `base_amount`
/// on a win — a gentler alternative to `classic-martingale`'s full double.
#[derive(Debug, Clone)]
pub struct SimpleProgression40Strategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    step_pct: Decimal,
    current_amount: Decimal,
}

impl Strategy for SimpleProgression40Strategy {
    fn name(&self) -> &'static str {
        "simple-progression-40"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.00001, 49.5);
        s.push(ParamSpec {
            field_name: "step_pct",
            param_type: ParamType::Float,
            default: json!(0.4),
            description: "Fractional increase applied to the stake after a loss",
        });
        s
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let base_amount = get_decimal(params, "base_amount", dec!(0.00001))?;
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        validate_chance(chance)?;
        Ok(Self {
            base_amount,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            step_pct: get_decimal(params, "step_pct", dec!(0.4))?,
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
            self.current_amount * (Decimal::ONE + self.step_pct)
        };
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::DryRunRng;
    use crate::session::{SessionLimits, SessionState};
    use parking_lot::Mutex;

    #[test]
    fn kelly_capped_never_exceeds_max_fraction() {
        let mut params = Params::new();
        params.insert("max_fraction".to_string(), json!(0.02));
        let mut strat = KellyCappedStrategy::with_params(&params).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let spec = strat.next_bet(&ctx).unwrap();
        assert!(spec.amount <= dec!(1000) * dec!(0.02));
    }

    #[test]
    fn max_wager_flow_scales_with_balance() {
        let mut strat = MaxWagerFlowStrategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let spec = strat.next_bet(&ctx).unwrap();
        assert_eq!(spec.amount, dec!(10)); // 1000 * 0.01
    }

    #[test]
    fn range_50_random_produces_valid_window() {
        let mut strat = Range50RandomStrategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let spec = strat.next_bet(&ctx).unwrap();
        let lo = spec.range_lo.unwrap();
        let hi = spec.range_hi.unwrap();
        assert!(hi <= 9999);
        assert_eq!(hi - lo, 4999);
    }

    #[test]
    fn simple_progression_40_applies_fractional_step() {
        let mut strat = SimpleProgression40Strategy::with_params(&Params::new()).unwrap();
        let limits = SessionLimits::default();
        let rng = Mutex::new(DryRunRng::from_seed(1));
        let state = SessionState::new(dec!(1000));
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);
        let s1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s1.amount, dec!(0.00001));
        strat.on_result(
            &ctx,
            &BetResult {
                win: false,
                roll: 9999,
                profit: -s1.amount,
                new_balance: dec!(1000) - s1.amount,
                simulated: true,
                timestamp_ms: 0,
                api_raw: None,
            },
        );
        let s2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s2.amount, dec!(0.000014));
    }
}
