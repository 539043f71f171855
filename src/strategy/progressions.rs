// =============================================================================
// dalembert, fibonacci, paroli, labouchere, oscars-grind, one-three-two-six,
// fib-loss-cluster
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction};

use super::param_helpers::{get_bool, get_decimal, get_u32};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

fn dice_schema(base_default: f64) -> Vec<ParamSpec> {
    vec![
        ParamSpec {
            field_name: "base_amount",
            param_type: ParamType::Float,
            default: json!(base_default),
            description: "Unit bet amount",
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

fn dice_spec(amount: Decimal, chance: Decimal, is_high: bool, faucet: bool) -> BetSpec {
    let direction = if is_high { Direction::High } else { Direction::Low };
    let balance_kind = if faucet { BalanceKind::Faucet } else { BalanceKind::Main };
    BetSpec::dice(amount, chance, direction, balance_kind)
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

/// Increase the bet by one unit after a loss, decrease by one unit after a
/// win, floored at `base_amount`.
#[derive(Debug, Clone)]
pub struct DAlembertStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    current_amount: Decimal,
}

impl Strategy for DAlembertStrategy {
    fn name(&self) -> &'static str {
        "dalembert"
    }

    fn schema() -> ParamSchema {
        dice_schema(0.00001)
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
            current_amount: base_amount,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        Ok(dice_spec(self.current_amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        self.current_amount = if result.win {
            (self.current_amount - self.base_amount).max(self.base_amount)
        } else {
            self.current_amount + self.base_amount
        };
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount }))
    }
}

/// Classic Fibonacci progression: step forward on loss, step back two on win.
#[derive(Debug, Clone)]
pub struct FibonacciStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    sequence: Vec<u64>,
    index: usize,
}

fn fib_sequence(len: usize) -> Vec<u64> {
    let mut seq = vec![1u64, 1u64];
    while seq.len() < len {
        let next = seq[seq.len() - 1] + seq[seq.len() - 2];
        seq.push(next);
    }
    seq
}

impl Strategy for FibonacciStrategy {
    fn name(&self) -> &'static str {
        "fibonacci"
    }

    fn schema() -> ParamSchema {
        dice_schema(0.00001)
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
            sequence: fib_sequence(64),
            index: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        if self.index >= self.sequence.len() {
            self.sequence = fib_sequence(self.sequence.len() * 2);
        }
        let amount = self.base_amount * Decimal::from(self.sequence[self.index]);
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            self.index = self.index.saturating_sub(2);
        } else {
            self.index += 1;
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "index": self.index }))
    }
}

/// Reverse martingale with a step cap: doubles on win, resets after
/// `max_steps` consecutive wins or on any loss.
#[derive(Debug, Clone)]
pub struct ParoliStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    max_steps: u32,
    current_amount: Decimal,
    step: u32,
}

impl Strategy for ParoliStrategy {
    fn name(&self) -> &'static str {
        "paroli"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.00001);
        s.push(ParamSpec {
            field_name: "max_steps",
            param_type: ParamType::Int,
            default: json!(3),
            description: "Consecutive wins before resetting to base",
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
            max_steps: get_u32(params, "max_steps", 3)?,
            current_amount: base_amount,
            step: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        Ok(dice_spec(self.current_amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            self.step += 1;
            if self.max_steps > 0 && self.step >= self.max_steps {
                self.current_amount = self.base_amount;
                self.step = 0;
            } else {
                self.current_amount *= dec!(2);
            }
        } else {
            self.current_amount = self.base_amount;
            self.step = 0;
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount, "step": self.step }))
    }
}

/// Cancellation system: a sequence of units; bet = first + last (or the
/// single remaining entry). Win cancels both ends; loss appends the bet as
/// a new entry at the end. Exits with `Completed` once the sequence empties.
#[derive(Debug, Clone)]
pub struct LabouchereStrategy {
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    unit: Decimal,
    sequence: Vec<Decimal>,
}

impl Strategy for LabouchereStrategy {
    fn name(&self) -> &'static str {
        "labouchere"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.00001);
        s[0].field_name = "unit";
        s[0].description = "Unit size used to seed the starting sequence [1,2,3]";
        s
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let unit = get_decimal(params, "unit", dec!(0.00001))?;
        let chance = get_decimal(params, "chance", dec!(49.5))?;
        validate_chance(chance)?;
        Ok(Self {
            chance,
            is_high: get_bool(params, "is_high", true)?,
            faucet: get_bool(params, "faucet", false)?,
            unit,
            sequence: vec![unit, unit * dec!(2), unit * dec!(3)],
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        if self.sequence.is_empty() {
            return Err(StrategyExit::new("labouchere sequence exhausted"));
        }
        let amount = if self.sequence.len() == 1 {
            self.sequence[0]
        } else {
            self.sequence[0] + self.sequence[self.sequence.len() - 1]
        };
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            if self.sequence.len() <= 1 {
                self.sequence.clear();
            } else {
                self.sequence.remove(0);
                self.sequence.pop();
            }
        } else {
            let amount = if self.sequence.len() == 1 {
                self.sequence[0]
            } else {
                self.sequence[0] + self.sequence[self.sequence.len() - 1]
            };
            self.sequence.push(amount);
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "sequence_len": self.sequence.len() }))
    }
}

/// Oscar's Grind: stake stays flat after a loss, increases by one unit after
/// a win, resets to one unit once the session-to-date profit reaches one unit.
#[derive(Debug, Clone)]
pub struct OscarsGrindStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    current_amount: Decimal,
    cycle_profit: Decimal,
}

impl Strategy for OscarsGrindStrategy {
    fn name(&self) -> &'static str {
        "oscars-grind"
    }

    fn schema() -> ParamSchema {
        dice_schema(0.00001)
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
            current_amount: base_amount,
            cycle_profit: Decimal::ZERO,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        Ok(dice_spec(self.current_amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        self.cycle_profit += result.profit;
        if self.cycle_profit >= self.base_amount {
            self.current_amount = self.base_amount;
            self.cycle_profit = Decimal::ZERO;
        } else if result.win {
            self.current_amount += self.base_amount;
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "current_amount": self.current_amount, "cycle_profit": self.cycle_profit }))
    }
}

/// 1-3-2-6 progression: bet multiples of base over a 4-step win cycle; any
/// loss resets to step 0.
#[derive(Debug, Clone)]
pub struct OneThreeTwoSixStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    step: usize,
}

const ONE_THREE_TWO_SIX_UNITS: [u32; 4] = [1, 3, 2, 6];

impl Strategy for OneThreeTwoSixStrategy {
    fn name(&self) -> &'static str {
        "one-three-two-six"
    }

    fn schema() -> ParamSchema {
        dice_schema(0.00001)
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
            step: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let units = ONE_THREE_TWO_SIX_UNITS[self.step % 4];
        let amount = self.base_amount * Decimal::from(units);
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            self.step = (self.step + 1) % 4;
        } else {
            self.step = 0;
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "step": self.step }))
    }
}

/// Fibonacci progression that resets to the start of the sequence after a
/// cluster of `cluster_size` consecutive losses rather than stepping forever.
#[derive(Debug, Clone)]
pub struct FibLossClusterStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    faucet: bool,
    cluster_size: u32,
    sequence: Vec<u64>,
    index: usize,
    consecutive_losses: u32,
}

impl Strategy for FibLossClusterStrategy {
    fn name(&self) -> &'static str {
        "fib-loss-cluster"
    }

    fn schema() -> ParamSchema {
        let mut s = dice_schema(0.00001);
        s.push(ParamSpec {
            field_name: "cluster_size",
            param_type: ParamType::Int,
            default: json!(5),
            description: "Consecutive losses before the sequence resets to the start",
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
            cluster_size: get_u32(params, "cluster_size", 5)?,
            sequence: fib_sequence(64),
            index: 0,
            consecutive_losses: 0,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        if self.index >= self.sequence.len() {
            self.sequence = fib_sequence(self.sequence.len() * 2);
        }
        let amount = self.base_amount * Decimal::from(self.sequence[self.index]);
        Ok(dice_spec(amount, self.chance, self.is_high, self.faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        if result.win {
            self.consecutive_losses = 0;
            self.index = self.index.saturating_sub(2);
        } else {
            self.consecutive_losses += 1;
            if self.cluster_size > 0 && self.consecutive_losses >= self.cluster_size {
                self.index = 0;
                self.consecutive_losses = 0;
            } else {
                self.index += 1;
            }
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(json!({ "index": self.index, "consecutive_losses": self.consecutive_losses }))
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
    fn dalembert_steps_up_and_down_by_one_unit() {
        let mut strat = DAlembertStrategy::with_params(&Params::new()).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        let s1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s1.amount, dec!(0.00001));
        strat.on_result(&ctx, &result(false, s1.amount));
        let s2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s2.amount, dec!(0.00002));
        strat.on_result(&ctx, &result(true, s2.amount));
        let s3 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s3.amount, dec!(0.00001));
    }

    #[test]
    fn fibonacci_advances_on_loss_retreats_two_on_win() {
        let mut strat = FibonacciStrategy::with_params(&Params::new()).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        let s1 = strat.next_bet(&ctx).unwrap(); // fib[0] = 1
        assert_eq!(s1.amount, dec!(0.00001));
        strat.on_result(&ctx, &result(false, s1.amount));
        let s2 = strat.next_bet(&ctx).unwrap(); // fib[1] = 1
        assert_eq!(s2.amount, dec!(0.00001));
        strat.on_result(&ctx, &result(false, s2.amount));
        let s3 = strat.next_bet(&ctx).unwrap(); // fib[2] = 2
        assert_eq!(s3.amount, dec!(0.00002));
    }

    #[test]
    fn labouchere_completes_when_sequence_empties() {
        let mut params = Params::new();
        params.insert("unit".to_string(), json!(1.0));
        let mut strat = LabouchereStrategy::with_params(&params).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        // sequence starts [1, 2, 3]; bet = 1 + 3 = 4
        let s1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s1.amount, dec!(4));
        strat.on_result(&ctx, &result(true, s1.amount));
        // sequence now [2]; bet = 2
        let s2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s2.amount, dec!(2));
        strat.on_result(&ctx, &result(true, s2.amount));
        // sequence empty -> exit
        assert!(strat.next_bet(&ctx).is_err());
    }

    #[test]
    fn one_three_two_six_resets_on_loss() {
        let mut strat = OneThreeTwoSixStrategy::with_params(&Params::new()).unwrap();
        let (state, limits, rng) = ctx_fixture();
        let ctx = StrategyContext::new(&state, &limits, dec!(0.00001), &rng);

        let s1 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s1.amount, dec!(0.00001));
        strat.on_result(&ctx, &result(true, s1.amount));
        let s2 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s2.amount, dec!(0.00003));
        strat.on_result(&ctx, &result(false, s2.amount));
        let s3 = strat.next_bet(&ctx).unwrap();
        assert_eq!(s3.amount, dec!(0.00001));
    }
}
