// =============================================================================
// faucet-grind, faucet-cashout
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction};

use super::param_helpers::{get_bool, get_decimal, get_u32};
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

/// Flat minimal-stake grinding on the faucet balance: every bet is the
/// configured `base_amount` at a high win-chance, intended to slowly farm
/// faucet wagering requirements rather than to profit.
#[derive(Debug, Clone)]
pub struct FaucetGrindStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
}

impl Strategy for FaucetGrindStrategy {
    fn name(&self) -> &'static str {
        "faucet-grind"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00000001),
                description: "Flat faucet-balance bet amount",
            },
            ParamSpec {
                field_name: "chance",
                param_type: ParamType::Float,
                default: json!(95.0),
                description: "Win chance percent (high, to minimize variance while grinding)",
            },
            ParamSpec {
                field_name: "is_high",
                param_type: ParamType::Bool,
                default: json!(true),
                description: "Bet on the high half of the roll range",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(95.0))?;
        if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
            return Err(StrategyError::InvalidParam {
                field: "chance".to_string(),
                reason: "must be in (0, 100)".to_string(),
            });
        }
        Ok(Self {
            base_amount: get_decimal(params, "base_amount", dec!(0.00000001))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
        })
    }

    fn next_bet(&mut self, _ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        Ok(BetSpec::dice(self.base_amount, self.chance, direction, BalanceKind::Faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {}
}

/// Grinds the faucet balance like `faucet-grind`, but voluntarily exits
/// once `current_balance` crosses `cashout_threshold` — modelling the
/// "grind then withdraw" faucet play pattern.
#[derive(Debug, Clone)]
pub struct FaucetCashoutStrategy {
    base_amount: Decimal,
    chance: Decimal,
    is_high: bool,
    cashout_threshold: Decimal,
    max_bets_before_cashout: u32,
    bets_so_far: u32,
}

impl Strategy for FaucetCashoutStrategy {
    fn name(&self) -> &'static str {
        "faucet-cashout"
    }

    fn schema() -> ParamSchema {
        vec![
            ParamSpec {
                field_name: "base_amount",
                param_type: ParamType::Float,
                default: json!(0.00000001),
                description: "Flat faucet-balance bet amount",
            },
            ParamSpec {
                field_name: "chance",
                param_type: ParamType::Float,
                default: json!(95.0),
                description: "Win chance percent",
            },
            ParamSpec {
                field_name: "is_high",
                param_type: ParamType::Bool,
                default: json!(true),
                description: "Bet on the high half of the roll range",
            },
            ParamSpec {
                field_name: "cashout_threshold",
                param_type: ParamType::Float,
                default: json!(0.001),
                description: "Faucet balance at which the session exits voluntarily",
            },
            ParamSpec {
                field_name: "max_bets_before_cashout",
                param_type: ParamType::Int,
                default: json!(500),
                description: "Exit after this many bets regardless of balance",
            },
        ]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        let chance = get_decimal(params, "chance", dec!(95.0))?;
        if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
            return Err(StrategyError::InvalidParam {
                field: "chance".to_string(),
                reason: "must be in (0, 100)".to_string(),
            });
        }
        Ok(Self {
            base_amount: get_decimal(params, "base_amount", dec!(0.00000001))?,
            chance,
            is_high: get_bool(params, "is_high", true)?,
            cashout_threshold: get_decimal(params, "cashout_threshold", dec!(0.001))?,
            max_bets_before_cashout: get_u32(params, "max_bets_before_cashout", 500)?,
            bets_so_far: 0,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        if ctx.state.current_balance >= self.cashout_threshold {
            return Err(StrategyExit::new("faucet cashout threshold reached"));
        }
        if self.bets_so_far >= self.max_bets_before_cashout {
            return Err(StrategyExit::new("faucet cashout bet ceiling reached"));
        }
        let direction = if self.is_high { Direction::High } else { Direction::Low };
        Ok(BetSpec::dice(self.base_amount, self.chance, direction, BalanceKind::Faucet))
    }

    fn on_result(&mut self, _ctx: &StrategyContext, _result: &BetResult) {
        self.bets_so_far += 1;
    }
}
