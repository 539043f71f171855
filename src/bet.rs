// =============================================================================
// BetSpec / BetResult — value types flowing between strategy, validator, API
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decimal::{quantize_amount, quantize_chance};
use crate::error::ValidationError;
use crate::types::{BalanceKind, Direction, Game, Side};

/// A strategy's request to place one bet, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetSpec {
    pub game: Game,
    pub amount: Decimal,
    /// Dice only.
    pub chance: Option<Decimal>,
    /// Dice only.
    pub direction: Option<Direction>,
    /// RangeDice only.
    pub range_lo: Option<u32>,
    /// RangeDice only.
    pub range_hi: Option<u32>,
    /// RangeDice only.
    pub side: Option<Side>,
    pub balance_kind: BalanceKind,
    /// Opaque wagering-bonus / TLE tokens passed through to the API verbatim.
    #[serde(default)]
    pub bonus: Option<Value>,
}

impl BetSpec {
    /// Build a plain Dice bet spec.
    pub fn dice(
        amount: Decimal,
        chance: Decimal,
        direction: Direction,
        balance_kind: BalanceKind,
    ) -> Self {
        Self {
            game: Game::Dice,
            amount,
            chance: Some(chance),
            direction: Some(direction),
            range_lo: None,
            range_hi: None,
            side: None,
            balance_kind,
            bonus: None,
        }
    }

    /// Build a RangeDice bet spec. `chance` is the coverage percentage of
    /// `[range_lo, range_hi]` out of the 10000 possible rolls.
    pub fn range_dice(
        amount: Decimal,
        range_lo: u32,
        range_hi: u32,
        side: Side,
        balance_kind: BalanceKind,
    ) -> Self {
        let coverage = (range_hi - range_lo + 1) as i64;
        let chance = Decimal::from(coverage) / Decimal::from(100);
        Self {
            game: Game::RangeDice,
            amount,
            chance: Some(chance),
            direction: None,
            range_lo: Some(range_lo),
            range_hi: Some(range_hi),
            side: Some(side),
            balance_kind,
            bonus: None,
        }
    }

    /// Quantize `amount` (8 dp) and `chance` (2 dp) the way the engine does
    /// immediately before submission.
    pub fn quantized(&self) -> Self {
        let mut spec = self.clone();
        spec.amount = quantize_amount(spec.amount);
        if let Some(c) = spec.chance {
            spec.chance = Some(quantize_chance(c));
        }
        spec
    }

    /// Pure shape checks: `0 < chance < 100` for Dice, `0 <= lo <= hi <= 9999`
    /// for RangeDice. Balance/min-bet checks live in `crate::session`, which
    /// has access to the running `min_bet` and `current_balance`.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        match self.game {
            Game::Dice => {
                let chance = self.chance.unwrap_or_default();
                if chance <= Decimal::ZERO || chance >= Decimal::from(100) {
                    return Err(ValidationError::InvalidChance { chance });
                }
            }
            Game::RangeDice => {
                let lo = self.range_lo.unwrap_or(0);
                let hi = self.range_hi.unwrap_or(0);
                if lo > hi || hi > 9999 {
                    return Err(ValidationError::InvalidRange { lo, hi });
                }
            }
        }
        Ok(())
    }
}

/// Outcome of `validate_and_clamp`'s balance check: whether the requested
/// amount had to be reduced to fit the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampOutcome {
    pub balance_clamped: bool,
}

/// The ordered pre-submission checks (§4.1), applied immediately before a
/// spec reaches the API or the dry-run RNG:
///
/// 1. `amount >= min_bet` on the raw, unclamped amount (`BelowMin` if not).
/// 2. `amount <= current_balance`; if not, clamp to `current_balance` and
///    report the clamp so the caller can emit a warning event. If the
///    clamped amount is still below `min_bet`, the balance itself is
///    insufficient (`ExceedsBalance`).
/// 3. Shape validity (`0 < chance < 100`, or `0 <= lo <= hi <= 9999`).
///
/// Returns the quantized, possibly-clamped spec ready for submission.
pub fn validate_and_clamp(
    spec: &BetSpec,
    min_bet: Decimal,
    current_balance: Decimal,
) -> Result<(BetSpec, ClampOutcome), ValidationError> {
    if spec.amount < min_bet {
        return Err(ValidationError::BelowMin {
            amount: spec.amount,
            min_bet,
        });
    }

    let mut amount = spec.amount;
    let mut balance_clamped = false;
    if amount > current_balance {
        amount = current_balance;
        balance_clamped = true;
    }

    if amount < min_bet {
        return Err(ValidationError::ExceedsBalance {
            amount: spec.amount,
            balance: current_balance,
        });
    }

    spec.validate_shape()?;

    let mut clamped = spec.clone();
    clamped.amount = amount;
    Ok((clamped.quantized(), ClampOutcome { balance_clamped }))
}

/// The outcome of one bet, from the API or the dry-run RNG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetResult {
    pub win: bool,
    pub roll: u32,
    pub profit: Decimal,
    pub new_balance: Decimal,
    pub simulated: bool,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub api_raw: Option<Value>,
}

/// Determine whether `roll` wins a Dice bet of the given `chance`/`direction`.
///
/// `threshold(chance)` splits `[0, 9999]` so that exactly `chance` percent of
/// rolls are winning: for High, the top `chance%` of the range wins; for Low,
/// the bottom `chance%` wins.
pub fn dice_wins(roll: u32, chance: Decimal, direction: Direction) -> bool {
    let winning_count = (chance * Decimal::from(100)).round().mantissa() as i64; // chance% of 10000
    let winning_count = winning_count.clamp(0, 10000) as u32;
    match direction {
        Direction::Low => roll < winning_count,
        Direction::High => roll >= 10000 - winning_count,
    }
}

/// Determine whether `roll` wins a RangeDice bet.
pub fn range_dice_wins(roll: u32, lo: u32, hi: u32, side: Side) -> bool {
    let inside = roll >= lo && roll <= hi;
    match side {
        Side::In => inside,
        Side::Out => !inside,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn dice_wins_high_uses_top_of_range() {
        // 49.5% chance, High: winning region is roll in [5050, 9999] (4950 numbers)
        assert!(dice_wins(9999, dec!(49.5), Direction::High));
        assert!(dice_wins(5050, dec!(49.5), Direction::High));
        assert!(!dice_wins(5049, dec!(49.5), Direction::High));
    }

    #[test]
    fn dice_wins_low_uses_bottom_of_range() {
        assert!(dice_wins(0, dec!(49.5), Direction::Low));
        assert!(dice_wins(4949, dec!(49.5), Direction::Low));
        assert!(!dice_wins(4950, dec!(49.5), Direction::Low));
    }

    #[test]
    fn range_dice_in_and_out_are_complementary() {
        assert!(range_dice_wins(5000, 1000, 6000, Side::In));
        assert!(!range_dice_wins(5000, 1000, 6000, Side::Out));
        assert!(range_dice_wins(7000, 1000, 6000, Side::Out));
    }

    #[test]
    fn validate_shape_rejects_out_of_bounds_chance() {
        let spec = BetSpec::dice(dec!(1), dec!(0), Direction::High, BalanceKind::Main);
        assert!(spec.validate_shape().is_err());
        let spec = BetSpec::dice(dec!(1), dec!(100), Direction::High, BalanceKind::Main);
        assert!(spec.validate_shape().is_err());
        let spec = BetSpec::dice(dec!(1), dec!(49.5), Direction::High, BalanceKind::Main);
        assert!(spec.validate_shape().is_ok());
    }

    #[test]
    fn validate_shape_rejects_inverted_range() {
        let spec = BetSpec::range_dice(dec!(1), 100, 50, Side::In, BalanceKind::Main);
        assert!(spec.validate_shape().is_err());
    }

    #[test]
    fn quantized_rounds_amount_and_chance() {
        let spec = BetSpec::dice(dec!(0.123456789), dec!(49.555), Direction::High, BalanceKind::Main);
        let q = spec.quantized();
        assert_eq!(q.amount.scale(), 8);
        assert_eq!(q.chance.unwrap().scale(), 2);
    }

    #[test]
    fn validate_and_clamp_passes_through_a_valid_spec() {
        let spec = BetSpec::dice(dec!(1), dec!(49.5), Direction::High, BalanceKind::Main);
        let (clamped, outcome) = validate_and_clamp(&spec, dec!(0.00001), dec!(1000)).unwrap();
        assert_eq!(clamped.amount, dec!(1));
        assert!(!outcome.balance_clamped);
    }

    #[test]
    fn validate_and_clamp_clamps_to_balance_and_reports_it() {
        let spec = BetSpec::dice(dec!(50), dec!(49.5), Direction::High, BalanceKind::Main);
        let (clamped, outcome) = validate_and_clamp(&spec, dec!(0.00001), dec!(10)).unwrap();
        assert_eq!(clamped.amount, dec!(10));
        assert!(outcome.balance_clamped);
    }

    #[test]
    fn validate_and_clamp_reports_exceeds_balance_when_clamp_still_below_min_bet() {
        let spec = BetSpec::dice(dec!(50), dec!(49.5), Direction::High, BalanceKind::Main);
        let err = validate_and_clamp(&spec, dec!(1), dec!(0.5)).unwrap_err();
        assert!(matches!(err, ValidationError::ExceedsBalance { .. }));
    }

    #[test]
    fn validate_and_clamp_reports_below_min_when_strategy_proposed_too_little() {
        let spec = BetSpec::dice(dec!(0.0000001), dec!(49.5), Direction::High, BalanceKind::Main);
        let err = validate_and_clamp(&spec, dec!(0.00001), dec!(1000)).unwrap_err();
        assert!(matches!(err, ValidationError::BelowMin { .. }));
    }

    #[test]
    fn validate_and_clamp_checks_min_bet_and_balance_before_shape() {
        let spec = BetSpec::dice(dec!(1), dec!(0), Direction::High, BalanceKind::Main);
        let err = validate_and_clamp(&spec, dec!(0.00001), dec!(1000)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidChance { .. }));

        // Below min_bet is reported even though the shape is also invalid,
        // since the min_bet check runs first.
        let spec = BetSpec::dice(dec!(0.0000001), dec!(0), Direction::High, BalanceKind::Main);
        let err = validate_and_clamp(&spec, dec!(0.00001), dec!(1000)).unwrap_err();
        assert!(matches!(err, ValidationError::BelowMin { .. }));
    }
}
