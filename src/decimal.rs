// =============================================================================
// Decimal arithmetic — exact fixed-point amounts and chances
// =============================================================================
//
// The engine never uses f64 for money or probability: every amount and
// chance that crosses a validation boundary or goes over the wire is an
// exact `rust_decimal::Decimal`, quantized to a fixed scale with
// round-half-up before submission.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fractional digits an amount is quantized to before it is sent to the API.
pub const AMOUNT_SCALE: u32 = 8;
/// Fractional digits a chance is quantized to before it is sent to the API.
pub const CHANCE_SCALE: u32 = 2;

/// House edge percentage deducted from the fair payout, by balance kind.
pub const HOUSE_EDGE_MAIN_PCT: Decimal = dec!(1.0);
pub const HOUSE_EDGE_FAUCET_PCT: Decimal = dec!(3.0);

/// Quantize `value` to `scale` fractional digits using round-half-up.
pub fn quantize(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantize an amount to the wire scale (8 fractional digits).
pub fn quantize_amount(value: Decimal) -> Decimal {
    quantize(value, AMOUNT_SCALE)
}

/// Quantize a chance to the wire scale (2 fractional digits).
pub fn quantize_chance(value: Decimal) -> Decimal {
    quantize(value, CHANCE_SCALE)
}

/// Payout multiplier for a given chance and house edge:
/// `(100 - house_edge_percent) / chance`.
///
/// This is the same rule for both Dice (chance = win-probability percent)
/// and RangeDice (chance = coverage percent of the `[lo, hi]` window).
pub fn payout_multiplier(chance: Decimal, house_edge_pct: Decimal) -> Decimal {
    (dec!(100) - house_edge_pct) / chance
}

/// Compute the gross payout (stake included) for a winning bet.
pub fn payout_amount(amount: Decimal, chance: Decimal, house_edge_pct: Decimal) -> Decimal {
    quantize_amount(amount * payout_multiplier(chance, house_edge_pct))
}

/// Convert a `Decimal` to `f64` for display/metrics purposes only — never
/// use this for a value that feeds back into arithmetic or validation.
pub fn to_f64_lossy(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_amount_rounds_half_up_at_eight_digits() {
        let v = Decimal::new(123456789, 9); // 0.123456789
        let q = quantize_amount(v);
        assert_eq!(q, Decimal::new(12345679, 8)); // 0.12345679 (rounds up)
        assert_eq!(q.scale(), 8);
    }

    #[test]
    fn quantize_chance_rounds_to_two_digits() {
        let v = dec!(49.555);
        let q = quantize_chance(v);
        assert_eq!(q, dec!(49.56));
    }

    #[test]
    fn payout_multiplier_matches_main_balance_edge() {
        // 49.5% chance, 1% house edge -> 99/49.5 = 2.0
        let mult = payout_multiplier(dec!(49.5), HOUSE_EDGE_MAIN_PCT);
        assert_eq!(mult, dec!(2.0));
    }

    #[test]
    fn payout_multiplier_matches_faucet_balance_edge() {
        // 50% chance, 3% house edge -> 97/50 = 1.94
        let mult = payout_multiplier(dec!(50), HOUSE_EDGE_FAUCET_PCT);
        assert_eq!(mult, dec!(1.94));
    }

    #[test]
    fn payout_amount_quantizes_to_eight_digits() {
        let amt = payout_amount(dec!(1), dec!(49.5), HOUSE_EDGE_MAIN_PCT);
        assert_eq!(amt, dec!(2.00000000));
    }
}
