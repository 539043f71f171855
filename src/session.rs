// =============================================================================
// Session state & limits — the stop-classification predicate
// =============================================================================
//
// `SessionState` tracks the running totals a strategy and the engine loop
// both need (profit, consecutive losses, bet count, elapsed time, a bounded
// history of recent results). `SessionLimits::evaluate` is the pure function
// that turns those totals into a `StopReason`, checked in a fixed precedence
// order every time a bet result lands, before the next bet is requested.
// =============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bet::BetResult;
use crate::types::StopReason;

/// Default number of most-recent `BetResult`s a session keeps for strategy
/// context (e.g. streak detection).
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// Caps that terminate a session. Any field left `None` is not enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLimits {
    pub max_bets: Option<u64>,
    #[serde(with = "duration_ms_opt", default)]
    pub max_duration: Option<Duration>,
    pub max_consecutive_losses: Option<u32>,
    /// Signed, relative to starting balance. Session stops once
    /// `cumulative_profit / starting_balance <= stop_loss_fraction`
    /// (e.g. `-0.5` stops at a 50% drawdown).
    pub stop_loss_fraction: Option<Decimal>,
    /// Positive, relative to starting balance. Session stops once
    /// `cumulative_profit / starting_balance >= take_profit_fraction`.
    pub take_profit_fraction: Option<Decimal>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_bets: None,
            max_duration: None,
            max_consecutive_losses: None,
            stop_loss_fraction: None,
            take_profit_fraction: None,
        }
    }
}

impl SessionLimits {
    /// Check `state` against every configured limit, in precedence order:
    /// MaxBets > MaxDuration > MaxConsecutiveLosses > StopLoss > TakeProfit.
    /// Returns `None` if the session should continue.
    pub fn evaluate(&self, state: &SessionState) -> Option<StopReason> {
        if let Some(max) = self.max_bets {
            if state.bets_placed >= max {
                return Some(StopReason::MaxBets);
            }
        }
        if let Some(max) = self.max_duration {
            if state.elapsed() >= max {
                return Some(StopReason::MaxDuration);
            }
        }
        if let Some(max) = self.max_consecutive_losses {
            if state.consecutive_losses >= max {
                return Some(StopReason::MaxConsecutiveLosses);
            }
        }
        if !state.starting_balance.is_zero() {
            let profit_fraction = state.cumulative_profit / state.starting_balance;
            if let Some(sl) = self.stop_loss_fraction {
                if profit_fraction <= sl {
                    return Some(StopReason::StopLoss);
                }
            }
            if let Some(tp) = self.take_profit_fraction {
                if profit_fraction >= tp {
                    return Some(StopReason::TakeProfit);
                }
            }
        }
        None
    }
}

/// Mutable running state of a single betting session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub bets_placed: u64,
    pub wins: u64,
    pub losses: u64,
    pub cumulative_profit: Decimal,
    pub current_balance: Decimal,
    pub starting_balance: Decimal,
    pub consecutive_losses: u32,
    pub consecutive_wins: u32,
    started_at: Instant,
    history: VecDeque<BetResult>,
    history_capacity: usize,
}

impl SessionState {
    pub fn new(starting_balance: Decimal) -> Self {
        Self::with_history_capacity(starting_balance, default_history_capacity())
    }

    pub fn with_history_capacity(starting_balance: Decimal, history_capacity: usize) -> Self {
        Self {
            bets_placed: 0,
            wins: 0,
            losses: 0,
            cumulative_profit: Decimal::ZERO,
            current_balance: starting_balance,
            starting_balance,
            consecutive_losses: 0,
            consecutive_wins: 0,
            started_at: Instant::now(),
            history: VecDeque::with_capacity(history_capacity.min(1024)),
            history_capacity,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fold a `BetResult` into the running totals and push it into the
    /// bounded history, evicting the oldest entry if at capacity.
    pub fn record(&mut self, result: &BetResult) {
        self.bets_placed += 1;
        self.cumulative_profit += result.profit;
        self.current_balance = result.new_balance;
        if result.win {
            self.wins += 1;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losses += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(result.clone());
    }

    /// Most recent results, oldest first, bounded by `history_capacity`.
    pub fn history(&self) -> &VecDeque<BetResult> {
        &self.history
    }

    /// The last `n` results, most recent last. Fewer than `n` if the
    /// session hasn't placed that many bets yet.
    pub fn last_n(&self, n: usize) -> Vec<&BetResult> {
        let len = self.history.len();
        let skip = len.saturating_sub(n);
        self.history.iter().skip(skip).collect()
    }
}

/// Final summary of a completed session, returned by the engine — never
/// thrown as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub stop_reason: StopReason,
    pub starting_balance: Decimal,
    pub bets_placed: u64,
    pub wins: u64,
    pub losses: u64,
    /// `wins / bets_placed`, or zero if no bets were placed.
    pub win_rate: Decimal,
    pub cumulative_profit: Decimal,
    pub final_balance: Decimal,
    /// `cumulative_profit / starting_balance`, or zero if `starting_balance`
    /// is zero (see DESIGN.md's Open Question decision on this ambiguity).
    pub profit_pct: Decimal,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl SessionReport {
    pub fn from_state(state: &SessionState, stop_reason: StopReason) -> Self {
        let win_rate = if state.bets_placed > 0 {
            Decimal::from(state.wins) / Decimal::from(state.bets_placed)
        } else {
            Decimal::ZERO
        };
        let profit_pct = if !state.starting_balance.is_zero() {
            state.cumulative_profit / state.starting_balance
        } else {
            Decimal::ZERO
        };
        Self {
            stop_reason,
            starting_balance: state.starting_balance,
            bets_placed: state.bets_placed,
            wins: state.wins,
            losses: state.losses,
            win_rate,
            cumulative_profit: state.cumulative_profit,
            final_balance: state.current_balance,
            profit_pct,
            duration: state.elapsed(),
        }
    }
}

/// `serde` helpers for `Duration` fields, stored as whole milliseconds.
mod duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_ms_opt {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|dur| dur.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn result(win: bool, profit: Decimal, balance: Decimal) -> BetResult {
        BetResult {
            win,
            roll: if win { 0 } else { 9999 },
            profit,
            new_balance: balance,
            simulated: true,
            timestamp_ms: 0,
            api_raw: None,
        }
    }

    #[test]
    fn max_bets_takes_precedence_over_everything() {
        let limits = SessionLimits {
            max_bets: Some(1),
            max_consecutive_losses: Some(100),
            ..Default::default()
        };
        let mut state = SessionState::new(dec!(100));
        state.record(&result(false, dec!(-1), dec!(99)));
        assert_eq!(limits.evaluate(&state), Some(StopReason::MaxBets));
    }

    #[test]
    fn consecutive_losses_trips_before_stop_loss_when_both_match_same_tick() {
        let limits = SessionLimits {
            max_consecutive_losses: Some(2),
            stop_loss_fraction: Some(dec!(-0.02)),
            ..Default::default()
        };
        let mut state = SessionState::new(dec!(100));
        state.record(&result(false, dec!(-1), dec!(99)));
        state.record(&result(false, dec!(-1), dec!(98)));
        assert_eq!(
            limits.evaluate(&state),
            Some(StopReason::MaxConsecutiveLosses)
        );
    }

    #[test]
    fn stop_loss_fires_when_cumulative_profit_breaches_negative_threshold() {
        let limits = SessionLimits {
            stop_loss_fraction: Some(dec!(-0.05)),
            ..Default::default()
        };
        let mut state = SessionState::new(dec!(100));
        state.record(&result(false, dec!(-5), dec!(95)));
        assert_eq!(limits.evaluate(&state), Some(StopReason::StopLoss));
    }

    #[test]
    fn take_profit_fires_when_cumulative_profit_meets_threshold() {
        let limits = SessionLimits {
            take_profit_fraction: Some(dec!(0.1)),
            ..Default::default()
        };
        let mut state = SessionState::new(dec!(100));
        state.record(&result(true, dec!(10), dec!(110)));
        assert_eq!(limits.evaluate(&state), Some(StopReason::TakeProfit));
    }

    #[test]
    fn no_limits_configured_never_stops() {
        let limits = SessionLimits::default();
        let mut state = SessionState::new(dec!(100));
        for _ in 0..50 {
            state.record(&result(false, dec!(-1), dec!(99)));
        }
        assert_eq!(limits.evaluate(&state), None);
    }

    #[test]
    fn consecutive_counters_reset_on_opposite_outcome() {
        let mut state = SessionState::new(dec!(100));
        state.record(&result(false, dec!(-1), dec!(99)));
        state.record(&result(false, dec!(-1), dec!(98)));
        assert_eq!(state.consecutive_losses, 2);
        state.record(&result(true, dec!(1), dec!(99)));
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.consecutive_wins, 1);
    }

    #[test]
    fn history_is_bounded_by_capacity() {
        let mut state = SessionState::with_history_capacity(dec!(100), 3);
        for i in 0..5 {
            state.record(&result(true, dec!(1), dec!(100) + Decimal::from(i)));
        }
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.bets_placed, 5);
    }

    #[test]
    fn last_n_returns_most_recent_in_order() {
        let mut state = SessionState::new(dec!(100));
        for i in 0..5u32 {
            let mut r = result(true, dec!(1), dec!(100));
            r.roll = i;
            state.record(&r);
        }
        let last_two: Vec<u32> = state.last_n(2).iter().map(|r| r.roll).collect();
        assert_eq!(last_two, vec![3, 4]);
    }
}
