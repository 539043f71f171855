// =============================================================================
// Bet event model & sink interface
// =============================================================================
//
// Sinks are pure observers. The engine calls every registered sink
// synchronously, in submission order, while holding the strategy lock; a
// sink must not call back into the engine and must not throw — any error is
// caught, logged, and does not affect the session.
// =============================================================================

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex as StdMutex;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::bet::{BetResult, BetSpec};
use crate::types::{BalanceKind, Direction, Game, Side};

/// One completed bet, structured for both in-process sinks and the
/// append-only persisted-row schema (§6): bet index, seq_id, timestamp,
/// currency, game, amount, chance/range, direction/side, balance_kind,
/// roll, win, profit, new_balance, starting_balance, cumulative_profit,
/// wins, losses, win_streak, loss_streak, strategy_name,
/// strategy_params_hash, strategy_snapshot_json, simulated_flag,
/// min_bet_adjusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetEvent {
    pub bet_index: u64,
    pub seq_id: u64,
    pub timestamp_ms: u64,
    pub currency: String,
    pub game: Game,
    pub amount: Decimal,
    pub chance: Option<Decimal>,
    pub range_lo: Option<u32>,
    pub range_hi: Option<u32>,
    pub direction: Option<Direction>,
    pub side: Option<Side>,
    pub balance_kind: BalanceKind,
    pub roll: u32,
    pub win: bool,
    pub profit: Decimal,
    pub new_balance: Decimal,
    pub starting_balance: Decimal,
    pub cumulative_profit: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub current_win_streak: u32,
    pub current_loss_streak: u32,
    pub strategy_name: String,
    pub strategy_params_hash: String,
    pub strategy_snapshot: Option<JsonValue>,
    pub simulated: bool,
    pub min_bet_adjusted: Option<Decimal>,
}

impl BetEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bet_index: u64,
        seq_id: u64,
        currency: &str,
        spec: &BetSpec,
        result: &BetResult,
        starting_balance: Decimal,
        cumulative_profit: Decimal,
        wins: u64,
        losses: u64,
        current_win_streak: u32,
        current_loss_streak: u32,
        strategy_name: &str,
        strategy_params_hash: &str,
        strategy_snapshot: Option<JsonValue>,
        min_bet_adjusted: Option<Decimal>,
    ) -> Self {
        Self {
            bet_index,
            seq_id,
            timestamp_ms: result.timestamp_ms,
            currency: currency.to_string(),
            game: spec.game,
            amount: spec.amount,
            chance: spec.chance,
            range_lo: spec.range_lo,
            range_hi: spec.range_hi,
            direction: spec.direction,
            side: spec.side,
            balance_kind: spec.balance_kind,
            roll: result.roll,
            win: result.win,
            profit: result.profit,
            new_balance: result.new_balance,
            starting_balance,
            cumulative_profit,
            wins,
            losses,
            current_win_streak,
            current_loss_streak,
            strategy_name: strategy_name.to_string(),
            strategy_params_hash: strategy_params_hash.to_string(),
            strategy_snapshot,
            simulated: result.simulated,
            min_bet_adjusted,
        }
    }
}

/// Receives bet/session events. Implementations must return quickly and
/// must never call back into the engine.
pub trait BetSink: Send + Sync {
    fn on_event(&self, event: &BetEvent);

    /// Optional warning event, e.g. the balance-clamp warning in §4.1.
    fn on_warning(&self, _message: &str) {}
}

/// Logs every event at `info` level via `tracing`, and warnings at `warn`.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl BetSink for LoggingSink {
    fn on_event(&self, event: &BetEvent) {
        tracing::info!(
            bet_index = event.bet_index,
            seq_id = event.seq_id,
            win = event.win,
            profit = %event.profit,
            new_balance = %event.new_balance,
            "bet resolved"
        );
    }

    fn on_warning(&self, message: &str) {
        tracing::warn!(message, "sink warning");
    }
}

/// Appends each event as one JSON line to a file. Schema is append-only:
/// readers must tolerate new trailing columns, so this never rewrites
/// previously written lines.
pub struct JsonlSink {
    file: StdMutex<std::fs::File>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: StdMutex::new(file),
        })
    }
}

impl BetSink for JsonlSink {
    fn on_event(&self, event: &BetEvent) {
        let line = match serde_json::to_string(event) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize bet event");
                return;
            }
        };
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "jsonl sink mutex poisoned");
                return;
            }
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::error!(error = %e, "failed to write bet event");
        }
    }
}

/// Keeps the last `capacity` events in memory, for dashboards or tests that
/// want to inspect recent history without re-reading a log file.
pub struct RingBufferSink {
    buffer: StdMutex<VecDeque<BetEvent>>,
    capacity: usize,
}

impl RingBufferSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: StdMutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    pub fn snapshot(&self) -> Vec<BetEvent> {
        self.buffer.lock().expect("ring buffer mutex poisoned").iter().cloned().collect()
    }
}

impl BetSink for RingBufferSink {
    fn on_event(&self, event: &BetEvent) {
        let mut buf = match self.buffer.lock() {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "ring buffer sink mutex poisoned");
                return;
            }
        };
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_event(bet_index: u64) -> BetEvent {
        let spec = BetSpec::dice(dec!(1), dec!(49.5), Direction::High, BalanceKind::Main);
        let result = BetResult {
            win: true,
            roll: 9000,
            profit: dec!(1),
            new_balance: dec!(1001),
            simulated: true,
            timestamp_ms: 123,
            api_raw: None,
        };
        BetEvent::new(
            bet_index,
            bet_index - 1,
            "btc",
            &spec,
            &result,
            dec!(1000),
            dec!(1),
            1,
            0,
            1,
            0,
            "classic-martingale",
            "deadbeef",
            None,
            None,
        )
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let sink = RingBufferSink::new(2);
        sink.on_event(&sample_event(1));
        sink.on_event(&sample_event(2));
        sink.on_event(&sample_event(3));
        let snap = sink.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].bet_index, 2);
        assert_eq!(snap[1].bet_index, 3);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("duckrun-test-{}.jsonl", std::process::id()));
        let sink = JsonlSink::open(&path).unwrap();
        sink.on_event(&sample_event(1));
        sink.on_event(&sample_event(2));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
