// =============================================================================
// Parallel engine — worker-pool submission with seq_id-ordered reassembly (§4.5)
// =============================================================================
//
// Decisions (`next_bet` / `validate_and_clamp`) are serialized behind one
// lock, exactly as in the sequential engine, so the bet sequence a strategy
// sees is identical regardless of which engine drives it given the same RNG
// seed. What runs concurrently is the submission itself (the dry-run roll or
// the network round trip), handled by a small worker pool. Because workers
// can finish out of order, completed bets are buffered by `seq_id` and
// applied to the shared session — `state.record`, the sink emission,
// `strategy.on_result` — strictly in the order they were decided, which is
// what makes `parallel(seed, N) == sequential(seed)` hold.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api_client::DiceApiClient;
use crate::bet::{validate_and_clamp, BetResult, BetSpec};
use crate::error::{ApiError, ValidationError};
use crate::rng::DryRunRng;
use crate::session::{SessionLimits, SessionReport, SessionState};
use crate::sink::{BetEvent, BetSink};
use crate::strategy::{Strategy, StrategyContext, StrategyExit};
use crate::types::StopReason;

use super::{call_api, response_to_result, simulate_result, strategy_params_hash, CancellationToken, EngineOptions};

/// State shared between the decision loop and every in-flight submission.
/// One lock covers the strategy, the running totals, and `min_bet` together
/// so a decision and a min-bet update never interleave inconsistently.
struct Shared {
    strategy: Box<dyn Strategy>,
    state: SessionState,
    min_bet: Decimal,
}

struct WorkItem {
    seq_id: u64,
    spec: BetSpec,
    /// Outcome roll pre-drawn by the dispatcher for a dry-run bet, so the
    /// worker that submits it never touches the shared RNG itself. `None`
    /// for live-API bets, which resolve their own outcome over the wire.
    roll: Option<u32>,
}

enum Outcome {
    Resolved {
        result: BetResult,
        min_bet_adjusted: Option<Decimal>,
    },
    Stop(StopReason),
}

struct CompletedItem {
    seq_id: u64,
    spec: BetSpec,
    outcome: Outcome,
}

/// Worker-pool driver. `worker_count` tasks submit bets concurrently;
/// `max_in_flight` bounds how far the decision loop can run ahead of
/// completed submissions.
pub struct ParallelEngine {
    api: Option<Arc<dyn DiceApiClient>>,
    options: EngineOptions,
    sinks: Vec<Arc<dyn BetSink>>,
}

impl ParallelEngine {
    pub fn new(options: EngineOptions, api: Option<Arc<dyn DiceApiClient>>) -> Self {
        Self {
            api,
            options,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn BetSink>) {
        self.sinks.push(sink);
    }

    async fn submit_one(
        api: &Option<Arc<dyn DiceApiClient>>,
        dry_run: bool,
        roll: Option<u32>,
        shared: &Mutex<Shared>,
        spec: &BetSpec,
    ) -> Outcome {
        let current_balance = shared.lock().state.current_balance;
        if dry_run || api.is_none() {
            let roll = roll.expect("dispatcher pre-draws a roll for every dry-run WorkItem");
            return Outcome::Resolved {
                result: simulate_result(spec, current_balance, roll),
                min_bet_adjusted: None,
            };
        }

        let api = api.as_ref().expect("checked above");
        let min_bet = shared.lock().min_bet;
        match call_api(api.as_ref(), spec).await {
            Ok(response) => Outcome::Resolved {
                result: response_to_result(spec, response),
                min_bet_adjusted: None,
            },
            Err(ApiError::MinimumBet(x)) => {
                let new_min_bet = min_bet.max(x);
                let retry_amount = new_min_bet.max(spec.amount);
                if retry_amount > current_balance {
                    return Outcome::Stop(StopReason::InsufficientBalance);
                }
                let mut retry_spec = spec.clone();
                retry_spec.amount = crate::decimal::quantize_amount(retry_amount);
                match call_api(api.as_ref(), &retry_spec).await {
                    Ok(response) => {
                        shared.lock().min_bet = new_min_bet;
                        Outcome::Resolved {
                            result: response_to_result(&retry_spec, response),
                            min_bet_adjusted: Some(new_min_bet),
                        }
                    }
                    Err(_) => Outcome::Stop(StopReason::ApiError { retryable: false }),
                }
            }
            Err(ApiError::InsufficientBalance) => Outcome::Stop(StopReason::InsufficientBalance),
            Err(ApiError::Transient(_)) => {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                match call_api(api.as_ref(), spec).await {
                    Ok(response) => Outcome::Resolved {
                        result: response_to_result(spec, response),
                        min_bet_adjusted: None,
                    },
                    Err(e) => Outcome::Stop(StopReason::ApiError {
                        retryable: e.is_retryable(),
                    }),
                }
            }
            Err(ApiError::Fatal(_)) => Outcome::Stop(StopReason::ApiError { retryable: false }),
        }
    }

    /// Drive one session to completion using `worker_count` concurrent
    /// submitters. Returns the strategy back to the caller alongside the
    /// report, since ownership had to move into the shared, task-spanning
    /// state.
    pub async fn run(
        &self,
        strategy: Box<dyn Strategy>,
        strategy_params_json: &serde_json::Value,
        limits: SessionLimits,
        starting_balance: Decimal,
        initial_min_bet: Decimal,
        cancel: Option<CancellationToken>,
    ) -> (SessionReport, Box<dyn Strategy>) {
        let params_hash = strategy_params_hash(strategy_params_json);
        let strategy_name = strategy.name().to_string();

        let shared = Arc::new(Mutex::new(Shared {
            strategy,
            state: SessionState::new(starting_balance),
            min_bet: initial_min_bet,
        }));
        let rng = Arc::new(Mutex::new(match self.options.rng_seed {
            Some(seed) => DryRunRng::from_seed(seed),
            None => DryRunRng::from_entropy(),
        }));

        if starting_balance <= Decimal::ZERO {
            let mut guard = shared.lock();
            let ctx = StrategyContext::new(&guard.state, &limits, guard.min_bet, &rng);
            guard.strategy.on_session_end(&ctx, &StopReason::InsufficientBalance);
            drop(guard);
            let report = SessionReport::from_state(&shared.lock().state, StopReason::InsufficientBalance);
            let strategy = Arc::try_unwrap(shared)
                .unwrap_or_else(|_| unreachable!("no other Arc holders remain after workers finish"))
                .into_inner()
                .strategy;
            return (report, strategy);
        }

        {
            let mut guard = shared.lock();
            let min_bet = guard.min_bet;
            let ctx = StrategyContext::new(&guard.state, &limits, min_bet, &rng);
            guard.strategy.on_session_start(&ctx);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_reason_slot: Arc<Mutex<Option<StopReason>>> = Arc::new(Mutex::new(None));
        let seq_counter = Arc::new(AtomicU64::new(0));

        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(self.options.max_in_flight.max(1));
        let (done_tx, mut done_rx) = mpsc::channel::<CompletedItem>(self.options.max_in_flight.max(1) * 2);
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        // Dispatcher: serializes decisions and hands validated specs to the
        // worker pool in seq_id order.
        let dispatcher = {
            let shared = shared.clone();
            let rng = rng.clone();
            let limits = limits.clone();
            let stop_flag = stop_flag.clone();
            let stop_reason_slot = stop_reason_slot.clone();
            let seq_counter = seq_counter.clone();
            let sinks = self.sinks.clone();
            let options = self.options.clone();
            let work_tx = work_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    if stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let decision = {
                        let mut guard = shared.lock();
                        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                            Err(StopReason::UserStop)
                        } else if let Some(reason) = limits.evaluate(&guard.state) {
                            Err(reason)
                        } else {
                            let min_bet = guard.min_bet;
                            let balance = guard.state.current_balance;
                            let ctx = StrategyContext::new(&guard.state, &limits, min_bet, &rng);
                            match guard.strategy.next_bet(&ctx) {
                                Ok(spec) => match validate_and_clamp(&spec, min_bet, balance) {
                                    Ok((validated, clamp_outcome)) => {
                                        if clamp_outcome.balance_clamped {
                                            for sink in &sinks {
                                                sink.on_warning(&format!(
                                                    "clamped bet amount {} down to available balance {}",
                                                    spec.amount, balance
                                                ));
                                            }
                                        }
                                        Ok(validated)
                                    }
                                    Err(ValidationError::ExceedsBalance { .. }) => Err(StopReason::InsufficientBalance),
                                    Err(
                                        ValidationError::BelowMin { .. }
                                        | ValidationError::InvalidChance { .. }
                                        | ValidationError::InvalidRange { .. },
                                    ) => Err(StopReason::StrategyExit {
                                        message: "strategy proposed an invalid bet".to_string(),
                                    }),
                                },
                                Err(StrategyExit { message }) => Err(StopReason::StrategyExit { message }),
                            }
                        }
                    };

                    match decision {
                        Ok(validated) => {
                            // Both draws happen here, in the dispatcher, in
                            // the same order the sequential engine draws them
                            // (jitter, then outcome) — workers never touch
                            // the shared RNG, so the roll a given seq_id
                            // resolves to can't race with another bet's draw.
                            let jitter_roll = rng.lock().roll() as u64;
                            let roll = if options.dry_run { Some(rng.lock().roll()) } else { None };
                            let seq_id = seq_counter.fetch_add(1, Ordering::SeqCst);
                            if work_tx.send(WorkItem { seq_id, spec: validated, roll }).await.is_err() {
                                break;
                            }
                            tokio::time::sleep(options.inter_bet_delay(jitter_roll)).await;
                        }
                        Err(reason) => {
                            stop_flag.store(true, Ordering::SeqCst);
                            let mut slot = stop_reason_slot.lock();
                            if slot.is_none() {
                                *slot = Some(reason);
                            }
                            break;
                        }
                    }
                }
            })
        };

        // Worker pool: pulls specs off the shared queue, submits them
        // concurrently, and forwards results for ordered reassembly.
        let mut workers = Vec::with_capacity(self.options.worker_count.max(1));
        for _ in 0..self.options.worker_count.max(1) {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let shared = shared.clone();
            let api = self.api.clone();
            let dry_run = self.options.dry_run;
            workers.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(item) = item else { break };
                    let outcome = Self::submit_one(&api, dry_run, item.roll, &shared, &item.spec).await;
                    if done_tx
                        .send(CompletedItem {
                            seq_id: item.seq_id,
                            spec: item.spec,
                            outcome,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }
        drop(work_tx);
        drop(done_tx);

        // Reorder/apply stage: runs on this task, applying completed bets
        // strictly in seq_id order so strategy callbacks and sink emission
        // see the same sequence the sequential engine would produce.
        let mut pending: BTreeMap<u64, CompletedItem> = BTreeMap::new();
        let mut next_expected: u64 = 0;
        while let Some(item) = done_rx.recv().await {
            pending.insert(item.seq_id, item);
            while let Some(item) = pending.remove(&next_expected) {
                match item.outcome {
                    Outcome::Resolved { result, min_bet_adjusted } => {
                        let mut guard = shared.lock();
                        guard.state.record(&result);
                        if let Some(new_min_bet) = min_bet_adjusted {
                            guard.min_bet = new_min_bet;
                        }
                        let snapshot = guard.strategy.snapshot();
                        let event = BetEvent::new(
                            guard.state.bets_placed,
                            item.seq_id,
                            &self.options.currency,
                            &item.spec,
                            &result,
                            starting_balance,
                            guard.state.cumulative_profit,
                            guard.state.wins,
                            guard.state.losses,
                            guard.state.consecutive_wins,
                            guard.state.consecutive_losses,
                            &strategy_name,
                            &params_hash,
                            snapshot,
                            min_bet_adjusted,
                        );
                        for sink in &self.sinks {
                            sink.on_event(&event);
                        }
                        info!(bet_index = event.bet_index, seq_id = event.seq_id, win = event.win, "bet recorded");
                        let min_bet = guard.min_bet;
                        let ctx = StrategyContext::new(&guard.state, &limits, min_bet, &rng);
                        guard.strategy.on_result(&ctx, &result);
                    }
                    Outcome::Stop(reason) => {
                        stop_flag.store(true, Ordering::SeqCst);
                        let mut slot = stop_reason_slot.lock();
                        if slot.is_none() {
                            *slot = Some(reason);
                        }
                    }
                }
                next_expected += 1;
            }
        }

        dispatcher.abort();
        for w in workers {
            let _ = w.await;
        }

        let final_reason = stop_reason_slot.lock().take().unwrap_or(StopReason::MaxBets);
        let mut guard = shared.lock();
        let min_bet = guard.min_bet;
        let ctx = StrategyContext::new(&guard.state, &limits, min_bet, &rng);
        guard.strategy.on_session_end(&ctx, &final_reason);
        if matches!(final_reason, StopReason::ApiError { .. }) {
            warn!(?final_reason, "session stopped on API error");
        }
        let report = SessionReport::from_state(&guard.state, final_reason);
        drop(guard);

        let strategy = Arc::try_unwrap(shared)
            .unwrap_or_else(|_| unreachable!("no other Arc holders remain after workers finish"))
            .into_inner()
            .strategy;
        (report, strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Registry;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn same_seed_same_strategy_matches_sequential_bet_count_and_profit() {
        let registry = Registry::with_builtins();
        let mut params = crate::strategy::Params::new();
        params.insert("base_amount".to_string(), json!(1.0));
        params.insert("multiplier".to_string(), json!(2.0));
        params.insert("chance".to_string(), json!(49.5));

        let seq_options = EngineOptions {
            dry_run: true,
            rng_seed: Some(7),
            base_delay_ms: 0,
            jitter_ms: 0,
            ..EngineOptions::default()
        };
        let seq_engine = super::super::sequential::SequentialEngine::new(seq_options.clone(), None);
        let mut seq_strategy = registry.build("classic-martingale", &params).unwrap();
        let seq_report = seq_engine
            .run(
                seq_strategy.as_mut(),
                &json!(params),
                SessionLimits { max_bets: Some(20), ..SessionLimits::default() },
                dec!(1000),
                dec!(0.00001),
                None,
            )
            .await;

        let par_options = EngineOptions {
            worker_count: 8,
            max_in_flight: 8,
            ..seq_options
        };
        let par_engine = ParallelEngine::new(par_options, None);
        let par_strategy = registry.build("classic-martingale", &params).unwrap();
        let (par_report, _) = par_engine
            .run(
                par_strategy,
                &json!(params),
                SessionLimits { max_bets: Some(20), ..SessionLimits::default() },
                dec!(1000),
                dec!(0.00001),
                None,
            )
            .await;

        assert_eq!(seq_report.bets_placed, par_report.bets_placed);
        assert_eq!(seq_report.wins, par_report.wins);
        assert_eq!(seq_report.losses, par_report.losses);
        assert_eq!(seq_report.cumulative_profit, par_report.cumulative_profit);
        assert_eq!(seq_report.final_balance, par_report.final_balance);
    }

    #[tokio::test]
    async fn max_bets_limit_is_respected_under_concurrency() {
        let registry = Registry::with_builtins();
        let strategy = registry
            .build("max-wager-flow", &crate::strategy::Params::new())
            .unwrap();
        let options = EngineOptions {
            dry_run: true,
            rng_seed: Some(3),
            base_delay_ms: 0,
            jitter_ms: 0,
            worker_count: 4,
            max_in_flight: 4,
            ..EngineOptions::default()
        };
        let engine = ParallelEngine::new(options, None);
        let (report, _) = engine
            .run(
                strategy,
                &json!({}),
                SessionLimits { max_bets: Some(12), ..SessionLimits::default() },
                dec!(1000),
                dec!(0.00001),
                None,
            )
            .await;
        assert_eq!(report.bets_placed, 12);
        assert_eq!(report.stop_reason, StopReason::MaxBets);
    }
}
