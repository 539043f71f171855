// =============================================================================
// Sequential engine — the deterministic single-threaded driver (§4.4)
// =============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::bet::{validate_and_clamp, BetResult, BetSpec};
use crate::error::{ApiError, ValidationError};
use crate::rng::DryRunRng;
use crate::session::{SessionLimits, SessionReport, SessionState};
use crate::sink::{BetEvent, BetSink};
use crate::strategy::{Strategy, StrategyContext, StrategyExit};
use crate::types::StopReason;

use super::{call_api, response_to_result, simulate_result, strategy_params_hash, CancellationToken, EngineOptions};
use crate::api_client::DiceApiClient;

/// Single-threaded loop enforcing session limits, driving either the
/// dry-run RNG or the real API, and funnelling every bet through the
/// strategy callback in the order it produced them.
pub struct SequentialEngine {
    api: Option<Arc<dyn DiceApiClient>>,
    options: EngineOptions,
    sinks: Vec<Arc<dyn BetSink>>,
}

/// Outcome of one call to `submit`: either a resolved bet (with the
/// min_bet adjustment that fired, if any) or a reason to stop the session.
enum SubmitOutcome {
    Resolved {
        result: BetResult,
        min_bet_adjusted: Option<Decimal>,
        new_min_bet: Decimal,
    },
    Stop(StopReason),
}

impl SequentialEngine {
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

    fn emit(&self, event: &BetEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }

    fn warn_sinks(&self, message: &str) {
        for sink in &self.sinks {
            sink.on_warning(message);
        }
    }

    /// Attempt to submit `spec`, applying the single minimum-bet retry rule
    /// (§4.1/§7): a `MinimumBet(X)` response updates `min_bet` and the spec
    /// is resubmitted once at `amount = max(X, original amount)`, re-checked
    /// against the current balance. A second failure of any kind stops the
    /// session with `ApiError`.
    async fn submit(
        &self,
        spec: &BetSpec,
        min_bet: Decimal,
        current_balance: Decimal,
        rng: &Mutex<DryRunRng>,
    ) -> SubmitOutcome {
        if self.options.dry_run || self.api.is_none() {
            let roll = rng.lock().roll();
            return SubmitOutcome::Resolved {
                result: simulate_result(spec, current_balance, roll),
                min_bet_adjusted: None,
                new_min_bet: min_bet,
            };
        }

        let api = self.api.as_ref().expect("checked above");
        match call_api(api.as_ref(), spec).await {
            Ok(response) => SubmitOutcome::Resolved {
                result: response_to_result(spec, response),
                min_bet_adjusted: None,
                new_min_bet: min_bet,
            },
            Err(ApiError::MinimumBet(x)) => {
                let new_min_bet = min_bet.max(x);
                let retry_amount = new_min_bet.max(spec.amount);
                if retry_amount > current_balance {
                    return SubmitOutcome::Stop(StopReason::InsufficientBalance);
                }
                let mut retry_spec = spec.clone();
                retry_spec.amount = crate::decimal::quantize_amount(retry_amount);
                match call_api(api.as_ref(), &retry_spec).await {
                    Ok(response) => SubmitOutcome::Resolved {
                        result: response_to_result(&retry_spec, response),
                        min_bet_adjusted: Some(new_min_bet),
                        new_min_bet,
                    },
                    Err(_) => SubmitOutcome::Stop(StopReason::ApiError { retryable: false }),
                }
            }
            Err(ApiError::InsufficientBalance) => SubmitOutcome::Stop(StopReason::InsufficientBalance),
            Err(ApiError::Transient(_)) => {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                match call_api(api.as_ref(), spec).await {
                    Ok(response) => SubmitOutcome::Resolved {
                        result: response_to_result(spec, response),
                        min_bet_adjusted: None,
                        new_min_bet: min_bet,
                    },
                    Err(e) => SubmitOutcome::Stop(StopReason::ApiError {
                        retryable: e.is_retryable(),
                    }),
                }
            }
            Err(ApiError::Fatal(_)) => SubmitOutcome::Stop(StopReason::ApiError { retryable: false }),
        }
    }

    /// Drive one session to completion, returning the final report by
    /// value. Never panics on a recoverable condition — every internal
    /// error is normalised into a `StopReason`.
    pub async fn run(
        &self,
        strategy: &mut dyn Strategy,
        strategy_params_json: &serde_json::Value,
        limits: SessionLimits,
        starting_balance: Decimal,
        initial_min_bet: Decimal,
        cancel: Option<CancellationToken>,
    ) -> SessionReport {
        let mut state = SessionState::new(starting_balance);
        let rng = Mutex::new(match self.options.rng_seed {
            Some(seed) => DryRunRng::from_seed(seed),
            None => DryRunRng::from_entropy(),
        });
        let mut min_bet = initial_min_bet;
        let params_hash = strategy_params_hash(strategy_params_json);
        let strategy_name = strategy.name().to_string();

        if starting_balance <= Decimal::ZERO {
            let ctx = StrategyContext::new(&state, &limits, min_bet, &rng);
            strategy.on_session_end(&ctx, &StopReason::InsufficientBalance);
            return SessionReport::from_state(&state, StopReason::InsufficientBalance);
        }

        {
            let ctx = StrategyContext::new(&state, &limits, min_bet, &rng);
            strategy.on_session_start(&ctx);
        }

        let stop_reason = loop {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                break StopReason::UserStop;
            }
            if let Some(reason) = limits.evaluate(&state) {
                break reason;
            }

            let proposal = {
                let ctx = StrategyContext::new(&state, &limits, min_bet, &rng);
                strategy.next_bet(&ctx)
            };
            let spec = match proposal {
                Ok(spec) => spec,
                Err(StrategyExit { message }) => break StopReason::StrategyExit { message },
            };

            let (validated, clamp_outcome) = match validate_and_clamp(&spec, min_bet, state.current_balance) {
                Ok(v) => v,
                Err(ValidationError::ExceedsBalance { .. }) => break StopReason::InsufficientBalance,
                Err(ValidationError::BelowMin { .. } | ValidationError::InvalidChance { .. } | ValidationError::InvalidRange { .. }) => {
                    break StopReason::StrategyExit {
                        message: "strategy proposed an invalid bet".to_string(),
                    }
                }
            };
            if clamp_outcome.balance_clamped {
                self.warn_sinks(&format!(
                    "clamped bet amount {} down to available balance {}",
                    spec.amount, state.current_balance
                ));
            }

            let jitter_roll = rng.lock().roll() as u64;
            tokio::time::sleep(self.options.inter_bet_delay(jitter_roll)).await;

            let outcome = self.submit(&validated, min_bet, state.current_balance, &rng).await;
            let (result, min_bet_adjusted) = match outcome {
                SubmitOutcome::Resolved {
                    result,
                    min_bet_adjusted,
                    new_min_bet,
                } => {
                    min_bet = new_min_bet;
                    (result, min_bet_adjusted)
                }
                SubmitOutcome::Stop(reason) => break reason,
            };

            state.record(&result);
            let snapshot = strategy.snapshot();
            let event = BetEvent::new(
                state.bets_placed,
                state.bets_placed - 1,
                &self.options.currency,
                &validated,
                &result,
                starting_balance,
                state.cumulative_profit,
                state.wins,
                state.losses,
                state.consecutive_wins,
                state.consecutive_losses,
                &strategy_name,
                &params_hash,
                snapshot,
                min_bet_adjusted,
            );
            self.emit(&event);
            info!(bet_index = event.bet_index, win = event.win, "bet recorded");

            let ctx = StrategyContext::new(&state, &limits, min_bet, &rng);
            strategy.on_result(&ctx, &result);
        };

        let ctx = StrategyContext::new(&state, &limits, min_bet, &rng);
        strategy.on_session_end(&ctx, &stop_reason);
        if matches!(stop_reason, StopReason::ApiError { .. }) {
            warn!(?stop_reason, "session stopped on API error");
        }
        SessionReport::from_state(&state, stop_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DEFAULT_HISTORY_CAPACITY;
    use crate::strategy::Registry;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn deterministic_dry_run_martingale_matches_expected_amounts() {
        let registry = Registry::with_builtins();
        let mut params = crate::strategy::Params::new();
        params.insert("base_amount".to_string(), json!(1.0));
        params.insert("multiplier".to_string(), json!(2.0));
        params.insert("chance".to_string(), json!(49.5));
        params.insert("is_high".to_string(), json!(true));
        let mut strategy = registry.build("classic-martingale", &params).unwrap();

        let options = EngineOptions {
            dry_run: true,
            rng_seed: Some(1),
            base_delay_ms: 0,
            jitter_ms: 0,
            ..EngineOptions::default()
        };
        let mut engine = SequentialEngine::new(options, None);
        let limits = SessionLimits {
            max_bets: Some(5),
            ..SessionLimits::default()
        };
        let ring = Arc::new(crate::sink::RingBufferSink::new(DEFAULT_HISTORY_CAPACITY));
        engine.add_sink(ring.clone());

        let report = engine
            .run(strategy.as_mut(), &json!(params), limits, dec!(1000), dec!(0.00001), None)
            .await;

        assert_eq!(report.bets_placed, 5);
        let events = ring.snapshot();
        assert_eq!(events.len(), 5);
        for e in &events {
            assert!(e.amount > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn stop_loss_or_balance_halts_a_losing_martingale_session() {
        // chance is deliberately tiny: losses dominate, so the doubling
        // martingale stake either breaches stop_loss or exhausts the
        // balance within a small, bounded number of bets regardless of
        // the exact roll sequence.
        let registry = Registry::with_builtins();
        let mut params = crate::strategy::Params::new();
        params.insert("base_amount".to_string(), json!(1.0));
        params.insert("multiplier".to_string(), json!(2.0));
        params.insert("chance".to_string(), json!(0.5));
        let mut strategy = registry.build("classic-martingale", &params).unwrap();

        let options = EngineOptions {
            dry_run: true,
            rng_seed: Some(99),
            base_delay_ms: 0,
            jitter_ms: 0,
            ..EngineOptions::default()
        };
        let engine = SequentialEngine::new(options, None);
        let limits = SessionLimits {
            max_bets: Some(1000),
            stop_loss_fraction: Some(dec!(-0.5)),
            take_profit_fraction: Some(dec!(10)),
            ..SessionLimits::default()
        };

        let report = engine
            .run(strategy.as_mut(), &json!(params), limits, dec!(100), dec!(0.00001), None)
            .await;

        assert!(matches!(
            report.stop_reason,
            StopReason::StopLoss | StopReason::InsufficientBalance
        ));
        assert!(report.bets_placed > 0 && report.bets_placed <= 1000);
    }

    #[tokio::test]
    async fn zero_starting_balance_stops_immediately_with_insufficient_balance() {
        let registry = Registry::with_builtins();
        let mut strategy = registry
            .build("classic-martingale", &crate::strategy::Params::new())
            .unwrap();
        let options = EngineOptions {
            dry_run: true,
            rng_seed: Some(1),
            ..EngineOptions::default()
        };
        let engine = SequentialEngine::new(options, None);
        let report = engine
            .run(
                strategy.as_mut(),
                &json!({}),
                SessionLimits::default(),
                Decimal::ZERO,
                dec!(0.00001),
                None,
            )
            .await;
        assert_eq!(report.stop_reason, StopReason::InsufficientBalance);
        assert_eq!(report.bets_placed, 0);
    }

    #[tokio::test]
    async fn target_aware_zero_bet_session_reports_zero_profit_pct() {
        let registry = Registry::with_builtins();
        let mut params = crate::strategy::Params::new();
        params.insert("target_profit".to_string(), json!(0.0));
        let mut strategy = registry.build("target-aware", &params).unwrap();
        let options = EngineOptions {
            dry_run: true,
            rng_seed: Some(1),
            ..EngineOptions::default()
        };
        let engine = SequentialEngine::new(options, None);
        let report = engine
            .run(strategy.as_mut(), &json!(params), SessionLimits::default(), dec!(1000), dec!(0.00001), None)
            .await;
        assert_eq!(report.bets_placed, 0);
        assert_eq!(report.wins, 0);
        assert_eq!(report.losses, 0);
        assert_eq!(report.cumulative_profit, Decimal::ZERO);
        assert_eq!(report.stop_reason, StopReason::StrategyExit { message: "target profit reached".to_string() });
    }
}
