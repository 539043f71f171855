// =============================================================================
// Strategy trait, context, parameter schema, and the name → constructor registry
// =============================================================================

mod custom_script;
mod faucet;
mod martingale;
mod misc;
mod progressions;
mod streak;
mod target;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::bet::BetSpec;
use crate::error::StrategyError;
use crate::rng::DryRunRng;
use crate::session::{SessionLimits, SessionState};

pub use custom_script::CustomScriptStrategy;
pub use faucet::{FaucetCashoutStrategy, FaucetGrindStrategy};
pub use martingale::{AntiMartingaleStreakStrategy, ClassicMartingaleStrategy};
pub use misc::{
    AdaptiveSurvivalStrategy, KellyCappedStrategy, MaxWagerFlowStrategy, Range50RandomStrategy,
    RngAnalysisStrategy, SimpleProgression40Strategy,
};
pub use progressions::{
    DAlembertStrategy, FibLossClusterStrategy, FibonacciStrategy, LabouchereStrategy,
    OneThreeTwoSixStrategy, OscarsGrindStrategy, ParoliStrategy,
};
pub use streak::{StreakHunterStrategy, StreakMultiplierStrategy};
pub use target::TargetAwareStrategy;

/// A single primitive type a strategy parameter can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
}

/// One entry in a strategy's declared parameter schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub field_name: &'static str,
    pub param_type: ParamType,
    pub default: JsonValue,
    pub description: &'static str,
}

/// The full parameter schema for one strategy, as returned by `schema()`.
pub type ParamSchema = Vec<ParamSpec>;

/// Loosely typed parameter bag passed to `with_params`. Values arrive as
/// JSON and are coerced/validated by each strategy's own constructor.
pub type Params = HashMap<String, JsonValue>;

/// Reason a strategy voluntarily ends a session from within `next_bet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyExit {
    pub message: String,
}

impl StrategyExit {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read-only view handed to every strategy call. Strategies read session
/// totals and limits here but mutate only their own private state.
pub struct StrategyContext<'a> {
    pub state: &'a SessionState,
    pub limits: &'a SessionLimits,
    pub min_bet: Decimal,
    rng: &'a Mutex<DryRunRng>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        state: &'a SessionState,
        limits: &'a SessionLimits,
        min_bet: Decimal,
        rng: &'a Mutex<DryRunRng>,
    ) -> Self {
        Self {
            state,
            limits,
            min_bet,
            rng,
        }
    }

    /// Draw a u32 from the strategy-private RNG stream. Strategies that need
    /// their own randomness (e.g. `range-50-random`) use this instead of
    /// reaching into the engine's dry-run roll RNG.
    pub fn next_rng_u32(&self) -> u32 {
        self.rng.lock().next_u32()
    }
}

/// The sole polymorphism point for betting behaviour.
///
/// Call ordering contract (enforced by both engines):
/// `on_session_start -> (next_bet -> on_result)* -> on_session_end`.
/// `on_result` observes bets in the exact order `next_bet` produced them,
/// regardless of which engine is driving the session.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    fn schema() -> ParamSchema
    where
        Self: Sized;

    fn with_params(params: &Params) -> Result<Self, StrategyError>
    where
        Self: Sized;

    fn on_session_start(&mut self, _ctx: &StrategyContext) {}

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit>;

    fn on_result(&mut self, ctx: &StrategyContext, result: &crate::bet::BetResult);

    fn on_session_end(&mut self, _ctx: &StrategyContext, _stop_reason: &crate::types::StopReason) {}

    /// Optional serialization of internal state for sinks/debugging.
    fn snapshot(&self) -> Option<JsonValue> {
        None
    }
}

type Constructor = Arc<dyn Fn(&Params) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync>;

/// Process-wide name → constructor map. Populated once via `Registry::with_builtins()`.
#[derive(Clone)]
pub struct Registry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<S>(&mut self, name: &'static str)
    where
        S: Strategy + 'static,
    {
        let ctor: Constructor = Arc::new(|params: &Params| -> Result<Box<dyn Strategy>, StrategyError> {
            Ok(Box::new(S::with_params(params)?))
        });
        self.constructors.insert(name, ctor);
    }

    pub fn build(&self, name: &str, params: &Params) -> Result<Box<dyn Strategy>, StrategyError> {
        let ctor = self
            .constructors
            .get(name)
            .ok_or_else(|| StrategyError::UnknownStrategy(name.to_string()))?;
        ctor(params)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Construct the registry pre-populated with every built-in strategy
    /// named in the catalog: classic-martingale, anti-martingale-streak,
    /// dalembert, fibonacci, paroli, labouchere, oscars-grind,
    /// one-three-two-six, kelly-capped, target-aware, streak-hunter,
    /// streak-multiplier, faucet-grind, faucet-cashout, max-wager-flow,
    /// range-50-random, fib-loss-cluster, rng-analysis-strategy,
    /// adaptive-survival, simple-progression-40, custom-script.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register::<ClassicMartingaleStrategy>("classic-martingale");
        r.register::<AntiMartingaleStreakStrategy>("anti-martingale-streak");
        r.register::<DAlembertStrategy>("dalembert");
        r.register::<FibonacciStrategy>("fibonacci");
        r.register::<ParoliStrategy>("paroli");
        r.register::<LabouchereStrategy>("labouchere");
        r.register::<OscarsGrindStrategy>("oscars-grind");
        r.register::<OneThreeTwoSixStrategy>("one-three-two-six");
        r.register::<KellyCappedStrategy>("kelly-capped");
        r.register::<TargetAwareStrategy>("target-aware");
        r.register::<StreakHunterStrategy>("streak-hunter");
        r.register::<StreakMultiplierStrategy>("streak-multiplier");
        r.register::<FaucetGrindStrategy>("faucet-grind");
        r.register::<FaucetCashoutStrategy>("faucet-cashout");
        r.register::<MaxWagerFlowStrategy>("max-wager-flow");
        r.register::<Range50RandomStrategy>("range-50-random");
        r.register::<FibLossClusterStrategy>("fib-loss-cluster");
        r.register::<RngAnalysisStrategy>("rng-analysis-strategy");
        r.register::<AdaptiveSurvivalStrategy>("adaptive-survival");
        r.register::<SimpleProgression40Strategy>("simple-progression-40");
        r.register::<CustomScriptStrategy>("custom-script");
        r
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Helpers shared by strategy `with_params` implementations for coercing
/// loosely typed JSON parameters into the concrete type each field needs.
pub(crate) mod param_helpers {
    use super::*;

    pub fn get_decimal(params: &Params, field: &str, default: Decimal) -> Result<Decimal, StrategyError> {
        match params.get(field) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .and_then(Decimal::from_f64_retain)
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| StrategyError::InvalidParam {
                    field: field.to_string(),
                    reason: "expected a number".to_string(),
                }),
        }
    }

    pub fn get_u64(params: &Params, field: &str, default: u64) -> Result<u64, StrategyError> {
        match params.get(field) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| StrategyError::InvalidParam {
                field: field.to_string(),
                reason: "expected a non-negative integer".to_string(),
            }),
        }
    }

    pub fn get_u32(params: &Params, field: &str, default: u32) -> Result<u32, StrategyError> {
        get_u64(params, field, default as u64).map(|v| v as u32)
    }

    pub fn get_bool(params: &Params, field: &str, default: bool) -> Result<bool, StrategyError> {
        match params.get(field) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| StrategyError::InvalidParam {
                field: field.to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    pub fn get_string(params: &Params, field: &str, default: &str) -> Result<String, StrategyError> {
        match params.get(field) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| StrategyError::InvalidParam {
                    field: field.to_string(),
                    reason: "expected a string".to_string(),
                }),
        }
    }
}
