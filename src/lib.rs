// =============================================================================
// duckrun-engine — an automated dice betting engine
// =============================================================================
//
// A strategy picks the next bet from running session state; the engine
// validates and clamps it against the configured minimum bet and current
// balance, submits it (to a provider API or a seeded dry-run RNG), folds the
// result back into session state, and repeats until a `SessionLimits` check
// or the strategy itself calls it quits. `engine::sequential` drives one bet
// at a time; `engine::parallel` pipelines submissions across a worker pool
// while preserving the sequential engine's exact decision/event order for a
// given RNG seed.
// =============================================================================

pub mod api_client;
pub mod bet;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod rng;
pub mod session;
pub mod sink;
pub mod strategy;
pub mod types;
