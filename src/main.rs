// =============================================================================
// duckrun — Dice Betting Engine CLI entry point
// =============================================================================
//
// Starts in dry-run mode for safety. Live API submission requires an
// explicit `dry_run: false` in the config file plus a `DUCKRUN_API_KEY`
// environment variable — there is no way to go live by accident.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use duckrun_engine::api_client::HttpDiceApiClient;
use duckrun_engine::config::EngineConfig;
use duckrun_engine::engine::{CancellationToken, SequentialEngine};
use duckrun_engine::sink::{JsonlSink, LoggingSink, RingBufferSink};
use duckrun_engine::strategy::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("duckrun — starting up");

    let mut config = EngineConfig::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    config.api.api_key = std::env::var("DUCKRUN_API_KEY").unwrap_or_default();
    if !config.engine_options.dry_run && config.api.api_key.is_empty() {
        warn!("dry_run is false but DUCKRUN_API_KEY is unset — forcing dry_run");
        config.engine_options.dry_run = true;
    }

    info!(
        strategy = %config.strategy_name,
        dry_run = config.engine_options.dry_run,
        currency = %config.engine_options.currency,
        "engine config resolved"
    );

    let registry = Registry::with_builtins();
    let mut strategy = registry
        .build(&config.strategy_name, &config.strategy_params)
        .with_context(|| format!("failed to build strategy '{}'", config.strategy_name))?;

    let api: Option<Arc<dyn duckrun_engine::api_client::DiceApiClient>> = if config.engine_options.dry_run {
        None
    } else {
        let client = HttpDiceApiClient::new(
            config.api.base_url.clone(),
            config.api.api_key.clone(),
            config.engine_options.currency.clone(),
        )?;
        Some(Arc::new(client))
    };

    let mut engine = SequentialEngine::new(config.engine_options.clone(), api.clone());
    engine.add_sink(Arc::new(LoggingSink));
    let ring = Arc::new(RingBufferSink::new(1000));
    engine.add_sink(ring.clone());
    if let Ok(sink) = JsonlSink::open("bets.jsonl") {
        engine.add_sink(Arc::new(sink));
    } else {
        warn!("failed to open bets.jsonl, continuing without a persisted log");
    }

    let starting_balance = if let Some(client) = &api {
        client
            .get_balance(&config.engine_options.currency, duckrun_engine::types::BalanceKind::Main)
            .await
            .context("failed to fetch starting balance")?
    } else {
        rust_decimal_macros::dec!(1000)
    };

    let strategy_params_json = serde_json::to_value(&config.strategy_params).unwrap_or_default();

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received — stopping after the in-flight bet");
            ctrl_c_cancel.cancel();
        }
    });

    info!(starting_balance = %starting_balance, "session starting");
    let report = engine
        .run(
            strategy.as_mut(),
            &strategy_params_json,
            config.limits.clone(),
            starting_balance,
            config.min_bet,
            Some(cancel),
        )
        .await;

    info!(
        stop_reason = %report.stop_reason,
        bets_placed = report.bets_placed,
        wins = report.wins,
        losses = report.losses,
        cumulative_profit = %report.cumulative_profit,
        final_balance = %report.final_balance,
        "session finished"
    );

    if let Err(e) = config.save("engine_config.json") {
        error!(error = %e, "failed to save engine config on shutdown");
    }

    info!("duckrun shut down complete");
    Ok(())
}
