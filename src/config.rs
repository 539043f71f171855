// =============================================================================
// Engine configuration — session limits, API wiring, and strategy params
// =============================================================================
//
// Everything a betting session needs to start is gathered here so a session
// can be reconfigured without touching the engine itself. Persistence uses
// the same atomic tmp + rename pattern as the rest of this family of bots:
// write to a sibling `.tmp` file, then rename over the target. All fields
// carry `#[serde(default)]` so an older config file missing newer fields
// still loads.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::engine::EngineOptions;
use crate::session::SessionLimits;

fn default_strategy_name() -> String {
    "classic-martingale".to_string()
}

fn default_api_base_url() -> String {
    "https://api.example-dice.invalid".to_string()
}

/// Connection details for the live `HttpDiceApiClient`. Ignored entirely in
/// dry-run mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Read from the environment at wiring time, never persisted to disk.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_key: String::new(),
        }
    }
}

/// Top-level configuration for one betting session: which strategy, what
/// parameters, how the engine talks to the API, and where it stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,

    /// Loosely typed parameter bag, coerced by the strategy's own
    /// `with_params` constructor.
    #[serde(default)]
    pub strategy_params: HashMap<String, JsonValue>,

    #[serde(default)]
    pub limits: SessionLimits,

    #[serde(default)]
    pub engine_options: EngineOptions,

    #[serde(default)]
    pub api: ApiConfig,

    /// Minimum bet amount enforced before a spec ever reaches the API or
    /// the dry-run RNG.
    #[serde(default)]
    pub min_bet: rust_decimal::Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy_name: default_strategy_name(),
            strategy_params: HashMap::new(),
            limits: SessionLimits::default(),
            engine_options: EngineOptions::default(),
            api: ApiConfig::default(),
            min_bet: rust_decimal::Decimal::ZERO,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            strategy = %config.strategy_name,
            dry_run = config.engine_options.dry_run,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). The API key is never serialized
    /// (`#[serde(skip)]`), so round-tripping a saved config never leaks it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}
