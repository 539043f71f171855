// =============================================================================
// DiceApiClient — the one collaborator the engine relies on
// =============================================================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::ApiError;
use crate::types::{BalanceKind, Direction, Side};

/// One dice bet request.
#[derive(Debug, Clone, Serialize)]
pub struct PlayDiceRequest {
    pub symbol: String,
    pub amount: Decimal,
    pub chance: Decimal,
    pub is_high: bool,
    pub faucet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<JsonValue>,
}

/// One range-dice bet request.
#[derive(Debug, Clone, Serialize)]
pub struct PlayRangeDiceRequest {
    pub symbol: String,
    pub amount: Decimal,
    pub range_lo: u32,
    pub range_hi: u32,
    pub is_in: bool,
    pub faucet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<JsonValue>,
}

/// Balances carried on every bet response, keyed by balance kind.
#[derive(Debug, Clone, Deserialize)]
pub struct Balances {
    pub main: Decimal,
    pub faucet: Decimal,
}

/// The subset of the provider's bet response the engine needs, plus the
/// full raw body preserved for sinks.
#[derive(Debug, Clone)]
pub struct PlayResponse {
    pub win: bool,
    pub roll: u32,
    pub profit: Decimal,
    pub balances: Balances,
    pub raw: JsonValue,
}

/// Wire shape of a successful bet response, as documented in §6: a nested
/// `bet` object plus top-level `balances`.
#[derive(Debug, Deserialize)]
struct RawPlayResponse {
    bet: RawBet,
    balances: Balances,
}

#[derive(Debug, Deserialize)]
struct RawBet {
    result: bool,
    number: u32,
    profit: String,
}

/// Wire shape of an error response body, used to classify `ApiError`.
#[derive(Debug, Deserialize)]
struct RawErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    amount: Option<String>,
}

fn parse_play_response(status: reqwest::StatusCode, body: &str) -> Result<PlayResponse, ApiError> {
    if status.is_success() {
        let raw: RawPlayResponse = serde_json::from_str(body)
            .map_err(|e| ApiError::Fatal(format!("malformed response body: {e}")))?;
        let profit: Decimal = raw
            .bet
            .profit
            .parse()
            .map_err(|e| ApiError::Fatal(format!("malformed profit field: {e}")))?;
        let raw_json: JsonValue = serde_json::from_str(body)
            .map_err(|e| ApiError::Fatal(format!("malformed response body: {e}")))?;
        return Ok(PlayResponse {
            win: raw.bet.result,
            roll: raw.bet.number,
            profit,
            balances: raw.balances,
            raw: raw_json,
        });
    }

    let parsed: Result<RawErrorBody, _> = serde_json::from_str(body);
    if status.as_u16() == 422 {
        if let Ok(err_body) = &parsed {
            let message_lower = err_body.message.to_lowercase();
            if message_lower.contains("minimum bet") {
                if let Some(amount_str) = &err_body.amount {
                    if let Ok(amount) = amount_str.parse::<Decimal>() {
                        return Err(ApiError::MinimumBet(amount));
                    }
                }
                return Err(ApiError::Fatal(
                    "minimum bet error missing a parseable amount".to_string(),
                ));
            }
            if message_lower.contains("insufficient balance") {
                return Err(ApiError::InsufficientBalance);
            }
        }
    }
    if status.is_server_error() {
        return Err(ApiError::Transient(format!("HTTP {status}")));
    }
    let message = parsed
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    Err(ApiError::Fatal(message))
}

/// The collaborator the engine depends on to place bets and read balances.
/// Implementations must be internally thread-safe: the parallel engine
/// calls `play_dice`/`play_range_dice` concurrently from multiple workers.
#[async_trait]
pub trait DiceApiClient: Send + Sync {
    async fn play_dice(
        &self,
        amount: Decimal,
        chance: Decimal,
        direction: Direction,
        balance_kind: BalanceKind,
        bonus: Option<JsonValue>,
    ) -> Result<PlayResponse, ApiError>;

    async fn play_range_dice(
        &self,
        amount: Decimal,
        range_lo: u32,
        range_hi: u32,
        side: Side,
        balance_kind: BalanceKind,
        bonus: Option<JsonValue>,
    ) -> Result<PlayResponse, ApiError>;

    /// Current balance for `symbol` (e.g. `"BTC"`), compared
    /// case-insensitively against the configured currency.
    async fn get_balance(&self, symbol: &str, balance_kind: BalanceKind) -> Result<Decimal, ApiError>;
}

/// `reqwest`-based client authenticating with a static per-account API key
/// header (`X-Api-Key`), the scheme dice-game APIs in this family use in
/// place of per-request HMAC signing.
pub struct HttpDiceApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    symbol: String,
}

impl std::fmt::Debug for HttpDiceApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDiceApiClient")
            .field("base_url", &self.base_url)
            .field("symbol", &self.symbol)
            .field("api_key", &"***redacted***")
            .finish()
    }
}

impl HttpDiceApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, symbol: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            symbol: symbol.into(),
        })
    }

    async fn post(&self, path: &str, body: JsonValue) -> Result<PlayResponse, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ApiError::Transient(e.to_string())
                } else {
                    ApiError::Fatal(e.to_string())
                }
            })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Fatal(format!("failed to read response body: {e}")))?;
        parse_play_response(status, &text)
    }
}

#[async_trait]
impl DiceApiClient for HttpDiceApiClient {
    #[instrument(skip(self, bonus), fields(amount = %amount, chance = %chance))]
    async fn play_dice(
        &self,
        amount: Decimal,
        chance: Decimal,
        direction: Direction,
        balance_kind: BalanceKind,
        bonus: Option<JsonValue>,
    ) -> Result<PlayResponse, ApiError> {
        let request = PlayDiceRequest {
            symbol: self.symbol.clone(),
            amount,
            chance,
            is_high: matches!(direction, Direction::High),
            faucet: matches!(balance_kind, BalanceKind::Faucet),
            bonus,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::Fatal(format!("failed to encode request: {e}")))?;
        self.post("/api/bet/dice", body).await
    }

    #[instrument(skip(self, bonus), fields(amount = %amount, range_lo, range_hi))]
    async fn play_range_dice(
        &self,
        amount: Decimal,
        range_lo: u32,
        range_hi: u32,
        side: Side,
        balance_kind: BalanceKind,
        bonus: Option<JsonValue>,
    ) -> Result<PlayResponse, ApiError> {
        let request = PlayRangeDiceRequest {
            symbol: self.symbol.clone(),
            amount,
            range_lo,
            range_hi,
            is_in: matches!(side, Side::In),
            faucet: matches!(balance_kind, BalanceKind::Faucet),
            bonus,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::Fatal(format!("failed to encode request: {e}")))?;
        self.post("/api/bet/range-dice", body).await
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, symbol: &str, balance_kind: BalanceKind) -> Result<Decimal, ApiError> {
        let url = format!("{}/api/account/balance", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| ApiError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Fatal(format!("HTTP {status}")));
        }
        let balances: Balances = resp
            .json()
            .await
            .map_err(|e| ApiError::Fatal(format!("malformed balance response: {e}")))?;
        Ok(match balance_kind {
            BalanceKind::Main => balances.main,
            BalanceKind::Faucet => balances.faucet,
        })
    }
}
