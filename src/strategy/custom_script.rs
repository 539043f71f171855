// =============================================================================
// custom-script — out-of-process strategy collaborator over a local socket
// =============================================================================
//
// The source tree sandboxes a user script inside the same process. That
// model doesn't translate: instead this strategy is a thin RPC client that
// forwards `next_bet`/`on_result` to an external process speaking
// newline-delimited JSON over a Unix domain socket, so the untrusted logic
// never runs inside the engine's own process or thread.
// =============================================================================

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bet::{BetResult, BetSpec};
use crate::error::StrategyError;
use crate::types::{BalanceKind, Direction, Game, Side};

use super::param_helpers::get_string;
use super::{ParamSchema, ParamSpec, ParamType, Params, Strategy, StrategyContext, StrategyExit};

#[derive(Debug, Serialize)]
struct NextBetRequest {
    method: &'static str,
    current_balance: Decimal,
    min_bet: Decimal,
}

#[derive(Debug, Serialize)]
struct OnResultRequest<'a> {
    method: &'static str,
    result: &'a BetResult,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptResponse {
    Bet {
        game: Game,
        amount: Decimal,
        chance: Option<Decimal>,
        direction: Option<Direction>,
        range_lo: Option<u32>,
        range_hi: Option<u32>,
        side: Option<Side>,
        balance_kind: BalanceKind,
    },
    Exit {
        message: String,
    },
}

/// Forwards every strategy call to an external process over a Unix domain
/// socket at `socket_path`, one newline-delimited JSON request/response pair
/// per call. The connection is established lazily on the first `next_bet`
/// and kept open for the lifetime of the session.
pub struct CustomScriptStrategy {
    socket_path: String,
    conn: Option<BufReader<UnixStream>>,
}

impl std::fmt::Debug for CustomScriptStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomScriptStrategy")
            .field("socket_path", &self.socket_path)
            .finish()
    }
}

impl CustomScriptStrategy {
    fn ensure_connected(&mut self) -> Result<(), StrategyExit> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| StrategyExit::new(format!("custom-script connect failed: {e}")))?;
        self.conn = Some(BufReader::new(stream));
        Ok(())
    }

    fn roundtrip(&mut self, request: &impl Serialize) -> Result<ScriptResponse, StrategyExit> {
        self.ensure_connected()?;
        let reader = self.conn.as_mut().expect("connected above");
        let mut line = serde_json::to_string(request)
            .map_err(|e| StrategyExit::new(format!("custom-script encode failed: {e}")))?;
        line.push('\n');
        reader
            .get_mut()
            .write_all(line.as_bytes())
            .map_err(|e| StrategyExit::new(format!("custom-script write failed: {e}")))?;
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .map_err(|e| StrategyExit::new(format!("custom-script read failed: {e}")))?;
        if response_line.is_empty() {
            return Err(StrategyExit::new("custom-script process closed the connection"));
        }
        serde_json::from_str(response_line.trim_end())
            .map_err(|e| StrategyExit::new(format!("custom-script malformed response: {e}")))
    }
}

impl Strategy for CustomScriptStrategy {
    fn name(&self) -> &'static str {
        "custom-script"
    }

    fn schema() -> ParamSchema {
        vec![ParamSpec {
            field_name: "socket_path",
            param_type: ParamType::String,
            default: json!("/tmp/duckrun-custom-script.sock"),
            description: "Unix domain socket the external strategy process listens on",
        }]
    }

    fn with_params(params: &Params) -> Result<Self, StrategyError> {
        Ok(Self {
            socket_path: get_string(params, "socket_path", "/tmp/duckrun-custom-script.sock")?,
            conn: None,
        })
    }

    fn next_bet(&mut self, ctx: &StrategyContext) -> Result<BetSpec, StrategyExit> {
        let request = NextBetRequest {
            method: "next_bet",
            current_balance: ctx.state.current_balance,
            min_bet: ctx.min_bet,
        };
        match self.roundtrip(&request)? {
            ScriptResponse::Exit { message } => Err(StrategyExit::new(message)),
            ScriptResponse::Bet {
                game,
                amount,
                chance,
                direction,
                range_lo,
                range_hi,
                side,
                balance_kind,
            } => Ok(BetSpec {
                game,
                amount,
                chance,
                direction,
                range_lo,
                range_hi,
                side,
                balance_kind,
                bonus: None,
            }),
        }
    }

    fn on_result(&mut self, _ctx: &StrategyContext, result: &BetResult) {
        let request = OnResultRequest {
            method: "on_result",
            result,
        };
        // Best-effort notification: a dropped connection here surfaces on the
        // next `next_bet` call instead of silently losing the bet outcome.
        let _ = self.roundtrip(&request);
    }
}
