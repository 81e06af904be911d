//! Query/mutation transport consumed by the session.
//!
//! Implementations execute the GraphQL documents below against the game
//! server and hand back typed payloads; the `decode_*` helpers turn a
//! response's `data` object into those payloads.

use async_trait::async_trait;
use serde::Deserialize;

use super::game::GameSnapshot;
use super::phase::PhaseSnapshot;
use crate::error::TransportError;

pub const GAME_FRAGMENT: &str = r#"
fragment Game on Game {
  id
  currentTurnId
  endCondition {
    __typename
    ... on GameRemainingTurnsEndCondition { remainingTurns }
    ... on GameScoreLimitEndCondition { scoreLimit }
  }
  status
  host { id username: name }
  players { id username: name score }
}
"#;

/// Variables: `gameId: ID!`
pub const GET_GAME: &str = r#"
query GetGame($gameId: ID!) {
  game(gameId: $gameId) { ...Game }
}
"#;

/// Variables: `turnId: ID!`. The `Phase` fragment is owned by the phase renderers.
pub const GET_TURN_PHASE: &str = r#"
query GetTurnPhase($turnId: ID!) {
  getTurnPhase(turnId: $turnId) { ...Phase }
}
"#;

/// Variables: `startGameInput: { gameId }`
pub const START_GAME: &str = r#"
mutation GameStartGame($startGameInput: GameStartGameInput!) {
  gameStartGame(startGameInput: $startGameInput) {
    __typename
    ... on GameStartGameResultError { type }
    ... on GameStartGameResultSuccess { game { ...Game } }
  }
}
"#;

/// Cache behaviour requested for a query.
///
/// Pollers ask for [`FetchPolicy::CacheFirst`] only on the first request of
/// a session; every later tick uses [`FetchPolicy::NetworkOnly`] so server
/// side changes are always observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Serve from the client cache when possible
    #[default]
    CacheFirst,
    /// Always hit the network
    NetworkOnly,
}

/// Result of the start-game mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartGameOutcome {
    Started(GameSnapshot),
    /// Server-side validation failure, `kind` is the error type it reported
    Rejected { kind: String },
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Run [`GET_GAME`]. `Ok(None)` when the server has no such game.
    async fn fetch_game(
        &self,
        game_id: &str,
        policy: FetchPolicy,
    ) -> Result<Option<GameSnapshot>, TransportError>;

    /// Run [`GET_TURN_PHASE`].
    async fn fetch_turn_phase(
        &self,
        turn_id: &str,
        policy: FetchPolicy,
    ) -> Result<Option<PhaseSnapshot>, TransportError>;

    /// Run [`START_GAME`].
    async fn start_game(&self, game_id: &str) -> Result<StartGameOutcome, TransportError>;
}

#[derive(Deserialize)]
struct GameData {
    game: Option<GameSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnPhaseData {
    get_turn_phase: Option<PhaseSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartGameData {
    game_start_game: StartGameResult,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum StartGameResult {
    #[serde(rename = "GameStartGameResultSuccess")]
    Success { game: GameSnapshot },

    #[serde(rename = "GameStartGameResultError")]
    Error {
        #[serde(rename = "type")]
        kind: String,
    },
}

/// Decode the `data` object of a [`GET_GAME`] response.
pub fn decode_game(data: serde_json::Value) -> Result<Option<GameSnapshot>, TransportError> {
    let decoded: GameData = decode(data)?;
    Ok(decoded.game)
}

/// Decode the `data` object of a [`GET_TURN_PHASE`] response.
pub fn decode_turn_phase(data: serde_json::Value) -> Result<Option<PhaseSnapshot>, TransportError> {
    let decoded: TurnPhaseData = decode(data)?;
    Ok(decoded.get_turn_phase)
}

/// Decode the `data` object of a [`START_GAME`] response.
pub fn decode_start_game(data: serde_json::Value) -> Result<StartGameOutcome, TransportError> {
    let decoded: StartGameData = decode(data)?;
    Ok(match decoded.game_start_game {
        StartGameResult::Success { game } => StartGameOutcome::Started(game),
        StartGameResult::Error { kind } => StartGameOutcome::Rejected { kind },
    })
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, TransportError> {
    serde_json::from_value(data).map_err(|e| TransportError::Decode(e.to_string()))
}
