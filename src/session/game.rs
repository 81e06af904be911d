//! Game snapshot as served by the game query and the start-game mutation.
//!
//! Field names follow the server's `Game` fragment so a response body can be
//! deserialized directly.

use serde::{Deserialize, Serialize};

/// Game lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Lobby open, host has not started
    WaitingForPlayers,
    /// Turns are being played
    Started,
    /// End condition reached
    Ended,
}

impl GameStatus {
    pub const ALL: [GameStatus; 3] = [Self::WaitingForPlayers, Self::Started, Self::Ended];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForPlayers => "WAITING_FOR_PLAYERS",
            Self::Started => "STARTED",
            Self::Ended => "ENDED",
        }
    }

    /// Check if turns are being played.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Check if game is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the game ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum EndCondition {
    /// Fixed number of turns left to play
    #[serde(rename = "GameRemainingTurnsEndCondition")]
    RemainingTurns {
        #[serde(rename = "remainingTurns")]
        count: u32,
    },

    /// First player to reach the score wins
    #[serde(rename = "GameScoreLimitEndCondition")]
    ScoreLimit {
        #[serde(rename = "scoreLimit")]
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub username: String,
}

/// A seated player with their running score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: String,
    pub username: String,
    pub score: i32,
}

/// Server-authoritative view of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: String,

    /// Turn being played, `None` before the first turn or between turns
    pub current_turn_id: Option<String>,

    pub status: GameStatus,

    pub end_condition: EndCondition,

    pub host: Host,

    /// Players in seating order
    pub players: Vec<PlayerSummary>,
}

impl GameSnapshot {
    /// Check if a turn is being played right now.
    pub fn turn_in_progress(&self) -> bool {
        self.status.is_active() && self.current_turn_id.is_some()
    }

    /// Check if the user hosts this game.
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host.id == user_id
    }

    /// Get a player.
    pub fn player(&self, player_id: &str) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.id == player_id)
    }

    /// Players sorted by score descending; ties keep seating order.
    pub fn standings(&self) -> Vec<&PlayerSummary> {
        let mut ranked: Vec<&PlayerSummary> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}
