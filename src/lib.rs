//! Dixit Session Library
//!
//! This crate keeps a client's view of one Dixit game in sync with the game
//! server.
//!
//! # Overview
//!
//! - **Session Store** - A pure reducer folding game and turn-phase fetch
//!   results into state, deriving which of the two resources to poll.
//!
//! - **Pollers** - Interval polling for the game and for the current turn's
//!   phase, with generation tagging so results from a cancelled subscription
//!   are dropped.
//!
//! - **Actions** - The start-game mutation, whose result is folded into the
//!   session as soon as it arrives.
//!
//! - **Orchestrator** - Owns the state, routes background results through the
//!   reducer and keeps the pollers in line with the poll flags.
//!
//! # Design Principles
//!
//! 1. **One owner** - Only the orchestrator mutates session state; pollers and
//!    actions report through a channel.
//!
//! 2. **Never poll both** - The game and the phase are not polled at the same
//!    time.
//!
//! 3. **Transport is a trait** - Queries go through [`SessionTransport`]; the
//!    crate has no HTTP client of its own.
//!
//! # Example
//!
//! ```rust
//! use dixit_session::{FetchState, GameSnapshot, SessionEvent, SessionState};
//!
//! let game: GameSnapshot = serde_json::from_value(serde_json::json!({
//!     "id": "game-1",
//!     "currentTurnId": "turn-1",
//!     "endCondition": { "__typename": "GameRemainingTurnsEndCondition", "remainingTurns": 5 },
//!     "status": "STARTED",
//!     "host": { "id": "u1", "username": "alice" },
//!     "players": [{ "id": "u1", "username": "alice", "score": 0 }]
//! }))
//! .unwrap();
//!
//! let state = SessionState::new().apply(SessionEvent::GameFetched(FetchState::ready(game)));
//!
//! // A turn is running: poll its phase, not the game
//! assert!(!state.should_poll_game());
//! assert!(state.should_poll_phase());
//! assert_eq!(state.current_turn_id(), Some("turn-1"));
//! ```

pub mod config;
pub mod error;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SessionConfig;
pub use error::{ConfigError, ErrorInfo, ErrorKind, SessionError, TransportError};
pub use session::*;
