//! Session synchronization for one game.
//!
//! This module provides the state and the workers behind a game screen:
//!
//! - `store` - Pure reducer over game and phase fetch results
//! - `poller` - Interval polling of the game and of the current turn's phase
//! - `action` - The start-game mutation and its analytics
//! - `orchestrator` - Owns the state and wires the pieces together
//! - `transport` - The query/mutation boundary to the game server
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        SessionOrchestrator                            │
//! │                                                                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐       │
//! │  │  GamePoller  │  │ PhasePoller  │  │ GameActionCoordinator │       │
//! │  │              │  │              │  │                       │       │
//! │  │ game_id,     │  │ turn_id,     │  │ start game mutation,  │       │
//! │  │ generation   │  │ generation   │  │ ticket                │       │
//! │  └──────┬───────┘  └──────┬───────┘  └──────────┬────────────┘       │
//! │         │ SessionMessage  │                     │                     │
//! │         └─────────────────┴──────────┬──────────┘                     │
//! │                                      ▼                                │
//! │                             admit generation                          │
//! │                                      ▼                                │
//! │  ┌─────────────────────────────────────────────────────────────┐     │
//! │  │ SessionState::apply(SessionEvent)                            │     │
//! │  │   game, phase, should_poll_game, should_poll_phase           │     │
//! │  └──────────────────────────────┬──────────────────────────────┘     │
//! │                                 ▼                                     │
//! │                 reconcile pollers, publish SessionView                │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While the game waits for players, ended, or sits between turns only the
//! game is polled. While a turn is running only its phase is polled.

pub mod action;
pub mod fetch;
pub mod game;
pub mod message;
pub mod orchestrator;
pub mod phase;
pub mod poller;
pub mod store;
pub mod transport;

pub use action::{
    AnalyticsEvent, AnalyticsSink, GameActionCoordinator, TracingAnalytics, GAME_STARTED_EVENT,
};
pub use fetch::FetchState;
pub use game::{EndCondition, GameSnapshot, GameStatus, Host, PlayerSummary};
pub use message::{SessionCommand, SessionMessage};
pub use orchestrator::{SessionContext, SessionHandle, SessionOrchestrator, SessionView};
pub use phase::PhaseSnapshot;
pub use poller::{GamePoller, PhasePoller, Resource};
pub use store::{PollFlags, SessionEvent, SessionState};
pub use transport::{
    decode_game, decode_start_game, decode_turn_phase, FetchPolicy, SessionTransport,
    StartGameOutcome,
};
