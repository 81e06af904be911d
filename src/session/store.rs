//! Session state reducer.
//!
//! All session state changes go through [`SessionState::apply`], a pure
//! transition from the previous state and one event to the next state.
//!
//! # Poll eligibility
//!
//! ```text
//!                         │ game poll │ phase poll │
//! ────────────────────────┼───────────┼────────────┤
//! no game data            │    yes    │     no     │
//! WAITING_FOR_PLAYERS     │    yes    │     no     │
//! STARTED, turn "t"       │    no     │    yes     │
//! STARTED, no turn        │    yes    │     no     │
//! ENDED                   │    yes    │     no     │
//! ```
//!
//! While a turn is being played the phase poll carries progress; the game is
//! polled in every other situation.

use serde::Serialize;

use super::fetch::FetchState;
use super::game::{GameSnapshot, GameStatus};
use super::phase::PhaseSnapshot;

/// Reducer input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Game query, refetch or start-game mutation resolved
    GameFetched(FetchState<GameSnapshot>),

    /// Turn phase query resolved, or phase reset
    PhaseFetched(FetchState<PhaseSnapshot>),
}

impl SessionEvent {
    /// Reset the phase without new network data.
    pub fn phase_cleared(previous: &FetchState<PhaseSnapshot>) -> Self {
        Self::PhaseFetched(previous.cleared())
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameFetched(_) => "game/fetched",
            Self::PhaseFetched(_) => "phase/fetched",
        }
    }
}

/// Which resources should be continuously polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollFlags {
    pub game: bool,
    pub phase: bool,
}

impl Default for PollFlags {
    fn default() -> Self {
        Self {
            game: true,
            phase: false,
        }
    }
}

impl PollFlags {
    /// Derive both flags from the latest game snapshot. Total over every input.
    pub fn derive(game: Option<&GameSnapshot>) -> Self {
        match game {
            None => Self {
                game: true,
                phase: false,
            },
            Some(game) => {
                let has_turn = game.current_turn_id.is_some();
                Self {
                    game: matches!(game.status, GameStatus::WaitingForPlayers | GameStatus::Ended)
                        || !has_turn,
                    phase: game.status == GameStatus::Started && has_turn,
                }
            }
        }
    }
}

/// Local view of the game session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    game: FetchState<GameSnapshot>,
    phase: FetchState<PhaseSnapshot>,
    should_poll_game: bool,
    should_poll_phase: bool,

    /// Game data has been observed at least once
    #[serde(skip)]
    game_settled: bool,

    /// Phase data has been observed at least once
    #[serde(skip)]
    phase_settled: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        let flags = PollFlags::default();
        Self {
            game: FetchState::idle(),
            phase: FetchState::idle(),
            should_poll_game: flags.game,
            should_poll_phase: flags.phase,
            game_settled: false,
            phase_settled: false,
        }
    }
}

impl SessionState {
    /// Create the state of a freshly mounted session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn game(&self) -> &FetchState<GameSnapshot> {
        &self.game
    }

    pub fn phase(&self) -> &FetchState<PhaseSnapshot> {
        &self.phase
    }

    pub fn should_poll_game(&self) -> bool {
        self.should_poll_game
    }

    pub fn should_poll_phase(&self) -> bool {
        self.should_poll_phase
    }

    pub fn poll_flags(&self) -> PollFlags {
        PollFlags {
            game: self.should_poll_game,
            phase: self.should_poll_phase,
        }
    }

    /// Turn identifier of the latest game snapshot.
    pub fn current_turn_id(&self) -> Option<&str> {
        self.game.data.as_ref()?.current_turn_id.as_deref()
    }

    /// Apply an event, returning the new state.
    pub fn apply(&self, event: SessionEvent) -> Self {
        let mut next = self.clone();
        next.apply_mut(event);
        next
    }

    /// Apply an event in place.
    pub fn apply_mut(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::GameFetched(payload) => {
                let (game, settled) = latch(self.game_settled, &self.game, payload);
                let flags = PollFlags::derive(game.data.as_ref());
                self.game = game;
                self.game_settled = settled;
                self.should_poll_game = flags.game;
                self.should_poll_phase = flags.phase;
            }
            SessionEvent::PhaseFetched(payload) => {
                let (phase, settled) = latch(self.phase_settled, &self.phase, payload);
                self.phase = phase;
                self.phase_settled = settled;
            }
        }
    }
}

/// Replace a fetch state, never going back to loading once data was seen.
fn latch<T>(settled: bool, previous: &FetchState<T>, payload: FetchState<T>) -> (FetchState<T>, bool) {
    let seen = settled || previous.data.is_some();
    let settled = seen || payload.data.is_some();
    let folded = FetchState {
        loading: !seen && payload.loading,
        ..payload
    };
    (folded, settled)
}
