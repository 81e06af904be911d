//! Messages sent to the session owner, from background tasks and from
//! [`SessionHandle`](super::orchestrator::SessionHandle)s.

use tokio::sync::oneshot;

use super::fetch::FetchState;
use super::game::GameSnapshot;
use super::phase::PhaseSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Game poll or refetch resolved
    Game {
        generation: u64,
        payload: FetchState<GameSnapshot>,
    },

    /// Turn phase poll resolved
    Phase {
        generation: u64,
        turn_id: String,
        payload: FetchState<PhaseSnapshot>,
    },

    /// Start-game mutation resolved
    StartGameSettled {
        ticket: u64,
        payload: FetchState<GameSnapshot>,
    },
}

/// Request from the view layer while the session runs.
#[derive(Debug)]
pub enum SessionCommand {
    StartGame,

    /// Refetch the game; the folded result is sent back on `reply`
    RefetchGame {
        reply: oneshot::Sender<FetchState<GameSnapshot>>,
    },
}
