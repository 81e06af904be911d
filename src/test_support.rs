//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::TransportError;
use crate::session::action::{AnalyticsEvent, AnalyticsSink};
use crate::session::game::{EndCondition, GameSnapshot, GameStatus, Host, PlayerSummary};
use crate::session::phase::PhaseSnapshot;
use crate::session::transport::{FetchPolicy, SessionTransport, StartGameOutcome};

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install a test subscriber once. Level from `TEST_LOG`, then `RUST_LOG`,
/// then `warn`.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        let filter = std::env::var("TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init()
            .ok();
    });
}

pub fn game(status: GameStatus, turn: Option<&str>) -> GameSnapshot {
    GameSnapshot {
        id: "game-1".to_string(),
        current_turn_id: turn.map(str::to_string),
        status,
        end_condition: EndCondition::ScoreLimit { limit: 30 },
        host: Host {
            id: "u1".to_string(),
            username: "alice".to_string(),
        },
        players: vec![
            PlayerSummary {
                id: "u1".to_string(),
                username: "alice".to_string(),
                score: 0,
            },
            PlayerSummary {
                id: "u2".to_string(),
                username: "bob".to_string(),
                score: 0,
            },
        ],
    }
}

pub fn phase(kind: &str) -> PhaseSnapshot {
    PhaseSnapshot::new(serde_json::json!({ "__typename": kind, "id": "phase-1" }))
}

/// A request the transport received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Game { game_id: String, policy: FetchPolicy },
    Phase { turn_id: String, policy: FetchPolicy },
    StartGame { game_id: String },
}

type GameReply = Result<Option<GameSnapshot>, TransportError>;
type PhaseReply = Result<Option<PhaseSnapshot>, TransportError>;

#[derive(Default)]
struct Script {
    games: VecDeque<GameReply>,
    last_game: Option<GameReply>,
    phases: VecDeque<PhaseReply>,
    last_phase: Option<PhaseReply>,
    starts: VecDeque<Result<StartGameOutcome, TransportError>>,
    calls: Vec<Call>,
}

/// Answers queries from queued replies.
///
/// Once a query's queue runs dry the last reply is repeated, so interval
/// polls keep seeing the same server state.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    game_gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every game fetch until a permit is available.
    pub fn with_game_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.game_gate = Some(gate);
        self
    }

    pub fn push_game(&self, reply: GameReply) {
        self.script.lock().unwrap().games.push_back(reply);
    }

    pub fn push_phase(&self, reply: PhaseReply) {
        self.script.lock().unwrap().phases.push_back(reply);
    }

    pub fn push_start(&self, reply: Result<StartGameOutcome, TransportError>) {
        self.script.lock().unwrap().starts.push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn fetch_game(&self, game_id: &str, policy: FetchPolicy) -> GameReply {
        self.record(Call::Game {
            game_id: game_id.to_string(),
            policy,
        });

        if let Some(gate) = &self.game_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut script = self.script.lock().unwrap();
        match script.games.pop_front() {
            Some(reply) => {
                script.last_game = Some(reply.clone());
                reply
            }
            None => script.last_game.clone().unwrap_or(Ok(None)),
        }
    }

    async fn fetch_turn_phase(&self, turn_id: &str, policy: FetchPolicy) -> PhaseReply {
        self.record(Call::Phase {
            turn_id: turn_id.to_string(),
            policy,
        });

        let mut script = self.script.lock().unwrap();
        match script.phases.pop_front() {
            Some(reply) => {
                script.last_phase = Some(reply.clone());
                reply
            }
            None => script.last_phase.clone().unwrap_or(Ok(None)),
        }
    }

    async fn start_game(&self, game_id: &str) -> Result<StartGameOutcome, TransportError> {
        self.record(Call::StartGame {
            game_id: game_id.to_string(),
        });

        self.script
            .lock()
            .unwrap()
            .starts
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted reply".to_string())))
    }
}

/// Keeps every analytics event it receives.
#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn log_event(&self, event: &AnalyticsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
