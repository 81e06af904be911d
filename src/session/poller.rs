//! Interval pollers for the game and turn-phase resources.
//!
//! Each poller runs at most one background task. Every request the task
//! issues is stamped with the poller's generation at the time the task was
//! spawned; `stop()` and turn changes bump the generation and abort the task.
//! The session owner calls [`GamePoller::admit`] / [`PhasePoller::admit`]
//! before folding a result, so a response from a cancelled subscription can
//! never reach the store even if it was already queued.
//!
//! ```text
//!  start()            stop()             start()
//!    │ gen 1            │ gen 2             │ gen 3
//!    ▼                  ▼                   ▼
//!  ──■──tick──tick──────✕───────────────────■──tick──▶
//!       │     │  (in flight, dropped)            │
//!       ▼     ▼                                  ▼
//!     admit admit                              admit
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::fetch::FetchState;
use super::game::GameSnapshot;
use super::message::SessionMessage;
use super::phase::PhaseSnapshot;
use super::transport::{FetchPolicy, SessionTransport};
use crate::error::{SessionError, TransportError};

/// Remote resource kept in sync by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Game,
    Phase,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game => write!(f, "game"),
            Self::Phase => write!(f, "phase"),
        }
    }
}

/// Generation counter and the task polling under the current generation.
#[derive(Debug, Default)]
struct Subscription {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Start a new generation.
    fn open(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Invalidate everything issued so far.
    fn cancel(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn admit(&self, resource: Resource, generation: u64) -> Result<(), SessionError> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(SessionError::StaleWrite {
                resource,
                generation,
                current: self.generation,
            })
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One polled query.
#[async_trait]
trait PollTarget: Send + Sync + 'static {
    type Data: Clone + Send + Sync + 'static;

    const RESOURCE: Resource;

    /// Identifier the query is keyed by, for logs.
    fn key(&self) -> &str;

    /// Issue one request. `first` is set for the subscription's first tick.
    async fn fetch(&self, first: bool) -> Result<Option<Self::Data>, TransportError>;

    fn message(&self, generation: u64, payload: FetchState<Self::Data>) -> SessionMessage;
}

struct GameTarget {
    transport: Arc<dyn SessionTransport>,
    game_id: String,
    /// Policy of the first tick; later ticks always go to the network
    first_policy: FetchPolicy,
}

#[async_trait]
impl PollTarget for GameTarget {
    type Data = GameSnapshot;

    const RESOURCE: Resource = Resource::Game;

    fn key(&self) -> &str {
        &self.game_id
    }

    async fn fetch(&self, first: bool) -> Result<Option<GameSnapshot>, TransportError> {
        let policy = if first {
            self.first_policy
        } else {
            FetchPolicy::NetworkOnly
        };
        self.transport.fetch_game(&self.game_id, policy).await
    }

    fn message(&self, generation: u64, payload: FetchState<GameSnapshot>) -> SessionMessage {
        SessionMessage::Game {
            generation,
            payload,
        }
    }
}

struct PhaseTarget {
    transport: Arc<dyn SessionTransport>,
    turn_id: String,
}

#[async_trait]
impl PollTarget for PhaseTarget {
    type Data = PhaseSnapshot;

    const RESOURCE: Resource = Resource::Phase;

    fn key(&self) -> &str {
        &self.turn_id
    }

    // Phase changes faster than anything else; never serve it from cache.
    async fn fetch(&self, _first: bool) -> Result<Option<PhaseSnapshot>, TransportError> {
        self.transport
            .fetch_turn_phase(&self.turn_id, FetchPolicy::NetworkOnly)
            .await
    }

    fn message(&self, generation: u64, payload: FetchState<PhaseSnapshot>) -> SessionMessage {
        SessionMessage::Phase {
            generation,
            turn_id: self.turn_id.clone(),
            payload,
        }
    }
}

/// Spawn the repeating fetch task for one subscription.
///
/// The first request goes out immediately. A failed request is reported and
/// the loop carries on at the next tick; errors keep the last snapshot this
/// subscription fetched successfully.
fn spawn_poll_loop<T: PollTarget>(
    target: T,
    every: Duration,
    generation: u64,
    announce: bool,
    outbox: UnboundedSender<SessionMessage>,
) -> JoinHandle<()> {
    let resource = T::RESOURCE;
    tokio::spawn(async move {
        if announce && outbox.send(target.message(generation, FetchState::loading())).is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<T::Data> = None;
        let mut first = true;

        loop {
            ticker.tick().await;

            let fetched = target.fetch(first).await;
            first = false;
            let payload = match fetched {
                Ok(data) => {
                    last = data.clone();
                    FetchState::settled(data)
                }
                Err(err) => {
                    warn!(
                        resource = %resource,
                        key = %target.key(),
                        generation,
                        error = %err,
                        "poll request failed"
                    );
                    FetchState::failed(err.into(), last.clone())
                }
            };

            if outbox.send(target.message(generation, payload)).is_err() {
                debug!(resource = %resource, generation, "session closed, poll loop exiting");
                break;
            }
        }
    })
}

/// Polls the game resource.
pub struct GamePoller {
    game_id: String,
    every: Duration,
    transport: Arc<dyn SessionTransport>,
    outbox: UnboundedSender<SessionMessage>,
    subscription: Subscription,
    /// Loading state has been reported for the first request
    announced: bool,
}

impl GamePoller {
    pub fn new(
        game_id: impl Into<String>,
        every: Duration,
        transport: Arc<dyn SessionTransport>,
        outbox: UnboundedSender<SessionMessage>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            every,
            transport,
            outbox,
            subscription: Subscription::default(),
            announced: false,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn is_polling(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn generation(&self) -> u64 {
        self.subscription.generation
    }

    /// Begin interval polling. No-op while already polling.
    pub fn start(&mut self) {
        if self.subscription.is_active() {
            return;
        }

        let generation = self.subscription.open();
        let announce = !self.announced;
        self.announced = true;
        info!(game_id = %self.game_id, generation, "game polling started");

        // Only the very first request may be answered from cache; a restart
        // must observe changes made while polling was off.
        let target = GameTarget {
            transport: Arc::clone(&self.transport),
            game_id: self.game_id.clone(),
            first_policy: if announce {
                FetchPolicy::CacheFirst
            } else {
                FetchPolicy::NetworkOnly
            },
        };
        self.subscription.attach(spawn_poll_loop(
            target,
            self.every,
            generation,
            announce,
            self.outbox.clone(),
        ));
    }

    /// Stop interval polling. No-op while stopped.
    pub fn stop(&mut self) {
        if !self.subscription.is_active() {
            return;
        }

        self.subscription.cancel();
        info!(
            game_id = %self.game_id,
            generation = self.subscription.generation,
            "game polling stopped"
        );
    }

    /// Fetch once, outside the interval.
    ///
    /// The result is both returned and sent to the session under the current
    /// generation.
    pub async fn refetch(&self) -> FetchState<GameSnapshot> {
        let generation = self.subscription.generation;

        let payload = match self
            .transport
            .fetch_game(&self.game_id, FetchPolicy::NetworkOnly)
            .await
        {
            Ok(game) => FetchState::settled(game),
            Err(err) => {
                warn!(game_id = %self.game_id, error = %err, "game refetch failed");
                FetchState::failed(err.into(), None)
            }
        };

        let message = SessionMessage::Game {
            generation,
            payload: payload.clone(),
        };
        if self.outbox.send(message).is_err() {
            debug!(game_id = %self.game_id, "session closed, refetch result not delivered");
        }
        payload
    }

    /// Check a result's generation against the current subscription.
    pub fn admit(&self, generation: u64) -> Result<(), SessionError> {
        self.subscription.admit(Resource::Game, generation)
    }
}

/// Polls the phase of the game's current turn.
pub struct PhasePoller {
    turn_id: Option<String>,
    every: Duration,
    transport: Arc<dyn SessionTransport>,
    outbox: UnboundedSender<SessionMessage>,
    subscription: Subscription,
    /// Last turn a subscription was opened for
    loaded_turn: Option<String>,
}

impl PhasePoller {
    pub fn new(
        every: Duration,
        transport: Arc<dyn SessionTransport>,
        outbox: UnboundedSender<SessionMessage>,
    ) -> Self {
        Self {
            turn_id: None,
            every,
            transport,
            outbox,
            subscription: Subscription::default(),
            loaded_turn: None,
        }
    }

    pub fn turn_id(&self) -> Option<&str> {
        self.turn_id.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn generation(&self) -> u64 {
        self.subscription.generation
    }

    /// Point the poller at another turn.
    ///
    /// Any subscription for the previous turn is torn down; polling resumes
    /// against the new turn if it was running.
    pub fn set_turn(&mut self, turn_id: Option<&str>) {
        if self.turn_id.as_deref() == turn_id {
            return;
        }

        let resume = self.subscription.is_active();
        self.subscription.cancel();
        debug!(from = ?self.turn_id, to = ?turn_id, resume, "turn changed");
        self.turn_id = turn_id.map(str::to_string);

        if resume {
            self.start();
        }
    }

    /// Begin interval polling of the current turn. No-op without a turn or
    /// while already polling.
    pub fn start(&mut self) {
        let Some(turn_id) = self.turn_id.clone() else {
            debug!("no current turn, phase polling not started");
            return;
        };
        if self.subscription.is_active() {
            return;
        }

        let generation = self.subscription.open();
        let announce = self.loaded_turn.as_deref() != Some(turn_id.as_str());
        self.loaded_turn = Some(turn_id.clone());
        info!(turn_id = %turn_id, generation, "phase polling started");

        let target = PhaseTarget {
            transport: Arc::clone(&self.transport),
            turn_id,
        };
        self.subscription.attach(spawn_poll_loop(
            target,
            self.every,
            generation,
            announce,
            self.outbox.clone(),
        ));
    }

    /// Stop interval polling. No-op while stopped.
    pub fn stop(&mut self) {
        if !self.subscription.is_active() {
            return;
        }

        self.subscription.cancel();
        info!(
            turn_id = ?self.turn_id,
            generation = self.subscription.generation,
            "phase polling stopped"
        );
    }

    pub fn admit(&self, generation: u64) -> Result<(), SessionError> {
        self.subscription.admit(Resource::Phase, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::session::game::GameStatus;
    use crate::test_support::{self, Call, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::sync::Semaphore;

    const EVERY: Duration = Duration::from_secs(2);

    fn game_poller(transport: &Arc<ScriptedTransport>) -> (GamePoller, UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn SessionTransport> = transport.clone();
        (GamePoller::new("game-1", EVERY, transport, tx), rx)
    }

    fn phase_poller(transport: &Arc<ScriptedTransport>) -> (PhasePoller, UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn SessionTransport> = transport.clone();
        (PhasePoller::new(EVERY, transport, tx), rx)
    }

    async fn next_game(rx: &mut UnboundedReceiver<SessionMessage>) -> (u64, FetchState<GameSnapshot>) {
        match rx.recv().await {
            Some(SessionMessage::Game {
                generation,
                payload,
            }) => (generation, payload),
            other => panic!("expected game message, got {:?}", other),
        }
    }

    async fn next_phase(
        rx: &mut UnboundedReceiver<SessionMessage>,
    ) -> (u64, String, FetchState<PhaseSnapshot>) {
        match rx.recv().await {
            Some(SessionMessage::Phase {
                generation,
                turn_id,
                payload,
            }) => (generation, turn_id, payload),
            other => panic!("expected phase message, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_poller_start_is_idempotent() {
        test_support::init_logging();
        let transport = Arc::new(ScriptedTransport::new());
        let waiting = test_support::game(GameStatus::WaitingForPlayers, None);
        transport.push_game(Ok(Some(waiting.clone())));

        let (mut poller, mut rx) = game_poller(&transport);
        assert!(!poller.is_polling());

        poller.start();
        poller.start();
        assert!(poller.is_polling());
        assert_eq!(poller.generation(), 1);

        assert_eq!(next_game(&mut rx).await, (1, FetchState::loading()));
        assert_eq!(next_game(&mut rx).await, (1, FetchState::ready(waiting.clone())));

        // Next tick repeats the last scripted answer
        assert_eq!(next_game(&mut rx).await, (1, FetchState::ready(waiting)));
        assert_eq!(
            transport.calls(),
            vec![
                Call::Game {
                    game_id: "game-1".to_string(),
                    policy: FetchPolicy::CacheFirst
                },
                Call::Game {
                    game_id: "game-1".to_string(),
                    policy: FetchPolicy::NetworkOnly
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_poller_stop_rejects_old_generation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_game(Ok(Some(test_support::game(GameStatus::WaitingForPlayers, None))));

        let (mut poller, mut rx) = game_poller(&transport);
        poller.start();
        next_game(&mut rx).await;
        let (generation, _) = next_game(&mut rx).await;

        poller.stop();
        poller.stop();
        assert!(!poller.is_polling());
        assert_eq!(poller.generation(), generation + 1);

        assert!(matches!(
            poller.admit(generation),
            Err(SessionError::StaleWrite {
                resource: Resource::Game,
                ..
            })
        ));
        assert!(poller.admit(poller.generation()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_poller_restart_skips_loading() {
        let transport = Arc::new(ScriptedTransport::new());
        let waiting = test_support::game(GameStatus::WaitingForPlayers, None);
        transport.push_game(Ok(Some(waiting.clone())));

        let (mut poller, mut rx) = game_poller(&transport);
        poller.start();
        next_game(&mut rx).await;
        next_game(&mut rx).await;

        poller.stop();
        poller.start();
        assert_eq!(poller.generation(), 3);
        assert_eq!(next_game(&mut rx).await, (3, FetchState::ready(waiting)));

        // A restarted subscription never reads from cache
        assert_eq!(
            transport.calls().last(),
            Some(&Call::Game {
                game_id: "game-1".to_string(),
                policy: FetchPolicy::NetworkOnly
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_request_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(ScriptedTransport::new().with_game_gate(gate.clone()));
        transport.push_game(Ok(Some(test_support::game(GameStatus::Started, Some("t1")))));

        let (mut poller, mut rx) = game_poller(&transport);
        poller.start();
        assert_eq!(next_game(&mut rx).await, (1, FetchState::loading()));

        // Let the task issue its request and park on the gate
        tokio::task::yield_now().await;
        assert_eq!(transport.calls().len(), 1);

        poller.stop();
        gate.add_permits(10);
        tokio::time::sleep(EVERY * 3).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_keep_last_snapshot_and_polling_continues() {
        let transport = Arc::new(ScriptedTransport::new());
        let waiting = test_support::game(GameStatus::WaitingForPlayers, None);
        let error = TransportError::Network("connection reset".to_string());
        transport.push_game(Ok(Some(waiting.clone())));
        transport.push_game(Err(error.clone()));
        transport.push_game(Ok(Some(waiting.clone())));

        let (mut poller, mut rx) = game_poller(&transport);
        poller.start();
        next_game(&mut rx).await;
        next_game(&mut rx).await;

        let (_, failed) = next_game(&mut rx).await;
        assert_eq!(failed, FetchState::failed(error.into(), Some(waiting.clone())));

        let (_, recovered) = next_game(&mut rx).await;
        assert_eq!(recovered, FetchState::ready(waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_reports_under_current_generation() {
        let transport = Arc::new(ScriptedTransport::new());
        let started = test_support::game(GameStatus::Started, Some("t1"));
        transport.push_game(Ok(Some(started.clone())));

        let (poller, mut rx) = game_poller(&transport);
        let payload = poller.refetch().await;

        assert_eq!(payload, FetchState::ready(started.clone()));
        assert_eq!(next_game(&mut rx).await, (0, FetchState::ready(started)));
        assert!(poller.admit(0).is_ok());
        assert!(!poller.is_polling());
        assert_eq!(
            transport.calls(),
            vec![Call::Game {
                game_id: "game-1".to_string(),
                policy: FetchPolicy::NetworkOnly
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_poller_needs_turn() {
        let transport = Arc::new(ScriptedTransport::new());
        let (mut poller, _rx) = phase_poller(&transport);

        poller.start();
        assert!(!poller.is_polling());

        poller.set_turn(Some("t1"));
        assert!(!poller.is_polling());

        poller.start();
        assert!(poller.is_polling());
        assert_eq!(poller.turn_id(), Some("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_poller_turn_change_resubscribes() {
        let transport = Arc::new(ScriptedTransport::new());
        let voting = test_support::phase("TurnVotingPhase");
        transport.push_phase(Ok(Some(voting.clone())));

        let (mut poller, mut rx) = phase_poller(&transport);
        poller.set_turn(Some("t1"));
        poller.start();

        let (first_gen, turn, payload) = next_phase(&mut rx).await;
        assert_eq!((turn.as_str(), payload), ("t1", FetchState::loading()));
        let (_, _, payload) = next_phase(&mut rx).await;
        assert_eq!(payload, FetchState::ready(voting));

        let storyteller = test_support::phase("TurnStorytellerPhase");
        transport.push_phase(Ok(Some(storyteller.clone())));
        poller.set_turn(Some("t2"));

        assert!(poller.is_polling());
        assert!(poller.admit(first_gen).is_err());

        let (generation, turn, payload) = next_phase(&mut rx).await;
        assert_eq!((turn.as_str(), payload), ("t2", FetchState::loading()));
        assert!(poller.admit(generation).is_ok());

        let (_, turn, payload) = next_phase(&mut rx).await;
        assert_eq!((turn.as_str(), payload), ("t2", FetchState::ready(storyteller)));

        let phase_calls: Vec<Call> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Phase { .. }))
            .collect();
        assert_eq!(
            phase_calls,
            vec![
                Call::Phase {
                    turn_id: "t1".to_string(),
                    policy: FetchPolicy::NetworkOnly
                },
                Call::Phase {
                    turn_id: "t2".to_string(),
                    policy: FetchPolicy::NetworkOnly
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_poller_cleared_turn_stops() {
        let transport = Arc::new(ScriptedTransport::new());
        let (mut poller, _rx) = phase_poller(&transport);
        poller.set_turn(Some("t1"));
        poller.start();
        let generation = poller.generation();

        poller.set_turn(None);
        assert!(!poller.is_polling());
        assert!(poller.admit(generation).is_err());

        // Same turn again is not a change
        poller.set_turn(None);
        assert_eq!(poller.generation(), generation + 1);
    }
}
