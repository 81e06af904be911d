//! Session owner.
//!
//! Holds the state, feeds every admitted result through the reducer, and
//! after each change starts or stops the pollers to match the derived poll
//! flags. The view layer reads [`SessionView`] snapshots through
//! [`SessionOrchestrator::subscribe`] or the accessors. While
//! [`SessionOrchestrator::run`] owns the session, a [`SessionHandle`] carries
//! view requests into the loop.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use super::action::{AnalyticsSink, GameActionCoordinator};
use super::fetch::FetchState;
use super::game::GameSnapshot;
use super::message::{SessionCommand, SessionMessage};
use super::phase::PhaseSnapshot;
use super::poller::{GamePoller, PhasePoller};
use super::store::{SessionEvent, SessionState};
use super::transport::SessionTransport;
use crate::config::SessionConfig;
use crate::error::SessionError;

/// Who is looking at which game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub game_id: String,
    /// Signed-in user, from the identity provider
    pub user_id: String,
}

impl SessionContext {
    pub fn new(game_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// What the view layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub game: FetchState<GameSnapshot>,
    pub phase: FetchState<PhaseSnapshot>,
    pub start_game_loading: bool,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    fn of(state: &SessionState, start_game_loading: bool) -> Self {
        Self {
            game: state.game().clone(),
            phase: state.phase().clone(),
            start_game_loading,
            updated_at: Utc::now(),
        }
    }
}

/// Cloneable access to a running session for the view layer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<SessionCommand>,
    views: watch::Receiver<SessionView>,
}

impl SessionHandle {
    /// Same as [`SessionOrchestrator::start_game`], performed by the loop.
    pub fn start_game(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::StartGame)
            .map_err(|_| SessionError::Closed)
    }

    /// Same as [`SessionOrchestrator::refetch_game`], performed by the loop.
    pub async fn refetch_game(&self) -> Result<FetchState<GameSnapshot>, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(SessionCommand::RefetchGame { reply })
            .map_err(|_| SessionError::Closed)?;
        answer.await.map_err(|_| SessionError::Closed)
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.views.borrow().clone()
    }

    /// Receive a view snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }
}

/// Owns the state of one game session and the workers keeping it current.
pub struct SessionOrchestrator {
    state: SessionState,
    game_poller: GamePoller,
    phase_poller: PhasePoller,
    actions: GameActionCoordinator,
    inbox: UnboundedReceiver<SessionMessage>,
    commands: UnboundedReceiver<SessionCommand>,
    command_tx: UnboundedSender<SessionCommand>,
    view: watch::Sender<SessionView>,
    mounted: bool,
}

impl SessionOrchestrator {
    pub fn new(
        context: SessionContext,
        config: &SessionConfig,
        transport: Arc<dyn SessionTransport>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let (outbox, inbox) = mpsc::unbounded_channel();
        let game_poller = GamePoller::new(
            context.game_id.clone(),
            config.game_poll_interval(),
            Arc::clone(&transport),
            outbox.clone(),
        );
        let phase_poller =
            PhasePoller::new(config.phase_poll_interval(), Arc::clone(&transport), outbox.clone());
        let actions = GameActionCoordinator::new(
            context.game_id,
            context.user_id,
            transport,
            analytics,
            outbox,
        );

        let state = SessionState::new();
        let (view, _) = watch::channel(SessionView::of(&state, false));
        let (command_tx, commands) = mpsc::unbounded_channel();

        Ok(Self {
            state,
            game_poller,
            phase_poller,
            actions,
            inbox,
            commands,
            command_tx,
            view,
            mounted: false,
        })
    }

    /// Begin synchronizing. Must be called inside a tokio runtime.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        info!(game_id = %self.game_poller.game_id(), "session mounted");
        self.reconcile();
    }

    /// Stop all polling and abandon any pending action.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.game_poller.stop();
        self.phase_poller.stop();
        self.actions.cancel();
        self.abandon_idle_loads();
        info!(game_id = %self.game_poller.game_id(), "session unmounted");
        self.publish();
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn game(&self) -> &FetchState<GameSnapshot> {
        self.state.game()
    }

    pub fn phase(&self) -> &FetchState<PhaseSnapshot> {
        self.state.phase()
    }

    pub fn start_game_loading(&self) -> bool {
        self.actions.is_loading()
    }

    pub fn view(&self) -> SessionView {
        SessionView::of(&self.state, self.actions.is_loading())
    }

    /// Receive a view snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Handle for the view layer, usable while [`run`](Self::run) owns the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.command_tx.clone(),
            views: self.view.subscribe(),
        }
    }

    /// Ask the server to start the game.
    ///
    /// The phase is cleared right away; the mutation result is folded into
    /// the game state as soon as it arrives.
    pub fn start_game(&mut self) {
        if !self.mounted {
            debug!("start game while unmounted ignored");
            return;
        }
        let Some(clear) = self.actions.begin_start(&self.state) else {
            return;
        };

        self.fold(clear);
        self.actions.issue_start();
        self.publish();
    }

    /// Fetch the game once, outside the poll interval, and fold the result.
    pub async fn refetch_game(&mut self) -> FetchState<GameSnapshot> {
        let payload = self.game_poller.refetch().await;
        self.drain();
        payload
    }

    /// Wait for the next background result or handle request and process it.
    ///
    /// Returns `false` once no result sender is left.
    pub async fn next(&mut self) -> bool {
        tokio::select! {
            received = self.inbox.recv() => match received {
                Some(message) => {
                    self.on_message(message);
                    true
                }
                None => false,
            },
            Some(command) = self.commands.recv() => {
                self.on_command(command).await;
                true
            }
        }
    }

    /// Handle every result already queued, without waiting.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.on_message(message);
            handled += 1;
        }
        handled
    }

    /// Mount and process results and handle requests until `shutdown`
    /// resolves, then unmount.
    pub async fn run<F>(mut self, shutdown: F) -> SessionState
    where
        F: Future<Output = ()>,
    {
        self.mount();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = self.inbox.recv() => match received {
                    Some(message) => self.on_message(message),
                    None => break,
                },
                Some(command) = self.commands.recv() => self.on_command(command).await,
            }
        }

        self.unmount();
        self.state
    }

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartGame => self.start_game(),
            SessionCommand::RefetchGame { reply } => {
                let payload = self.refetch_game().await;
                if reply.send(payload).is_err() {
                    debug!("refetch requester went away");
                }
            }
        }
    }

    fn on_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Game {
                generation,
                payload,
            } => match self.game_poller.admit(generation) {
                Ok(()) => self.dispatch(SessionEvent::GameFetched(payload)),
                Err(err) => debug!(error = %err, "dropped game result"),
            },
            SessionMessage::Phase {
                generation,
                turn_id,
                payload,
            } => match self.phase_poller.admit(generation) {
                Ok(()) => self.dispatch(SessionEvent::PhaseFetched(payload)),
                Err(err) => debug!(turn_id = %turn_id, error = %err, "dropped phase result"),
            },
            SessionMessage::StartGameSettled { ticket, payload } => {
                if let Some(event) = self.actions.settle(ticket, payload) {
                    self.dispatch(event);
                }
            }
        }
    }

    fn dispatch(&mut self, event: SessionEvent) {
        self.fold(event);
        self.publish();
    }

    fn fold(&mut self, event: SessionEvent) {
        debug!(event = event.name(), "applying session event");
        self.state.apply_mut(event);
        self.reconcile();
    }

    /// Bring the pollers in line with the poll flags.
    fn reconcile(&mut self) {
        if !self.mounted {
            return;
        }

        let flags = self.state.poll_flags();

        if flags.game {
            self.game_poller.start();
        } else {
            self.game_poller.stop();
        }

        self.phase_poller.set_turn(self.state.current_turn_id());

        if flags.phase {
            self.phase_poller.start();
        } else {
            self.phase_poller.stop();
        }

        self.abandon_idle_loads();
    }

    /// Clear loading markers left by subscriptions cancelled before answering.
    fn abandon_idle_loads(&mut self) {
        if self.state.game().loading && !self.game_poller.is_polling() {
            let game = self.state.game().abandoned();
            self.state.apply_mut(SessionEvent::GameFetched(game));
        }
        if self.state.phase().loading && !self.phase_poller.is_polling() {
            let phase = self.state.phase().abandoned();
            self.state.apply_mut(SessionEvent::PhaseFetched(phase));
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }
}
