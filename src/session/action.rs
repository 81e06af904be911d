//! Player-triggered actions.
//!
//! Starting the game is the one write the client performs. Its result is
//! folded straight into the session instead of waiting for the next game
//! poll, so the acting player sees the game start immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetch::FetchState;
use super::game::{GameSnapshot, GameStatus};
use super::message::SessionMessage;
use super::store::{SessionEvent, SessionState};
use super::transport::{SessionTransport, StartGameOutcome};
use crate::error::{ErrorInfo, TransportError};

/// Analytics event name for a start-game request.
pub const GAME_STARTED_EVENT: &str = "game_started";

/// A named analytics event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Receives analytics events.
pub trait AnalyticsSink: Send + Sync {
    fn log_event(&self, event: &AnalyticsEvent);
}

/// Writes analytics events to the `analytics` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn log_event(&self, event: &AnalyticsEvent) {
        info!(
            target: "analytics",
            event = %event.name,
            attributes = ?event.attributes,
            recorded_at = %event.recorded_at,
            "analytics event"
        );
    }
}

/// Issues the start-game mutation for one game.
pub struct GameActionCoordinator {
    game_id: String,
    user_id: String,
    transport: Arc<dyn SessionTransport>,
    analytics: Arc<dyn AnalyticsSink>,
    outbox: UnboundedSender<SessionMessage>,
    /// Ticket and task of the mutation in flight
    in_flight: Option<(u64, JoinHandle<()>)>,
    next_ticket: u64,
}

impl GameActionCoordinator {
    pub fn new(
        game_id: impl Into<String>,
        user_id: impl Into<String>,
        transport: Arc<dyn SessionTransport>,
        analytics: Arc<dyn AnalyticsSink>,
        outbox: UnboundedSender<SessionMessage>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            user_id: user_id.into(),
            transport,
            analytics,
            outbox,
            in_flight: None,
            next_ticket: 0,
        }
    }

    /// A start-game mutation is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// First half of a start: check the request makes sense, record it, and
    /// return the phase reset to apply before the mutation goes out.
    ///
    /// Returns `None` when a start is already in flight or the game has
    /// already started or ended.
    pub fn begin_start(&self, state: &SessionState) -> Option<SessionEvent> {
        if self.is_loading() {
            debug!(game_id = %self.game_id, "start game already in flight");
            return None;
        }

        let status = state.game().data.as_ref().map(|g| g.status);
        if matches!(status, Some(GameStatus::Started | GameStatus::Ended)) {
            debug!(game_id = %self.game_id, status = ?status, "start game ignored");
            return None;
        }

        self.analytics.log_event(
            &AnalyticsEvent::new(GAME_STARTED_EVENT)
                .with_attribute("userId", self.user_id.as_str())
                .with_attribute("gameId", self.game_id.as_str()),
        );

        Some(SessionEvent::phase_cleared(state.phase()))
    }

    /// Second half of a start: send the mutation.
    ///
    /// The result arrives as [`SessionMessage::StartGameSettled`].
    pub fn issue_start(&mut self) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let transport = Arc::clone(&self.transport);
        let outbox = self.outbox.clone();
        let game_id = self.game_id.clone();
        info!(game_id = %game_id, ticket, "starting game");

        let task = tokio::spawn(async move {
            let payload = fold_outcome(&game_id, transport.start_game(&game_id).await);
            if outbox
                .send(SessionMessage::StartGameSettled { ticket, payload })
                .is_err()
            {
                debug!(game_id = %game_id, ticket, "session closed before start game settled");
            }
        });

        self.in_flight = Some((ticket, task));
        ticket
    }

    /// Turn a settled mutation into the event to fold, if it is the one in
    /// flight.
    pub fn settle(&mut self, ticket: u64, payload: FetchState<GameSnapshot>) -> Option<SessionEvent> {
        match &self.in_flight {
            Some((current, _)) if *current == ticket => {
                self.in_flight = None;
                Some(SessionEvent::GameFetched(payload))
            }
            _ => {
                debug!(game_id = %self.game_id, ticket, "dropping result of abandoned start game");
                None
            }
        }
    }

    /// Abandon the mutation in flight.
    pub fn cancel(&mut self) {
        if let Some((ticket, task)) = self.in_flight.take() {
            debug!(game_id = %self.game_id, ticket, "start game abandoned");
            task.abort();
        }
    }
}

impl Drop for GameActionCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Mutation result as the game fetch state to fold.
fn fold_outcome(
    game_id: &str,
    result: Result<StartGameOutcome, TransportError>,
) -> FetchState<GameSnapshot> {
    match result {
        Ok(StartGameOutcome::Started(game)) => FetchState::ready(game),
        Ok(StartGameOutcome::Rejected { kind }) => {
            warn!(game_id = %game_id, kind = %kind, "start game rejected");
            FetchState::failed(ErrorInfo::rejected(kind), None)
        }
        Err(err) => {
            warn!(game_id = %game_id, error = %err, "start game request failed");
            FetchState::failed(err.into(), None)
        }
    }
}
