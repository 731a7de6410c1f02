//! Applies client commands to sessions and publishes the resulting events.

use std::sync::Arc;

use huddle_core::{Command, Rejection, SessionEvent, SessionId, SessionSnapshot};
use huddle_telemetry::MetricsRecorder;
use tokio::sync::broadcast;
use tracing::debug;

use crate::client::{ClientId, ClientRegistry};
use crate::registry::{LockedSession, SessionRegistry};

pub const TRANSITIONS: &str = "huddle.transitions";
pub const REJECTIONS: &str = "huddle.rejections";
pub const SESSIONS: &str = "huddle.sessions";
pub const REVEAL_PARTICIPANTS: &str = "huddle.reveal.participants";

/// An event together with the clients attached to its session at the moment
/// it was published.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub event: SessionEvent,
    pub recipients: Vec<ClientId>,
}

/// Owns every live session and the channel its events leave on.
pub struct SessionHub {
    registry: SessionRegistry,
    clients: Arc<ClientRegistry>,
    events: broadcast::Sender<Delivery>,
    metrics: Arc<MetricsRecorder>,
}

impl SessionHub {
    pub fn new(
        broadcast_capacity: usize,
        clients: Arc<ClientRegistry>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let (events, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            registry: SessionRegistry::new(),
            clients,
            events,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.events.subscribe()
    }

    /// Run one command against a session.
    ///
    /// Only a join may create the session. The event is published while the
    /// session is still locked, so subscribers see events in the order the
    /// transitions happened.
    pub fn apply(&self, session_id: &SessionId, command: Command) -> Result<SessionEvent, Rejection> {
        let session = self.lock(session_id, &command)?;
        self.finish(session_id, session, command)
    }

    /// Like [`apply`](Self::apply), but `guard` runs first with the session
    /// locked. When it returns `false` nothing is applied and `None` comes
    /// back.
    ///
    /// A guard that attaches a connection, or checks whether a seat is still
    /// held, cannot interleave with another transition on the same session.
    pub fn apply_if(
        &self,
        session_id: &SessionId,
        command: Command,
        guard: impl FnOnce() -> bool,
    ) -> Option<Result<SessionEvent, Rejection>> {
        let session = match self.lock(session_id, &command) {
            Ok(session) => session,
            Err(rejection) => return Some(Err(rejection)),
        };
        if guard() {
            return Some(self.finish(session_id, session, command));
        }

        let reclaim = session.is_empty();
        drop(session);
        if reclaim {
            self.reclaim(session_id);
            self.metrics
                .gauge_set(SESSIONS, &[], self.registry.len() as f64);
        }
        debug!(session_id = %session_id, kind = command.kind(), "command skipped");
        None
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        self.registry.snapshot(session_id)
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshots()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.registry.contains(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    fn lock(&self, session_id: &SessionId, command: &Command) -> Result<LockedSession, Rejection> {
        let Some(session) = self.registry.lock(session_id, command.creates_session()) else {
            return Err(self.rejected(session_id, command.kind(), Rejection::SessionNotFound));
        };
        if session.created() {
            debug!(session_id = %session_id, "session created");
        }
        Ok(session)
    }

    fn finish(
        &self,
        session_id: &SessionId,
        mut session: LockedSession,
        command: Command,
    ) -> Result<SessionEvent, Rejection> {
        let kind = command.kind();
        let participant_id = command.participant_id().cloned();

        let result = session.apply(command);
        if let Ok(event) = &result {
            if matches!(event, SessionEvent::CardsReveal { .. }) {
                self.metrics
                    .histogram_observe(REVEAL_PARTICIPANTS, &[], session.len() as f64);
            }
            let delivery = Delivery {
                event: event.clone(),
                recipients: self.clients.clients_for_session(session_id),
            };
            // No receivers just means nobody is connected yet.
            let _ = self.events.send(delivery);
        }
        let reclaim = session.is_empty();
        drop(session);

        // The session lock is released before touching the map again.
        if reclaim {
            self.reclaim(session_id);
        }
        self.metrics
            .gauge_set(SESSIONS, &[], self.registry.len() as f64);

        match result {
            Ok(event) => {
                self.metrics.counter_inc(TRANSITIONS, &[("kind", kind)], 1);
                debug!(
                    session_id = %session_id,
                    participant_id = participant_id.as_ref().map(|p| p.as_str()),
                    kind,
                    event = event.event_type(),
                    "transition applied"
                );
                Ok(event)
            }
            Err(rejection) => Err(self.rejected(session_id, kind, rejection)),
        }
    }

    fn reclaim(&self, session_id: &SessionId) {
        if self.registry.remove(session_id) {
            debug!(session_id = %session_id, "session reclaimed");
        }
    }

    fn rejected(&self, session_id: &SessionId, kind: &str, rejection: Rejection) -> Rejection {
        self.metrics
            .counter_inc(REJECTIONS, &[("reason", rejection.reason())], 1);
        debug!(
            session_id = %session_id,
            kind,
            reason = rejection.reason(),
            "command rejected"
        );
        rejection
    }
}
