//! Process-wide map from session id to live session.
//!
//! Each session sits behind its own mutex, so transitions on one session are
//! serialized while different sessions proceed in parallel. Lock order is
//! always map shard, then session; nothing takes a shard lock while holding a
//! session lock.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dashmap::DashMap;
use huddle_core::{Session, SessionId, SessionSnapshot};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

struct SlotState {
    session: Session,
    /// Set once the slot has been dropped from the map. Anyone who locks a
    /// retired slot must go back to the registry.
    retired: bool,
}

type Slot = Arc<Mutex<SlotState>>;

/// Exclusive access to one session for the duration of a transition.
pub struct LockedSession {
    guard: ArcMutexGuard<RawMutex, SlotState>,
    created: bool,
}

impl LockedSession {
    /// Whether this lock brought the session into existence.
    pub fn created(&self) -> bool {
        self.created
    }
}

impl Deref for LockedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard.session
    }
}

impl DerefMut for LockedSession {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard.session
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a session, creating an empty one in the voting phase if `create`
    /// is set and none exists. Racing creators share a single session.
    pub fn lock(&self, id: &SessionId, create: bool) -> Option<LockedSession> {
        let mut created = false;
        loop {
            let slot = if create {
                let (slot, fresh) = self.get_or_create(id);
                created |= fresh;
                slot
            } else {
                self.slot(id)?
            };
            let guard = slot.lock_arc();
            if !guard.retired {
                return Some(LockedSession { guard, created });
            }
        }
    }

    /// Drop a session once it has no participants. No-op if it is missing or
    /// still occupied. Must not be called while holding a [`LockedSession`].
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions
            .remove_if(id, |_, slot| {
                let mut state = slot.lock();
                if state.session.is_empty() {
                    state.retired = true;
                    true
                } else {
                    false
                }
            })
            .is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<SessionSnapshot> {
        let slot = self.slot(id)?;
        let state = slot.lock();
        Some(state.session.snapshot())
    }

    /// Snapshots of every live session, ordered by id.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let slots: Vec<Slot> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut out: Vec<SessionSnapshot> = slots
            .iter()
            .map(|slot| slot.lock().session.snapshot())
            .collect();
        out.sort_by(|a, b| a.session_id.as_str().cmp(b.session_id.as_str()));
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn get_or_create(&self, id: &SessionId) -> (Slot, bool) {
        let mut fresh = false;
        let slot = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                fresh = true;
                Arc::new(Mutex::new(SlotState {
                    session: Session::new(id.clone()),
                    retired: false,
                }))
            })
            .clone();
        (slot, fresh)
    }

    fn slot(&self, id: &SessionId) -> Option<Slot> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }
}
