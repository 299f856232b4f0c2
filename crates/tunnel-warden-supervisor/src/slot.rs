//! Single-slot registry for the one live session.

use std::sync::Arc;

use tunnel_warden_core::{ProcessControl, Session, SessionId};

/// Session occupying the slot, plus its process once spawned.
pub(crate) struct ActiveSession {
    pub(crate) session: Session,
    pub(crate) control: Option<Arc<dyn ProcessControl>>,
}

/// Holds at most one session. Acquisition fails while occupied.
#[derive(Default)]
pub(crate) struct SessionSlot {
    active: Option<ActiveSession>,
}

impl SessionSlot {
    /// Place `session` in the slot if it is empty.
    ///
    /// Returns the session back when the slot is already occupied.
    pub(crate) fn try_acquire(&mut self, session: Session) -> Result<(), Session> {
        if self.active.is_some() {
            return Err(session);
        }
        self.active = Some(ActiveSession {
            session,
            control: None,
        });
        Ok(())
    }

    /// Empty the slot if it holds `id`.
    pub(crate) fn release(&mut self, id: SessionId) -> Option<ActiveSession> {
        if self.holds(id) {
            self.active.take()
        } else {
            None
        }
    }

    pub(crate) fn holds(&self, id: SessionId) -> bool {
        self.active.as_ref().is_some_and(|a| a.session.id() == id)
    }

    /// The active session if it is `id`.
    pub(crate) fn get(&self, id: SessionId) -> Option<&ActiveSession> {
        self.active.as_ref().filter(|a| a.session.id() == id)
    }

    /// The active session if it is `id`.
    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut ActiveSession> {
        self.active.as_mut().filter(|a| a.session.id() == id)
    }

    pub(crate) const fn current(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub(crate) const fn current_mut(&mut self) -> Option<&mut ActiveSession> {
        self.active.as_mut()
    }
}
