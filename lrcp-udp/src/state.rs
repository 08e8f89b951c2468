//! Session finite-state machine types.
//!
//! An LRCP session has no handshake beyond a single Connect/Ack exchange, so
//! its state diagram is short:
//!
//! ```text
//!  CREATED ──connect acked──▶ OPEN ──close / ack violation / eviction──▶ CLOSED
//! ```
//!
//! Creation and the reply to the first Connect happen atomically, so no
//! message is ever processed while a session is still `Created`.

/// All possible states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Registered, first Connect not yet answered.
    #[default]
    Created,
    /// Data and Ack messages are accepted.
    Open,
    /// Terminal; the session accepts nothing further and is removed.
    Closed,
}

impl SessionState {
    /// Answer a Connect.  Idempotent: an open session stays open and a
    /// closed one stays closed.
    pub fn on_connect(&mut self) {
        if *self == SessionState::Created {
            *self = SessionState::Open;
        }
    }

    /// Enter the terminal state.
    pub fn on_close(&mut self) {
        *self = SessionState::Closed;
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
