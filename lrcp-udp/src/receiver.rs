//! Inbound stream reconstruction for one session.
//!
//! [`StreamReceiver`] implements the receive side of LRCP:
//!
//! - Only **in-order** payloads are accepted (`position == received_len`).
//! - Payloads starting anywhere else, whether duplicates or beyond a gap,
//!   are discarded whole.  Nothing is buffered for later.
//! - After every Data message, accepted or not, the caller replies with an
//!   Ack carrying [`StreamReceiver::received_len`], which is the only signal
//!   the peer gets for resynchronising.
//!
//! Accepted bytes are fed straight into the session's [`LineReversal`]
//! application; whatever it produces is returned to the caller for queueing
//! on the outbound side.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use crate::app::LineReversal;

/// Result of applying one Data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// The payload extended the stream; `output` holds the application's
    /// response bytes, one entry per completed line.
    Accepted {
        received_len: u64,
        output: Vec<Vec<u8>>,
    },
    /// The payload did not start at the cursor and was dropped.
    Rejected { received_len: u64 },
}

impl DataOutcome {
    /// Cursor to advertise in the Ack reply.
    pub fn received_len(&self) -> u64 {
        match self {
            DataOutcome::Accepted { received_len, .. } | DataOutcome::Rejected { received_len } => {
                *received_len
            }
        }
    }
}

/// Receive-side state for one session.
#[derive(Debug, Default)]
pub struct StreamReceiver {
    /// Bytes accepted into the reconstructed stream so far.
    received_len: u64,

    /// Consumer of the reconstructed stream.
    app: LineReversal,
}

impl StreamReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a Data payload that claims to start at `position`.
    pub fn on_data(&mut self, position: u64, payload: &[u8]) -> DataOutcome {
        if position != self.received_len {
            return DataOutcome::Rejected {
                received_len: self.received_len,
            };
        }
        self.received_len += payload.len() as u64;
        DataOutcome::Accepted {
            received_len: self.received_len,
            output: self.app.feed(payload),
        }
    }

    /// Number of stream bytes received in order; the value every Ack carries.
    pub fn received_len(&self) -> u64 {
        self.received_len
    }

    /// Bytes of an unterminated line waiting in the application.
    pub fn pending_len(&self) -> usize {
        self.app.pending_len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
