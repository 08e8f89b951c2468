//! One LRCP session: inbound cursor, outbound stream and retransmit loop.
//!
//! # Architecture
//!
//! ```text
//!  dispatcher                        SessionHandle
//!      │ on_data(pos, bytes)          ┌──────────────────────────────┐
//!      ├────────────────────────────▶ │ Mutex<Inbound>               │
//!      │ ◀── received_len (for Ack) ─ │   SessionState               │
//!      │                              │   StreamReceiver ─ lines ──┐ │
//!      │ on_ack(len)                  │                            │ │
//!      ├──────────────┐               │ unbounded SessionEvent mbox ◀┘│
//!      │              └─────────────▶ │                              │
//!      │                              └──────────────┬───────────────┘
//!      │                                             │ event_loop task
//!      │                                   StreamSender + RetransmitTimer
//!      │                                             │
//!      ▼                                             ▼
//!   outbox ◀──────────── Data / Close packets ───────┘
//! ```
//!
//! The inbound half answers the dispatcher synchronously so every Data
//! message can be acked with the true cursor.  Everything that touches the
//! outbound stream is serialised through the session's event loop: acks,
//! produced lines and retransmission ticks are handled one at a time in
//! arrival order, so the loop owns [`StreamSender`] without locking.
//!
//! Neither direction ever waits on the event loop.  The mailbox is
//! unbounded, so the dispatcher hands over acks and produced lines and moves
//! straight on to the next datagram, whatever state this session is in.
//! Sending is fire-and-forget too: packets are pushed onto the shared outbox
//! and written to the socket by the server's writer task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::packet::{Packet, SessionId};
use crate::receiver::{DataOutcome, StreamReceiver};
use crate::sender::{AckOutcome, StreamSender};
use crate::state::SessionState;
use crate::timer::RetransmitTimer;

/// Outgoing datagrams, addressed to a peer.  Drained by a single writer.
pub type Outbox = mpsc::UnboundedSender<(SocketAddr, Packet)>;

/// Called once by a session that closes itself, so its owner can forget it.
pub type Evict = Box<dyn FnOnce() + Send + 'static>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced to the dispatcher.  Both are answered with a Close.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} is closed")]
    Closed(SessionId),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Work items processed sequentially by a session's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer acknowledged this many bytes.
    AckReceived(u64),
    /// The application produced output to append to the stream.
    LineProduced(Vec<u8>),
    /// Retransmit the unacknowledged tail now.
    TickFired,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inbound {
    state: SessionState,
    stream: StreamReceiver,
}

/// Shared handle to a running session.
///
/// Created by [`crate::registry::Registry::connect`]; the event loop task is
/// spawned alongside and stops when the handle is closed.
pub struct SessionHandle {
    id: SessionId,
    /// Distinguishes successive sessions that reuse one id.
    serial: u64,
    peer: SocketAddr,
    inbound: Mutex<Inbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Create a session and spawn its event loop.
    ///
    /// `evict` runs if the session closes itself after an ack violation.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        id: SessionId,
        serial: u64,
        peer: SocketAddr,
        config: &SessionConfig,
        outbox: Outbox,
        evict: Evict,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = SessionTask {
            id: id.clone(),
            peer,
            sender: StreamSender::new(),
            outbox,
        };
        let timer = RetransmitTimer::start(&config.timers);
        log::info!(
            "[session {id}] opened for {peer}, retransmitting every {:?}",
            timer.period()
        );
        tokio::spawn(event_loop(task, events_rx, cancel.clone(), timer, evict));

        Arc::new(Self {
            id,
            serial,
            peer,
            inbound: Mutex::new(Inbound::default()),
            events: events_tx,
            cancel,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Address every outbound packet of this session goes to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn state(&self) -> SessionState {
        let mut inbound = self.inbound.lock().await;
        // Errors only when closed, which the state then reflects.
        let _ = self.ensure_open(&mut inbound);
        inbound.state
    }

    /// Answer a Connect.  Idempotent; returns the cursor for the Ack reply.
    pub async fn on_connect(&self) -> Result<u64, SessionError> {
        let mut inbound = self.inbound.lock().await;
        self.ensure_open(&mut inbound)?;
        inbound.state.on_connect();
        Ok(inbound.stream.received_len())
    }

    /// Apply a Data payload.  Returns the cursor to advertise in the Ack,
    /// whether or not the payload was accepted.
    ///
    /// Lines the payload completes are queued on the event loop before this
    /// returns.
    pub async fn on_data(&self, position: u64, payload: &[u8]) -> Result<u64, SessionError> {
        let mut inbound = self.inbound.lock().await;
        self.ensure_open(&mut inbound)?;

        match inbound.stream.on_data(position, payload) {
            DataOutcome::Accepted {
                received_len,
                output,
            } => {
                for line in output {
                    self.post(SessionEvent::LineProduced(line))?;
                }
                Ok(received_len)
            }
            DataOutcome::Rejected { received_len } => {
                log::debug!(
                    "[session {}] data at {position} rejected, cursor at {received_len}",
                    self.id
                );
                Ok(received_len)
            }
        }
    }

    /// Hand an Ack to the event loop.
    pub fn on_ack(&self, length: u64) -> Result<(), SessionError> {
        self.post(SessionEvent::AckReceived(length))
    }

    /// Retransmit now instead of waiting for the timer.
    pub fn tick(&self) -> Result<(), SessionError> {
        self.post(SessionEvent::TickFired)
    }

    /// Bytes received in order so far.
    pub async fn received_len(&self) -> u64 {
        self.inbound.lock().await.stream.received_len()
    }

    /// Stop the session.  Its event loop exits, pending events are dropped
    /// and any unterminated input line is discarded.  Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("[session {}] closed", self.id);
        }
        self.cancel.cancel();
    }

    fn ensure_open(&self, inbound: &mut Inbound) -> Result<(), SessionError> {
        if self.is_closed() {
            inbound.state.on_close();
            return Err(self.closed());
        }
        Ok(())
    }

    fn post(&self, event: SessionEvent) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(self.closed());
        }
        self.events.send(event).map_err(|_| self.closed())
    }

    fn closed(&self) -> SessionError {
        SessionError::Closed(self.id.clone())
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// State owned exclusively by a session's event loop.
struct SessionTask {
    id: SessionId,
    peer: SocketAddr,
    sender: StreamSender,
    outbox: Outbox,
}

impl SessionTask {
    /// Process one event.  Returns `false` when the session must close.
    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::AckReceived(length) => match self.sender.on_ack(length) {
                AckOutcome::Advanced { newly_acked } => {
                    log::debug!(
                        "[session {}] ack {length} (+{newly_acked}, {} unacked)",
                        self.id,
                        self.sender.unacked().len()
                    );
                    true
                }
                AckOutcome::Unchanged => {
                    log::debug!(
                        "[session {}] stale ack {length} (acked {})",
                        self.id,
                        self.sender.acked()
                    );
                    true
                }
                AckOutcome::Violation { sent_len } => {
                    log::warn!(
                        "[session {}] ack {length} beyond {sent_len} bytes sent; closing",
                        self.id
                    );
                    self.send(Packet::Close {
                        session: self.id.clone(),
                    });
                    false
                }
            },
            SessionEvent::LineProduced(bytes) => {
                self.sender.push(&bytes);
                true
            }
            SessionEvent::TickFired => {
                if !self.sender.has_unacked() {
                    return true;
                }
                for packet in self.sender.retransmit_packets(&self.id) {
                    self.send(packet);
                }
                true
            }
        }
    }

    fn send(&self, packet: Packet) {
        if self.outbox.send((self.peer, packet)).is_err() {
            log::debug!("[session {}] outbox closed, packet dropped", self.id);
        }
    }
}

async fn event_loop(
    mut task: SessionTask,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    mut timer: RetransmitTimer,
    evict: Evict,
) {
    let violated = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break false,
            event = events.recv() => match event {
                Some(event) => event,
                None => break false,
            },
            _ = timer.tick() => SessionEvent::TickFired,
        };

        if !task.handle(event) {
            break true;
        }
    };

    if violated {
        cancel.cancel();
        evict();
    }
    log::debug!("[session {}] event loop stopped", task.id);
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
