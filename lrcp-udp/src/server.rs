//! UDP front end: decode datagrams, route them to sessions, send replies.
//!
//! ```text
//!   Socket::recv_from ──▶ handle_packet ──▶ Registry ──▶ SessionHandle
//!                              │                             │
//!                              ▼ reply                       ▼ retransmits
//!                         ┌──────────────── Outbox ────────────────┐
//!                         └──────────▶ writer task ──▶ Socket::send_to
//! ```
//!
//! The dispatch loop never sends directly.  Replies and session output share
//! one unbounded outbox drained by a single writer task, so a slow send never
//! holds up the next datagram.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::config::ServerConfig;
use crate::packet::Packet;
use crate::registry::Registry;
use crate::session::Outbox;
use crate::socket::{Socket, SocketError};

/// Work out the reply (if any) for one decoded packet from `from`.
///
/// Unknown or closed sessions get `/close/ID/`; a Close is always echoed.
/// Nothing here waits for a session's event loop, so one busy session never
/// delays the next datagram.
pub async fn handle_packet(
    registry: &Registry,
    packet: Packet,
    from: SocketAddr,
) -> Option<Packet> {
    match packet {
        Packet::Connect { session } => {
            let handle = registry.connect(session.clone(), from);
            match handle.on_connect().await {
                Ok(length) => Some(Packet::Ack { session, length }),
                Err(e) => {
                    log::debug!("[server] connect: {e}");
                    Some(Packet::Close { session })
                }
            }
        }
        Packet::Data {
            session,
            position,
            payload,
        } => match registry.dispatch_data(&session, position, &payload).await {
            Ok(length) => Some(Packet::Ack { session, length }),
            Err(e) => {
                log::debug!("[server] data: {e}");
                Some(Packet::Close { session })
            }
        },
        Packet::Ack { session, length } => match registry.dispatch_ack(&session, length) {
            Ok(()) => None,
            Err(e) => {
                log::debug!("[server] ack: {e}");
                Some(Packet::Close { session })
            }
        },
        Packet::Close { session } => {
            if !session.is_empty() && registry.remove(&session) {
                log::info!("[server] session {session} closed by {from}");
            }
            Some(Packet::Close { session })
        }
    }
}

/// A bound LRCP server.
#[derive(Debug)]
pub struct Server {
    socket: Arc<Socket>,
    registry: Registry,
    outbox: Outbox,
    outbox_rx: UnboundedReceiver<(SocketAddr, Packet)>,
}

impl Server {
    /// Bind the listening socket and build an empty registry.
    pub async fn bind(config: ServerConfig) -> Result<Self, SocketError> {
        let socket = Arc::new(Socket::bind(config.bind).await?);
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let registry = Registry::new(outbox.clone(), config.session);
        log::info!("[server] listening on {}", socket.local_addr);
        Ok(Self {
            socket,
            registry,
            outbox,
            outbox_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve until a socket I/O error occurs.
    pub async fn run(self) -> Result<(), SocketError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves or a socket I/O error occurs.  Every
    /// session is closed on the way out.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), SocketError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            socket,
            registry,
            outbox,
            outbox_rx,
        } = self;

        let writer = tokio::spawn(write_loop(Arc::clone(&socket), outbox_rx));

        let result = tokio::select! {
            r = dispatch_loop(&socket, &registry, &outbox) => r,
            () = shutdown => {
                log::info!("[server] shutting down");
                Ok(())
            }
        };

        registry.shutdown();
        writer.abort();
        result
    }
}

async fn dispatch_loop(
    socket: &Socket,
    registry: &Registry,
    outbox: &Outbox,
) -> Result<(), SocketError> {
    loop {
        let (packet, from) = match socket.recv_from().await {
            Ok(received) => received,
            Err(e) if e.is_malformed() => {
                log::debug!("[server] dropped: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(reply) = handle_packet(registry, packet, from).await {
            // The writer only stops when the server does.
            let _ = outbox.send((from, reply));
        }
    }
}

async fn write_loop(socket: Arc<Socket>, mut rx: UnboundedReceiver<(SocketAddr, Packet)>) {
    while let Some((dest, packet)) = rx.recv().await {
        if let Err(e) = socket.send_to(&packet, dest).await {
            log::warn!(
                "[server] send to {dest} for session {} failed: {e}",
                packet.session()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
