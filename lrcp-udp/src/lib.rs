//! `lrcp-udp` — the Line Reversal Control Protocol: reliable, ordered byte
//! streams carried in small text datagrams over UDP.
//!
//! # Architecture
//!
//! ```text
//!   UDP datagram
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └────┬──────┘
//!       │ Packet
//!  ┌────▼──────────────────────────────┐
//!  │  Server  (dispatch loop + writer) │
//!  └────┬──────────────────────────────┘
//!       │ session id
//!  ┌────▼──────┐        ┌──────────────────────────────────────┐
//!  │ Registry  │───────▶│ Session                              │
//!  └───────────┘        │  Receiver ─▶ LineReversal ─▶ Sender  │
//!                       │          RetransmitTimer ──┘         │
//!                       └──────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]   — wire format (escape / parse / serialise)
//! - [`state`]    — session lifecycle states
//! - [`receiver`] — inbound cursor and in-order acceptance
//! - [`app`]      — line splitting and reversal
//! - [`sender`]   — outbound buffer, ack tracking, chunking
//! - [`timer`]    — retransmission tick
//! - [`session`]  — per-session actor
//! - [`registry`] — session id to session map
//! - [`socket`]   — async UDP socket abstraction
//! - [`server`]   — datagram dispatch and reply writing
//! - [`config`]   — server and session settings

pub mod app;
pub mod config;
pub mod packet;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod server;
pub mod session;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::{ServerConfig, SessionConfig};
pub use packet::{Packet, PacketError, SessionId};
pub use registry::Registry;
pub use server::Server;
pub use session::SessionError;
pub use socket::SocketError;
