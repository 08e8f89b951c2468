//! Packet-level UDP I/O.
//!
//! [`Socket`] wraps `tokio::net::UdpSocket` so the rest of the crate deals in
//! [`Packet`]s.  It decodes on the way in, encodes on the way out, and writes
//! the traffic log; it makes no protocol decisions.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError};

/// Receive buffer size.  Larger than [`crate::packet::MAX_DATAGRAM_LEN`] so
/// oversized datagrams arrive whole and are rejected rather than truncated.
const RECV_BUFFER: usize = 65_535;

/// Errors from [`Socket`].
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A datagram arrived but is not valid LRCP.  Not fatal.
    #[error("malformed datagram from {from}: {source}")]
    Packet {
        source: PacketError,
        from: SocketAddr,
    },
}

impl SocketError {
    /// `true` when the socket itself is still usable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Packet { .. })
    }
}

/// A UDP socket that sends and receives [`Packet`]s.
///
/// Every method takes `&self`; the server shares one socket between its
/// dispatch loop and its writer task through an `Arc`.
#[derive(Debug)]
pub struct Socket {
    /// Bound address, with the OS-assigned port when bound to port 0.
    pub local_addr: SocketAddr,
    udp: UdpSocket,
}

impl Socket {
    /// Bind to `addr`.  Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let udp = UdpSocket::bind(addr).await?;
        Ok(Self {
            local_addr: udp.local_addr()?,
            udp,
        })
    }

    /// Send `packet` to `peer` as one datagram.
    pub async fn send_to(&self, packet: &Packet, peer: SocketAddr) -> Result<(), SocketError> {
        log::debug!("{peer} <-- {packet}");
        let wire = packet.encode();
        self.udp.send_to(&wire, peer).await?;
        Ok(())
    }

    /// Wait for the next datagram and decode it.
    ///
    /// A datagram that fails to decode yields [`SocketError::Packet`] naming
    /// its sender; callers drop it and keep receiving.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let (len, peer) = self.udp.recv_from(&mut buf).await?;
        let wire = &buf[..len];
        log::debug!("{peer} --> {}", String::from_utf8_lossy(wire));
        match Packet::decode(wire) {
            Ok(packet) => Ok((packet, peer)),
            Err(source) => Err(SocketError::Packet { source, from: peer }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::SessionId;

    #[tokio::test]
    async fn packets_cross_loopback() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let packet = Packet::Ack {
            session: SessionId::new("42").unwrap(),
            length: 7,
        };
        a.send_to(&packet, b.local_addr).await.unwrap();
        let (got, from) = b.recv_from().await.unwrap();
        assert_eq!(got, packet);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn malformed_datagram_names_sender() {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        raw.send_to(b"/nope/", sock.local_addr).await.unwrap();
        let err = sock.recv_from().await.unwrap_err();
        assert!(err.is_malformed());
        let sender = raw.local_addr().unwrap();
        assert!(matches!(err, SocketError::Packet { from, .. } if from == sender));
    }
}
