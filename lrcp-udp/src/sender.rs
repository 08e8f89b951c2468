//! Outbound stream state for one session.
//!
//! [`StreamSender`] owns every byte the application has produced for the
//! peer, addressed by stream offset, together with the highest offset the
//! peer has acknowledged.
//!
//! # Retransmission contract
//!
//! - Nothing is sent when bytes are produced; each retransmission tick
//!   re-emits the **whole** unacknowledged tail.
//! - The tail is cut into Data messages at line terminators.  A chunk is at
//!   most `min(newline, MAX_CHUNK_LEN - 1) + 1` bytes and is shortened
//!   further when its escaped, framed form would exceed
//!   [`MAX_DATAGRAM_LEN`].
//! - Bytes after the last `\n` are never sent.
//! - Only an Ack moves the acknowledged offset.  A tick sends but changes
//!   nothing.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use crate::packet::{
    data_overhead, escaped_width, Packet, SessionId, MAX_CHUNK_LEN, MAX_DATAGRAM_LEN,
};

/// Result of applying a peer's Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledged offset moved forward by `newly_acked` bytes.
    Advanced { newly_acked: u64 },
    /// Duplicate or stale (lower than already recorded); ignored.
    Unchanged,
    /// The peer acknowledged bytes that were never produced.
    Violation { sent_len: u64 },
}

/// Send-side state for one session.
///
/// # Offset layout
///
/// ```text
///  0          acked                     sent_len
///  ├──────────┼─────────────────────────┤
///  │ released │ <── unacked (buffer) ──▶ │
/// ```
#[derive(Debug, Default)]
pub struct StreamSender {
    /// Stream offset acknowledged by the peer; also the offset of
    /// `buffer[0]`.
    acked: u64,

    /// Produced bytes not yet acknowledged.
    buffer: Vec<u8>,
}

impl StreamSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append application output to the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Total bytes ever produced.
    pub fn sent_len(&self) -> u64 {
        self.acked + self.buffer.len() as u64
    }

    /// Highest offset acknowledged by the peer.
    pub fn acked(&self) -> u64 {
        self.acked
    }

    /// The unacknowledged tail.
    pub fn unacked(&self) -> &[u8] {
        &self.buffer
    }

    /// `true` when at least one byte awaits acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Process an inbound Ack for `length` bytes.
    ///
    /// Acknowledged bytes are released.  An Ack beyond [`sent_len`] leaves
    /// the state untouched and reports a [`AckOutcome::Violation`]; the
    /// caller closes the session.
    ///
    /// [`sent_len`]: StreamSender::sent_len
    pub fn on_ack(&mut self, length: u64) -> AckOutcome {
        let sent_len = self.sent_len();
        if length > sent_len {
            return AckOutcome::Violation { sent_len };
        }
        if length <= self.acked {
            return AckOutcome::Unchanged;
        }

        let newly_acked = length - self.acked;
        // newly_acked <= buffer.len() because length <= sent_len.
        self.buffer.drain(..newly_acked as usize);
        self.acked = length;
        AckOutcome::Advanced { newly_acked }
    }

    /// Data messages covering the unacknowledged tail, in stream order.
    pub fn retransmit_packets(&self, session: &SessionId) -> Vec<Packet> {
        let mut packets = Vec::new();
        let mut position = self.acked;
        let mut data = &self.buffer[..];

        while !data.is_empty() {
            let budget = MAX_DATAGRAM_LEN.saturating_sub(data_overhead(session, position));
            let Some(len) = next_chunk_len(data, budget) else {
                break;
            };
            if len == 0 {
                log::warn!("[session {session}] id too long to frame data at {position}");
                break;
            }

            packets.push(Packet::Data {
                session: session.clone(),
                position,
                payload: data[..len].to_vec(),
            });
            position += len as u64;
            data = &data[len..];
        }
        packets
    }
}

/// Length of the next chunk to send from `data`, or `None` when `data` holds
/// no complete line.  `budget` is the number of escaped bytes that fit.
fn next_chunk_len(data: &[u8], budget: usize) -> Option<usize> {
    let newline = data.iter().position(|&b| b == b'\n')?;
    let limit = newline.min(MAX_CHUNK_LEN - 1) + 1;

    let mut width = 0;
    Some(
        data[..limit]
            .iter()
            .take_while(|&&b| {
                width += escaped_width(b);
                width <= budget
            })
            .count(),
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
