//! Wire-format definitions for LRCP messages.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the textual, slash-delimited record grammar.
//! - Serialising a [`Packet`] into the bytes of one datagram.
//! - Parsing a raw datagram back into a [`Packet`], returning a
//!   [`PacketError`] for anything malformed.
//! - Escaping and unescaping the reserved `/` and `\` bytes inside Data
//!   payloads.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//! /connect/<session>/
//! /data/<session>/<position>/<escaped payload>/
//! /ack/<session>/<length>/
//! /close/<session>/
//! ```
//!
//! `<session>`, `<position>` and `<length>` are runs of ASCII digits.  The
//! session id of a Close may be empty.  A datagram longer than
//! [`MAX_DATAGRAM_LEN`] bytes is rejected without being parsed.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Largest datagram accepted or produced, in bytes.
pub const MAX_DATAGRAM_LEN: usize = 1000;

/// Upper bound on the unescaped length of one retransmitted Data chunk.
pub const MAX_CHUNK_LEN: usize = 975;

const ESCAPE: u8 = b'\\';
const SLASH: u8 = b'/';

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Textual session identifier.
///
/// Ids are compared as text, never as numbers: `"007"` and `"7"` name two
/// different sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Build an id from a string of ASCII digits.  The empty id is allowed
    /// (it is only meaningful in a Close message).
    pub fn new(id: impl Into<String>) -> Result<Self, PacketError> {
        let id = id.into();
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PacketError::InvalidSessionId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of the id on the wire.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn from_field(field: &[u8], allow_empty: bool) -> Result<Self, PacketError> {
        if (field.is_empty() && !allow_empty) || !field.iter().all(u8::is_ascii_digit) {
            return Err(PacketError::InvalidSessionId);
        }
        // All ASCII digits, so this is valid UTF-8.
        Ok(Self(String::from_utf8_lossy(field).into_owned()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One LRCP control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Open (or re-open) a session.
    Connect { session: SessionId },
    /// `payload` (unescaped) starts at byte `position` of the sender's stream.
    Data {
        session: SessionId,
        position: u64,
        payload: Vec<u8>,
    },
    /// The sender has received `length` bytes of the addressed stream.
    Ack { session: SessionId, length: u64 },
    /// Terminate the session.
    Close { session: SessionId },
}

impl Packet {
    /// Session the message is addressed to.
    pub fn session(&self) -> &SessionId {
        match self {
            Packet::Connect { session }
            | Packet::Data { session, .. }
            | Packet::Ack { session, .. }
            | Packet::Close { session } => session,
        }
    }

    /// Serialise this packet into the bytes of one datagram.
    ///
    /// Data payloads are escaped; callers keep the result within
    /// [`MAX_DATAGRAM_LEN`] by sizing payloads with [`data_overhead`].
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Connect { session } => format!("/connect/{session}/").into_bytes(),
            Packet::Data {
                session,
                position,
                payload,
            } => {
                let mut buf = format!("/data/{session}/{position}/").into_bytes();
                buf.extend_from_slice(&escape(payload));
                buf.push(SLASH);
                buf
            }
            Packet::Ack { session, length } => format!("/ack/{session}/{length}/").into_bytes(),
            Packet::Close { session } => format!("/close/{session}/").into_bytes(),
        }
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if the datagram is oversized, matches none of the four
    /// record forms, or carries a badly escaped Data payload.  Every error is
    /// a reason to drop the datagram silently.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() > MAX_DATAGRAM_LEN {
            return Err(PacketError::Oversized(buf.len()));
        }

        let rest = buf.strip_prefix(b"/").ok_or(PacketError::UnknownMessage)?;
        let (kind, rest) = next_field(rest)?;

        match kind {
            b"connect" => {
                let (id, rest) = next_field(rest)?;
                expect_end(rest)?;
                Ok(Packet::Connect {
                    session: SessionId::from_field(id, false)?,
                })
            }
            b"close" => {
                let (id, rest) = next_field(rest)?;
                expect_end(rest)?;
                Ok(Packet::Close {
                    session: SessionId::from_field(id, true)?,
                })
            }
            b"ack" => {
                let (id, rest) = next_field(rest)?;
                let (length, rest) = next_field(rest)?;
                expect_end(rest)?;
                Ok(Packet::Ack {
                    session: SessionId::from_field(id, false)?,
                    length: parse_number(length)?,
                })
            }
            b"data" => {
                let (id, rest) = next_field(rest)?;
                let (position, rest) = next_field(rest)?;
                Ok(Packet::Data {
                    session: SessionId::from_field(id, false)?,
                    position: parse_number(position)?,
                    payload: decode_payload(rest)?,
                })
            }
            _ => Err(PacketError::UnknownMessage),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.encode()))
    }
}

/// Number of framing bytes a Data message for `session` at `position` adds
/// around its escaped payload.
pub fn data_overhead(session: &SessionId, position: u64) -> usize {
    // "/data/" + id + "/" + position + "/" + payload + "/"
    6 + session.len() + 1 + position.to_string().len() + 1 + 1
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// Escape `\` as `\\` and `/` as `\/`.
///
/// Backslashes are handled before slashes, so the output never contains a
/// `/` that is not preceded by an escaping backslash.
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &b in payload {
        if b == ESCAPE || b == SLASH {
            out.push(ESCAPE);
        }
        out.push(b);
    }
    out
}

/// Reverse [`escape`] with a single left-to-right scan.
///
/// Only `\\` and `\/` are valid escapes; a bare `/`, a backslash followed by
/// anything else, or a trailing lone backslash is rejected.
pub fn unescape(escaped: &[u8]) -> Result<Vec<u8>, PacketError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut bytes = escaped.iter().copied();
    while let Some(b) = bytes.next() {
        match b {
            ESCAPE => match bytes.next() {
                Some(next @ (ESCAPE | SLASH)) => out.push(next),
                Some(_) => return Err(PacketError::InvalidEscape),
                // The would-be terminator was itself escaped.
                None => return Err(PacketError::MissingTerminator),
            },
            SLASH => return Err(PacketError::UnescapedSlash),
            _ => out.push(b),
        }
    }
    Ok(out)
}

/// Number of bytes `b` occupies once escaped.
pub(crate) fn escaped_width(b: u8) -> usize {
    if b == ESCAPE || b == SLASH {
        2
    } else {
        1
    }
}

/// Decode the payload field of a Data message: everything after the
/// position field, including the message terminator.
fn decode_payload(field: &[u8]) -> Result<Vec<u8>, PacketError> {
    let body = field
        .strip_suffix(b"/")
        .ok_or(PacketError::MissingTerminator)?;

    // Cheap balance check: an escaped payload never holds more slashes than
    // backslashes.
    let slashes = body.iter().filter(|&&b| b == SLASH).count();
    let escapes = body.iter().filter(|&&b| b == ESCAPE).count();
    if slashes > escapes {
        return Err(PacketError::UnbalancedEscapes);
    }

    unescape(body)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Split off the next `/`-terminated field.
fn next_field(buf: &[u8]) -> Result<(&[u8], &[u8]), PacketError> {
    let end = buf
        .iter()
        .position(|&b| b == SLASH)
        .ok_or(PacketError::UnknownMessage)?;
    Ok((&buf[..end], &buf[end + 1..]))
}

fn expect_end(rest: &[u8]) -> Result<(), PacketError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(PacketError::UnknownMessage)
    }
}

fn parse_number(field: &[u8]) -> Result<u64, PacketError> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(PacketError::InvalidNumber);
    }
    field.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u64::from(d - b'0')))
            .ok_or(PacketError::InvalidNumber)
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a datagram is discarded without reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("datagram of {0} bytes exceeds the 1000-byte limit")]
    Oversized(usize),
    #[error("datagram matches no known message form")]
    UnknownMessage,
    #[error("session id is not a run of ASCII digits")]
    InvalidSessionId,
    #[error("numeric field is not a decimal u64")]
    InvalidNumber,
    #[error("data payload does not end with an unescaped '/'")]
    MissingTerminator,
    #[error("data payload has more '/' than '\\' bytes")]
    UnbalancedEscapes,
    #[error("data payload contains an unescaped '/'")]
    UnescapedSlash,
    #[error("data payload contains an invalid escape sequence")]
    InvalidEscape,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[test]
    fn decode_connect() {
        assert_eq!(
            Packet::decode(b"/connect/12345/"),
            Ok(Packet::Connect {
                session: id("12345")
            })
        );
    }

    #[test]
    fn decode_data_unescapes_payload() {
        let pkt = Packet::decode(b"/data/12345/0/hello\n/").unwrap();
        assert_eq!(
            pkt,
            Packet::Data {
                session: id("12345"),
                position: 0,
                payload: b"hello\n".to_vec(),
            }
        );

        let pkt = Packet::decode(br"/data/1/7/a\/b\\c/").unwrap();
        assert_eq!(
            pkt,
            Packet::Data {
                session: id("1"),
                position: 7,
                payload: br"a/b\c".to_vec(),
            }
        );
    }

    #[test]
    fn decode_ack_and_close() {
        assert_eq!(
            Packet::decode(b"/ack/12345/999/"),
            Ok(Packet::Ack {
                session: id("12345"),
                length: 999
            })
        );
        assert_eq!(
            Packet::decode(b"/close/12345/"),
            Ok(Packet::Close {
                session: id("12345")
            })
        );
    }

    #[test]
    fn close_accepts_empty_session() {
        assert_eq!(
            Packet::decode(b"/close//"),
            Ok(Packet::Close { session: id("") })
        );
    }

    #[test]
    fn other_messages_reject_empty_session() {
        assert_eq!(
            Packet::decode(b"/connect//"),
            Err(PacketError::InvalidSessionId)
        );
        assert_eq!(
            Packet::decode(b"/ack//5/"),
            Err(PacketError::InvalidSessionId)
        );
    }

    #[test]
    fn session_ids_are_textual() {
        let a = Packet::decode(b"/connect/007/").unwrap();
        let b = Packet::decode(b"/connect/7/").unwrap();
        assert_ne!(a.session(), b.session());
        assert_eq!(a.session().as_str(), "007");
    }

    #[test]
    fn oversized_datagram_rejected() {
        let mut buf = b"/data/1/0/".to_vec();
        buf.resize(MAX_DATAGRAM_LEN, b'a');
        buf.push(b'/');
        assert_eq!(
            Packet::decode(&buf),
            Err(PacketError::Oversized(MAX_DATAGRAM_LEN + 1))
        );
    }

    #[test]
    fn datagram_at_limit_accepted() {
        let mut buf = b"/data/1/0/".to_vec();
        buf.resize(MAX_DATAGRAM_LEN - 1, b'a');
        buf.push(b'/');
        assert!(Packet::decode(&buf).is_ok());
    }

    #[test]
    fn data_without_terminator_rejected() {
        assert_eq!(
            Packet::decode(b"/data/1/0/hello"),
            Err(PacketError::MissingTerminator)
        );
        // The final slash is escaped, so there is no terminator.
        assert_eq!(
            Packet::decode(br"/data/1/0/hello\/"),
            Err(PacketError::MissingTerminator)
        );
    }

    #[test]
    fn data_with_too_many_slashes_rejected() {
        assert_eq!(
            Packet::decode(b"/data/1/0/illegal data/has too many/parts/"),
            Err(PacketError::UnbalancedEscapes)
        );
    }

    #[test]
    fn balanced_but_bare_slash_rejected() {
        // An escaped backslash followed by a bare slash passes the balance
        // check but is still malformed.
        assert_eq!(
            Packet::decode(br"/data/1/0/a\\/b/"),
            Err(PacketError::UnescapedSlash)
        );
    }

    #[test]
    fn unknown_escape_rejected() {
        assert_eq!(
            Packet::decode(br"/data/1/0/a\nb/"),
            Err(PacketError::InvalidEscape)
        );
    }

    #[test]
    fn empty_payload_accepted() {
        assert_eq!(
            Packet::decode(b"/data/1/0//"),
            Ok(Packet::Data {
                session: id("1"),
                position: 0,
                payload: Vec::new(),
            })
        );
    }

    #[test]
    fn malformed_records_rejected() {
        for raw in [
            &b""[..],
            b"connect/1/",
            b"/connect/1",
            b"/connect/1/extra",
            b"/connect/abc/",
            b"/hello/1/",
            b"/ack/1/",
            b"/ack/1/x/",
            b"/ack/1/+5/",
            b"/ack/1/2/3/",
            b"/data/1/",
            b"/data/1/-1/x/",
        ] {
            assert!(Packet::decode(raw).is_err(), "{:?} decoded", raw);
        }
    }

    #[test]
    fn numeric_overflow_rejected() {
        assert_eq!(
            Packet::decode(b"/ack/1/18446744073709551616/"),
            Err(PacketError::InvalidNumber)
        );
        assert_eq!(
            Packet::decode(b"/ack/1/18446744073709551615/"),
            Ok(Packet::Ack {
                session: id("1"),
                length: u64::MAX
            })
        );
    }

    #[test]
    fn encode_messages() {
        assert_eq!(
            Packet::Ack {
                session: id("12345"),
                length: 6
            }
            .encode(),
            b"/ack/12345/6/"
        );
        assert_eq!(
            Packet::Close {
                session: id("12345")
            }
            .encode(),
            b"/close/12345/"
        );
        assert_eq!(
            Packet::Data {
                session: id("12345"),
                position: 0,
                payload: b"olleh\n".to_vec(),
            }
            .encode(),
            b"/data/12345/0/olleh\n/"
        );
    }

    #[test]
    fn encode_escapes_backslash_before_slash() {
        let pkt = Packet::Data {
            session: id("9"),
            position: 3,
            payload: br"\/".to_vec(),
        };
        assert_eq!(pkt.encode(), br"/data/9/3/\\\//");
        assert_eq!(Packet::decode(&pkt.encode()), Ok(pkt));
    }

    #[test]
    fn data_overhead_matches_encoding() {
        let pkt = Packet::Data {
            session: id("12345"),
            position: 1234,
            payload: Vec::new(),
        };
        assert_eq!(data_overhead(&id("12345"), 1234), pkt.encode().len());
    }

    #[test]
    fn session_id_rejects_non_digits() {
        assert_eq!("12a".parse::<SessionId>(), Err(PacketError::InvalidSessionId));
        assert_eq!("42".parse::<SessionId>().unwrap().as_str(), "42");
    }
}
