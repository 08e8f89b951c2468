//! Property-based tests using proptest
//!
//! These tests check the framing and stream invariants over randomly
//! generated payloads.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use lrcp_udp::app::LineReversal;
use lrcp_udp::packet::{escape, unescape, Packet, SessionId, MAX_DATAGRAM_LEN};
use lrcp_udp::sender::StreamSender;
use proptest::prelude::*;

// Property: unescape inverts escape for any bytes
proptest! {
    #[test]
    fn prop_escape_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..2000)) {
        let escaped = escape(&payload);
        prop_assert_eq!(unescape(&escaped).expect("escaped payload must decode"), payload);
    }
}

// Property: every slash in escaped output is preceded by an escaping backslash
proptest! {
    #[test]
    fn prop_escape_hides_slashes(payload in prop::collection::vec(any::<u8>(), 0..500)) {
        let escaped = escape(&payload);
        let mut i = 0;
        while i < escaped.len() {
            match escaped[i] {
                b'\\' => {
                    prop_assert!(i + 1 < escaped.len());
                    prop_assert!(escaped[i + 1] == b'\\' || escaped[i + 1] == b'/');
                    i += 2;
                }
                b'/' => prop_assert!(false, "bare slash at {}", i),
                _ => i += 1,
            }
        }
    }
}

// Property: decoding arbitrary bytes never panics
proptest! {
    #[test]
    fn prop_decode_never_panics(raw in prop::collection::vec(any::<u8>(), 0..1200)) {
        let _ = Packet::decode(&raw);
    }
}

// Property: lines produced do not depend on how input is split
proptest! {
    #[test]
    fn prop_lines_independent_of_chunking(
        input in prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'/', b'\n']), 0..300),
        cuts in prop::collection::vec(0usize..300, 0..10),
    ) {
        let whole = LineReversal::new().feed(&input);

        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(input.len())).collect();
        cuts.sort_unstable();
        let mut app = LineReversal::new();
        let mut pieces = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain(std::iter::once(input.len())) {
            pieces.extend(app.feed(&input[start..cut]));
            start = cut;
        }
        prop_assert_eq!(pieces, whole);
    }
}

// Property: retransmissions fit one datagram and cover the unacked tail
proptest! {
    #[test]
    fn prop_retransmit_fits_and_covers(
        lines in prop::collection::vec(
            prop::collection::vec(prop::sample::select(vec![b'x', b'/', b'\\']), 0..3000),
            1..4,
        ),
        acked_fraction in 0u64..=100,
    ) {
        let session = SessionId::new("1234567890").unwrap();
        let mut sender = StreamSender::new();
        for mut line in lines {
            line.push(b'\n');
            sender.push(&line);
        }
        sender.on_ack(sender.sent_len() * acked_fraction / 100);

        let mut covered = Vec::new();
        let mut expected_position = sender.acked();
        for packet in sender.retransmit_packets(&session) {
            prop_assert!(packet.encode().len() <= MAX_DATAGRAM_LEN);
            match packet {
                Packet::Data { position, payload, .. } => {
                    prop_assert_eq!(position, expected_position);
                    expected_position += payload.len() as u64;
                    covered.extend(payload);
                }
                other => prop_assert!(false, "unexpected {}", other),
            }
        }
        prop_assert_eq!(covered.as_slice(), sender.unacked());
    }
}
