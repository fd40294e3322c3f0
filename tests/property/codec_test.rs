// tests/property/codec_test.rs

//! Property-based tests for framing: however the bytes are chunked on the
//! wire, the decoder yields the same messages in the same order.

use super::strategies::{destinations, event, room_id, rule};
use bytes::BytesMut;
use proptest::collection::vec;
use proptest::prelude::*;
use roomgraph::core::protocol::{FrameCodec, WireMessage};
use tokio_util::codec::Decoder;

fn message() -> impl Strategy<Value = WireMessage> {
    prop_oneof![
        (room_id(), event()).prop_map(|(source, event)| WireMessage::Event { source, event }),
        (event(), destinations())
            .prop_map(|(event, destinations)| WireMessage::Result { event, destinations }),
        (room_id(), rule(), room_id()).prop_map(|(source, rule, destination)| {
            WireMessage::RegisterRule { source, rule, destination }
        }),
        (room_id(), rule(), room_id()).prop_map(|(source, rule, destination)| {
            WireMessage::UnregisterRule { source, rule, destination }
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_chunked_stream_decodes_in_order(
        messages in vec(message(), 1..6),
        chunk in 1usize..64,
    ) {
        let mut codec = FrameCodec::default();
        let mut wire = Vec::new();
        for message in &messages {
            wire.extend_from_slice(&codec.encode_frame(message).unwrap());
        }

        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(message) = codec.decode(&mut buf).unwrap() {
                decoded.push(message);
            }
        }
        prop_assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        prop_assert_eq!(decoded, messages);
    }

    #[test]
    fn test_any_strict_prefix_is_truncated(
        message in message(),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut codec = FrameCodec::default();
        let frame = codec.encode_frame(&message).unwrap();
        let len = cut.index(frame.len() - 1) + 1;
        let mut buf = BytesMut::from(&frame[..len]);
        if len == frame.len() {
            prop_assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(message));
        } else {
            prop_assert!(codec.decode_eof(&mut buf).is_err());
        }
    }
}
