//! Property tests for the framing codec and the receive window.

use boardlink::constants::PACKAGED_PAYLOAD_LEN;
use boardlink::link::{DecodeStats, FrameCodec, ReceiveBuffer, Sentinels};
use boardlink::LinkError;
use proptest::prelude::*;

fn payload_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=PACKAGED_PAYLOAD_LEN)
}

/// Payloads that lean on the reserved values so stuffing is exercised
fn sentinel_heavy_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![Just(0x7Eu8), Just(0x7F), Just(0x7D), any::<u8>()],
        0..=PACKAGED_PAYLOAD_LEN,
    )
}

fn sentinels() -> impl Strategy<Value = Sentinels> {
    (1u8..=255, any::<u8>(), any::<u8>())
        .prop_filter_map("sentinels must be distinct", |(h, f, e)| {
            Sentinels::new(h, f, e).ok()
        })
}

proptest! {
    #[test]
    fn roundtrip_through_receive_buffer(payload in sentinel_heavy_payload()) {
        let codec = FrameCodec::default();
        let frame = codec.encode(&payload).unwrap();

        let mut buffer = ReceiveBuffer::<128>::new();
        buffer.push_bytes(frame.as_bytes());
        let stats = DecodeStats::new();
        let report = codec.decode(&mut buffer, &stats);

        let payloads = report.into_payloads();
        prop_assert_eq!(payloads.len(), 1);
        prop_assert_eq!(payloads[0].as_bytes(), payload.as_slice());
        prop_assert_eq!(stats.valid(), 1);
    }

    #[test]
    fn roundtrip_with_custom_sentinels(payload in payload_bytes(), s in sentinels()) {
        let codec = FrameCodec::new(s);
        let frame = codec.encode(&payload).unwrap();
        let report = codec.scan(frame.as_bytes());
        prop_assert_eq!(report.decoded_count(), 1);
        prop_assert_eq!(report.frames()[0].payload.as_bytes(), payload.as_slice());
    }

    #[test]
    fn frame_length_accounts_for_escapes(payload in sentinel_heavy_payload()) {
        let codec = FrameCodec::default();
        let frame = codec.encode(&payload).unwrap();
        let k = payload
            .iter()
            .filter(|&&b| Sentinels::DEFAULT.is_reserved(b))
            .count();

        prop_assert_eq!(frame.stuffed_len(), payload.len() + k);
        prop_assert_eq!(frame.len(), payload.len() + k + 4);
        prop_assert_eq!(frame.last_index(), payload.len() + k + 3);
        prop_assert_eq!(frame.as_bytes()[1] as usize, payload.len() + k);
    }

    #[test]
    fn single_bit_flip_is_a_checksum_error(
        payload in sentinel_heavy_payload(),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let codec = FrameCodec::default();
        let mut bytes = codec.encode(&payload).unwrap().as_bytes().to_vec();

        // Any byte from the stuffed body through the checksum
        let span = bytes.len() - 3;
        let at = 2 + pick.index(span);
        bytes[at] ^= 1 << bit;

        let mut buffer = ReceiveBuffer::<128>::new();
        buffer.push_bytes(&bytes);
        let stats = DecodeStats::new();
        let report = codec.decode(&mut buffer, &stats);

        prop_assert_eq!(report.decoded_count(), 0);
        prop_assert_eq!(report.checksum_errors(), 1);
        let is_checksum_mismatch = matches!(report.status(), Err(LinkError::ChecksumMismatch { .. }));
        prop_assert!(is_checksum_mismatch);
        prop_assert_eq!(stats.bad_checksum(), 1);

        // The bad frame was consumed: a second pass finds nothing new
        let again = codec.decode(&mut buffer, &stats);
        prop_assert_eq!(again.checksum_errors(), 0);
        prop_assert_eq!(stats.bad_checksum(), 1);
    }

    #[test]
    fn noise_before_frame_is_skipped(
        noise in prop::collection::vec(any::<u8>().prop_filter("no header", |b| *b != 0x7E), 0..24),
        payload in payload_bytes(),
    ) {
        let codec = FrameCodec::default();
        let frame = codec.encode(&payload).unwrap();
        let mut stream = noise.clone();
        stream.extend_from_slice(frame.as_bytes());

        let report = codec.scan(&stream);
        prop_assert_eq!(report.decoded_count(), 1);
        prop_assert_eq!(report.frames()[0].range.start, noise.len());
    }

    #[test]
    fn concatenated_frames_decode_in_one_pass(a in payload_bytes(), b in payload_bytes()) {
        let codec = FrameCodec::default();
        let mut buffer = ReceiveBuffer::<256>::new();
        buffer.push_bytes(codec.encode(&a).unwrap().as_bytes());
        buffer.push_bytes(codec.encode(&b).unwrap().as_bytes());

        let payloads = codec.decode(&mut buffer, &DecodeStats::new()).into_payloads();
        prop_assert_eq!(payloads.len(), 2);
        prop_assert_eq!(payloads[0].as_bytes(), a.as_slice());
        prop_assert_eq!(payloads[1].as_bytes(), b.as_slice());
    }

    #[test]
    fn window_keeps_most_recent_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut buffer = ReceiveBuffer::<16>::new();
        for &b in &bytes {
            buffer.push_byte(b);
        }
        let keep = bytes.len().min(16);
        prop_assert_eq!(buffer.fill_count(), keep);
        let window: Vec<u8> = buffer.iter().collect();
        prop_assert_eq!(window.as_slice(), &bytes[bytes.len() - keep..]);
        let snapshot = buffer.snapshot();
        prop_assert_eq!(snapshot.as_slice(), &bytes[bytes.len() - keep..]);
    }

    #[test]
    fn bulk_push_matches_byte_push(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..8)) {
        let mut bulk = ReceiveBuffer::<16>::new();
        let mut single = ReceiveBuffer::<16>::new();
        for chunk in &chunks {
            bulk.push_bytes(chunk);
            for &b in chunk {
                single.push_byte(b);
            }
        }
        prop_assert_eq!(bulk.fill_count(), single.fill_count());
        prop_assert_eq!(bulk.stream_end(), single.stream_end());
        prop_assert_eq!(bulk.iter().collect::<Vec<_>>(), single.iter().collect::<Vec<_>>());
    }

    #[test]
    fn consume_survives_later_pushes(
        before in prop::collection::vec(1u8..=255, 8..16),
        after in prop::collection::vec(1u8..=255, 0..8),
        from in 0usize..8,
        len in 0usize..8,
    ) {
        let mut buffer = ReceiveBuffer::<32>::new();
        buffer.push_bytes(&before);
        let snapshot = buffer.snapshot();

        let end = (from + len).min(before.len());
        buffer.push_bytes(&after);
        let consumed = buffer.consume(snapshot.stream_range(from..end));
        prop_assert_eq!(consumed, end - from);

        let window: Vec<u8> = buffer.iter().collect();
        for (i, &b) in window.iter().enumerate() {
            let zeroed = (from..end).contains(&i);
            prop_assert_eq!(b == 0, zeroed);
        }
    }
}
