//! Property-based tests for the wire codecs.
//!
//! These verify that frame serialization round-trips for ALL well-formed
//! values, not just specific examples. Strategies generate arbitrary
//! configurations, blocks, and command matrices; decode(encode(f)) must be
//! identity for every frame type.

use bytes::Bytes;
use crankline_proto::{
    ChannelSet, ControlFrame, ControlMessage, DataFrame, LEGACY_SAMPLE_WIDTH, LegacyRequest,
    LegacyResponse, Opcode, SampleBlock, SetConfig,
};
use proptest::prelude::*;

/// Strategy for arbitrary known opcodes.
fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::SetConfig),
        Just(Opcode::Start),
        Just(Opcode::Stop),
        Just(Opcode::GetStatus),
        Just(Opcode::Ping),
        Just(Opcode::Ack),
        Just(Opcode::Err),
    ]
}

/// Strategy for arbitrary control frames (opaque payloads up to 1 KiB).
fn arbitrary_control_frame() -> impl Strategy<Value = ControlFrame> {
    (arbitrary_opcode(), prop::collection::vec(any::<u8>(), 0..1024))
        .prop_map(|(opcode, payload)| ControlFrame::new(opcode, payload))
}

/// Strategy for arbitrary SET_CONFIG payloads.
fn arbitrary_set_config() -> impl Strategy<Value = SetConfig> {
    (
        prop::option::of(1_u32..=10_000),
        prop::option::of(1_u16..=500),
        prop::option::of(prop::collection::vec(0_u8..45, 0..45)),
        prop::option::of(1_u16..=u16::MAX),
    )
        .prop_map(|(frequency, samples_per_block, channels, udp_port)| SetConfig {
            frequency,
            samples_per_block,
            channels,
            udp_port,
        })
}

/// Strategy for sample blocks with strictly increasing timestamps.
///
/// Finite channel values only: the payload is IEEE-754 on the wire, so
/// NaN would break `decode(encode(f)) == f` under `==` without being a
/// codec defect.
fn arbitrary_block(max_width: usize) -> impl Strategy<Value = SampleBlock> {
    let width = 2..=max_width;
    let samples = 1_usize..=20;
    (width, samples).prop_flat_map(|(width, samples)| {
        prop::collection::vec(-1.0e6_f64..1.0e6, samples * (width - 1)).prop_map(
            move |channel_values| {
                let mut values = Vec::with_capacity(samples * width);
                let mut rest = channel_values.into_iter();
                for sample in 0..samples {
                    values.push(sample as f64 * 0.02);
                    for _ in 1..width {
                        values.push(rest.next().unwrap_or_default());
                    }
                }
                SampleBlock::from_raw(width, values).expect("generated block is well formed")
            },
        )
    })
}

proptest! {
    #[test]
    fn control_frame_round_trip(frame in arbitrary_control_frame()) {
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = ControlFrame::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn set_config_message_round_trip(config in arbitrary_set_config()) {
        let message = ControlMessage::SetConfig(config);
        let frame = message.clone().into_frame().expect("should build frame");

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = ControlFrame::decode(&wire).expect("should decode");
        prop_assert_eq!(ControlMessage::from_frame(&parsed).expect("should parse"), message);
    }

    #[test]
    fn ack_err_payloads_are_opaque(payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let message = ControlMessage::Err(Bytes::from(payload.clone()));
        let frame = message.into_frame().expect("should build frame");

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = ControlFrame::decode(&wire).expect("should decode");
        match ControlMessage::from_frame(&parsed).expect("should parse") {
            ControlMessage::Err(bytes) => prop_assert_eq!(bytes.as_ref(), &payload[..]),
            other => prop_assert!(false, "unexpected message {other:?}"),
        }
    }

    #[test]
    fn data_frame_round_trip(sequence_id in any::<u32>(), block in arbitrary_block(46)) {
        let frame = DataFrame { sequence_id, block };

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = DataFrame::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn data_frame_rejects_any_truncation(
        block in arbitrary_block(8),
        cut in 1_usize..32,
    ) {
        let frame = DataFrame { sequence_id: 1, block };
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let keep = wire.len().saturating_sub(cut);
        prop_assert!(DataFrame::decode(&wire[..keep]).is_err());
    }

    #[test]
    fn legacy_request_round_trip(
        rows in 1_usize..64,
        seed in prop::collection::vec(any::<u8>(), 2),
    ) {
        let matrix: Vec<Vec<u8>> = (0..rows)
            .map(|row| vec![seed[0].wrapping_add(row as u8), seed[1]])
            .collect();
        let request = LegacyRequest::from_matrix(&matrix).expect("rectangular matrix");

        let mut wire = Vec::new();
        request.encode(&mut wire);

        let parsed = LegacyRequest::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed.codes(), request.codes());
        prop_assert_eq!(parsed.cols(), 2);
    }

    #[test]
    fn legacy_response_round_trip(block in arbitrary_block(LEGACY_SAMPLE_WIDTH)) {
        // Rebuild at exactly the legacy width.
        let resized = SampleBlock::from_raw(
            LEGACY_SAMPLE_WIDTH,
            block
                .iter()
                .map(|sample| {
                    let mut row = vec![sample.time];
                    row.extend(sample.channels.iter().copied());
                    row.resize(LEGACY_SAMPLE_WIDTH, 0.0);
                    row
                })
                .collect::<Vec<_>>()
                .concat(),
        )
        .expect("resized block is well formed");

        let response = LegacyResponse::from_block(resized).expect("legacy width");
        let mut wire = Vec::new();
        response.encode(&mut wire);

        let parsed = LegacyResponse::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed, response);
    }

    #[test]
    fn projection_width_matches_selection(
        block in arbitrary_block(46),
        indices in prop::collection::vec(0_u8..45, 0..16),
    ) {
        let max = usize::from(indices.iter().copied().max().unwrap_or(0));
        prop_assume!(max + 1 < block.width());

        let set = ChannelSet::new(indices).expect("indices in range");
        let projected = block.project(&set).expect("set fits block");

        prop_assert_eq!(projected.width(), 1 + set.len());
        prop_assert_eq!(projected.samples(), block.samples());
        for (original, kept) in block.iter().zip(projected.iter()) {
            prop_assert_eq!(kept.time, original.time);
        }
    }
}
