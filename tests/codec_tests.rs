use espbridge::protocol::*;
use espbridge::telemetry::*;
use proptest::prelude::*;

#[test]
fn test_telemetry_wire_layout_is_little_endian() {
    let mut values = [0.0f32; TELEMETRY_CHANNELS];
    values[0] = 1.0;
    values[17] = -2.5;

    let bytes = TelemetryFrame::new(values).encode_binary();

    assert_eq!(bytes.len(), TELEMETRY_FRAME_SIZE);
    assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
    assert_eq!(&bytes[68..72], &(-2.5f32).to_le_bytes());
    assert!(bytes[4..68].iter().all(|b| *b == 0));
}

#[test]
fn test_structured_keys_in_channel_order() {
    let values: [f32; TELEMETRY_CHANNELS] = core::array::from_fn(|i| i as f32);
    let json = TelemetryFrame::new(values).encode_structured().unwrap();

    let mut cursor = 0;
    for (i, name) in FIELD_NAMES.iter().enumerate() {
        let key = format!("\"{name}\":");
        let at = json[cursor..].find(&key).map(|p| p + cursor);
        assert!(at.is_some(), "{name} missing or out of order in {json}");
        cursor = at.unwrap_or(cursor) + key.len();
        assert!(json[cursor..].starts_with(&format!("{}", i as f32)));
    }
}

#[test]
fn test_non_finite_channel_becomes_null() {
    let mut values = [1.0f32; TELEMETRY_CHANNELS];
    values[5] = f32::NAN;
    values[6] = f32::INFINITY;

    let json = TelemetryFrame::new(values).encode_structured().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert!(parsed["data5"].is_null());
    assert!(parsed["data6"].is_null());
    assert_eq!(parsed["data7"], 1.0);
}

#[test]
fn test_command_record_layout() {
    let record = CommandMessage::new("open_valve").encode_binary().unwrap();

    assert_eq!(record.len(), COMMAND_HEADER_SIZE + 10);
    assert_eq!(&record[0..2], &10u16.to_le_bytes());
    assert_eq!(&record[2..], b"open_valve");
}

#[test]
fn test_command_record_rejects_bad_input() {
    assert_eq!(
        CommandMessage::decode_binary(&[]),
        Err(ProtocolError::SizeMismatch { expected: COMMAND_HEADER_SIZE, actual: 0 })
    );

    // Header claims more bytes than follow
    let mut short = vec![250, 0];
    short.extend_from_slice(b"open");
    assert_eq!(
        CommandMessage::decode_binary(&short),
        Err(ProtocolError::SizeMismatch { expected: 252, actual: 6 })
    );

    // Trailing bytes past the declared length
    assert_eq!(
        CommandMessage::decode_binary(&[1, 0, b'a', 0]),
        Err(ProtocolError::SizeMismatch { expected: 3, actual: 4 })
    );

    assert_eq!(
        CommandMessage::decode_binary(&[2, 0, 0xC3, 0x28]),
        Err(ProtocolError::MalformedInput)
    );
}

#[test]
fn test_client_message_errors() {
    assert_eq!(CommandMessage::decode_structured("{"), Err(ProtocolError::MalformedInput));
    assert_eq!(CommandMessage::decode_structured(""), Err(ProtocolError::MalformedInput));
    assert_eq!(
        CommandMessage::decode_structured("{}"),
        Err(ProtocolError::MissingField(ACTION_FIELD))
    );
    assert_eq!(
        CommandMessage::decode_structured(r#"{"action":null}"#),
        Err(ProtocolError::InvalidField(ACTION_FIELD))
    );
    assert_eq!(
        CommandMessage::decode_structured(r#"["action"]"#),
        Err(ProtocolError::MissingField(ACTION_FIELD))
    );
}

#[test]
fn test_multibyte_action_is_carried_whole() {
    let action = "é".repeat(130);
    let text = serde_json::json!({ "action": action }).to_string();

    let command = CommandMessage::decode_structured(&text).unwrap();
    let record = command.encode_binary().unwrap();
    assert_eq!(record.len(), COMMAND_HEADER_SIZE + 260);

    let relayed = CommandMessage::decode_binary(&record).unwrap();
    assert_eq!(relayed.action(), action);
}

proptest! {
    #[test]
    fn prop_telemetry_binary_round_trip(values in proptest::array::uniform18(any::<f32>())) {
        let frame = TelemetryFrame::new(values);
        let decoded = TelemetryFrame::decode_binary(&frame.encode_binary()).unwrap();

        for (a, b) in decoded.values().iter().zip(values.iter()) {
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn prop_telemetry_rejects_wrong_length(bytes in proptest::collection::vec(any::<u8>(), 0..300)) {
        prop_assume!(bytes.len() != TELEMETRY_FRAME_SIZE);
        prop_assert_eq!(
            TelemetryFrame::decode_binary(&bytes),
            Err(ProtocolError::SizeMismatch { expected: TELEMETRY_FRAME_SIZE, actual: bytes.len() })
        );
    }

    #[test]
    fn prop_finite_telemetry_survives_structured_encoding(
        values in proptest::array::uniform18(-1.0e6f32..1.0e6f32)
    ) {
        let json = TelemetryFrame::new(values).encode_structured().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        for (name, value) in FIELD_NAMES.iter().zip(values.iter()) {
            let read = parsed[*name].as_f64().unwrap() as f32;
            prop_assert_eq!(read.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn prop_any_action_round_trips_exactly(action in ".{0,2000}") {
        let text = serde_json::json!({ "action": action }).to_string();
        let command = CommandMessage::decode_structured(&text).unwrap();
        prop_assert_eq!(command.action(), action.as_str());

        let record = command.encode_binary().unwrap();
        prop_assert_eq!(record.len(), command.encoded_len());
        let decoded = CommandMessage::decode_binary(&record).unwrap();
        prop_assert_eq!(decoded.action(), action.as_str());
    }
}
