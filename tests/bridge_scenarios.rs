use espbridge::config::BridgeConfig;
use espbridge::diagnostics::DiagnosticKind;
use espbridge::link::{PeerAddress, SendStatus};
use espbridge::mock::{MockLink, MockPushChannel};
use espbridge::protocol::{CommandMessage, COMMAND_HEADER_SIZE, MAX_ACTION_LEN};
use espbridge::telemetry::{TelemetryFrame, TELEMETRY_CHANNELS, TELEMETRY_FRAME_SIZE};
use espbridge::*;

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.simulation.seed = Some(42);
    config
}

fn create_bridge(config: &BridgeConfig) -> Bridge<MockLink, MockPushChannel> {
    Bridge::new(config, MockLink::new(), MockPushChannel::new()).unwrap()
}

fn parse_broadcast(text: &str) -> Vec<f64> {
    let value: serde_json::Value = serde_json::from_str(text).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), TELEMETRY_CHANNELS);
    (0..TELEMETRY_CHANNELS)
        .map(|i| object[&format!("data{i}")].as_f64().unwrap())
        .collect()
}

#[test]
fn test_live_frame_suppresses_fallback() {
    let mut bridge = create_bridge(&test_config());
    let mut values = [0.0f32; TELEMETRY_CHANNELS];
    values[0] = 1.0;

    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &TelemetryFrame::new(values).encode_binary());

    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
    assert_eq!(bridge.get_push().get_broadcasts().len(), 1);
    let broadcast = parse_broadcast(bridge.get_push().get_last_broadcast().unwrap());
    assert_eq!(broadcast[0], 1.0);
    assert!(broadcast[1..].iter().all(|v| *v == 0.0));

    assert!(!bridge.tick(1000));
    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
    assert_eq!(bridge.get_push().get_broadcasts().len(), 1);
    assert!(bridge.get_last_simulated_tick_time().is_none());
}

#[test]
fn test_all_zero_frame_is_treated_as_stale() {
    let mut bridge = create_bridge(&test_config());

    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &TelemetryFrame::zeroed().encode_binary());
    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
    assert!(bridge.get_current_telemetry().is_all_zero());
    assert!(bridge.is_stale());

    assert!(bridge.tick(1000));
    assert_eq!(bridge.get_output(), BridgeOutput::SimulatedTelemetry);
    assert_eq!(bridge.get_last_simulated_tick_time(), Some(1000));
    assert_eq!(bridge.get_push().get_broadcasts().len(), 2);

    let simulated = parse_broadcast(bridge.get_push().get_last_broadcast().unwrap());
    assert!(simulated.iter().all(|v| (0.0..100.0).contains(v)));
    for (sent, held) in simulated.iter().zip(bridge.get_current_telemetry().values()) {
        assert_eq!(*sent, f64::from(*held));
    }
}

#[test]
fn test_repeated_ticks_without_data_keep_simulating() {
    let mut bridge = create_bridge(&test_config());

    assert!(bridge.tick(1000));
    assert!(bridge.tick(2000));
    assert!(bridge.tick(3000));

    let broadcasts = bridge.get_push().get_broadcasts();
    assert_eq!(broadcasts.len(), 3);
    for text in broadcasts {
        assert!(parse_broadcast(text).iter().all(|v| (0.0..100.0).contains(v)));
    }
    assert_eq!(bridge.get_stats().simulated_frames, 3);
    assert_eq!(bridge.get_generator().get_stats().frames_generated, 3);
}

#[test]
fn test_live_frame_after_simulation_takes_over() {
    let mut bridge = create_bridge(&test_config());
    bridge.tick(1000);
    assert_eq!(bridge.get_output(), BridgeOutput::SimulatedTelemetry);

    let frame = TelemetryFrame::new([7.5; TELEMETRY_CHANNELS]);
    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &frame.encode_binary());

    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
    assert_eq!(bridge.get_current_telemetry(), &frame);
    assert!(!bridge.tick(2000));
}

#[test]
fn test_command_relayed_and_fail_status_is_observational() {
    let mut bridge = create_bridge(&test_config());

    bridge.on_client_message(1, r#"{"action":"open_valve"}"#);

    let sent = bridge.get_link().get_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, PeerAddress::DEFAULT_PEER);
    assert_eq!(sent[0].1.len(), COMMAND_HEADER_SIZE + "open_valve".len());
    let relayed = CommandMessage::decode_binary(&sent[0].1).unwrap();
    assert_eq!(relayed.action(), "open_valve");
    assert_eq!(bridge.get_current_command().map(|c| c.action()), Some("open_valve"));

    bridge.on_wireless_send_status(PeerAddress::DEFAULT_PEER, SendStatus::Fail);

    assert_eq!(bridge.get_link().get_sent().len(), 1);
    assert_eq!(bridge.get_current_command().map(|c| c.action()), Some("open_valve"));
    assert_eq!(bridge.get_stats().deliveries_failed, 1);
    assert!(matches!(
        bridge.get_diagnostics().last().map(|e| &e.kind),
        Some(DiagnosticKind::DeliveryFailure { .. })
    ));
}

#[test]
fn test_malformed_client_message_changes_nothing() {
    let mut bridge = create_bridge(&test_config());

    bridge.on_client_message(3, "open the valve please");

    assert!(bridge.get_link().get_sent().is_empty());
    assert!(bridge.get_current_command().is_none());
    assert_eq!(bridge.get_output(), BridgeOutput::NoDataYet);
    assert!(bridge.get_push().get_broadcasts().is_empty());
    assert_eq!(
        bridge.get_diagnostics().last().map(|e| e.kind.clone()),
        Some(DiagnosticKind::MalformedInput { client: 3 })
    );
}

#[test]
fn test_size_mismatch_leaves_state_untouched() {
    let mut bridge = create_bridge(&test_config());
    let frame = TelemetryFrame::new([3.0; TELEMETRY_CHANNELS]);
    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &frame.encode_binary());

    let short = [0u8; TELEMETRY_FRAME_SIZE - 1];
    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &short);
    let long = [0u8; TELEMETRY_FRAME_SIZE + 4];
    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &long);

    assert_eq!(bridge.get_current_telemetry(), &frame);
    assert_eq!(bridge.get_push().get_broadcasts().len(), 1);
    assert_eq!(bridge.get_stats().frames_rejected, 2);
    assert_eq!(
        bridge.get_diagnostics().last().map(|e| e.kind.clone()),
        Some(DiagnosticKind::SizeMismatch {
            from: PeerAddress::DEFAULT_PEER,
            expected: TELEMETRY_FRAME_SIZE,
            actual: TELEMETRY_FRAME_SIZE + 4,
        })
    );
}

#[test]
fn test_missing_and_non_string_action() {
    let mut bridge = create_bridge(&test_config());

    bridge.on_client_message(1, r#"{"command":"open_valve"}"#);
    bridge.on_client_message(1, r#"{"action":42}"#);

    assert!(bridge.get_link().get_sent().is_empty());
    assert!(bridge.get_current_command().is_none());
    assert_eq!(bridge.get_stats().commands_rejected, 2);

    let kinds: Vec<_> = bridge.get_diagnostics().recent().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            DiagnosticKind::MissingField { client: 1, field: "action" },
            DiagnosticKind::InvalidField { client: 1, field: "action" },
        ]
    );
}

#[test]
fn test_empty_action_is_relayed() {
    let mut bridge = create_bridge(&test_config());
    bridge.on_client_message(2, r#"{"action":""}"#);

    let relayed = CommandMessage::decode_binary(bridge.get_link().get_last_sent().unwrap()).unwrap();
    assert_eq!(relayed.action(), "");
}

#[test]
fn test_long_actions_are_relayed_whole() {
    let mut bridge = create_bridge(&test_config());

    for (client, len) in [(2, 300), (3, 1100), (4, MAX_ACTION_LEN)] {
        let action = "x".repeat(len);
        bridge.on_client_message(client, &format!(r#"{{"action":"{action}"}}"#));

        let relayed = CommandMessage::decode_binary(bridge.get_link().get_last_sent().unwrap()).unwrap();
        assert_eq!(relayed.action(), action);
        assert_eq!(bridge.get_current_command().map(|c| c.action()), Some(action.as_str()));
    }

    assert_eq!(bridge.get_stats().commands_relayed, 3);
    assert!(bridge.get_diagnostics().is_empty());
}

#[test]
fn test_action_too_long_for_link_is_rejected() {
    let mut bridge = create_bridge(&test_config());
    bridge.on_client_message(1, r#"{"action":"keep"}"#);

    let long = "x".repeat(MAX_ACTION_LEN + 1);
    bridge.on_client_message(2, &format!(r#"{{"action":"{long}"}}"#));

    assert_eq!(bridge.get_link().get_sent().len(), 1);
    assert_eq!(bridge.get_current_command().map(|c| c.action()), Some("keep"));
    assert_eq!(bridge.get_stats().commands_rejected, 1);
    assert_eq!(
        bridge.get_diagnostics().last().map(|e| e.kind.clone()),
        Some(DiagnosticKind::CommandTooLarge { client: 2, len: MAX_ACTION_LEN + 1, limit: MAX_ACTION_LEN })
    );
}

#[test]
fn test_send_failure_is_recorded_not_retried() {
    let mut bridge = create_bridge(&test_config());
    bridge.get_link_mut().fail_sends(true);

    bridge.on_client_message(1, r#"{"action":"close_valve"}"#);

    assert!(bridge.get_link().get_sent().is_empty());
    assert_eq!(bridge.get_current_command().map(|c| c.action()), Some("close_valve"));
    assert_eq!(bridge.get_stats().send_failures, 1);
    assert!(matches!(
        bridge.get_diagnostics().last().map(|e| &e.kind),
        Some(DiagnosticKind::TransportSendFailure { peer, .. }) if *peer == PeerAddress::DEFAULT_PEER
    ));

    bridge.get_link_mut().fail_sends(false);
    bridge.tick(1000);
    assert!(bridge.get_link().get_sent().is_empty());
}

#[test]
fn test_later_command_replaces_earlier() {
    let mut bridge = create_bridge(&test_config());
    bridge.on_client_message(1, r#"{"action":"first"}"#);
    bridge.on_client_message(2, r#"{"action":"second","extra":true}"#);

    assert_eq!(bridge.get_link().get_sent().len(), 2);
    assert_eq!(bridge.get_current_command().map(|c| c.action()), Some("second"));
}

#[test]
fn test_unregistered_sender_accepted_by_default() {
    let mut bridge = create_bridge(&test_config());
    let stranger: PeerAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();

    bridge.on_wireless_receive(stranger, &TelemetryFrame::new([1.0; TELEMETRY_CHANNELS]).encode_binary());

    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
    assert_eq!(bridge.get_stats().frames_received, 1);
}

#[test]
fn test_strict_peer_drops_unregistered_sender() {
    let mut config = test_config();
    config.link.strict_peer = true;
    let mut bridge = create_bridge(&config);
    let stranger: PeerAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();

    bridge.on_wireless_receive(stranger, &TelemetryFrame::new([1.0; TELEMETRY_CHANNELS]).encode_binary());

    assert_eq!(bridge.get_output(), BridgeOutput::NoDataYet);
    assert!(bridge.get_push().get_broadcasts().is_empty());
    assert_eq!(
        bridge.get_diagnostics().last().map(|e| e.kind.clone()),
        Some(DiagnosticKind::UnknownPeer { from: stranger })
    );

    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &TelemetryFrame::new([1.0; TELEMETRY_CHANNELS]).encode_binary());
    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
}

#[test]
fn test_simulation_disabled_never_broadcasts_on_tick() {
    let mut config = test_config();
    config.simulation.enabled = false;
    let mut bridge = create_bridge(&config);

    assert!(!bridge.tick(1000));
    assert!(!bridge.tick(2000));

    assert_eq!(bridge.get_output(), BridgeOutput::NoDataYet);
    assert!(bridge.get_push().get_broadcasts().is_empty());
    assert!(bridge.is_stale());
}

#[test]
fn test_broadcast_with_no_clients_still_counts() {
    let mut bridge = create_bridge(&test_config());
    bridge.get_push_mut().set_client_count(0);

    bridge.on_wireless_receive(PeerAddress::DEFAULT_PEER, &TelemetryFrame::new([4.0; TELEMETRY_CHANNELS]).encode_binary());

    assert_eq!(bridge.get_stats().broadcasts, 1);
    assert_eq!(bridge.get_output(), BridgeOutput::LiveTelemetry);
}

#[test]
fn test_diagnostic_history_is_bounded() {
    let mut bridge = create_bridge(&test_config());
    for _ in 0..100 {
        bridge.on_client_message(1, "not json");
    }

    assert_eq!(bridge.get_diagnostics().total(), 100);
    assert_eq!(bridge.get_diagnostics().len(), espbridge::diagnostics::DIAGNOSTIC_HISTORY_SIZE);
}
