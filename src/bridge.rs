use std::net::SocketAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, ConfigError};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::link::{LinkError, PeerAddress, Payload, SendStatus, WirelessLink};
use crate::protocol::{CommandMessage, ProtocolError};
use crate::push::{ClientId, PushChannel};
use crate::simulation::FallbackGenerator;
use crate::telemetry::TelemetryFrame;

/// Capacity of the queue feeding adapter callbacks into the scheduler loop.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// A callback from one of the adapters, delivered through the event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    WirelessReceive { from: PeerAddress, payload: Payload },
    WirelessSendStatus { peer: PeerAddress, status: SendStatus },
    ClientConnected { client: ClientId, addr: SocketAddr },
    ClientDisconnected { client: ClientId },
    ClientMessage { client: ClientId, text: String },
}

/// What the push channel is currently being fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeOutput {
    NoDataYet,
    LiveTelemetry,
    SimulatedTelemetry,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BridgeStats {
    pub frames_received: u32,
    pub frames_rejected: u32,
    pub simulated_frames: u32,
    pub broadcasts: u32,
    pub commands_relayed: u32,
    pub commands_rejected: u32,
    pub send_failures: u32,
    pub deliveries_succeeded: u32,
    pub deliveries_failed: u32,
    pub clients_connected: u32,
    pub clients_total: u32,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to register peer: {0}")]
    PeerRegistration(#[source] LinkError),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The relay engine.
///
/// Owns the latest telemetry and command and is driven from a single logical
/// thread: the scheduler loop calls [`Bridge::tick`] and dispatches adapter
/// events through [`Bridge::handle_event`]. Nothing here blocks, retries, or
/// reports failures back to a client; failures end up in [`Bridge::diagnostics`].
#[derive(Debug)]
pub struct Bridge<L, P> {
    link: L,
    push: P,
    peer: PeerAddress,
    strict_peer: bool,

    current_telemetry: TelemetryFrame,
    // Staleness is judged on genuine data only, never on simulated frames
    last_genuine: TelemetryFrame,
    current_command: Option<CommandMessage>,
    last_simulated_tick_time: Option<u64>,
    output: BridgeOutput,

    generator: FallbackGenerator,
    stats: BridgeStats,
    diagnostics: Diagnostics,
    start_time: Instant,
}

impl<L: WirelessLink, P: PushChannel> Bridge<L, P> {
    /// Build the bridge and register the configured peer with the link.
    pub fn new(config: &BridgeConfig, mut link: L, push: P) -> Result<Self, BridgeError> {
        let peer = config.link.peer;
        link.register_peer(peer).map_err(BridgeError::PeerRegistration)?;
        info!("Bridge relaying to peer {}", peer);

        Ok(Self {
            link,
            push,
            peer,
            strict_peer: config.link.strict_peer,
            current_telemetry: TelemetryFrame::zeroed(),
            last_genuine: TelemetryFrame::zeroed(),
            current_command: None,
            last_simulated_tick_time: None,
            output: BridgeOutput::NoDataYet,
            generator: FallbackGenerator::new_with_config(config.simulation.clone()),
            stats: BridgeStats::default(),
            diagnostics: Diagnostics::new(),
            start_time: Instant::now(),
        })
    }

    pub fn handle_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::WirelessReceive { from, payload } => self.on_wireless_receive(from, &payload),
            BridgeEvent::WirelessSendStatus { peer, status } => self.on_wireless_send_status(peer, status),
            BridgeEvent::ClientConnected { client, addr } => self.on_client_connect(client, addr),
            BridgeEvent::ClientDisconnected { client } => self.on_client_disconnect(client),
            BridgeEvent::ClientMessage { client, text } => self.on_client_message(client, &text),
        }
    }

    /// A frame arrived from the wireless link.
    ///
    /// A frame of the wrong size is dropped without touching any state. A
    /// good frame replaces the current telemetry and is broadcast at once.
    pub fn on_wireless_receive(&mut self, from: PeerAddress, raw: &[u8]) {
        if self.strict_peer && from != self.peer {
            self.stats.frames_rejected = self.stats.frames_rejected.saturating_add(1);
            self.record(DiagnosticKind::UnknownPeer { from });
            return;
        }

        let frame = match TelemetryFrame::decode_binary(raw) {
            Ok(frame) => frame,
            Err(ProtocolError::SizeMismatch { expected, actual }) => {
                self.stats.frames_rejected = self.stats.frames_rejected.saturating_add(1);
                self.record(DiagnosticKind::SizeMismatch { from, expected, actual });
                return;
            }
            Err(e) => {
                self.stats.frames_rejected = self.stats.frames_rejected.saturating_add(1);
                warn!("Unexpected telemetry decode error from {}: {}", from, e);
                return;
            }
        };

        if from != self.peer {
            debug!("Accepting telemetry from unregistered sender {}", from);
        }

        self.current_telemetry = frame;
        self.last_genuine = frame;
        self.output = BridgeOutput::LiveTelemetry;
        self.stats.frames_received = self.stats.frames_received.saturating_add(1);

        self.broadcast_current();
    }

    /// Delivery report for an earlier send. Observational only.
    pub fn on_wireless_send_status(&mut self, peer: PeerAddress, status: SendStatus) {
        match status {
            SendStatus::Success => {
                self.stats.deliveries_succeeded = self.stats.deliveries_succeeded.saturating_add(1);
                debug!("Last packet send status to {}: delivery success", peer);
            }
            SendStatus::Fail => {
                self.stats.deliveries_failed = self.stats.deliveries_failed.saturating_add(1);
                self.record(DiagnosticKind::DeliveryFailure { peer });
            }
        }
    }

    /// A client sent a text message. Relayed to the peer if it carries an action.
    pub fn on_client_message(&mut self, client: ClientId, text: &str) {
        let command = match CommandMessage::decode_structured(text) {
            Ok(command) => command,
            Err(e) => {
                self.stats.commands_rejected = self.stats.commands_rejected.saturating_add(1);
                self.record(DiagnosticKind::from_client_error(client, e));
                return;
            }
        };

        let payload = match command.encode_binary() {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.commands_rejected = self.stats.commands_rejected.saturating_add(1);
                self.record(DiagnosticKind::from_client_error(client, e));
                return;
            }
        };

        info!("Action received from client #{}: {}", client, command.action());
        self.current_command = Some(command);

        match self.link.send(self.peer, &payload) {
            Ok(()) => {
                self.stats.commands_relayed = self.stats.commands_relayed.saturating_add(1);
            }
            Err(e) => {
                self.stats.send_failures = self.stats.send_failures.saturating_add(1);
                self.record(DiagnosticKind::TransportSendFailure {
                    peer: self.peer,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn on_client_connect(&mut self, client: ClientId, addr: SocketAddr) {
        self.stats.clients_connected = self.stats.clients_connected.saturating_add(1);
        self.stats.clients_total = self.stats.clients_total.saturating_add(1);
        info!("WebSocket client #{} connected from {}", client, addr);
    }

    pub fn on_client_disconnect(&mut self, client: ClientId) {
        self.stats.clients_connected = self.stats.clients_connected.saturating_sub(1);
        info!("WebSocket client #{} disconnected", client);
    }

    /// Periodic fallback check, called by the scheduler once per interval.
    ///
    /// When the last genuine frame is all zero (or none has arrived) a
    /// simulated frame replaces the current telemetry and is broadcast.
    /// Returns whether that happened.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if !self.is_stale() || !self.generator.is_enabled() {
            return false;
        }

        self.current_telemetry = self.generator.generate(now_ms);
        self.last_simulated_tick_time = Some(now_ms);
        if self.output != BridgeOutput::SimulatedTelemetry {
            info!("No genuine telemetry held, switching to simulated data");
        }
        self.output = BridgeOutput::SimulatedTelemetry;
        self.stats.simulated_frames = self.stats.simulated_frames.saturating_add(1);

        self.broadcast_current();
        true
    }

    /// Push channel housekeeping, run once per scheduler iteration.
    pub fn housekeeping(&mut self) {
        self.push.cleanup_clients();
    }

    /// True while no genuine frame with a non-zero channel is held.
    ///
    /// A peer that genuinely reads zero on every channel looks exactly like a
    /// peer that never sent anything.
    pub fn is_stale(&self) -> bool {
        self.last_genuine.is_all_zero()
    }

    fn broadcast_current(&mut self) {
        match self.current_telemetry.encode_structured() {
            Ok(json) => {
                let reached = self.push.broadcast(&json);
                self.stats.broadcasts = self.stats.broadcasts.saturating_add(1);
                debug!("Broadcast telemetry to {} clients", reached);
            }
            Err(_) => self.record(DiagnosticKind::SerializationFailure),
        }
    }

    fn record(&mut self, kind: DiagnosticKind) {
        let at_ms = self.start_time.elapsed().as_millis() as u64;
        self.diagnostics.record(at_ms, kind);
    }

    pub fn get_output(&self) -> BridgeOutput {
        self.output
    }

    pub fn get_current_telemetry(&self) -> &TelemetryFrame {
        &self.current_telemetry
    }

    pub fn get_current_command(&self) -> Option<&CommandMessage> {
        self.current_command.as_ref()
    }

    pub fn get_last_simulated_tick_time(&self) -> Option<u64> {
        self.last_simulated_tick_time
    }

    pub fn get_peer(&self) -> PeerAddress {
        self.peer
    }

    pub fn get_stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn get_diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn get_generator(&self) -> &FallbackGenerator {
        &self.generator
    }

    pub fn get_link(&self) -> &L {
        &self.link
    }

    pub fn get_link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn get_push(&self) -> &P {
        &self.push
    }

    pub fn get_push_mut(&mut self) -> &mut P {
        &mut self.push
    }
}
