//! # ESP-NOW Telemetry Bridge
//!
//! A bridge between a point-to-point wireless sensor link and a browser-facing
//! WebSocket push channel. Telemetry frames arriving from the single remote
//! sensor peer are fanned out to every connected client, and operator commands
//! sent by clients are relayed back to the peer.
//!
//! ## Features
//!
//! - **Telemetry relay**: 18-channel binary frames decoded and broadcast as JSON
//! - **Command relay**: `{"action": "..."}` client messages forwarded to the peer
//! - **Fallback data**: synthetic telemetry keeps the push channel alive while
//!   no genuine data is held
//! - **Cooperative scheduling**: one loop owns all bridge state, no locking
//! - **Diagnostics**: bounded history of dropped frames, rejected commands and
//!   delivery failures
//!
//! ## Quick Start
//!
//! ```rust
//! use espbridge::mock::{MockLink, MockPushChannel};
//! use espbridge::{Bridge, BridgeConfig, TelemetryFrame};
//!
//! let config = BridgeConfig::default();
//! let mut bridge = Bridge::new(&config, MockLink::new(), MockPushChannel::new()).unwrap();
//!
//! // A genuine frame from the peer is broadcast immediately
//! let frame = TelemetryFrame::new([1.0; 18]);
//! bridge.on_wireless_receive(config.link.peer, &frame.encode_binary());
//! assert_eq!(bridge.get_push().get_broadcasts().len(), 1);
//!
//! // A client command is relayed to the peer
//! bridge.on_client_message(1, r#"{"action":"open_valve"}"#);
//! assert_eq!(bridge.get_link().get_sent().len(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`telemetry`] - Telemetry frame codec
//! - [`protocol`] - Client command codec
//! - [`link`] - Wireless link contract and the UDP transport
//! - [`push`] - Push channel contract and the WebSocket server
//! - [`bridge`] - Bridge engine owning all relay state
//! - [`simulation`] - Fallback telemetry generator
//! - [`scheduler`] - Cooperative scheduler loop
//! - [`diagnostics`] - Diagnostic event history
//! - [`config`] - Bridge configuration

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod link;
pub mod mock;
pub mod protocol;
pub mod push;
pub mod scheduler;
pub mod simulation;
pub mod telemetry;

// Re-export main public types for convenience
pub use bridge::{Bridge, BridgeError, BridgeEvent, BridgeOutput};
pub use config::BridgeConfig;
pub use link::{PeerAddress, SendStatus, WirelessLink};
pub use protocol::{CommandMessage, ProtocolError};
pub use push::{ClientId, PushChannel};
pub use scheduler::SchedulerLoop;
pub use telemetry::TelemetryFrame;
