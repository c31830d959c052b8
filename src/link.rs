//! Wireless link contract and its UDP realisation.
//!
//! The bridge talks to exactly one remote peer, identified by a 6-byte
//! hardware address. Sends are fire-and-forget: [`WirelessLink::send`] only
//! reports whether the payload was handed to the transport, and the delivery
//! status arrives later as a [`BridgeEvent::WirelessSendStatus`].
//!
//! On a hosted OS the link runs over UDP. Each datagram carries the sender's
//! hardware address followed by the payload, mirroring what an ESP-NOW
//! receive callback is given:
//!
//! ```text
//! +----------------+-----------------------+
//! | source (6 B)   | payload (0..=65501 B) |
//! +----------------+-----------------------+
//! ```
//!
//! The payload limit is whatever fits in one IPv4 UDP datagram.

use core::fmt;
use core::str::FromStr;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::BridgeEvent;

pub const PEER_ADDRESS_LEN: usize = 6;
pub const DATAGRAM_HEADER_SIZE: usize = PEER_ADDRESS_LEN;
/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - DATAGRAM_HEADER_SIZE;

pub const DEFAULT_LINK_PORT: u16 = 4210;
pub const DEFAULT_PEER_PORT: u16 = 4211;

pub type Payload = Vec<u8>;

/// Hardware address of a wireless endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; PEER_ADDRESS_LEN]);

impl PeerAddress {
    /// The remote sensor unit the firmware was paired with.
    pub const DEFAULT_PEER: PeerAddress = PeerAddress([0xD4, 0xF9, 0x8D, 0x05, 0x83, 0x70]);
    /// Locally administered address used by the bridge itself.
    pub const DEFAULT_LOCAL: PeerAddress = PeerAddress([0x02, 0x45, 0x53, 0x50, 0x00, 0x01]);

    pub const fn new(octets: [u8; PEER_ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; PEER_ADDRESS_LEN] {
        self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid peer address `{0}`, expected six colon-separated hex octets")]
pub struct PeerAddressParseError(pub String);

impl FromStr for PeerAddress {
    type Err = PeerAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PeerAddressParseError(s.to_string());
        let mut octets = [0u8; PEER_ADDRESS_LEN];
        let mut parts = s.trim().split(':');

        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Asynchronous delivery outcome of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    Success,
    Fail,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("send to {peer} failed: {source}")]
    TransportSendFailure {
        peer: PeerAddress,
        source: std::io::Error,
    },
    #[error("payload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("peer {0} is not registered")]
    UnknownPeer(PeerAddress),
    #[error("peer {0} is already registered")]
    PeerAlreadyRegistered(PeerAddress),
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-to-point wireless transport.
///
/// Inbound frames and delivery statuses are not returned from these calls;
/// implementations push them onto the bridge event queue.
pub trait WirelessLink {
    /// Register the single peer. A second registration is refused.
    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError>;

    /// Hand `payload` to the transport for delivery to `peer`.
    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError>;
}

pub fn encode_datagram(source: PeerAddress, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(LinkError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    let mut datagram = Vec::with_capacity(DATAGRAM_HEADER_SIZE + payload.len());
    datagram.extend_from_slice(&source.octets());
    datagram.extend_from_slice(payload);
    Ok(datagram)
}

/// Split a datagram into its source address and payload.
///
/// Returns `None` for datagrams too short to carry a header or whose payload
/// exceeds [`MAX_PAYLOAD_SIZE`].
pub fn decode_datagram(datagram: &[u8]) -> Option<(PeerAddress, &[u8])> {
    if datagram.len() < DATAGRAM_HEADER_SIZE || datagram.len() > MAX_DATAGRAM_SIZE {
        return None;
    }
    let (header, payload) = datagram.split_at(DATAGRAM_HEADER_SIZE);
    let mut octets = [0u8; PEER_ADDRESS_LEN];
    octets.copy_from_slice(header);
    Some((PeerAddress::new(octets), payload))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Local UDP address the link listens on.
    pub bind: SocketAddr,
    /// UDP address the peer's frames are delivered to.
    pub peer_endpoint: SocketAddr,
    /// Hardware address of the remote sensor peer.
    pub peer: PeerAddress,
    /// Hardware address stamped on outgoing datagrams.
    pub local_address: PeerAddress,
    /// Drop frames whose source is not the registered peer.
    pub strict_peer: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LINK_PORT)),
            peer_endpoint: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PEER_PORT)),
            peer: PeerAddress::DEFAULT_PEER,
            local_address: PeerAddress::DEFAULT_LOCAL,
            strict_peer: false,
        }
    }
}

/// Wireless link over a UDP socket.
#[derive(Debug)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    local_address: PeerAddress,
    peer_endpoint: SocketAddr,
    peer: Option<PeerAddress>,
    events: mpsc::Sender<BridgeEvent>,
    receiver: JoinHandle<()>,
}

impl UdpLink {
    /// Bind the socket and start forwarding received frames to `events`.
    pub async fn bind(config: &LinkConfig, events: mpsc::Sender<BridgeEvent>) -> Result<Self, LinkError> {
        let socket = Arc::new(UdpSocket::bind(config.bind).await?);
        info!(
            "Wireless link listening on {} as {}, peer endpoint {}",
            socket.local_addr()?,
            config.local_address,
            config.peer_endpoint
        );

        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), events.clone()));

        Ok(Self {
            socket,
            local_address: config.local_address,
            peer_endpoint: config.peer_endpoint,
            peer: None,
            events,
            receiver,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn local_address(&self) -> PeerAddress {
        self.local_address
    }

    fn report_status(&self, peer: PeerAddress, status: SendStatus) {
        let event = BridgeEvent::WirelessSendStatus { peer, status };
        if let Err(e) = self.events.try_send(event) {
            warn!("Dropping send status for {}: {}", peer, e);
        }
    }
}

impl WirelessLink for UdpLink {
    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        if let Some(existing) = self.peer {
            return Err(LinkError::PeerAlreadyRegistered(existing));
        }
        self.peer = Some(peer);
        info!("Registered peer {} at {}", peer, self.peer_endpoint);
        Ok(())
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        if self.peer != Some(peer) {
            return Err(LinkError::UnknownPeer(peer));
        }

        let datagram = encode_datagram(self.local_address, payload)?;
        let written = self
            .socket
            .try_send_to(&datagram, self.peer_endpoint)
            .map_err(|source| LinkError::TransportSendFailure { peer, source })?;

        // UDP has no link-layer acknowledgement; a full handoff counts as delivered
        let status = if written == datagram.len() {
            SendStatus::Success
        } else {
            SendStatus::Fail
        };
        self.report_status(peer, status);
        Ok(())
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, events: mpsc::Sender<BridgeEvent>) {
    // One spare byte so oversized datagrams are seen as oversized
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];

    loop {
        let (len, origin) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Wireless link receive error: {}", e);
                continue;
            }
        };

        let Some((from, payload)) = decode_datagram(&buf[..len]) else {
            debug!("Discarding {}-byte datagram from {}", len, origin);
            continue;
        };

        let event = BridgeEvent::WirelessReceive { from, payload: payload.to_vec() };
        if events.send(event).await.is_err() {
            debug!("Event queue closed, stopping wireless receive loop");
            break;
        }
    }
}
