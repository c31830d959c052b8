//! In-memory link and push channel for tests and examples.
//!
//! Both record everything the bridge hands them so callers can assert on
//! what would have gone out over the air or to browser clients.

use crate::link::{LinkError, PeerAddress, WirelessLink, MAX_PAYLOAD_SIZE};
use crate::push::PushChannel;

#[derive(Debug, Default)]
pub struct MockLink {
    peer: Option<PeerAddress>,
    sent: Vec<(PeerAddress, Vec<u8>)>,
    fail_sends: bool,
    fail_registration: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send` fail as if the transport refused it.
    pub fn fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    pub fn fail_registration(&mut self, fail: bool) {
        self.fail_registration = fail;
    }

    pub fn get_registered_peer(&self) -> Option<PeerAddress> {
        self.peer
    }

    /// Every accepted send, in order.
    pub fn get_sent(&self) -> &[(PeerAddress, Vec<u8>)] {
        &self.sent
    }

    pub fn get_last_sent(&self) -> Option<&[u8]> {
        self.sent.last().map(|(_, payload)| payload.as_slice())
    }
}

impl WirelessLink for MockLink {
    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        if self.fail_registration {
            return Err(LinkError::Io(std::io::Error::other("mock registration failure")));
        }
        if let Some(existing) = self.peer {
            return Err(LinkError::PeerAlreadyRegistered(existing));
        }
        self.peer = Some(peer);
        Ok(())
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        if self.peer != Some(peer) {
            return Err(LinkError::UnknownPeer(peer));
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkError::PayloadTooLarge { size: payload.len(), limit: MAX_PAYLOAD_SIZE });
        }
        if self.fail_sends {
            return Err(LinkError::TransportSendFailure {
                peer,
                source: std::io::Error::other("mock send failure"),
            });
        }
        self.sent.push((peer, payload.to_vec()));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockPushChannel {
    broadcasts: Vec<String>,
    clients: usize,
    cleanup_calls: u32,
}

impl MockPushChannel {
    pub fn new() -> Self {
        Self {
            broadcasts: Vec::new(),
            clients: 1,
            cleanup_calls: 0,
        }
    }

    pub fn set_client_count(&mut self, clients: usize) {
        self.clients = clients;
    }

    /// Every broadcast message, in order.
    pub fn get_broadcasts(&self) -> &[String] {
        &self.broadcasts
    }

    pub fn get_last_broadcast(&self) -> Option<&str> {
        self.broadcasts.last().map(String::as_str)
    }

    pub fn get_cleanup_calls(&self) -> u32 {
        self.cleanup_calls
    }
}

impl Default for MockPushChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannel for MockPushChannel {
    fn broadcast(&mut self, text: &str) -> usize {
        self.broadcasts.push(text.to_string());
        self.clients
    }

    fn cleanup_clients(&mut self) {
        self.cleanup_calls = self.cleanup_calls.saturating_add(1);
    }

    fn client_count(&self) -> usize {
        self.clients
    }
}
