use heapless::HistoryBuffer;
use serde::Serialize;
use tracing::warn;

use crate::link::PeerAddress;
use crate::protocol::ProtocolError;
use crate::push::ClientId;

pub const DIAGNOSTIC_HISTORY_SIZE: usize = 32;

/// Something the bridge dropped or failed at. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// Wireless payload of the wrong length.
    SizeMismatch { from: PeerAddress, expected: usize, actual: usize },
    /// Frame from an address other than the registered peer.
    UnknownPeer { from: PeerAddress },
    /// Client text that is not JSON.
    MalformedInput { client: ClientId },
    /// Client JSON without an action field.
    MissingField { client: ClientId, field: &'static str },
    /// Client JSON whose action is not a string.
    InvalidField { client: ClientId, field: &'static str },
    /// Action too long for one link payload; nothing was sent.
    CommandTooLarge { client: ClientId, len: usize, limit: usize },
    /// The link refused the send.
    TransportSendFailure { peer: PeerAddress, reason: String },
    /// The link reported a failed delivery.
    DeliveryFailure { peer: PeerAddress },
    SerializationFailure,
}

impl DiagnosticKind {
    /// Map a client command decode error.
    pub fn from_client_error(client: ClientId, error: ProtocolError) -> Self {
        match error {
            ProtocolError::MissingField(field) => Self::MissingField { client, field },
            ProtocolError::InvalidField(field) => Self::InvalidField { client, field },
            ProtocolError::ActionTooLong { len, limit } => Self::CommandTooLarge { client, len, limit },
            ProtocolError::SerializationError => Self::SerializationFailure,
            ProtocolError::MalformedInput | ProtocolError::SizeMismatch { .. } => {
                Self::MalformedInput { client }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEvent {
    pub at_ms: u64,
    pub kind: DiagnosticKind,
}

/// Bounded history of diagnostic events, oldest overwritten first.
#[derive(Debug)]
pub struct Diagnostics {
    history: HistoryBuffer<DiagnosticEvent, DIAGNOSTIC_HISTORY_SIZE>,
    total: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            history: HistoryBuffer::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, at_ms: u64, kind: DiagnosticKind) {
        warn!("Diagnostic: {:?}", kind);
        self.history.write(DiagnosticEvent { at_ms, kind });
        self.total = self.total.saturating_add(1);
    }

    /// Events still held, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.history.oldest_ordered()
    }

    pub fn last(&self) -> Option<&DiagnosticEvent> {
        self.history.recent()
    }

    /// Events recorded since startup, including those no longer held.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.len() == 0
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
