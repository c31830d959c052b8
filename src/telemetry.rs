use crate::link::MAX_PAYLOAD_SIZE;
use crate::protocol::ProtocolError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use static_assertions::{const_assert, const_assert_eq};

pub const TELEMETRY_CHANNELS: usize = 18;
pub const CHANNEL_SIZE: usize = core::mem::size_of::<f32>();
pub const TELEMETRY_FRAME_SIZE: usize = TELEMETRY_CHANNELS * CHANNEL_SIZE;

const_assert_eq!(TELEMETRY_FRAME_SIZE, 72);
const_assert!(TELEMETRY_FRAME_SIZE <= MAX_PAYLOAD_SIZE);

/// Push channel field names, indexed by channel.
pub const FIELD_NAMES: [&str; TELEMETRY_CHANNELS] = [
    "data0", "data1", "data2", "data3", "data4", "data5",
    "data6", "data7", "data8", "data9", "data10", "data11",
    "data12", "data13", "data14", "data15", "data16", "data17",
];

/// One sample of the remote sensor's 18 channels.
///
/// The bridge never interprets individual channels. On the wireless link a
/// frame is 18 packed little-endian `f32` values; on the push channel it is a
/// JSON object keyed `data0` through `data17` in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryFrame {
    values: [f32; TELEMETRY_CHANNELS],
}

impl TelemetryFrame {
    pub const fn new(values: [f32; TELEMETRY_CHANNELS]) -> Self {
        Self { values }
    }

    /// Frame with every channel at the zero sentinel.
    pub const fn zeroed() -> Self {
        Self { values: [0.0; TELEMETRY_CHANNELS] }
    }

    pub fn values(&self) -> &[f32; TELEMETRY_CHANNELS] {
        &self.values
    }

    /// Staleness predicate: true when every channel equals zero.
    ///
    /// "No data yet" and "peer reports zero on every channel" are
    /// indistinguishable here; callers treat both as no data.
    pub fn is_all_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Decode a wireless payload. The length is checked before any channel is read.
    pub fn decode_binary(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != TELEMETRY_FRAME_SIZE {
            return Err(ProtocolError::SizeMismatch {
                expected: TELEMETRY_FRAME_SIZE,
                actual: bytes.len(),
            });
        }

        let mut values = [0.0f32; TELEMETRY_CHANNELS];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(CHANNEL_SIZE)) {
            let mut raw = [0u8; CHANNEL_SIZE];
            raw.copy_from_slice(chunk);
            *value = f32::from_le_bytes(raw);
        }

        Ok(Self { values })
    }

    pub fn encode_binary(&self) -> [u8; TELEMETRY_FRAME_SIZE] {
        let mut bytes = [0u8; TELEMETRY_FRAME_SIZE];
        for (chunk, value) in bytes.chunks_exact_mut(CHANNEL_SIZE).zip(self.values.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Encode as the push channel message. Non-finite channels become `null`.
    pub fn encode_structured(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|_| ProtocolError::SerializationError)
    }
}

impl From<[f32; TELEMETRY_CHANNELS]> for TelemetryFrame {
    fn from(values: [f32; TELEMETRY_CHANNELS]) -> Self {
        Self::new(values)
    }
}

// Written as a map so keys come out in channel order, not sorted order
impl Serialize for TelemetryFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TELEMETRY_CHANNELS))?;
        for (name, value) in FIELD_NAMES.iter().zip(self.values.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
