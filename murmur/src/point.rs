//! Fixed-width codec for a single sample.
//!
//! Every slot of every archive holds one 12-byte big-endian record:
//!
//! ```text
//! [0..4)   u32  timestamp (seconds since epoch, 0 = missing)
//! [4..12)  f64  value
//! ```
//!
//! Any 12 bytes decode to a valid [`Point`]. A zero timestamp marks a slot
//! that was never written, so epoch zero itself cannot be stored.

/// Size of one encoded point in bytes.
pub const POINT_SIZE: usize = 12;

/// A single (timestamp, value) sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Seconds since the Unix epoch; `0` means missing.
    pub timestamp: u32,
    /// The sample value. Always `0.0` for a missing point.
    pub value: f64,
}

impl Point {
    /// The missing sentinel.
    pub const MISSING: Self = Self {
        timestamp: 0,
        value: 0.0,
    };

    /// Creates a point.
    pub fn new(timestamp: u32, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Returns `true` if this slot was never written or has been invalidated.
    pub fn is_missing(&self) -> bool {
        self.timestamp == 0
    }

    /// Encodes the point into its 12-byte big-endian form.
    pub fn encode(&self) -> [u8; POINT_SIZE] {
        let mut buf = [0u8; POINT_SIZE];
        buf[..4].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[4..].copy_from_slice(&self.value.to_be_bytes());
        buf
    }

    /// Decodes a point from its 12-byte big-endian form.
    ///
    /// A zero timestamp yields [`Point::MISSING`] whatever the value bytes hold.
    pub fn decode(bytes: &[u8; POINT_SIZE]) -> Self {
        let timestamp = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if timestamp == 0 {
            return Self::MISSING;
        }
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[4..]);
        Self {
            timestamp,
            value: f64::from_be_bytes(value),
        }
    }

    /// Decodes consecutive points from a buffer whose length is a multiple of
    /// [`POINT_SIZE`]. Trailing bytes shorter than a point are ignored.
    pub fn decode_all(bytes: &[u8]) -> Vec<Self> {
        bytes
            .chunks_exact(POINT_SIZE)
            .map(|chunk| {
                let mut slot = [0u8; POINT_SIZE];
                slot.copy_from_slice(chunk);
                Self::decode(&slot)
            })
            .collect()
    }
}
