//! Generic CAN types

pub mod codec;

use std::fmt;

/// Highest arbitration ID that fits in a standard (11 bit) frame.
pub const MAX_STANDARD_ID: u32 = 0x7ff;
/// Highest arbitration ID that fits in an extended (29 bit) frame.
pub const MAX_EXTENDED_ID: u32 = 0x1fffffff;
/// Maximum payload of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

/// Identifier for a CAN frame
#[derive(Copy, Clone, PartialOrd, Ord, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Identifier {
    Standard(u32),
    Extended(u32),
}

impl Identifier {
    pub fn is_standard(&self) -> bool {
        match self {
            Identifier::Standard(_) => true,
            Identifier::Extended(_) => false,
        }
    }
    pub fn is_extended(&self) -> bool {
        !self.is_standard()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Extended(id) => write!(f, "0x{:08x}", id),
            Identifier::Standard(id) => write!(f, "0x{:03x}", id),
        }
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Identifier {
        if id <= MAX_STANDARD_ID {
            Identifier::Standard(id)
        } else if id <= MAX_EXTENDED_ID {
            Identifier::Extended(id)
        } else {
            Identifier::Standard(0)
        }
    }
}

impl From<Identifier> for u32 {
    fn from(val: Identifier) -> u32 {
        match val {
            Identifier::Standard(id) => id,
            Identifier::Extended(id) => id,
        }
    }
}

/// Kind of a CAN frame as reported by the driver.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameKind {
    #[default]
    Data,
    Remote,
    Error,
    Overload,
}

/// A classic CAN frame. The length is always the length of `data`, which never exceeds 8 bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Arbitration ID
    pub id: Identifier,
    /// Frame Data
    pub data: Vec<u8>,
    pub kind: FrameKind,
}

impl Frame {
    /// Creates a data frame. Payloads longer than 8 bytes are truncated, an ID above 29 bits resets to standard ID 0.
    pub fn new(id: u32, data: &[u8]) -> Frame {
        let len = data.len().min(MAX_DATA_LEN);
        Frame {
            id: id.into(),
            data: data[..len].to_vec(),
            kind: FrameKind::Data,
        }
    }

    /// Creates a frame with an explicit length. The payload is truncated or zero-extended to `length` (at most 8).
    pub fn with_length(id: u32, length: usize, data: &[u8], kind: FrameKind) -> Frame {
        let length = length.min(MAX_DATA_LEN);
        let mut buf: Vec<u8> = data.iter().copied().take(length).collect();
        buf.resize(length, 0);

        Frame {
            id: id.into(),
            data: buf,
            kind,
        }
    }

    pub fn raw_id(&self) -> u32 {
        self.id.into()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    /// 64-bit view of the payload. The last byte lands in the lowest 8 bits, unused high bytes are zero.
    pub fn bit_vector(&self) -> u64 {
        self.data
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Textual form `0x<id>:<length>:<hex>`, used as a key for stimulus frames.
    pub fn text(&self) -> String {
        format!(
            "0x{:x}:{}:{}",
            self.raw_id(),
            self.data.len(),
            hex::encode(&self.data)
        )
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("data", &hex::encode(&self.data))
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
