use crate::can::Identifier;

/// A reassembled ISO-TP payload together with the arbitration ID it was received on.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoTpMessage {
    pub id: Identifier,
    pub data: Vec<u8>,
}

impl IsoTpMessage {
    pub fn new(id: u32, data: &[u8]) -> Self {
        Self {
            id: id.into(),
            data: data.to_vec(),
        }
    }

    pub fn raw_id(&self) -> u32 {
        self.id.into()
    }
}
