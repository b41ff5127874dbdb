#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum FrameType {
    Single = 0x00,
    First = 0x10,
    Consecutive = 0x20,
    FlowControl = 0x30,
    Unknown = 0xff,
}

pub static FRAME_TYPE_MASK: u8 = 0xf0;

/// Largest payload addressable by the 12 bit length of a first frame.
pub const MAX_PAYLOAD_LEN: usize = 4095;
/// Payload bytes carried by a single frame.
pub const SINGLE_FRAME_LEN: usize = 7;
/// Payload bytes carried by a first frame.
pub const FIRST_FRAME_LEN: usize = 6;
/// Payload bytes carried by a consecutive frame.
pub const CONSECUTIVE_FRAME_LEN: usize = 7;

impl From<u8> for FrameType {
    fn from(val: u8) -> FrameType {
        match val & FRAME_TYPE_MASK {
            0x00 => FrameType::Single,
            0x10 => FrameType::First,
            0x20 => FrameType::Consecutive,
            0x30 => FrameType::FlowControl,
            _ => FrameType::Unknown,
        }
    }
}
