//! Byte encoding of frames as exchanged with transport collaborators.
//!
//! Layout: big-endian arbitration ID (2 bytes standard, 4 bytes extended), one length byte, then the payload.
use crate::can::{Frame, FrameKind, Identifier, MAX_DATA_LEN, MAX_EXTENDED_ID, MAX_STANDARD_ID};
use crate::error::Error;

pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + frame.data.len());
    match frame.id {
        Identifier::Standard(id) => buf.extend((id as u16).to_be_bytes()),
        Identifier::Extended(id) => buf.extend(id.to_be_bytes()),
    }
    buf.push(frame.data.len() as u8);
    buf.extend(&frame.data);
    buf
}

/// Decodes a single frame. The addressing mode is not part of the encoding and has to be provided by the caller.
pub fn decode(buf: &[u8], extended: bool) -> Result<Frame, Error> {
    let id_len = if extended { 4 } else { 2 };
    if buf.len() < id_len + 1 {
        return Err(Error::MalformedFrame);
    }

    let id = buf[..id_len]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    let length = buf[id_len] as usize;
    let data = &buf[id_len + 1..];

    if length > MAX_DATA_LEN || data.len() != length {
        return Err(Error::MalformedFrame);
    }

    let id = match extended {
        false if id <= MAX_STANDARD_ID => Identifier::Standard(id),
        true if id <= MAX_EXTENDED_ID => Identifier::Extended(id),
        _ => return Err(Error::MalformedFrame),
    };

    Ok(Frame {
        id,
        data: data.to_vec(),
        kind: FrameKind::Data,
    })
}
