//! ISO Transport Protocol (ISO-TP) segmentation, implements the classic CAN subset of ISO 15765-2.
//!
//! Unlike a transport adapter this module does not talk to the bus. [`IsoTpAssembler`] is fed frames captured by the pipeline and hands back complete payloads, [`segment`] splits a payload into frames ready to be injected.
//! ## Example:
//! ```rust
//! use canfuzz::isotp::{segment, IsoTpAssembler};
//!
//! let frames = segment(0x7e0, &[0x22, 0xf1, 0x90], Some(0xaa)).unwrap();
//! let mut assembler = IsoTpAssembler::default();
//! let message = assembler.assemble(&frames[0]).unwrap().unwrap();
//! assert_eq!(message.data, vec![0x22, 0xf1, 0x90]);
//! ```

mod constants;
pub mod error;
mod types;

use std::collections::HashMap;

use crate::can::{Frame, Identifier, MAX_DATA_LEN};
use crate::isotp::constants::{
    FrameType, CONSECUTIVE_FRAME_LEN, FIRST_FRAME_LEN, MAX_PAYLOAD_LEN, SINGLE_FRAME_LEN,
};
use crate::isotp::error::Error;
pub use constants::FRAME_TYPE_MASK;
pub use types::IsoTpMessage;

use tracing::debug;

#[derive(Debug)]
struct Partial {
    buf: Vec<u8>,
    len: usize,
    idx: u8,
}

/// Reassembles ISO-TP payloads from a stream of frames. Keeps one partial payload per arbitration ID.
#[derive(Debug, Default)]
pub struct IsoTpAssembler {
    partial: HashMap<Identifier, Partial>,
}

impl IsoTpAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame. Returns `Ok(Some(..))` once a payload is complete, `Ok(None)` while still collecting (or for flow control frames) and an error when the sequence has to be aborted.
    pub fn assemble(&mut self, frame: &Frame) -> Result<Option<IsoTpMessage>, Error> {
        if frame.data.is_empty() {
            return Err(Error::MalformedFrame);
        }

        match frame.data[0].into() {
            FrameType::Single => self.recv_single_frame(frame).map(Some),
            FrameType::First => self.recv_first_frame(frame),
            FrameType::Consecutive => self.recv_consecutive_frame(frame),
            FrameType::FlowControl => Ok(None),
            FrameType::Unknown => {
                self.partial.remove(&frame.id);
                Err(Error::UnknownFrameType)
            }
        }
    }

    /// Drops the unfinished payload of `id`, if any.
    pub fn reset(&mut self, id: &Identifier) {
        self.partial.remove(id);
    }

    /// Number of arbitration IDs with an unfinished multi frame payload.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    fn recv_single_frame(&mut self, frame: &Frame) -> Result<IsoTpMessage, Error> {
        self.partial.remove(&frame.id);

        let len = (frame.data[0] & 0xF) as usize;
        if len == 0 || len + 1 > frame.data.len() {
            return Err(Error::MalformedFrame);
        }

        debug!("RX SF, length: {} data {}", len, hex::encode(&frame.data));

        Ok(IsoTpMessage {
            id: frame.id,
            data: frame.data[1..len + 1].to_vec(),
        })
    }

    fn recv_first_frame(&mut self, frame: &Frame) -> Result<Option<IsoTpMessage>, Error> {
        if frame.data.len() < 2 {
            return Err(Error::MalformedFrame);
        }

        let b0 = frame.data[0] as u16;
        let b1 = frame.data[1] as u16;
        let len = ((b0 << 8 | b1) & 0xFFF) as usize;
        if len == 0 {
            return Err(Error::MalformedFrame);
        }

        debug!("RX FF, length: {}, data {}", len, hex::encode(&frame.data));

        let mut buf = frame.data[2..].to_vec();
        if buf.len() >= len {
            buf.truncate(len);
            self.partial.remove(&frame.id);
            return Ok(Some(IsoTpMessage { id: frame.id, data: buf }));
        }

        self.partial.insert(frame.id, Partial { buf, len, idx: 1 });
        Ok(None)
    }

    fn recv_consecutive_frame(&mut self, frame: &Frame) -> Result<Option<IsoTpMessage>, Error> {
        let Some(partial) = self.partial.get_mut(&frame.id) else {
            return Err(Error::UnexpectedConsecutive);
        };

        let msg_idx = frame.data[0] & 0xF;
        if msg_idx != partial.idx {
            self.partial.remove(&frame.id);
            return Err(Error::OutOfOrder);
        }

        let remaining_len = partial.len - partial.buf.len();
        let end_idx = std::cmp::min(remaining_len + 1, frame.data.len());
        partial.buf.extend(&frame.data[1..end_idx]);
        debug!(
            "RX CF, idx: {}, data {} {}",
            partial.idx,
            hex::encode(&frame.data),
            hex::encode(&partial.buf)
        );

        partial.idx = if partial.idx == 0xF { 0 } else { partial.idx + 1 };

        if partial.buf.len() >= partial.len {
            let partial = self.partial.remove(&frame.id).ok_or(Error::MalformedFrame)?;
            return Ok(Some(IsoTpMessage {
                id: frame.id,
                data: partial.buf,
            }));
        }
        Ok(None)
    }
}

fn pad(data: &mut Vec<u8>, padding: Option<u8>) {
    if let Some(padding) = padding {
        data.resize(MAX_DATA_LEN, padding);
    }
}

/// Splits a payload of up to 4095 bytes into single, or first and consecutive frames. Frames are padded to 8 bytes when `padding` is set.
pub fn segment(id: u32, payload: &[u8], padding: Option<u8>) -> Result<Vec<Frame>, Error> {
    if payload.is_empty() {
        return Err(Error::MalformedFrame);
    }

    debug!("TX {}", hex::encode(payload));

    if payload.len() <= SINGLE_FRAME_LEN {
        let mut buf = vec![FrameType::Single as u8 | payload.len() as u8];
        buf.extend(payload);
        pad(&mut buf, padding);

        debug!("TX SF, length: {} data {}", payload.len(), hex::encode(&buf));
        return Ok(vec![Frame::new(id, &buf)]);
    } else if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::DataTooLarge);
    }

    let mut frames = Vec::new();

    let b0: u8 = FrameType::First as u8 | ((payload.len() >> 8) & 0xF) as u8;
    let b1: u8 = (payload.len() & 0xFF) as u8;
    let mut buf = vec![b0, b1];
    buf.extend(&payload[..FIRST_FRAME_LEN]);

    debug!("TX FF, length: {} data {}", payload.len(), hex::encode(&buf));
    frames.push(Frame::new(id, &buf));

    let chunks = payload[FIRST_FRAME_LEN..].chunks(CONSECUTIVE_FRAME_LEN);
    for (idx, chunk) in chunks.enumerate() {
        let idx = ((idx + 1) & 0xF) as u8;

        let mut buf = vec![FrameType::Consecutive as u8 | idx];
        buf.extend(chunk);
        pad(&mut buf, padding);

        debug!("TX CF, idx: {} data {}", idx, hex::encode(&buf));
        frames.push(Frame::new(id, &buf));
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_padding() {
        let frames = segment(0x7e0, &[0x10, 0x03], Some(0xaa)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, vec![0x02, 0x10, 0x03, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa]);

        let frames = segment(0x7e0, &[0x10, 0x03], None).unwrap();
        assert_eq!(frames[0].data, vec![0x02, 0x10, 0x03]);
    }

    #[test]
    fn multi_frame_layout() {
        let payload: Vec<u8> = (0..20).collect();
        let frames = segment(0x7e0, &payload, None).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data, vec![0x10, 20, 0, 1, 2, 3, 4, 5]);
        assert_eq!(frames[1].data[0], 0x21);
        assert_eq!(frames[2].data, vec![0x22, 13, 14, 15, 16, 17, 18, 19]);
    }

    #[test]
    fn segment_limits() {
        assert_eq!(segment(0x7e0, &[], None), Err(Error::MalformedFrame));
        assert_eq!(segment(0x7e0, &[0; 4096], None), Err(Error::DataTooLarge));
        assert!(segment(0x7e0, &[0; 4095], None).is_ok());
    }

    #[test]
    fn assemble_segmented_payload() {
        let payload: Vec<u8> = (0..200u8).collect();
        let frames = segment(0x7e8, &payload, Some(0x00)).unwrap();

        let mut assembler = IsoTpAssembler::new();
        let (last, rest) = frames.split_last().unwrap();
        for frame in rest {
            assert_eq!(assembler.assemble(frame), Ok(None));
        }
        assert_eq!(assembler.pending(), 1);

        let message = assembler.assemble(last).unwrap().unwrap();
        assert_eq!(message.data, payload);
        assert_eq!(message.raw_id(), 0x7e8);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn assemble_out_of_order() {
        let payload: Vec<u8> = (0..30u8).collect();
        let frames = segment(0x7e8, &payload, None).unwrap();

        let mut assembler = IsoTpAssembler::new();
        assert_eq!(assembler.assemble(&frames[0]), Ok(None));
        assert_eq!(assembler.assemble(&frames[2]), Err(Error::OutOfOrder));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn assemble_aborts() {
        let mut assembler = IsoTpAssembler::new();
        assert_eq!(
            assembler.assemble(&Frame::new(0x7e8, &[0x21, 0x00])),
            Err(Error::UnexpectedConsecutive)
        );
        assert_eq!(
            assembler.assemble(&Frame::new(0x7e8, &[0x40, 0x00])),
            Err(Error::UnknownFrameType)
        );
        assert_eq!(
            assembler.assemble(&Frame::new(0x7e8, &[0x05, 0x00])),
            Err(Error::MalformedFrame)
        );
        // Flow control frames are not payload
        assert_eq!(assembler.assemble(&Frame::new(0x7e8, &[0x30, 0x00, 0x00])), Ok(None));
    }

    #[test]
    fn sequence_index_wraps() {
        let payload = vec![0x55u8; 6 + 7 * 17];
        let frames = segment(0x7e0, &payload, None).unwrap();
        assert_eq!(frames[15].data[0], 0x2f);
        assert_eq!(frames[16].data[0], 0x20);

        let mut assembler = IsoTpAssembler::new();
        let mut result = None;
        for frame in &frames {
            result = assembler.assemble(frame).unwrap();
        }
        assert_eq!(result.unwrap().data, payload);
    }
}
