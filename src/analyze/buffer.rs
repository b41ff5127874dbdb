use std::collections::BTreeSet;

use crate::can::Frame;

/// A frame with its capture time in seconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Captured {
    pub timestamp: f64,
    pub frame: Frame,
}

/// Named, time ordered list of captured frames.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureBuffer {
    name: String,
    entries: Vec<Captured>,
}

impl CaptureBuffer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, timestamp: f64, frame: Frame) {
        self.entries.push(Captured { timestamp, frame });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Captured> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Captured> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Captured> {
        self.entries.last()
    }

    /// Frames with arbitration ID `id`, in capture order.
    pub fn frames_by_id(&self, id: u32) -> impl Iterator<Item = &Frame> {
        self.entries
            .iter()
            .filter(move |c| c.frame.raw_id() == id)
            .map(|c| &c.frame)
    }

    pub fn remove_by_id(&mut self, id: u32) {
        self.entries.retain(|c| c.frame.raw_id() != id);
    }

    pub fn ids(&self) -> BTreeSet<u32> {
        self.entries.iter().map(|c| c.frame.raw_id()).collect()
    }

    /// Appends all frames of `other`.
    pub fn extend_from(&mut self, other: &CaptureBuffer) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Concatenation of several buffers, in order.
    pub fn concat<'a>(name: &str, buffers: impl IntoIterator<Item = &'a CaptureBuffer>) -> Self {
        let mut result = Self::new(name);
        for buffer in buffers {
            result.extend_from(buffer);
        }
        result
    }
}

impl FromIterator<(f64, Frame)> for CaptureBuffer {
    fn from_iter<I: IntoIterator<Item = (f64, Frame)>>(iter: I) -> Self {
        let mut buffer = CaptureBuffer::default();
        for (timestamp, frame) in iter {
            buffer.push(timestamp, frame);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_and_remove() {
        let mut buffer: CaptureBuffer = [
            (0.0, Frame::new(0x100, &[1])),
            (0.1, Frame::new(0x200, &[2])),
            (0.2, Frame::new(0x100, &[3])),
        ]
        .into_iter()
        .collect();

        let data: Vec<_> = buffer.frames_by_id(0x100).map(|f| f.data[0]).collect();
        assert_eq!(data, vec![1, 3]);

        buffer.remove_by_id(0x100);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.ids().into_iter().collect::<Vec<_>>(), vec![0x200]);
    }
}
