//! First phase: learn per-ID statistics from a reference capture.
use std::collections::BTreeMap;

use crate::analyze::buffer::CaptureBuffer;

/// Half width of the timing window seeded by the second sample.
pub const TIMING_SEED: f64 = 0.001;

/// Timestamps are compared with four decimals.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaselineRecord {
    pub count: u64,
    pub changes: u64,
    /// Bit vector of the last frame
    pub last: u64,
    /// OR of every bit seen changing
    pub diff_mask: u64,
    pub last_time: f64,
    pub ch_last_time: f64,
    /// Inter-arrival bounds of consecutive frames
    pub min_time: f64,
    pub max_time: f64,
    /// Inter-arrival bounds of content changes
    pub ch_min_time: f64,
    pub ch_max_time: f64,
}

impl BaselineRecord {
    fn new(bits: u64, timestamp: f64) -> Self {
        Self {
            count: 1,
            changes: 0,
            last: bits,
            diff_mask: 0,
            last_time: timestamp,
            ch_last_time: timestamp,
            min_time: 0.0,
            max_time: 0.0,
            ch_min_time: 0.0,
            ch_max_time: 0.0,
        }
    }

    fn update(&mut self, bits: u64, timestamp: f64) {
        self.count += 1;

        if bits != self.last {
            self.changes += 1;
            self.diff_mask |= self.last ^ bits;
            self.last = bits;

            let elapsed = timestamp - self.ch_last_time;
            if self.changes == 2 {
                self.ch_max_time = round4(elapsed + TIMING_SEED);
                self.ch_min_time = round4(elapsed - TIMING_SEED);
            } else if self.changes > 2 {
                let ch_time = round4(elapsed);
                if ch_time > self.ch_max_time {
                    self.ch_max_time = ch_time;
                } else if ch_time < self.ch_min_time {
                    self.ch_min_time = ch_time;
                }
            }
            self.ch_last_time = round4(timestamp);
        }

        let elapsed = timestamp - self.last_time;
        if self.count == 2 {
            self.max_time = round4(elapsed + TIMING_SEED);
            self.min_time = round4(elapsed - TIMING_SEED);
        } else if self.count > 2 {
            let time = round4(elapsed);
            if time > self.max_time {
                self.max_time = time;
            } else if time < self.min_time {
                self.min_time = time;
            }
        }
        self.last_time = round4(timestamp);
    }
}

/// Learned behaviour of every arbitration ID in a reference capture.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Baseline {
    records: BTreeMap<u32, BaselineRecord>,
}

impl Baseline {
    pub fn train(buffer: &CaptureBuffer) -> Self {
        let mut records: BTreeMap<u32, BaselineRecord> = BTreeMap::new();

        for captured in buffer.iter() {
            let id = captured.frame.raw_id();
            let bits = captured.frame.bit_vector();

            match records.get_mut(&id) {
                Some(record) => record.update(bits, captured.timestamp),
                None => {
                    records.insert(id, BaselineRecord::new(bits, round4(captured.timestamp)));
                }
            }
        }

        Self { records }
    }

    pub fn get(&self, id: u32) -> Option<&BaselineRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.records.contains_key(&id)
    }

    /// Changing bits of `id`, zero for IDs never seen.
    pub fn diff_mask(&self, id: u32) -> u64 {
        self.records.get(&id).map(|r| r.diff_mask).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BaselineRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::Frame;

    #[test]
    fn counts_changes_and_mask() {
        let buffer: CaptureBuffer = [
            (0.00, Frame::new(0x100, &[0x00, 0x01])),
            (0.01, Frame::new(0x100, &[0x00, 0x01])),
            (0.02, Frame::new(0x100, &[0x00, 0x03])),
            (0.03, Frame::new(0x100, &[0x80, 0x03])),
        ]
        .into_iter()
        .collect();

        let baseline = Baseline::train(&buffer);
        let record = baseline.get(0x100).unwrap();
        assert_eq!(record.count, 4);
        assert_eq!(record.changes, 2);
        assert_eq!(record.diff_mask, 0x8002);
        assert_eq!(record.last, 0x8003);
    }

    #[test]
    fn timing_bounds() {
        let buffer: CaptureBuffer = [0.0, 0.1, 0.2, 0.35, 0.4]
            .into_iter()
            .map(|t| (t, Frame::new(0x200, &[0x00])))
            .collect();

        let record = Baseline::train(&buffer).get(0x200).cloned().unwrap();
        // Seeded from the first interval, then widened
        assert_eq!(record.max_time, 0.15);
        assert_eq!(record.min_time, 0.05);
        assert_eq!(record.changes, 0);
        assert_eq!(record.ch_max_time, 0.0);
    }

    #[test]
    fn change_timing_seed() {
        let buffer: CaptureBuffer = [
            (0.0, Frame::new(0x300, &[0x00])),
            (0.5, Frame::new(0x300, &[0x01])),
            (1.0, Frame::new(0x300, &[0x00])),
        ]
        .into_iter()
        .collect();

        let record = Baseline::train(&buffer).get(0x300).cloned().unwrap();
        assert_eq!(record.changes, 2);
        assert_eq!(record.ch_max_time, 0.501);
        assert_eq!(record.ch_min_time, 0.499);
    }
}
