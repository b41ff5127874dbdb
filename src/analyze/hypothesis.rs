//! Second phase: replay a capture against a [`Baseline`] and flag frames that break it.
//!
//! Every ID keeps a small state machine over its changes. A change touching bits that never moved in the baseline opens an event. Returning to the value seen before the event releases it. Any other change moves the event to its next stage. While an event is open the changing IDs are kept on a correlator list. IDs that change while others are on that list end up in the history, the set of IDs that took part in a correlated event.
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::analyze::baseline::{round4, Baseline};
use crate::analyze::buffer::CaptureBuffer;
use crate::can::Frame;

/// Slack subtracted from the learned minimum interval before a frame counts as an impulse.
pub const IMPULSE_TOLERANCE: f64 = 0.04;

/// Where an ID's event stood when a frame arrived too early.
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum ImpulseStage {
    #[strum(serialize = "continuous event")]
    Continued,
    #[strum(serialize = "next stage")]
    NextStage,
    #[strum(serialize = "event finished")]
    Completed,
    #[strum(serialize = "no event")]
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyKind {
    /// Bits changed that never changed during training
    NewPosition,
    /// Value returned to the one seen before the event
    Released,
    /// Further change while an event is open
    ChangedAgain,
    /// Frame arrived before the learned minimum interval
    Impulse { stage: ImpulseStage, interval: f64, expected: f64 },
    /// ID absent from the baseline
    NewId,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::NewPosition => f.write_str("new bit position changed"),
            AnomalyKind::Released => f.write_str("returned to previous value"),
            AnomalyKind::ChangedAgain => f.write_str("changed again"),
            AnomalyKind::Impulse {
                stage,
                interval,
                expected,
            } => write!(f, "impulse, {} (interval {} < {})", stage, interval, expected),
            AnomalyKind::NewId => f.write_str("new ID"),
        }
    }
}

/// One breaking frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    /// Position of the frame among frames of its ID
    pub count: u64,
    pub timestamp: f64,
    pub frame: Frame,
    pub kind: AnomalyKind,
    /// Other IDs on the correlator list when the frame arrived
    pub causes: Vec<u32>,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] {} {}", self.count, self.timestamp, self.frame.text(), self.kind)?;
        if !self.causes.is_empty() {
            write!(f, ", possibly caused by {}", hex_list(&self.causes))?;
        }
        Ok(())
    }
}

/// Per-ID replay state.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisRecord {
    pub count: u64,
    pub changes: u64,
    pub last: u64,
    pub last_time: f64,
    pub ch_last_time: f64,
    /// Bits changed by events of this ID
    pub diff_mask: u64,
    pub changed: bool,
    pub released: bool,
    pub changed_again: bool,
    pub settled: bool,
    pub comments: Vec<String>,
    pub anomalies: Vec<Anomaly>,
    next_comment: usize,
}

impl HypothesisRecord {
    fn new(bits: u64, timestamp: f64) -> Self {
        Self {
            count: 1,
            changes: 0,
            last: bits,
            last_time: timestamp,
            ch_last_time: timestamp,
            diff_mask: 0,
            changed: false,
            released: false,
            changed_again: false,
            settled: false,
            comments: Vec::new(),
            anomalies: Vec::new(),
            next_comment: 0,
        }
    }

    fn next_comment(&mut self) -> String {
        if self.comments.is_empty() {
            return "periodic".to_string();
        }
        let comment = self.comments[self.next_comment % self.comments.len()].clone();
        self.next_comment += 1;
        comment
    }
}

fn hex_list(ids: &[u32]) -> String {
    ids.iter().map(|id| format!("0x{:x}", id)).collect::<Vec<_>>().join(", ")
}

/// Puts `id` on the correlator list unless it is already there.
fn correlate(correlator: &mut Vec<u32>, id: u32) {
    if !correlator.contains(&id) {
        correlator.push(id);
    }
}

/// IDs on the correlator list other than `id`.
fn causes_of(correlator: &[u32], id: u32) -> Vec<u32> {
    correlator.iter().copied().filter(|c| *c != id).collect()
}

/// Moves `id` off the correlator list and remembers its settled mask.
fn settle(correlator: &mut Vec<u32>, known: &mut Vec<(u32, u64)>, id: u32, mask: u64) {
    if let Some(position) = correlator.iter().position(|c| *c == id) {
        correlator.remove(position);
        known.push((id, mask));
    }
}

/// Result of replaying one capture against a baseline.
#[derive(Debug, Clone, Default)]
pub struct Hypothesis {
    records: BTreeMap<u32, HypothesisRecord>,
    history: BTreeSet<u32>,
    findings: CaptureBuffer,
    session: Vec<Vec<String>>,
}

impl Hypothesis {
    pub fn run(baseline: &Baseline, buffer: &CaptureBuffer) -> Self {
        let mut records: BTreeMap<u32, HypothesisRecord> = BTreeMap::new();
        let mut history = BTreeSet::new();
        let mut findings = CaptureBuffer::new("findings");
        let mut correlator: Vec<u32> = Vec::new();
        let mut known: Vec<(u32, u64)> = Vec::new();

        for captured in buffer.iter() {
            let frame = &captured.frame;
            let timestamp = captured.timestamp;
            let id = frame.raw_id();
            let bits = frame.bit_vector();

            let record = match records.entry(id) {
                Entry::Vacant(entry) => entry.insert(HypothesisRecord::new(bits, round4(timestamp))),
                Entry::Occupied(entry) => {
                    let record = entry.into_mut();
                    record.count += 1;
                    let (changed, settled, changed_again) = (record.changed, record.settled, record.changed_again);

                    if bits != record.last {
                        record.changes += 1;
                        let diff = bits ^ record.last;
                        let learned = baseline.diff_mask(id);

                        if (diff | learned) != learned {
                            let causes = causes_of(&correlator, id);
                            let kind = if !changed && !settled && !changed_again {
                                record.settled = false;
                                if causes.is_empty() {
                                    record.comments.push(format!("first change, previous data {:016x}", record.last));
                                } else {
                                    history.insert(id);
                                    history.extend(causes.iter().copied());
                                    record.comments.push(format!(
                                        "first change, previous data {:016x}, possibly caused by {}",
                                        record.last,
                                        hex_list(&causes)
                                    ));
                                }
                                if !known.contains(&(id, record.diff_mask)) {
                                    correlate(&mut correlator, id);
                                }
                                record.changed = true;
                                record.released = false;
                                record.changed_again = false;
                                record.diff_mask |= diff;
                                AnomalyKind::NewPosition
                            } else if diff == record.diff_mask {
                                record.released = true;
                                record.changed = false;
                                record.changed_again = false;
                                record.settled = false;
                                settle(&mut correlator, &mut known, id, record.diff_mask);
                                record.comments.push("returned to previous value".to_string());
                                AnomalyKind::Released
                            } else {
                                if causes.is_empty() {
                                    record.comments.push("changed again".to_string());
                                } else {
                                    history.insert(id);
                                    history.extend(causes.iter().copied());
                                    record
                                        .comments
                                        .push(format!("changed again, possibly caused by {}", hex_list(&causes)));
                                }
                                settle(&mut correlator, &mut known, id, record.diff_mask);
                                if !known.contains(&(id, record.diff_mask | diff)) {
                                    correlate(&mut correlator, id);
                                }
                                record.diff_mask |= diff;
                                record.changed_again = true;
                                record.changed = false;
                                record.settled = false;
                                AnomalyKind::ChangedAgain
                            };

                            debug!("0x{:x}: {} at {}", id, kind, timestamp);
                            record.anomalies.push(Anomaly {
                                count: record.count,
                                timestamp: round4(timestamp),
                                frame: frame.clone(),
                                kind,
                                causes,
                            });
                            findings.push(timestamp, frame.clone());
                        }
                    } else if record.changed {
                        record.changed = false;
                        record.settled = true;
                        settle(&mut correlator, &mut known, id, record.diff_mask);
                    } else if record.changed_again {
                        record.changed_again = false;
                        record.settled = true;
                        settle(&mut correlator, &mut known, id, record.diff_mask);
                    }

                    let (changed, released, settled, changed_again) =
                        (record.changed, record.released, record.settled, record.changed_again);
                    record.last = bits;
                    record.ch_last_time = round4(timestamp);

                    if record.count > 2 {
                        if let Some(learned) = baseline.get(id) {
                            let interval = round4(timestamp - record.last_time);
                            if interval < learned.min_time - IMPULSE_TOLERANCE {
                                let stage = if settled {
                                    Some(ImpulseStage::Continued)
                                } else if changed_again {
                                    Some(ImpulseStage::NextStage)
                                } else if released {
                                    Some(ImpulseStage::Completed)
                                } else if !changed {
                                    Some(ImpulseStage::Idle)
                                } else {
                                    None
                                };
                                if let Some(stage) = stage {
                                    record.comments.push(format!("impulse, {}", stage));
                                }

                                // Only impulses outside of an open event break the baseline
                                if let Some(stage) = stage.filter(|_| !changed && !changed_again && !released) {
                                    record.anomalies.push(Anomaly {
                                        count: record.count,
                                        timestamp: round4(timestamp),
                                        frame: frame.clone(),
                                        kind: AnomalyKind::Impulse {
                                            stage,
                                            interval,
                                            expected: learned.min_time,
                                        },
                                        causes: causes_of(&correlator, id),
                                    });
                                    findings.push(timestamp, frame.clone());
                                }
                            }
                        }
                    }
                    record.last_time = round4(timestamp);
                    record
                }
            };

            if !baseline.contains(id) {
                let causes = causes_of(&correlator, id);
                correlate(&mut correlator, id);
                record.comments.push("new ID".to_string());
                record.anomalies.push(Anomaly {
                    count: record.count,
                    timestamp: round4(timestamp),
                    frame: frame.clone(),
                    kind: AnomalyKind::NewId,
                    causes,
                });
                findings.push(timestamp, frame.clone());
            }
        }

        // Frames of IDs that never took part in a correlated event are not worth replaying
        for (id, record) in &records {
            if !record.anomalies.is_empty() && !history.contains(id) {
                findings.remove_by_id(*id);
            }
        }

        let mut session = vec![["TIME", "ID", "LENGTH", "MESSAGE", "COMMENT"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()];
        for captured in findings.iter() {
            let frame = &captured.frame;
            let comment = records
                .get_mut(&frame.raw_id())
                .map(HypothesisRecord::next_comment)
                .unwrap_or_default();
            session.push(vec![
                round4(captured.timestamp).to_string(),
                format!("0x{:x}", frame.raw_id()),
                frame.len().to_string(),
                hex::encode(&frame.data),
                comment,
            ]);
        }

        Self {
            records,
            history,
            findings,
            session,
        }
    }

    pub fn record(&self, id: u32) -> Option<&HypothesisRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = (u32, &HypothesisRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// IDs involved in correlated events.
    pub fn history(&self) -> &BTreeSet<u32> {
        &self.history
    }

    /// Breaking frames of history IDs, in capture order. These are the stimulus candidates.
    pub fn findings(&self) -> &CaptureBuffer {
        &self.findings
    }

    /// Table of the findings with one comment per row, header first.
    pub fn session_table(&self) -> &[Vec<String>] {
        &self.session
    }

    /// Every anomaly, ordered by ID.
    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.records.values().flat_map(|r| r.anomalies.iter())
    }

    /// Human readable summary of the anomalies of history IDs.
    pub fn report(&self) -> String {
        let mut report = String::new();
        for (id, record) in &self.records {
            if record.anomalies.is_empty() || !self.history.contains(id) {
                continue;
            }
            report.push_str(&format!("ID 0x{:x}, {} anomalies:\n", id, record.anomalies.len()));
            for anomaly in &record.anomalies {
                report.push_str(&format!("\t{}\n", anomaly));
            }
        }
        if report.is_empty() {
            report.push_str("No correlated changes found\n");
        }
        report
    }
}
