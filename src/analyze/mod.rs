//! Baseline and anomaly engine.
//!
//! [`Analyzer`] records the frames flowing through its `read` action into numbered capture buffers. Analysis runs in three phases driven by commands:
//!
//! 1. `statistic` learns a [`Baseline`] from one buffer (or all of them),
//! 2. `hypothesis` replays another buffer against it and collects the frames that broke it,
//! 3. `test` injects every flagged frame through the `write` action and scores the reaction of the IDs implicated by the hypothesis.
//!
//! The phases themselves are plain functions over [`CaptureBuffer`]s and can be used without the module.
//! ## Example
//! ```rust
//! use canfuzz::analyze::{Baseline, CaptureBuffer, Hypothesis};
//! use canfuzz::can::Frame;
//!
//! let training: CaptureBuffer = (0..10).map(|i| (i as f64 * 0.1, Frame::new(0x100, &[0x00]))).collect();
//! let mut replay = training.clone();
//! replay.push(1.0, Frame::new(0x100, &[0x01]));
//!
//! let baseline = Baseline::train(&training);
//! let hypothesis = Hypothesis::run(&baseline, &replay);
//! assert_eq!(hypothesis.record(0x100).unwrap().anomalies.len(), 1);
//! ```

pub mod baseline;
pub mod buffer;
pub mod confirm;
pub mod hypothesis;
pub mod protocol;

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::can::Frame;
use crate::cmdres::{CmdResult, CmdValue, ERR_GENERIC};
use crate::engine::Envelope;
use crate::error::Error;
use crate::module::{parse_int, Arity, Command, CommandTable, GateGuard, Module, ModuleCore, Params};
use crate::output::OutputSink;
use crate::uds::DEFAULT_SHIFT;
use crate::Result;

pub use baseline::{Baseline, BaselineRecord};
pub use buffer::{CaptureBuffer, Captured};
pub use confirm::{best_stimulus, correlation_weight, NOT_FOUND};
pub use hypothesis::{Anomaly, AnomalyKind, Hypothesis, HypothesisRecord, ImpulseStage};
pub use protocol::ProtocolFormat;

/// Buffer index selecting every buffer at once.
pub const ALL_BUFFERS: i64 = -1;

pub const DEFAULT_SETTLE_SECS: f64 = 1.0;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_POLL_MS: i64 = 10;

struct Trained {
    index: i64,
    baseline: Baseline,
}

struct Tested {
    index: usize,
    hypothesis: Hypothesis,
}

struct State {
    buffers: Vec<CaptureBuffer>,
    trained: Option<Trained>,
    tested: Option<Tested>,
    /// Frame waiting for the `write` action
    resend: Option<Frame>,
    shift: u32,
}

impl State {
    fn new(shift: u32) -> Self {
        Self {
            buffers: vec![CaptureBuffer::new("start_buffer")],
            trained: None,
            tested: None,
            resend: None,
            shift,
        }
    }

    fn current(&self) -> usize {
        self.buffers.len() - 1
    }

    fn push_buffer(&mut self, buffer: CaptureBuffer) -> usize {
        self.buffers.push(buffer);
        self.current()
    }

    /// One buffer, or the concatenation of all of them for [`ALL_BUFFERS`].
    fn select(&self, index: i64) -> Result<CaptureBuffer> {
        if index == ALL_BUFFERS {
            return Ok(CaptureBuffer::concat("all", &self.buffers));
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.buffers.get(i))
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no buffer with index {}", index)))
    }
}

fn seconds(params: &Params, key: &str, default: f64) -> Result<Duration> {
    let value = params.parse::<f64>(key)?.unwrap_or(default);
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidArgument(format!("{}={}", key, value)));
    }
    Ok(Duration::from_secs_f64(value))
}

fn parse_index(arg: Option<&str>, default: i64) -> Result<i64> {
    arg.map(parse_int).transpose().map(|i| i.unwrap_or(default))
}

/// Capture and anomaly analysis module, registered as `analyze`.
///
/// Init parameters besides the [`ModuleCore`] ones: `uds_shift`, `settle` (seconds added to each confirmation wait), `drain_timeout` (seconds to wait for an injected frame to leave) and `poll` (milliseconds between drain checks).
///
/// Action parameters: `action=read` (default) records frames, `action=write` injects queued stimulus frames into empty envelopes.
pub struct Analyzer {
    core: ModuleCore,
    commands: CommandTable<Self>,
    state: Mutex<State>,
    clock: Instant,
    settle: Duration,
    drain_timeout: Duration,
    poll: Duration,
}

impl Analyzer {
    pub fn new(name: &str, params: &Params, sink: OutputSink) -> Result<Self> {
        let core = ModuleCore::new(name, params, sink)?;

        let shift = params.get_int("uds_shift")?.unwrap_or(DEFAULT_SHIFT as i64);
        let shift = u32::try_from(shift).map_err(|_| Error::InvalidArgument(format!("uds_shift={}", shift)))?;

        let poll = params.get_int("poll")?.unwrap_or(DEFAULT_POLL_MS);
        let poll = u64::try_from(poll)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::InvalidArgument(format!("poll={}", poll)))?;

        let commands = CommandTable::new()
            .with("status", Command::new("Get current status", Arity::Zero, "", status))
            .with("newbuf", Command::new("Start a new capture buffer", Arity::One, "[name]", new_buffer))
            .with("print", Command::new("Summary of a buffer", Arity::One, "[index|-1]", print))
            .with("search", Command::new("Frames with an arbitration ID", Arity::One, "<id>", search))
            .with(
                "protocol",
                Command::new("ISO-TP and UDS found in a buffer", Arity::One, "[UDS|ISO|ALL][, index]", protocol),
            )
            .with("uds", Command::new("UDS response ID shift", Arity::One, "[shift]", uds_shift))
            .with("statistic", Command::new("Train the baseline", Arity::One, "[index|-1]", statistic))
            .with(
                "hypothesis",
                Command::new("Find frames breaking the baseline", Arity::One, "[index]", hypothesis),
            )
            .with("test", Command::new("Confirm the cause of the findings", Arity::Zero, "", confirm).disabled())
            .with("clean", Command::new("Drop all buffers and results", Arity::Zero, "", clean));

        Ok(Self {
            core,
            commands,
            state: Mutex::new(State::new(shift)),
            clock: Instant::now(),
            settle: seconds(params, "settle", DEFAULT_SETTLE_SECS)?,
            drain_timeout: seconds(params, "drain_timeout", DEFAULT_DRAIN_TIMEOUT_SECS)?,
            poll: Duration::from_millis(poll),
        })
    }

    /// Seconds since the module was created.
    fn now(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Adds a capture recorded elsewhere. It becomes the current buffer, returns its index.
    pub fn load_buffer(&self, name: &str, buffer: CaptureBuffer) -> usize {
        let mut loaded = CaptureBuffer::new(name);
        loaded.extend_from(&buffer);
        self.state.lock().push_buffer(loaded)
    }

    pub fn buffer(&self, index: usize) -> Option<CaptureBuffer> {
        self.state.lock().buffers.get(index).cloned()
    }

    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.state.lock().trained.as_ref().map(|t| t.baseline.clone())
    }

    pub fn hypothesis(&self) -> Option<Hypothesis> {
        self.state.lock().tested.as_ref().map(|t| t.hypothesis.clone())
    }

    /// Frame queued for injection, if the `write` action did not take it yet.
    pub fn pending_resend(&self) -> Option<Frame> {
        self.state.lock().resend.clone()
    }

    /// Waits until the `write` action took the queued frame. False on timeout, the frame is withdrawn then.
    fn wait_drained(&self) -> bool {
        let started = Instant::now();
        loop {
            if self.state.lock().resend.is_none() {
                return true;
            }
            if started.elapsed() >= self.drain_timeout {
                self.state.lock().resend = None;
                return false;
            }
            std::thread::sleep(self.poll);
        }
    }
}

impl Module for Analyzer {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn commands(&self) -> &CommandTable<Self> {
        &self.commands
    }

    fn effect(&self, mut envelope: Envelope, params: &Params) -> Envelope {
        match params.get_or("action", "read") {
            "read" => {
                if let Some(frame) = envelope.can_frame() {
                    let timestamp = self.now();
                    let mut state = self.state.lock();
                    let current = state.current();
                    state.buffers[current].push(timestamp, frame.clone());
                }
            }
            "write" => {
                if !envelope.has_can_data {
                    if let Some(frame) = self.state.lock().resend.take() {
                        debug!("{}: injecting {}", self.core.name(), frame.text());
                        envelope = Envelope::with_frame(frame, self.core.bus());
                    }
                }
            }
            other => self.core.dprint(1, &format!("unknown action: {}", other)),
        }
        envelope
    }

    fn on_start(&self, _params: &Params) {
        info!("{}: capturing into buffer {}", self.core.name(), self.state.lock().current());
    }
}

fn status(module: &Analyzer, _gate: &mut GateGuard<'_>, _arg: Option<&str>) -> Result<CmdResult> {
    let state = module.state.lock();
    let current = state.current();
    let mut text = format!(
        "{}, buffer {} ({}) with {} frames",
        if module.core.is_active() { "active" } else { "inactive" },
        current,
        state.buffers[current].name(),
        state.buffers[current].len()
    );
    if let Some(trained) = &state.trained {
        text.push_str(&format!(", baseline from {} with {} IDs", trained.index, trained.baseline.len()));
    }
    if let Some(tested) = &state.tested {
        text.push_str(&format!(
            ", hypothesis on {} with {} findings",
            tested.index,
            tested.hypothesis.findings().len()
        ));
    }
    Ok(CmdResult::text("status", "Current status", text))
}

fn new_buffer(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let mut state = module.state.lock();
    let name = match arg {
        Some(name) => name.trim().to_string(),
        None => format!("buffer_{}", state.buffers.len()),
    };
    let index = state.push_buffer(CaptureBuffer::new(&name));
    module.core.info(&format!("New buffer {} ({})", index, name));
    Ok(CmdResult::new("newbuf", "Index of the new buffer", CmdValue::Int(index as i64)))
}

/// One row per distinct frame: ID, length, data and number of occurrences.
fn print(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let index = parse_index(arg, ALL_BUFFERS)?;
    let buffer = module.state.lock().select(index)?;

    let mut counts: BTreeMap<(u32, usize, Vec<u8>), u64> = BTreeMap::new();
    for captured in buffer.iter() {
        let frame = &captured.frame;
        *counts.entry((frame.raw_id(), frame.len(), frame.data.clone())).or_default() += 1;
    }

    let mut rows = vec![vec![
        "ID".to_string(),
        "LENGTH".to_string(),
        "MESSAGE".to_string(),
        "COUNT".to_string(),
    ]];
    rows.extend(counts.into_iter().map(|((id, len, data), count)| {
        vec![format!("0x{:x}", id), len.to_string(), hex::encode(data), count.to_string()]
    }));
    Ok(CmdResult::new("print", "Frames by ID", CmdValue::Table(rows)))
}

fn search(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let arg = arg.ok_or_else(|| Error::InvalidArgument("missing ID".to_string()))?;
    let id = u32::try_from(parse_int(arg)?).map_err(|_| Error::InvalidArgument(arg.to_string()))?;

    let state = module.state.lock();
    let mut rows = vec![vec!["BUFFER".to_string(), "TIME".to_string(), "MESSAGE".to_string()]];
    for (index, buffer) in state.buffers.iter().enumerate() {
        for captured in buffer.iter().filter(|c| c.frame.raw_id() == id) {
            rows.push(vec![
                index.to_string(),
                format!("{:.4}", captured.timestamp),
                hex::encode(&captured.frame.data),
            ]);
        }
    }
    Ok(CmdResult::new("search", "Frames with the ID", CmdValue::Table(rows)))
}

fn protocol(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let (format, index) = match arg.map(|a| a.split_once(',').unwrap_or((a, ""))) {
        None => (ProtocolFormat::All, ALL_BUFFERS),
        Some((format, index)) => {
            let format = match format.trim() {
                "" => ProtocolFormat::All,
                name => name
                    .parse()
                    .map_err(|e| Error::InvalidArgument(format!("{}: {}", name, e)))?,
            };
            let index = parse_index(Some(index).filter(|i| !i.trim().is_empty()), ALL_BUFFERS)?;
            (format, index)
        }
    };

    let (buffer, shift) = {
        let state = module.state.lock();
        (state.select(index)?, state.shift)
    };
    Ok(CmdResult::text("protocol", "Protocol analysis", protocol::report(&buffer, format, shift)))
}

fn uds_shift(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let mut state = module.state.lock();
    if let Some(arg) = arg {
        let shift = parse_int(arg)?;
        state.shift = u32::try_from(shift).map_err(|_| Error::InvalidArgument(arg.to_string()))?;
    }
    Ok(CmdResult::new("uds", "UDS response shift", CmdValue::Int(state.shift as i64)))
}

fn statistic(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let index = parse_index(arg, ALL_BUFFERS)?;
    let mut state = module.state.lock();
    let buffer = state.select(index)?;
    let baseline = Baseline::train(&buffer);

    let summary: BTreeMap<String, String> = baseline
        .iter()
        .map(|(id, r)| {
            (
                format!("0x{:x}", id),
                format!(
                    "count={} changes={} mask={:016x} period={}..{} change_period={}..{}",
                    r.count, r.changes, r.diff_mask, r.min_time, r.max_time, r.ch_min_time, r.ch_max_time
                ),
            )
        })
        .collect();

    module.core.info(&format!(
        "Baseline trained on {} frames, {} IDs",
        buffer.len(),
        baseline.len()
    ));
    state.trained = Some(Trained { index, baseline });
    Ok(CmdResult::new("statistic", "Baseline", CmdValue::Object(summary)))
}

fn hypothesis(module: &Analyzer, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let mut state = module.state.lock();
    let index = parse_index(arg, state.current() as i64)?;

    let Some(trained) = &state.trained else {
        return Ok(CmdResult::error("hypothesis", "No baseline, run 'statistic' first", ERR_GENERIC));
    };
    if index == trained.index {
        return Ok(CmdResult::error(
            "hypothesis",
            "The buffer was used to train the baseline",
            ERR_GENERIC,
        ));
    }
    let index = usize::try_from(index)
        .ok()
        .filter(|i| *i < state.buffers.len())
        .ok_or_else(|| Error::InvalidArgument(format!("no buffer with index {}", index)))?;

    let result = Hypothesis::run(&trained.baseline, &state.buffers[index]);
    let report = result.report();
    module.core.info(&format!(
        "Hypothesis on buffer {}: {} IDs implicated, {} findings",
        index,
        result.history().len(),
        result.findings().len()
    ));

    state.tested = Some(Tested {
        index,
        hypothesis: result,
    });
    module.commands.set_enabled("test", true);
    Ok(CmdResult::text("hypothesis", "Findings", report))
}

fn confirm(module: &Analyzer, gate: &mut GateGuard<'_>, _arg: Option<&str>) -> Result<CmdResult> {
    if !module.core.is_active() {
        return Ok(CmdResult::error("test", "Module is not active", ERR_GENERIC));
    }

    let (baseline, hypothesis) = {
        let state = module.state.lock();
        match (&state.trained, &state.tested) {
            (Some(trained), Some(tested)) => (trained.baseline.clone(), tested.hypothesis.clone()),
            _ => return Ok(CmdResult::text("test", "Nothing to test", NOT_FOUND)),
        }
    };

    let findings = hypothesis.findings();
    let Some(last) = findings.last() else {
        return Ok(CmdResult::text("test", "Nothing to test", NOT_FOUND));
    };
    let last_time = last.timestamp;

    let mut weights: Vec<(String, u32)> = vec![(NOT_FOUND.to_string(), 0)];
    let mut tried = HashSet::new();
    let mut injected = 0usize;

    for captured in findings.iter() {
        let key = captured.frame.text();
        if !tried.insert(key.clone()) {
            continue;
        }

        let wait = Duration::from_secs_f64((last_time - captured.timestamp).max(0.0)) + module.settle;
        let scratch = {
            let mut state = module.state.lock();
            let scratch = state.push_buffer(CaptureBuffer::new(&format!("confirm {}", key)));
            state.resend = Some(captured.frame.clone());
            scratch
        };
        module.core.info(&format!("Sending {}, waiting {:?}", key, wait));

        let drained = gate.unlocked(|| {
            let drained = module.wait_drained();
            if drained {
                std::thread::sleep(wait);
            }
            drained
        });
        if !drained {
            warn!("{}: {} was not injected within {:?}", module.core.name(), key, module.drain_timeout);
            module.core.error(&format!("{} was not injected", key));
            continue;
        }

        injected += 1;
        module.core.set_active(false);
        let capture = module.buffer(scratch).unwrap_or_default();
        let weight = correlation_weight(&baseline, &hypothesis, captured.frame.raw_id(), &capture);
        module.core.set_active(true);

        debug!("{}: weight {}", key, weight);
        weights.push((key, weight));
    }

    if injected == 0 {
        return Ok(CmdResult::error("test", "No stimulus could be injected, is the engine running?", ERR_GENERIC));
    }

    let (best, weight) = best_stimulus(&weights);
    module.core.info(&format!("Best stimulus {} with weight {}", best, weight));
    Ok(CmdResult::text("test", "Most likely cause", best))
}

fn clean(module: &Analyzer, _gate: &mut GateGuard<'_>, _arg: Option<&str>) -> Result<CmdResult> {
    let mut state = module.state.lock();
    let shift = state.shift;
    *state = State::new(shift);
    module.commands.set_enabled("test", false);
    Ok(CmdResult::none("clean", "All buffers dropped"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::DynModule;

    fn analyzer() -> Analyzer {
        Analyzer::new("analyze", &Params::default(), OutputSink::default()).unwrap()
    }

    fn alternating(id: u32, frames: usize, values: [[u8; 4]; 2]) -> CaptureBuffer {
        (0..frames)
            .map(|i| (i as f64 * 0.01, Frame::new(id, &values[i % 2])))
            .collect()
    }

    #[test]
    fn read_and_write_actions() {
        let module = analyzer();
        let read = Params::from([("action", "read")]);
        let write = Params::from([("action", "write")]);

        let envelope = Envelope::with_frame(Frame::new(0x123, &[1, 2]), "can0");
        module.step(envelope, &read);
        module.step(Envelope::default(), &read);
        assert_eq!(module.buffer(0).unwrap().len(), 1);

        // Nothing queued
        assert!(!module.step(Envelope::default(), &write).has_can_data);

        module.state.lock().resend = Some(Frame::new(0x7e0, &[0x02, 0x10, 0x03]));
        let busy = Envelope::with_frame(Frame::new(0x1, &[0]), "can0");
        assert_eq!(module.step(busy, &write).can_frame().map(|f| f.raw_id()), Some(0x1));
        assert!(module.pending_resend().is_some());

        let injected = module.step(Envelope::default(), &write);
        assert_eq!(injected.can_frame().map(|f| f.raw_id()), Some(0x7e0));
        assert_eq!(injected.bus, "analyze");
        assert!(module.pending_resend().is_none());
    }

    #[test]
    fn index_checks() {
        let module = analyzer();
        let result = module.invoke("hypothesis 0");
        assert_eq!(result.error_code, ERR_GENERIC);

        module.load_buffer("training", alternating(0x100, 10, [[0; 4], [1; 4]]));
        assert!(!module.invoke("statistic 1").is_error());
        assert!(module.invoke("hypothesis 1").is_error());
        assert!(module.invoke("hypothesis 7").is_error());
        assert!(module.invoke("print 9").is_error());
        assert!(module.invoke("test").is_error());
    }

    #[test]
    fn baseline_then_hypothesis() {
        let module = analyzer();
        let a = [0x10, 0x20, 0x00, 0x00];
        let b = [0x10, 0x21, 0x00, 0x00];
        let training = module.load_buffer("training", alternating(0x100, 100, [a, b]));

        let mut replay = alternating(0x100, 21, [a, b]);
        replay.push(0.21, Frame::new(0x100, &[0x10, 0x20, 0x00, 0x7f]));
        replay.push(0.22, Frame::new(0x100, &a));
        let tested = module.load_buffer("replay", replay);

        module.invoke(&format!("statistic {}", training));
        let result = module.invoke(&format!("hypothesis {}", tested));
        assert!(!result.is_error());

        let hypothesis = module.hypothesis().unwrap();
        let record = hypothesis.record(0x100).unwrap();
        let new_positions = record
            .anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::NewPosition)
            .count();
        assert_eq!(new_positions, 1);
        assert!(hypothesis.anomalies().all(|a| a.frame.raw_id() == 0x100));
        assert!(module.commands().get("test").unwrap().is_enabled());
    }

    #[test]
    fn new_byte_in_full_frame() {
        let module = analyzer();
        let a = [0x10, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x55];
        let b = [0x10, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00, 0x55];
        let mut unseen = a;
        unseen[3] = 0x7f;

        let mut training: CaptureBuffer = (0..100)
            .map(|i| (i as f64 * 0.01, Frame::new(0x100, if i % 2 == 0 { &a } else { &b })))
            .collect();
        training.extend_from(&alternating(0x200, 100, [[7; 4], [7; 4]]));
        let training = module.load_buffer("training", training);

        let mut replay: CaptureBuffer = (0..21)
            .map(|i| (i as f64 * 0.01, Frame::new(0x100, if i % 2 == 0 { &a } else { &b })))
            .collect();
        replay.push(0.21, Frame::new(0x100, &unseen));
        replay.push(0.22, Frame::new(0x100, &a));
        replay.extend_from(&alternating(0x200, 23, [[7; 4], [7; 4]]));
        let tested = module.load_buffer("replay", replay);

        assert!(!module.invoke(&format!("statistic {}", training)).is_error());
        assert!(!module.invoke(&format!("hypothesis {}", tested)).is_error());

        let hypothesis = module.hypothesis().unwrap();
        let kinds: Vec<_> = hypothesis
            .record(0x100)
            .unwrap()
            .anomalies
            .iter()
            .map(|a| a.kind.clone())
            .collect();
        assert_eq!(kinds, vec![AnomalyKind::NewPosition, AnomalyKind::Released]);
        assert!(hypothesis.record(0x200).unwrap().anomalies.is_empty());
        assert!(hypothesis.anomalies().all(|a| a.frame.raw_id() == 0x100));
    }

    #[test]
    fn same_buffer_has_no_new_ids() {
        let module = analyzer();
        let mut capture = alternating(0x100, 50, [[0; 4], [1; 4]]);
        capture.extend_from(&alternating(0x200, 50, [[7; 4], [7; 4]]));
        module.load_buffer("a", capture.clone());
        module.load_buffer("b", capture);

        module.invoke("statistic 1");
        module.invoke("hypothesis 2");
        let hypothesis = module.hypothesis().unwrap();
        assert!(hypothesis.anomalies().all(|a| a.kind != AnomalyKind::NewId));
    }

    #[test]
    fn confirm_without_findings() {
        let module = analyzer();
        let capture = alternating(0x100, 20, [[0; 4], [1; 4]]);
        module.load_buffer("a", capture.clone());
        module.load_buffer("b", capture);
        module.invoke("statistic 1");
        module.invoke("hypothesis 2");

        let result = module.invoke("test");
        assert_eq!(result.as_str(), Some(NOT_FOUND));
        assert!(module.pending_resend().is_none());
        assert_eq!(module.buffer_count(), 3);
    }

    #[test]
    fn buffers_and_clean() {
        let module = analyzer();
        assert_eq!(module.invoke("newbuf").as_int(), Some(1));
        assert_eq!(module.invoke("newbuf session").as_int(), Some(2));
        assert_eq!(module.buffer(2).unwrap().name(), "session");

        assert_eq!(module.invoke("uds 0x10").as_int(), Some(16));
        module.invoke("clean");
        assert_eq!(module.buffer_count(), 1);
        assert_eq!(module.invoke("uds").as_int(), Some(16));
    }

    #[test]
    fn print_and_search() {
        let module = analyzer();
        module.load_buffer("a", alternating(0x100, 4, [[0; 4], [1; 4]]));

        let result = module.invoke("print 1");
        let CmdValue::Table(rows) = &result.value else {
            panic!("expected a table, got {:?}", result.value);
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["0x100", "4", "00000000", "2"]);

        let result = module.invoke("search 0x100");
        let CmdValue::Table(rows) = &result.value else {
            panic!("expected a table");
        };
        assert_eq!(rows.len(), 5);
        assert!(module.invoke("search").is_error());
    }

    #[test]
    fn protocol_report() {
        let module = analyzer();
        let capture: CaptureBuffer = [
            (0.0, Frame::new(0x7e0, &[0x02, 0x10, 0x03])),
            (0.1, Frame::new(0x7e8, &[0x02, 0x50, 0x03])),
        ]
        .into_iter()
        .collect();
        module.load_buffer("uds", capture);

        let result = module.invoke("protocol UDS, 1");
        assert!(result.as_str().unwrap().contains("Service 0x10 Sub 0x03"));
        assert!(module.invoke("protocol FRAG").is_error());
    }

    #[test]
    fn invalid_init() {
        assert!(Analyzer::new("a", &Params::from([("poll", "0")]), OutputSink::default()).is_err());
        assert!(Analyzer::new("a", &Params::from([("settle", "-1")]), OutputSink::default()).is_err());
        assert!(Analyzer::new("a", &Params::from([("uds_shift", "-8")]), OutputSink::default()).is_err());
    }
}
