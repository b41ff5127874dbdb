use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use canfuzz::analyze::{Analyzer, AnomalyKind, CaptureBuffer, NOT_FOUND};
use canfuzz::can::Frame;
use canfuzz::cmdres::ERR_GENERIC;
use canfuzz::engine::{Engine, EngineConfig, Envelope, Registry};
use canfuzz::module::{CommandTable, DynModule, Module, ModuleCore, Params};
use canfuzz::output::OutputSink;

const STIMULUS_ID: u32 = 0x100;
const EFFECT_ID: u32 = 0x200;

/// Simulated ECU. Sends `EFFECT_ID` on pipe 1 every tick, toggling its top bit once it received the stimulus on pipe 2.
struct Ecu {
    core: ModuleCore,
    commands: CommandTable<Self>,
    triggered: AtomicBool,
    sent: AtomicUsize,
}

impl Module for Ecu {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn commands(&self) -> &CommandTable<Self> {
        &self.commands
    }

    fn effect(&self, mut envelope: Envelope, params: &Params) -> Envelope {
        match params.get_or("action", "send") {
            "send" => {
                let n = self.sent.fetch_add(1, Ordering::SeqCst);
                let value = if self.triggered.load(Ordering::SeqCst) && n % 2 == 0 {
                    0x80
                } else {
                    0x00
                };
                envelope.set_frame(Frame::new(EFFECT_ID, &[value]));
            }
            _ => {
                if let Some(frame) = envelope.can_frame() {
                    if frame.raw_id() == STIMULUS_ID && frame.data == [0x01] {
                        self.triggered.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
        envelope
    }
}

fn ecu() -> Arc<Ecu> {
    Arc::new(Ecu {
        core: ModuleCore::new("ecu", &Params::default(), OutputSink::default()).unwrap(),
        commands: CommandTable::new(),
        triggered: AtomicBool::new(false),
        sent: AtomicUsize::new(0),
    })
}

fn capture(ticks: usize, change_at: Option<usize>) -> CaptureBuffer {
    let mut buffer = CaptureBuffer::default();
    for i in 0..ticks {
        let t = i as f64 * 0.01;
        let changed = change_at.map(|c| i >= c).unwrap_or(false);
        buffer.push(t, Frame::new(STIMULUS_ID, &[changed as u8]));
        buffer.push(t + 0.001, Frame::new(EFFECT_ID, &[if changed { 0x80 } else { 0x00 }]));
    }
    buffer
}

fn setup(change_at: Option<usize>) -> (Engine, Arc<Analyzer>, Arc<Ecu>) {
    setup_with(change_at, "2")
}

fn setup_with(change_at: Option<usize>, drain_timeout: &str) -> (Engine, Arc<Analyzer>, Arc<Ecu>) {
    let _ = tracing_subscriber::fmt::try_init();

    let params = Params::from([("settle", "0.05"), ("poll", "1"), ("drain_timeout", drain_timeout)]);
    let analyzer = Arc::new(Analyzer::new("analyze", &params, OutputSink::default()).unwrap());
    let ecu = ecu();

    let training = analyzer.load_buffer("training", capture(50, None));
    let replay = analyzer.load_buffer("replay", capture(50, change_at));
    assert!(!analyzer.invoke(&format!("statistic {}", training)).is_error());
    assert!(!analyzer.invoke(&format!("hypothesis {}", replay)).is_error());

    let mut engine = Engine::new(EngineConfig::default(), Registry::new());
    engine.insert_module("ecu", ecu.clone());
    engine.insert_module("analyze", analyzer.clone());
    engine
        .load_actions(&[
            ("ecu".to_string(), Params::from([("action", "send"), ("pipe", "1")])),
            ("analyze".to_string(), Params::from([("action", "read"), ("pipe", "1")])),
            ("analyze".to_string(), Params::from([("action", "write"), ("pipe", "2")])),
            ("ecu".to_string(), Params::from([("action", "receive"), ("pipe", "2")])),
        ])
        .unwrap();

    (engine, analyzer, ecu)
}

#[test]
fn analyze_test_hypothesis_implicates_both_ids() {
    let (_engine, analyzer, _ecu) = setup(Some(25));
    let hypothesis = analyzer.hypothesis().unwrap();

    assert_eq!(
        hypothesis.history().iter().copied().collect::<Vec<_>>(),
        vec![STIMULUS_ID, EFFECT_ID]
    );
    let effect = hypothesis.record(EFFECT_ID).unwrap();
    assert_eq!(effect.anomalies[0].kind, AnomalyKind::NewPosition);
    assert_eq!(effect.anomalies[0].causes, vec![STIMULUS_ID]);
    assert_eq!(hypothesis.findings().len(), 2);
}

#[test]
#[serial_test::serial]
fn analyze_test_confirm_finds_stimulus() {
    let (mut engine, analyzer, ecu) = setup(Some(25));
    engine.start().unwrap();

    let index = engine.find_action("analyze").unwrap();
    let result = engine.invoke(index, "test");
    engine.stop();

    assert!(!result.is_error(), "{}", result);
    assert_eq!(result.as_str(), Some("0x100:1:01"));
    assert!(ecu.triggered.load(Ordering::SeqCst));
    assert!(analyzer.is_active());
    assert!(analyzer.pending_resend().is_none());
}

#[test]
#[serial_test::serial]
fn analyze_test_confirm_without_findings() {
    let (mut engine, analyzer, ecu) = setup(None);
    engine.start().unwrap();

    let before = analyzer.buffer_count();
    let result = engine.invoke(1, "test");
    engine.stop();

    assert_eq!(result.as_str(), Some(NOT_FOUND));
    assert!(!ecu.triggered.load(Ordering::SeqCst));
    assert_eq!(analyzer.buffer_count(), before);
}

#[test]
#[serial_test::serial]
fn analyze_test_confirm_on_stopped_engine() {
    let (engine, analyzer, ecu) = setup_with(Some(25), "0.05");

    // Nobody runs the write action, so nothing leaves the queue
    let result = engine.invoke(2, "test");

    assert!(result.is_error(), "{}", result);
    assert_eq!(result.error_code, ERR_GENERIC);
    assert!(!ecu.triggered.load(Ordering::SeqCst));
    assert!(analyzer.pending_resend().is_none());
    assert!(analyzer.is_active());
}

#[test]
#[serial_test::serial]
fn analyze_test_capture_through_engine() {
    let (engine, analyzer, _ecu) = setup(None);
    let current = analyzer.buffer_count() - 1;
    let before = analyzer.buffer(current).unwrap().len();

    for _ in 0..5 {
        engine.tick();
    }

    let buffer = analyzer.buffer(current).unwrap();
    assert_eq!(buffer.len(), before + 5);
    assert_eq!(buffer.last().unwrap().frame.raw_id(), EFFECT_ID);
}

#[test]
fn analyze_test_registry_instance() {
    let mut engine = Engine::new(EngineConfig::default(), Registry::default());
    engine
        .load(
            &[("analyze".to_string(), Params::from([("uds_shift", "0x10")]))],
            &[("analyze".to_string(), Params::default())],
        )
        .unwrap();

    assert_eq!(engine.invoke(0, "uds").as_int(), Some(16));
    assert!(engine.invoke(0, "test").is_error());
    assert!(engine.invoke(0, "status").as_str().unwrap().starts_with("active"));
}
