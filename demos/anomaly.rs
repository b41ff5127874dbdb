use std::sync::Arc;

use canfuzz::analyze::{Analyzer, CaptureBuffer};
use canfuzz::can::Frame;
use canfuzz::engine::{Engine, EngineConfig, Registry};
use canfuzz::module::{DynModule, Params};
use canfuzz::StreamExt;

/// 0x100 carries a door switch, 0x3a0 a lamp status. Both are sent every 10ms.
fn drive(ticks: usize, door_opened_at: Option<usize>) -> CaptureBuffer {
    let mut buffer = CaptureBuffer::default();
    for i in 0..ticks {
        let t = i as f64 * 0.01;
        let open = door_opened_at.map(|at| i >= at).unwrap_or(false);
        buffer.push(t, Frame::new(0x100, &[0x00, open as u8, 0x00, (i % 4) as u8]));
        buffer.push(t + 0.002, Frame::new(0x3a0, &[if open { 0x40 } else { 0x00 }, 0x12]));
    }
    buffer
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut engine = Engine::new(EngineConfig::default(), Registry::default());
    let output = engine.sink().stream();
    tokio::spawn(async move {
        tokio::pin!(output);
        while let Some(line) = output.next().await {
            println!("[{}] [{}] {}", line.source, line.level, line.text);
        }
    });

    let params = Params::from([("settle", "0.2")]);
    let analyzer = Arc::new(Analyzer::new("analyze", &params, engine.sink().clone()).unwrap());
    let training = analyzer.load_buffer("doors closed", drive(200, None));
    let replay = analyzer.load_buffer("door opened", drive(200, Some(120)));

    println!("{}", analyzer.invoke(&format!("statistic {}", training)));
    println!("{}", analyzer.invoke(&format!("hypothesis {}", replay)));
    if let Some(hypothesis) = analyzer.hypothesis() {
        for row in hypothesis.session_table() {
            println!("{}", row.join("\t"));
        }
    }

    // Without an ECU on the pipes nothing reacts to the injected frames
    engine.insert_module("analyze", analyzer.clone());
    engine
        .load_actions(&[
            ("analyze".to_string(), Params::from([("action", "read")])),
            ("analyze".to_string(), Params::from([("action", "write"), ("pipe", "2")])),
        ])
        .unwrap();
    engine.start().unwrap();

    let result = tokio::task::spawn_blocking(move || {
        let result = engine.invoke(0, "test");
        engine.stop();
        result
    })
    .await
    .unwrap();
    println!("Stimulus: {}", result);
}
