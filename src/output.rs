//! Shared sink for module output.
//!
//! Lines are kept per source until they are taken and are also broadcast to any number of async subscribers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::Stream;
use async_stream::stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

const OUTPUT_CHANNEL_SIZE: usize = 1024;
const MAX_LINES_PER_SOURCE: usize = 4096;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    #[strum(serialize = "INFO")]
    Info,
    #[strum(serialize = "DEBUG")]
    Debug,
    #[strum(serialize = "ERROR")]
    Error,
    #[strum(serialize = "FATAL")]
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Output {
    /// Bus label of the emitting module
    pub source: String,
    pub level: Level,
    pub text: String,
}

/// Cheap to clone handle to the shared output buffers.
#[derive(Clone)]
pub struct OutputSink {
    sender: broadcast::Sender<Output>,
    buffer: Arc<Mutex<BTreeMap<String, VecDeque<String>>>>,
    timeout: Duration,
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl OutputSink {
    /// `timeout` bounds how long an emitter waits for the buffer lock before the line is dropped.
    pub fn new(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(OUTPUT_CHANNEL_SIZE);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(BTreeMap::new())),
            timeout,
        }
    }

    /// Fire and forget. Never blocks longer than the sink timeout.
    pub fn emit(&self, source: &str, level: Level, text: &str) {
        match self.buffer.try_lock_for(self.timeout) {
            Some(mut buffer) => {
                let lines = buffer.entry(source.to_string()).or_default();
                if lines.len() >= MAX_LINES_PER_SOURCE {
                    lines.pop_front();
                }
                lines.push_back(format!("[{}] {}", level, text));
            }
            None => warn!("Output buffer busy, dropping line from {}", source),
        }

        // No subscribers is not an error
        let _ = self.sender.send(Output {
            source: source.to_string(),
            level,
            text: text.to_string(),
        });
    }

    /// Removes and returns the buffered lines of one source.
    pub fn take(&self, source: &str) -> Vec<String> {
        let mut buffer = self.buffer.lock();
        buffer
            .remove(source)
            .map(|lines| lines.into_iter().collect())
            .unwrap_or_default()
    }

    /// Removes and returns all buffered lines, keyed by source.
    pub fn take_all(&self) -> BTreeMap<String, Vec<String>> {
        let mut buffer = self.buffer.lock();
        std::mem::take(&mut *buffer)
            .into_iter()
            .map(|(source, lines)| (source, lines.into_iter().collect()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Output> {
        self.sender.subscribe()
    }

    /// Stream of all lines emitted after the call. Lagging subscribers skip the lines they missed.
    pub fn stream(&self) -> impl Stream<Item = Output> {
        let mut rx = self.sender.subscribe();

        Box::pin(stream! {
            loop {
                match rx.recv().await {
                    Ok(output) => yield output,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamExt;

    #[test]
    fn buffered_per_source() {
        let sink = OutputSink::default();
        sink.emit("analyze", Level::Info, "hello");
        sink.emit("fuzz", Level::Error, "failed");

        assert_eq!(sink.take("analyze"), vec!["[INFO] hello".to_string()]);
        assert!(sink.take("analyze").is_empty());

        let rest = sink.take_all();
        assert_eq!(rest["fuzz"], vec!["[ERROR] failed".to_string()]);
    }

    #[tokio::test]
    async fn stream_receives_lines() {
        let sink = OutputSink::default();
        let stream = sink.stream();
        tokio::pin!(stream);

        sink.emit("analyze", Level::Debug, "tick");
        let output = stream.next().await.unwrap();
        assert_eq!(output.source, "analyze");
        assert_eq!(output.level, Level::Debug);
        assert_eq!(output.text, "tick");
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_line() {
        let sink = OutputSink::default();
        let streams: Vec<_> = (0..3).map(|_| Box::pin(sink.stream())).collect();

        sink.emit("fuzz", Level::Info, "sent 0x7e0");
        let received = futures::future::join_all(streams.into_iter().map(|mut s| async move { s.next().await })).await;

        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|o| o.as_ref().map(|o| o.text.as_str()) == Some("sent 0x7e0")));
    }
}
