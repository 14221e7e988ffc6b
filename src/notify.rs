//! Progress and completion notifications, decoupled from any UI toolkit.

use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info};

use crate::pipeline::{RunReport, RunStatus};

/// Receives one-way notifications from a pipeline run.
///
/// Called from the worker thread; implementations must marshal any UI
/// state changes back to their own thread.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, message: &str);

    /// `done` of `total` chunks have a recorded result.
    fn on_chunk(&self, _done: usize, _total: usize) {}

    fn on_complete(&self, report: &RunReport);
}

/// Sink that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_progress(&self, message: &str) {
        info!("{}", message);
    }

    fn on_complete(&self, report: &RunReport) {
        match report.status {
            RunStatus::Succeeded => info!(
                "Upsampled audio saved successfully to {}",
                report.output.display()
            ),
            _ => error!(
                "Super-resolution failed: {}",
                report.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// A notification forwarded to the foreground thread.
#[derive(Debug)]
pub enum Notification {
    Progress(String),
    Chunk { done: usize, total: usize },
    Complete(Box<RunReport>),
}

/// Sink that forwards every notification over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

// Send errors mean the foreground receiver is gone; the run continues regardless.
impl EventSink for ChannelSink {
    fn on_progress(&self, message: &str) {
        let _ = self.tx.send(Notification::Progress(message.to_string()));
    }

    fn on_chunk(&self, done: usize, total: usize) {
        let _ = self.tx.send(Notification::Chunk { done, total });
    }

    fn on_complete(&self, report: &RunReport) {
        let _ = self.tx.send(Notification::Complete(Box::new(report.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStats;
    use std::path::PathBuf;

    fn report(status: RunStatus) -> RunReport {
        RunReport {
            status,
            input: PathBuf::from("in.wav"),
            output: PathBuf::from("out.flac"),
            total_chunks: 0,
            outcomes: Vec::new(),
            error: None,
            stats: PipelineStats::default(),
        }
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.on_progress("starting");
        sink.on_chunk(1, 2);
        sink.on_complete(&report(RunStatus::Succeeded));

        assert!(matches!(rx.recv().unwrap(), Notification::Progress(m) if m == "starting"));
        assert!(matches!(
            rx.recv().unwrap(),
            Notification::Chunk { done: 1, total: 2 }
        ));
        match rx.recv().unwrap() {
            Notification::Complete(r) => assert_eq!(r.status, RunStatus::Succeeded),
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_progress("nobody listening");
        sink.on_complete(&report(RunStatus::Failed));
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingSink.on_progress("hello");
        TracingSink.on_complete(&report(RunStatus::Failed));
    }
}
