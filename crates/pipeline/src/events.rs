use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// A point-in-time progress reading derived from encoder output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    /// 0..=100
    pub percentage: f64,
    /// Encoder speed token such as `1.2x`; empty on the terminal sample
    pub speed_factor: String,
}

impl ProgressSample {
    /// The terminal sample sent once the encoder has exited
    pub fn finished() -> Self {
        Self {
            percentage: 100.0,
            speed_factor: String::new(),
        }
    }
}

/// Lifecycle events surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PipelineEvent {
    Progress(ProgressSample),
    #[serde(rename_all = "camelCase")]
    Completion { output_path: PathBuf },
    Error { message: String },
    /// The running job has been cleared; the driver is about to dequeue
    Next,
}

/// Receives pipeline events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

impl EventSink for UnboundedSender<PipelineEvent> {
    fn emit(&self, event: PipelineEvent) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.send(event);
    }
}

/// Adapts a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(PipelineEvent) + Send + Sync,
{
    fn emit(&self, event: PipelineEvent) {
        (self.0)(event)
    }
}
