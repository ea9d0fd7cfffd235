pub mod config;
pub mod error;
pub mod events;
pub mod ffprobe;
pub mod job;
pub mod logs;
pub mod pipeline;
pub mod preferences;
pub mod progress;
pub mod queue;
pub mod scan;
pub mod supervisor;
pub mod tail;
pub mod tools;

pub use config::PipelineConfig;
pub use error::{PipelineError, QueueError, Result};
pub use events::{EventSink, FnSink, PipelineEvent, ProgressSample};
pub use ffprobe::{MediaDescriptor, ProbeReport, Prober};
pub use job::{Job, JobStatus};
pub use pipeline::{Pipeline, RunSummary};
pub use queue::{JobOutcome, JobQueue, QueueSnapshot};
pub use supervisor::Supervisor;
pub use tools::ToolPaths;
