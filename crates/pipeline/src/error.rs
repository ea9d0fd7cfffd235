use std::path::PathBuf;
use thiserror::Error;

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the conversion pipeline.
///
/// Probe errors are scoped to one source file, directory/log/encode errors to
/// one job, and `StartupFatal` to the whole process.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Metadata could not be extracted for a source file
    #[error("probe failed for {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    /// Destination directory could not be created
    #[error("failed to create output directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoder log file could not be created
    #[error("failed to create log file {}: {source}", path.display())]
    LogCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoder failed to launch or exited non-zero
    #[error("ffmpeg error: {message}")]
    Encode { message: String },

    /// Missing tools or an unusable logs directory
    #[error("startup failed: {0}")]
    StartupFatal(String),
}

impl PipelineError {
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Whether this error only affects a single job (the queue keeps going)
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self,
            Self::Directory { .. } | Self::LogCreate { .. } | Self::Encode { .. }
        )
    }
}

/// Errors raised when editing queued jobs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue index {index} out of range (queue length {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scoped_errors() {
        assert!(PipelineError::encode("exit status: 1").is_job_scoped());
        assert!(PipelineError::Directory {
            path: PathBuf::from("/out"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .is_job_scoped());
        assert!(!PipelineError::probe("/a.mp4", "no streams").is_job_scoped());
        assert!(!PipelineError::StartupFatal("ffmpeg not found".into()).is_job_scoped());
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = PipelineError::probe("/videos/a.mp4", "no streams found in the video file");
        let msg = err.to_string();
        assert!(msg.contains("/videos/a.mp4"));
        assert!(msg.contains("no streams"));
    }
}
