use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::ffprobe::MediaDescriptor;

/// Characters that are replaced with `_` in output file names
const INVALID_FILE_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum length (in characters) of a sanitized file stem
pub const MAX_FILE_NAME_LEN: usize = 200;

/// Lifecycle of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One request to convert a single source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Distinguishes duplicate entries for the same source path
    pub id: Uuid,
    pub media: MediaDescriptor,
    pub destination: PathBuf,
    pub output_path: PathBuf,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message for failed jobs
    pub reason: Option<String>,
}

impl Job {
    pub fn new(media: MediaDescriptor, destination: &Path, suffix: &str) -> Self {
        let output_path = output_path_for(&media.full_path, destination, suffix);
        Self {
            id: Uuid::new_v4(),
            media,
            destination: destination.to_path_buf(),
            output_path,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            reason: None,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.media.full_path
    }

    /// Source file name for display
    pub fn file_name(&self) -> String {
        self.media
            .full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Sanitized stem shared by the output file and the encoder log
    pub fn output_stem(&self) -> String {
        sanitized_stem(&self.media.full_path)
    }
}

/// Replace characters that are invalid in file names and cap the length
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if INVALID_FILE_NAME_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_FILE_NAME_LEN)
        .collect()
}

/// Source base name without extension, sanitized.
///
/// Everything from the last `.` of the base name is dropped, so a dotfile
/// such as `.mp4` has an empty stem.
pub fn sanitized_stem(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let stem = match base.rfind('.') {
        Some(dot) => &base[..dot],
        None => base.as_str(),
    };
    sanitize_file_name(stem)
}

/// `<destination>/<sanitized stem><suffix>`
pub fn output_path_for(source: &Path, destination: &Path, suffix: &str) -> PathBuf {
    destination.join(format!("{}{}", sanitized_stem(source), suffix))
}
