use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Suffix appended to every converted file name
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_av1.mp4";

/// Configuration for the AV1 conversion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Explicit ffmpeg binary; discovered automatically when unset
    pub ffmpeg_bin: Option<PathBuf>,
    /// Explicit ffprobe binary; discovered automatically when unset
    pub ffprobe_bin: Option<PathBuf>,
    /// Directory holding app.log and the per-job encoder logs.
    /// Relative paths resolve against the application directory.
    pub logs_dir: PathBuf,
    /// Interval between progress polls of the encoder log
    pub poll_interval_ms: u64,
    /// How many bytes from the end of the encoder log are scanned per poll
    pub tail_window_bytes: u64,
    /// Pause after a successful encode before the completion event goes out
    pub settle_delay_ms: u64,
    /// Suffix appended to the sanitized source name
    pub output_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl PipelineConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            ffmpeg_bin: None,
            ffprobe_bin: None,
            logs_dir: PathBuf::from("logs"),
            poll_interval_ms: 500,
            tail_window_bytes: 1024,
            settle_delay_ms: 1000,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Logs directory resolved against the application directory
    pub fn resolved_logs_dir(&self, app_dir: &Path) -> PathBuf {
        if self.logs_dir.is_absolute() {
            self.logs_dir.clone()
        } else {
            app_dir.join(&self.logs_dir)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would spin the monitor
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
