use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use crate::error::{PipelineError, Result};

/// Complete ffprobe output structure (only the fields the pipeline reads)
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    #[serde(default)]
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeFormat {
    /// Duration in seconds, as a decimal string
    pub duration: Option<String>,
    /// Size in bytes, as a decimal string
    pub size: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    #[serde(rename = "codec_name")]
    pub codec_name: Option<String>,
    #[serde(rename = "nb_frames")]
    pub nb_frames: Option<String>,
    #[serde(rename = "avg_frame_rate")]
    pub avg_frame_rate: Option<String>,
}

/// Immutable metadata snapshot of a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    /// Absolute path of the source file
    pub full_path: PathBuf,
    /// Display timecode `HH:MM:SS:FF`
    pub duration: String,
    /// Total frames reported by the first stream; 0 when unknown
    pub frame_count: u64,
    pub codec: String,
    /// Size in megabytes, e.g. `"12.50 MB"`
    pub size: String,
}

/// Outcome of probing a batch of files
#[derive(Debug, Default)]
pub struct ProbeReport {
    pub descriptors: Vec<MediaDescriptor>,
    pub failures: Vec<(PathBuf, PipelineError)>,
}

/// Runs ffprobe against source files
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe_bin: PathBuf,
}

impl Prober {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    pub fn ffprobe_bin(&self) -> &Path {
        &self.ffprobe_bin
    }

    /// Run ffprobe on a single file and build its descriptor
    pub async fn probe(&self, file_path: &Path) -> Result<MediaDescriptor> {
        // Verify file exists before trying to probe
        if !file_path.exists() {
            return Err(PipelineError::probe(file_path, "file does not exist"));
        }

        let full_path = std::path::absolute(file_path).unwrap_or_else(|_| file_path.to_path_buf());
        debug!("ffprobe: probing {}", full_path.display());

        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(&full_path)
            .output()
            .await
            .map_err(|e| {
                PipelineError::probe(
                    &full_path,
                    format!("failed to execute {}: {}", self.ffprobe_bin.display(), e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("ffprobe failed (exit code {}) for {}", exit_code, full_path.display());
            debug!("ffprobe stderr: {}", stderr);
            return Err(PipelineError::probe(
                &full_path,
                format!("ffprobe exit code {}, stderr: {}", exit_code, stderr.trim()),
            ));
        }

        parse_probe_output(&full_path, &output.stdout)
    }

    /// Probe every path in order. Failures are collected per file and never
    /// stop the rest of the batch.
    pub async fn probe_batch(&self, paths: &[PathBuf]) -> ProbeReport {
        let mut report = ProbeReport::default();

        for path in paths {
            info!("Processing file: {}", path.display());
            match self.probe(path).await {
                Ok(descriptor) => {
                    info!("Successfully processed file: {}", path.display());
                    report.descriptors.push(descriptor);
                }
                Err(e) => {
                    warn!("Error getting info for {}: {}", path.display(), e);
                    report.failures.push((path.clone(), e));
                }
            }
        }

        report
    }
}

/// Build a descriptor from raw ffprobe JSON
pub fn parse_probe_output(full_path: &Path, stdout: &[u8]) -> Result<MediaDescriptor> {
    let data: FFProbeData = serde_json::from_slice(stdout).map_err(|e| {
        debug!("ffprobe output: {}", String::from_utf8_lossy(stdout));
        PipelineError::probe(full_path, format!("invalid ffprobe JSON: {}", e))
    })?;

    let stream = data
        .streams
        .first()
        .ok_or_else(|| PipelineError::probe(full_path, "no streams found in the video file"))?;

    let duration_secs = parse_decimal(data.format.duration.as_deref());
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaDescriptor {
        full_path: full_path.to_path_buf(),
        duration: format_timecode(duration_secs, frame_rate),
        frame_count,
        codec: stream.codec_name.clone().unwrap_or_default(),
        size: format_size_mb(parse_decimal(data.format.size.as_deref())),
    })
}

/// Display timecode `HH:MM:SS:FF`; the frame field comes from the fractional second
pub fn format_timecode(duration_secs: f64, frame_rate: f64) -> String {
    let duration = if duration_secs.is_finite() && duration_secs > 0.0 { duration_secs } else { 0.0 };
    let fps = if frame_rate.is_finite() && frame_rate > 0.0 { frame_rate } else { 0.0 };

    let whole = duration.trunc() as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let seconds = whole % 60;
    let frames = ((duration - duration.trunc()) * fps).floor() as u64;

    format!("{:02}:{:02}:{:02}:{:02}", hours, minutes, seconds, frames)
}

/// Bytes to megabytes with two decimals
pub fn format_size_mb(bytes: f64) -> String {
    let bytes = if bytes.is_finite() && bytes > 0.0 { bytes } else { 0.0 };
    format!("{:.2} MB", bytes / 1024.0 / 1024.0)
}

fn parse_decimal(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0)
}

/// Helper function to parse frame rate from string (e.g., "30/1", "29.97", "60")
fn parse_frame_rate(frame_rate_str: &str) -> Option<f64> {
    // Try parsing as fraction (e.g., "30/1")
    if let Some((num_str, den_str)) = frame_rate_str.split_once('/') {
        let num = num_str.trim().parse::<f64>().ok()?;
        let den = den_str.trim().parse::<f64>().ok()?;
        if den != 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }

    frame_rate_str.trim().parse::<f64>().ok().filter(|&f| f > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "h264", "codec_type": "video", "nb_frames": "1500", "avg_frame_rate": "25/1"},
            {"index": 1, "codec_name": "aac", "codec_type": "audio", "nb_frames": "2810", "avg_frame_rate": "0/0"}
        ],
        "format": {"duration": "3725.480000", "size": "13107200", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}
    }"#;

    #[test]
    fn test_parse_sample_output() {
        let desc = parse_probe_output(Path::new("/videos/a.mp4"), SAMPLE.as_bytes()).unwrap();
        assert_eq!(desc.full_path, PathBuf::from("/videos/a.mp4"));
        assert_eq!(desc.duration, "01:02:05:12");
        assert_eq!(desc.frame_count, 1500);
        assert_eq!(desc.codec, "h264");
        assert_eq!(desc.size, "12.50 MB");
    }

    #[test]
    fn test_zero_streams_is_an_error() {
        let json = r#"{"streams": [], "format": {"duration": "10.0", "size": "100"}}"#;
        let err = parse_probe_output(Path::new("/videos/a.mp4"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Probe { .. }));
        assert!(err.to_string().contains("no streams"));
    }

    #[test]
    fn test_missing_streams_key_is_an_error() {
        let json = r#"{"format": {"duration": "10.0"}}"#;
        assert!(parse_probe_output(Path::new("/a.mp4"), json.as_bytes()).is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let err = parse_probe_output(Path::new("/a.mp4"), b"{\"streams\": [").unwrap_err();
        assert!(err.to_string().contains("invalid ffprobe JSON"));
    }

    #[test]
    fn test_unparseable_frame_count_defaults_to_zero() {
        let json = r#"{"streams": [{"codec_name": "vp9", "nb_frames": "N/A", "avg_frame_rate": "30000/1001"}],
                       "format": {"duration": "1.5", "size": "2048"}}"#;
        let desc = parse_probe_output(Path::new("/a.webm"), json.as_bytes()).unwrap();
        assert_eq!(desc.frame_count, 0);
        assert_eq!(desc.codec, "vp9");
        // 0.5 s at 29.97 fps
        assert_eq!(desc.duration, "00:00:01:14");
        assert_eq!(desc.size, "0.00 MB");
    }

    #[test]
    fn test_missing_format_fields() {
        let json = r#"{"streams": [{"codec_name": "hevc"}]}"#;
        let desc = parse_probe_output(Path::new("/a.mkv"), json.as_bytes()).unwrap();
        assert_eq!(desc.duration, "00:00:00:00");
        assert_eq!(desc.frame_count, 0);
        assert_eq!(desc.size, "0.00 MB");
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("23.976").unwrap() - 23.976).abs() < 0.001);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("abc").is_none());
    }

    #[test]
    fn test_format_timecode_degenerate_inputs() {
        assert_eq!(format_timecode(f64::NAN, 25.0), "00:00:00:00");
        assert_eq!(format_timecode(-5.0, 25.0), "00:00:00:00");
        assert_eq!(format_timecode(59.99, 0.0), "00:00:59:00");
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let prober = Prober::new("ffprobe");
        let err = prober.probe(Path::new("/nonexistent/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Probe { .. }));
    }

    #[tokio::test]
    async fn test_probe_batch_continues_after_failures() {
        let prober = Prober::new("/nonexistent/ffprobe");
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("clip.mp4");
        std::fs::write(&existing, b"not really a video").unwrap();

        let paths = vec![
            PathBuf::from("/nonexistent/one.mp4"),
            existing.clone(),
            PathBuf::from("/nonexistent/two.mp4"),
        ];
        let report = prober.probe_batch(&paths).await;
        assert!(report.descriptors.is_empty());
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.failures[1].0, existing);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Timecode fields stay in range and hours/minutes/seconds reassemble the whole seconds
        #[test]
        fn test_timecode_fields_in_range(
            duration in 0.0f64..200_000.0,
            fps in prop_oneof![Just(23.976f64), Just(25.0), Just(29.97), Just(60.0)],
        ) {
            let tc = format_timecode(duration, fps);
            let parts: Vec<u64> = tc.split(':').map(|p| p.parse().unwrap()).collect();
            prop_assert_eq!(parts.len(), 4);
            prop_assert!(parts[1] < 60);
            prop_assert!(parts[2] < 60);
            prop_assert!((parts[3] as f64) < fps);
            prop_assert_eq!(parts[0] * 3600 + parts[1] * 60 + parts[2], duration.trunc() as u64);
        }
    }
}
