//! Locating the application directory and the ffmpeg / ffprobe executables.

use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Install prefixes checked before falling back to `PATH`
const COMMON_BIN_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

/// Resolved encoder and prober executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Directory the running executable lives in.
///
/// Inside a macOS bundle (`Foo.app/Contents/MacOS`) this is the bundle itself.
pub fn app_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| PipelineError::StartupFatal(format!("cannot determine executable path: {}", e)))?;
    let dir = exe
        .parent()
        .ok_or_else(|| PipelineError::StartupFatal(format!("executable has no parent: {}", exe.display())))?;
    Ok(app_dir_for(dir))
}

/// Apply the bundle adjustment to an executable's directory
pub fn app_dir_for(exe_dir: &Path) -> PathBuf {
    if exe_dir.ends_with("MacOS") {
        if let Some(bundle) = exe_dir.parent().and_then(Path::parent) {
            return bundle.to_path_buf();
        }
    }
    exe_dir.to_path_buf()
}

/// Candidate locations for `name`, in lookup order, excluding `PATH`
pub fn candidate_paths(name: &str, explicit: Option<&Path>, app_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }

    if let Some(argv0) = std::env::args_os().next() {
        if let Some(dir) = Path::new(&argv0).parent() {
            candidates.push(dir.join(name));
        }
    }

    candidates.push(app_dir.join(name));
    candidates.extend(COMMON_BIN_DIRS.iter().map(|dir| Path::new(dir).join(name)));

    candidates
}

/// Find one executable, falling back to `PATH`
pub fn locate_tool(name: &str, explicit: Option<&Path>, app_dir: &Path) -> Result<PathBuf> {
    for path in candidate_paths(name, explicit, app_dir) {
        debug!("Checking for {} at: {}", name, path.display());
        if path.is_file() {
            info!("Found {} at: {}", name, path.display());
            return Ok(path);
        }
    }

    match which::which(name) {
        Ok(path) => {
            info!("Found {} in PATH: {}", name, path.display());
            Ok(path)
        }
        Err(e) => Err(PipelineError::StartupFatal(format!(
            "{} not found in the application directory, common locations or PATH: {}",
            name, e
        ))),
    }
}

/// Locate both tools; either one missing is fatal
pub fn locate_tools(cfg: &PipelineConfig, app_dir: &Path) -> Result<ToolPaths> {
    let ffmpeg = locate_tool("ffmpeg", cfg.ffmpeg_bin.as_deref(), app_dir)?;
    let ffprobe = locate_tool("ffprobe", cfg.ffprobe_bin.as_deref(), app_dir)?;
    Ok(ToolPaths { ffmpeg, ffprobe })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_dir_is_two_levels_up() {
        assert_eq!(
            app_dir_for(Path::new("/Applications/AV1.app/Contents/MacOS")),
            PathBuf::from("/Applications/AV1.app")
        );
        assert_eq!(app_dir_for(Path::new("/opt/av1q/bin")), PathBuf::from("/opt/av1q/bin"));
    }

    #[test]
    fn test_candidate_order() {
        let explicit = PathBuf::from("/custom/ffmpeg");
        let candidates = candidate_paths("ffmpeg", Some(&explicit), Path::new("/app"));

        assert_eq!(candidates.first(), Some(&explicit));
        let app_pos = candidates.iter().position(|p| p == Path::new("/app/ffmpeg")).unwrap();
        let local_pos = candidates.iter().position(|p| p == Path::new("/usr/local/bin/ffmpeg")).unwrap();
        let brew_pos = candidates.iter().position(|p| p == Path::new("/opt/homebrew/bin/ffmpeg")).unwrap();
        assert!(app_pos < local_pos && local_pos < brew_pos);
    }

    #[test]
    fn test_explicit_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("my-ffmpeg");
        std::fs::write(&custom, b"").unwrap();

        let found = locate_tool("ffmpeg", Some(&custom), Path::new("/nonexistent")).unwrap();
        assert_eq!(found, custom);
    }

    #[test]
    fn test_app_dir_copy_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("av1q-test-tool");
        std::fs::write(&bundled, b"").unwrap();

        let found = locate_tool("av1q-test-tool", None, dir.path()).unwrap();
        assert_eq!(found, bundled);
    }

    #[test]
    fn test_missing_tool_is_fatal() {
        let err = locate_tool("av1q-no-such-tool-7f3a", None, Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, PipelineError::StartupFatal(_)));
        assert!(err.to_string().contains("av1q-no-such-tool-7f3a"));
    }
}
