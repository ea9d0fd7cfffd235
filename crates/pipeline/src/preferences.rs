use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::error::PipelineError;

/// File name of the preferences file inside the application directory
pub const PREFERENCES_FILE: &str = "config.json";

const WRITE_PROBE_FILE: &str = "test_write_permission.tmp";

/// User choices remembered between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub last_destination: Option<PathBuf>,
}

impl Preferences {
    /// Read preferences; a missing or unreadable file yields defaults
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                info!("No preferences loaded from {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Preferences>(&content) {
            Ok(mut prefs) => {
                // An empty string is the same as never having chosen
                if prefs.last_destination.as_deref() == Some(Path::new("")) {
                    prefs.last_destination = None;
                }
                prefs
            }
            Err(e) => {
                warn!("Ignoring malformed preferences {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write preferences: {}", path.display()))?;
        Ok(())
    }
}

/// Default destination when nothing was chosen before: Desktop, else home
pub fn default_destination() -> Option<PathBuf> {
    dirs::desktop_dir().or_else(dirs::home_dir)
}

/// Check that `dir` accepts new files by creating and removing a probe file
pub fn check_writable(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(WRITE_PROBE_FILE);
    fs::File::create(&probe)?;
    fs::remove_file(&probe)
}

/// Resolve the destination directory and remember it.
///
/// Order: `requested`, the last destination, then [`default_destination`].
/// The chosen directory must be writable; it is then saved to `prefs_path`.
pub fn confirm_destination(
    requested: Option<&Path>,
    prefs: &mut Preferences,
    prefs_path: &Path,
) -> crate::Result<PathBuf> {
    let folder = requested
        .map(Path::to_path_buf)
        .or_else(|| prefs.last_destination.clone())
        .or_else(default_destination)
        .ok_or_else(|| PipelineError::StartupFatal("no destination folder available".to_string()))?;

    check_writable(&folder).map_err(|e| {
        PipelineError::StartupFatal(format!("destination folder {} is not writable: {}", folder.display(), e))
    })?;

    prefs.last_destination = Some(folder.clone());
    if let Err(e) = prefs.save(prefs_path) {
        warn!("{:#}", e);
    }

    info!("Destination folder: {}", folder.display());
    Ok(folder)
}
