use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use log::{debug, info, warn};

/// Video file extensions accepted as sources
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Whether `path` has one of the accepted video extensions (case-insensitive)
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand user arguments into source files.
///
/// Files are taken as given, in argument order. Directories are walked
/// recursively for video files, sorted by path. Missing paths are skipped.
pub fn collect_sources<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut sources = Vec::new();

    for path in paths {
        let path = path.as_ref();

        if path.is_file() {
            sources.push(path.to_path_buf());
            continue;
        }

        if !path.is_dir() {
            warn!("File does not exist: {}", path.display());
            continue;
        }

        info!("Scanning directory: {}", path.display());
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_video_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        found.sort();

        debug!("Found {} video file(s) in {}", found.len(), path.display());
        sources.extend(found);
    }

    sources
}
