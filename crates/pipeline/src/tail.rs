//! Best-effort reads of the newest line in a log that is still being written.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use async_trait::async_trait;

/// Read the last non-empty line within the final `window` bytes of `reader`.
///
/// Lines are split on `\n` and `\r` since ffmpeg redraws its status line with
/// carriage returns. Windows larger than the stream are clamped to its start.
pub fn last_line<R: Read + Seek>(reader: &mut R, window: u64) -> io::Result<Option<String>> {
    let len = reader.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(window);
    reader.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    (&mut *reader).take(window).read_to_end(&mut buf)?;

    let text = String::from_utf8_lossy(&buf);
    Ok(text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string))
}

/// Source of the most recent log line, polled by the progress monitor
#[async_trait]
pub trait LogTail: Send {
    async fn latest_line(&mut self) -> io::Result<Option<String>>;
}

/// Tails a file on disk, reopening it lazily until it exists
#[derive(Debug)]
pub struct FileTail {
    path: PathBuf,
    window: u64,
    file: Option<File>,
}

impl FileTail {
    pub fn new(path: impl Into<PathBuf>, window: u64) -> Self {
        Self {
            path: path.into(),
            window,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_latest(path: &Path, window: u64, file: &mut Option<File>) -> io::Result<Option<String>> {
    if file.is_none() {
        *file = Some(File::open(path)?);
    }
    match file.as_mut() {
        Some(file) => last_line(file, window),
        None => Ok(None),
    }
}

#[async_trait]
impl LogTail for FileTail {
    /// Open, seek and read on the blocking pool; the handle is kept between polls
    async fn latest_line(&mut self) -> io::Result<Option<String>> {
        let path = self.path.clone();
        let window = self.window;
        let mut file = self.file.take();

        let (file, line) = tokio::task::spawn_blocking(move || {
            let line = read_latest(&path, window, &mut file);
            (file, line)
        })
        .await
        .map_err(io::Error::other)?;

        self.file = file;
        line
    }
}

#[async_trait]
impl<T: AsRef<[u8]> + Send> LogTail for io::Cursor<T> {
    async fn latest_line(&mut self) -> io::Result<Option<String>> {
        last_line(self, u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_last_line_simple() {
        let mut cur = Cursor::new(b"first\nsecond\nthird\n".to_vec());
        assert_eq!(last_line(&mut cur, 1024).unwrap().as_deref(), Some("third"));
    }

    #[test]
    fn test_last_line_with_carriage_returns() {
        let log = b"Stream mapping:\nframe=   10 fps=0.0 speed=0.4x\rframe=   20 fps=12 speed=0.8x\r";
        let mut cur = Cursor::new(log.to_vec());
        assert_eq!(
            last_line(&mut cur, 1024).unwrap().as_deref(),
            Some("frame=   20 fps=12 speed=0.8x")
        );
    }

    #[test]
    fn test_short_stream_clamps_window() {
        let mut cur = Cursor::new(b"only line".to_vec());
        assert_eq!(last_line(&mut cur, 1024).unwrap().as_deref(), Some("only line"));
    }

    #[test]
    fn test_empty_stream() {
        let mut cur = Cursor::new(Vec::new());
        assert_eq!(last_line(&mut cur, 1024).unwrap(), None);
        let mut blank = Cursor::new(b"\n\r\n".to_vec());
        assert_eq!(last_line(&mut blank, 1024).unwrap(), None);
    }

    #[test]
    fn test_window_only_sees_the_tail() {
        let mut log = "x".repeat(5000);
        log.push_str("\nframe=  99 speed=2x\n");
        let mut cur = Cursor::new(log.into_bytes());
        assert_eq!(last_line(&mut cur, 64).unwrap().as_deref(), Some("frame=  99 speed=2x"));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut cur = Cursor::new(vec![0xff, 0xfe, b'\n', b'o', b'k']);
        assert_eq!(last_line(&mut cur, 1024).unwrap().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_file_tail_follows_growing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enc_ffmpeg.log");
        let mut tail = FileTail::new(&path, 1024);

        // Not created yet
        assert!(tail.latest_line().await.is_err());

        let mut writer = std::fs::File::create(&path).unwrap();
        write!(writer, "frame=    1 speed=1x\r").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.latest_line().await.unwrap().as_deref(), Some("frame=    1 speed=1x"));

        write!(writer, "frame=    2 speed=1x\r").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.latest_line().await.unwrap().as_deref(), Some("frame=    2 speed=1x"));
    }

    #[tokio::test]
    async fn test_cursor_tail() {
        let mut cur = Cursor::new(b"frame=  5 speed=1x\rframe=  6 speed=1x\r".to_vec());
        assert_eq!(cur.latest_line().await.unwrap().as_deref(), Some("frame=  6 speed=1x"));
    }
}
