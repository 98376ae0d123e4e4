//! Sequentially numbered storage for captured frames (`1.jpg`, `2.jpg`, ...).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::Frame;
use crate::ports::PortError;

const EXTENSION: &str = "jpg";

/// Directory of captured frames.
#[derive(Debug, Clone)]
pub struct FrameArchive {
    dir: PathBuf,
}

impl FrameArchive {
    /// Open (and create if needed) the archive directory.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Io`] when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PortError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Archive directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the next frame will be written to: highest numeric stem + 1.
    /// Files whose stem is not a number are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Io`] when the directory cannot be listed and
    /// [`PortError::Internal`] when the highest stem is already `u64::MAX`.
    pub fn next_path(&self) -> Result<PathBuf, PortError> {
        let mut highest = 0_u64;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let number = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok());
            if let Some(number) = number {
                highest = highest.max(number);
            }
        }
        let next = highest.checked_add(1).ok_or_else(|| {
            PortError::Internal(format!("frame numbering exhausted in {}", self.dir.display()))
        })?;
        Ok(self.dir.join(format!("{next}.{EXTENSION}")))
    }

    /// Write a frame under the next free number.
    ///
    /// # Errors
    ///
    /// Returns the [`FrameArchive::next_path`] errors, and [`PortError::Io`] when the
    /// frame cannot be written.
    pub fn store(&self, frame: &Frame) -> Result<PathBuf, PortError> {
        let path = self.next_path()?;
        fs::write(&path, frame.bytes())?;
        debug!(path = %path.display(), bytes = frame.bytes().len(), "frame archived");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_starts_at_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = FrameArchive::open(dir.path().join("waste_collected")).expect("open");

        let next = archive.next_path().expect("list");
        assert_eq!(next, archive.dir().join("1.jpg"));
    }

    #[test]
    fn continues_after_highest_number_and_skips_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = FrameArchive::open(dir.path()).expect("open");
        for name in ["1.jpg", "7.jpg", "3.jpg", "notes.jpg", "12.png", "captured.txt"] {
            fs::write(dir.path().join(name), b"x").expect("seed file");
        }

        let next = archive.next_path().expect("list");
        assert_eq!(next, dir.path().join("8.jpg"));
    }

    #[test]
    fn store_writes_frames_in_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = FrameArchive::open(dir.path()).expect("open");

        let first = archive.store(&Frame::new(vec![0xFF, 0xD8])).expect("store");
        let second = archive.store(&Frame::new(vec![0xFF, 0xD9])).expect("store");

        assert_eq!(first, dir.path().join("1.jpg"));
        assert_eq!(second, dir.path().join("2.jpg"));
        assert_eq!(fs::read(&second).expect("read back"), [0xFF, 0xD9]);
    }

    #[test]
    fn max_stem_is_an_error_not_an_overflow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = FrameArchive::open(dir.path()).expect("open");
        fs::write(dir.path().join(format!("{}.jpg", u64::MAX)), b"x").expect("seed file");

        assert!(matches!(archive.next_path(), Err(PortError::Internal(_))));
        assert!(archive.store(&Frame::new(vec![1])).is_err());
    }
}
