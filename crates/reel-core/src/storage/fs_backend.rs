use super::{Slot, StorageBackend};
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One JSON file per slot inside a data directory.
///
/// Separate processes pointed at the same directory see each other's
/// writes; each write lands via temp file + rename.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a slot's file
    pub fn slot_path(&self, slot: Slot) -> PathBuf {
        self.root.join(format!("{}.json", slot.key()))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, slot: Slot) -> Result<Option<String>> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&self, slot: Slot, contents: &str) -> Result<()> {
        self.ensure_dir()
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", self.root.display(), e)))?;
        let tmp_path = self
            .root
            .join(format!(".{}-{}.tmp", slot.key(), Uuid::new_v4()));
        let written = fs::write(&tmp_path, contents)
            .and_then(|()| fs::rename(&tmp_path, self.slot_path(slot)));
        if let Err(e) = written {
            // A partial write or failed rename must not leave the tmp file behind
            fs::remove_file(&tmp_path).ok();
            return Err(Error::Io(e));
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        if self.root.is_dir() {
            return fs::metadata(&self.root)
                .map(|m| !m.permissions().readonly())
                .unwrap_or(false);
        }
        // Not created yet: available if it can be
        self.ensure_dir().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_slot_reads_none() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        assert_eq!(backend.read(Slot::Pipeline).unwrap(), None);
    }

    #[test]
    fn test_write_creates_dir_and_replaces() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().join("nested").join("reel"));

        backend.write(Slot::Archive, "{\"a\":1}").unwrap();
        backend.write(Slot::Archive, "{\"b\":2}").unwrap();

        assert_eq!(backend.read(Slot::Archive).unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(backend.slot_path(Slot::Archive).ends_with("archive.json"));
        let leftovers = fs::read_dir(backend.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_write_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        // A non-empty directory where the slot file belongs makes the write fail
        let blocker = backend.slot_path(Slot::Pipeline);
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        assert!(backend.write(Slot::Pipeline, "{}").is_err());

        let leftovers = fs::read_dir(backend.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_is_available() {
        let dir = TempDir::new().unwrap();
        assert!(FsBackend::new(dir.path()).is_available());
    }
}
