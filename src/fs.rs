//! Filesystem access contract
//!
//! The index core never touches `std::fs` directly: every file operation
//! goes through the [`Filesystem`] trait supplied by the host. Tests inject
//! failing implementations through the same seam. Any filesystem error is an
//! internal error, never data loss.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{MinnowError, Result};

/// Host-provided filesystem operations.
pub trait Filesystem {
    /// Open `path` read-write, creating it if absent.
    fn open_for_write(&self, path: &Path) -> Result<File>;

    /// Open `path` read-only.
    fn open_for_read(&self, path: &Path) -> Result<File>;

    /// Write `data` at `offset` without moving any append position.
    fn pwrite(&self, path: &Path, offset: u64, data: &[u8]) -> Result<()>;

    /// Set the file's size to `len` bytes.
    fn truncate(&self, path: &Path, len: u64) -> Result<()>;

    fn get_file_size(&self, path: &Path) -> Result<u64>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file; succeeds if it does not exist.
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Remove a directory tree; succeeds if it does not exist.
    fn delete_directory_recursively(&self, path: &Path) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    /// Replace the file's contents with `data`.
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = self.open_for_write(path)?;
        file.set_len(0).map_err(MinnowError::from)?;
        file.write_all(data).map_err(MinnowError::from)?;
        file.sync_data().map_err(MinnowError::from)?;
        Ok(())
    }

    /// Read the file's entire contents.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = self.open_for_read(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(MinnowError::from)?;
        Ok(buf)
    }
}

/// The standard-library implementation used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn open_for_write(&self, path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(MinnowError::from)
    }

    fn open_for_read(&self, path: &Path) -> Result<File> {
        File::open(path).map_err(MinnowError::from)
    }

    fn pwrite(&self, path: &Path, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(MinnowError::from)?;
        file.seek(SeekFrom::Start(offset)).map_err(MinnowError::from)?;
        file.write_all(data).map_err(MinnowError::from)?;
        file.sync_data().map_err(MinnowError::from)?;
        Ok(())
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(MinnowError::from)?;
        file.set_len(len).map_err(MinnowError::from)
    }

    fn get_file_size(&self, path: &Path) -> Result<u64> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(MinnowError::from)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(MinnowError::from)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_directory_recursively(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob");
        let fs = StdFilesystem;

        fs.write_file(&path, b"hello").unwrap();
        assert_eq!(fs.read_file(&path).unwrap(), b"hello");
        assert_eq!(fs.get_file_size(&path).unwrap(), 5);
    }

    #[test]
    fn test_pwrite_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob");
        let fs = StdFilesystem;

        fs.write_file(&path, b"hello").unwrap();
        fs.pwrite(&path, 1, b"u").unwrap();
        assert_eq!(fs.read_file(&path).unwrap(), b"hullo");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFilesystem;
        fs.delete_file(&tmp.path().join("nope")).unwrap();
        fs.delete_directory_recursively(&tmp.path().join("nope_dir"))
            .unwrap();
    }

    #[test]
    fn test_open_for_read_missing_is_internal() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFilesystem;
        let err = fs.open_for_read(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, MinnowError::Internal(_)));
    }
}
