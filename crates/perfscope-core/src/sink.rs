//! Report output destinations.

use crate::error::StorageError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Where rendered reports are written.
pub trait ReportSink: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> Result<(), StorageError>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError>;
}

/// Local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ReportSink for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::create_dir_all(path).map_err(|e| StorageError::create_dir(path, e))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        std::fs::write(path, contents).map_err(|e| StorageError::write(path, e))
    }
}

/// In-memory sink that records everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<Vec<PathBuf>>,
    fail_writes: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail with a permission error.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn files(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn read_to_string(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for MemorySink {
    fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        let mut dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        if !dirs.iter().any(|d| d == path) {
            dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::write(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "write rejected"),
            ));
        }
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_fs_writes_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let file = nested.join("report.md");

        LocalFs.create_dir_all(&nested).unwrap();
        LocalFs.write_file(&file, b"# Report").unwrap();

        assert_eq!(std::fs::read_to_string(file).unwrap(), "# Report");
    }

    #[test]
    fn test_memory_sink_records_writes() {
        let sink = MemorySink::new();
        let path = Path::new("reports/out.json");

        sink.create_dir_all(Path::new("reports")).unwrap();
        sink.write_file(path, b"{}").unwrap();

        assert_eq!(sink.read_to_string(path).as_deref(), Some("{}"));
        assert_eq!(sink.dirs(), vec![PathBuf::from("reports")]);
    }

    #[test]
    fn test_failing_sink_surfaces_path() {
        let sink = MemorySink::failing();
        let err = sink.write_file(Path::new("x.csv"), b"a,b").unwrap_err();
        assert_eq!(err.path(), Some(Path::new("x.csv")));
    }
}
