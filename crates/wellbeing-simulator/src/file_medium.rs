//! Cycle log persistence on a host file

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::error;

use wellbeing_core::{MediumError, StorageMedium};

/// Single-file [`StorageMedium`]. The journal handle is opened lazily in
/// append mode and kept until the file is replaced or destroyed.
pub struct FileMedium {
    path: PathBuf,
    journal: Option<File>,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn journal(&mut self) -> Result<&mut File, MediumError> {
        if self.journal.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| io_failure("open", &self.path, &e, MediumError::Write))?;
            self.journal = Some(file);
        }
        self.journal.as_mut().ok_or(MediumError::Write)
    }
}

fn io_failure(op: &str, path: &Path, err: &io::Error, kind: MediumError) -> MediumError {
    error!(" Failed to {} {}: {}", op, path.display(), err);
    kind
}

impl StorageMedium for FileMedium {
    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<(), MediumError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                buf.extend_from_slice(&bytes);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure("read", &self.path, &e, MediumError::Read)),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), MediumError> {
        let path = self.path.clone();
        self.journal()?
            .write_all(bytes)
            .map_err(|e| io_failure("append to", &path, &e, MediumError::Write))
    }

    fn sync(&mut self) -> Result<(), MediumError> {
        let Some(file) = self.journal.as_mut() else {
            return Ok(());
        };
        file.sync_all()
            .map_err(|e| io_failure("sync", &self.path, &e, MediumError::Sync))
    }

    fn replace(&mut self, bytes: &[u8]) -> Result<(), MediumError> {
        self.journal = None;
        let staging = self.path.with_extension("tmp");

        fs::write(&staging, bytes)
            .and_then(|()| File::open(&staging)?.sync_all())
            .map_err(|e| io_failure("write", &staging, &e, MediumError::Write))?;
        fs::rename(&staging, &self.path)
            .map_err(|e| io_failure("replace", &self.path, &e, MediumError::Write))
    }

    fn destroy(&mut self) -> Result<(), MediumError> {
        self.journal = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure("remove", &self.path, &e, MediumError::Remove)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellbeing_core::{ConfigRecord, CycleRecord, LogStore};

    fn medium_in(dir: &tempfile::TempDir) -> FileMedium {
        FileMedium::new(dir.path().join("database.bin"))
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = medium_in(&dir);

        let mut buf = Vec::new();
        medium.read_all(&mut buf).unwrap();

        assert!(buf.is_empty());
        assert!(!medium.path().exists());
    }

    #[test]
    fn test_append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = medium_in(&dir);

        medium.append(&[1, 2, 3]).unwrap();
        medium.append(&[4]).unwrap();
        medium.sync().unwrap();

        let mut buf = Vec::new();
        medium.read_all(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_replace_overwrites_and_appends_after() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = medium_in(&dir);
        medium.append(&[9; 16]).unwrap();

        medium.replace(&[1, 2]).unwrap();
        medium.append(&[3]).unwrap();

        assert_eq!(fs::read(medium.path()).unwrap(), [1, 2, 3]);
        assert!(!medium.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_destroy_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = medium_in(&dir);
        medium.append(&[1]).unwrap();

        medium.destroy().unwrap();
        assert!(!medium.path().exists());

        medium.destroy().unwrap();
    }

    #[test]
    fn test_log_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = CycleRecord {
            start_time: 1_591_000_200,
            end_time: 1_591_000_260,
            duration_secs: 60,
            min_amps: 3.9,
            avg_amps: 4.1,
            max_amps: 4.4,
        };
        {
            let mut store = LogStore::open(medium_in(&dir)).unwrap();
            store.set_config(&ConfigRecord::default()).unwrap();
            store.put(&record).unwrap();
        }

        let store = LogStore::open(medium_in(&dir)).unwrap();

        let found: Vec<_> = store.range_from(0).collect();
        assert_eq!(found, [record]);
        assert_eq!(store.config(), Some(ConfigRecord::default()));
    }
}
