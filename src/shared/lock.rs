//! Exclusive locking of shared documents
//!
//! A shared document is a plain file that several worker processes read and
//! rewrite. Every access goes through an OS-level exclusive lock; there is no
//! in-memory locking because the mutators live in separate processes.

use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::utils::timer::Timer;

/// Lock waits longer than this are logged as warnings
const SLOW_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Shared document errors
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to open shared document {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to lock shared document {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read shared document {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write shared document {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Shared document {} was opened read-only", path.display())]
    ReadOnly { path: PathBuf },

    #[error("Failed to remove shared document {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DocumentError {
    /// Whether the document did not exist when it was opened
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::Open { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// How a shared document is opened before locking
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read and rewrite; the file is created when missing
    ReadWrite,
    /// Read only; the file must already exist
    ReadOnly,
}

/// A named shared document on the local filesystem
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedDocument {
    path: PathBuf,
}

impl SharedDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Run `f` while holding the exclusive lock on this document.
    ///
    /// Blocks until the lock is free. The lock is released when `f` returns,
    /// whether it succeeded or not.
    pub fn with_exclusive_lock<T, E, F>(&self, mode: OpenMode, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut LockedDocument) -> Result<T, E>,
        E: From<DocumentError>,
    {
        let mut locked = self.lock(mode)?;
        f(&mut locked)
    }

    /// Open and exclusively lock this document, blocking until the lock is free
    pub fn lock(&self, mode: OpenMode) -> Result<LockedDocument, DocumentError> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::ReadWrite => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|source| DocumentError::Open {
                        path: self.path.clone(),
                        source,
                    })?;
                }
                options.read(true).write(true).create(true).truncate(false);
            }
            OpenMode::ReadOnly => {
                options.read(true);
            }
        }

        let file = options
            .open(&self.path)
            .map_err(|source| DocumentError::Open {
                path: self.path.clone(),
                source,
            })?;

        let timer = Timer::start(format!("lock wait on {}", self.path.display()))
            .slow_after(SLOW_LOCK_WAIT);
        FileExt::lock_exclusive(&file).map_err(|source| DocumentError::Lock {
            path: self.path.clone(),
            source,
        })?;
        timer.stop();

        Ok(LockedDocument {
            path: self.path.clone(),
            file,
            mode,
        })
    }

    /// Delete the document. A document that is already gone is not an error.
    pub fn remove(&self) -> Result<bool, DocumentError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed shared document {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(DocumentError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// An exclusively locked shared document. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockedDocument {
    path: PathBuf,
    file: File,
    mode: OpenMode,
}

impl LockedDocument {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the document in bytes
    pub fn len(&self) -> Result<u64, DocumentError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| DocumentError::Read {
                path: self.path.clone(),
                source,
            })
    }

    pub fn is_empty(&self) -> Result<bool, DocumentError> {
        Ok(self.len()? == 0)
    }

    /// Read the full current contents
    pub fn read(&mut self) -> Result<Vec<u8>, DocumentError> {
        let mut bytes = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut bytes))
            .map_err(|source| DocumentError::Read {
                path: self.path.clone(),
                source,
            })?;
        trace!("Read {} bytes from {}", bytes.len(), self.path.display());
        Ok(bytes)
    }

    /// Truncate the document and replace its contents with `bytes`
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DocumentError> {
        if self.mode == OpenMode::ReadOnly {
            return Err(DocumentError::ReadOnly {
                path: self.path.clone(),
            });
        }

        let file = &mut self.file;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(bytes))
            .and_then(|_| file.flush())
            .map_err(|source| DocumentError::Write {
                path: self.path.clone(),
                source,
            })?;
        trace!("Wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

impl Drop for LockedDocument {
    fn drop(&mut self) {
        // Closing the file releases the lock as well; errors here are not actionable.
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_read_write_round_trip() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("nested").join("doc.bin"));

        doc.with_exclusive_lock(OpenMode::ReadWrite, |locked| {
            assert!(locked.is_empty()?);
            locked.write(b"first version, long")?;
            locked.write(b"second")?;
            Ok::<_, DocumentError>(())
        })
        .unwrap();

        let bytes = doc
            .with_exclusive_lock(OpenMode::ReadOnly, |locked| locked.read())
            .unwrap();
        assert_eq!(bytes, b"second");
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("doc.bin"));
        std::fs::write(doc.path(), b"data").unwrap();

        let err = doc
            .with_exclusive_lock(OpenMode::ReadOnly, |locked| locked.write(b"nope"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::ReadOnly { .. }));
    }

    #[test]
    fn test_read_only_missing_document() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("missing.bin"));
        let err = doc.lock(OpenMode::ReadOnly).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lock_released_on_error() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("doc.bin"));

        let result: Result<(), DocumentError> = doc.with_exclusive_lock(OpenMode::ReadWrite, |_| {
            Err(DocumentError::ReadOnly {
                path: PathBuf::from("forced"),
            })
        });
        assert!(result.is_err());

        // A second acquisition would block forever if the lock had leaked
        let locked = doc.lock(OpenMode::ReadWrite).unwrap();
        drop(locked);
    }

    #[test]
    fn test_remove_is_best_effort() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("doc.bin"));
        std::fs::write(doc.path(), b"data").unwrap();

        assert!(doc.remove().unwrap());
        assert!(!doc.remove().unwrap());
        assert!(!doc.exists());
    }

    #[test]
    fn test_exclusive_lock_serializes_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        let workers = 8;
        let increments = 25;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let doc = SharedDocument::new(path.clone());
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..increments {
                        doc.with_exclusive_lock(OpenMode::ReadWrite, |locked| {
                            let bytes = locked.read()?;
                            let current: u32 = String::from_utf8_lossy(&bytes)
                                .trim()
                                .parse()
                                .unwrap_or(0);
                            locked.write((current + 1).to_string().as_bytes())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, (workers * increments).to_string());
    }
}
