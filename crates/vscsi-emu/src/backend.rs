//! Backing-store collaborators.
//!
//! A unit never owns its backing store; it holds a shared [`BlockBackend`] handle that the deferred
//! worker and the inline (direct handle) path read and write through.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("backend is read-only")]
    ReadOnly,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Byte-addressed backing store shared between the engine and the deferred worker.
pub trait BlockBackend: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<(), BackendError>;
    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), BackendError>;

    fn flush(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

fn check_bounds(offset: u64, len: usize, capacity: u64) -> Result<(), BackendError> {
    let end = u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len));
    match end {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BackendError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// In-memory backing store, used by tests and the probe harness.
#[derive(Debug)]
pub struct MemBackend {
    data: Mutex<Vec<u8>>,
}

impl MemBackend {
    pub fn new(size: usize) -> Self {
        Self::from_vec(vec![0; size])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl BlockBackend for MemBackend {
    fn len(&self) -> u64 {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len() as u64
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<(), BackendError> {
        let data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        check_bounds(offset, dst.len(), data.len() as u64)?;
        let start = offset as usize;
        dst.copy_from_slice(&data[start..start + dst.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), BackendError> {
        let mut data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        check_bounds(offset, src.len(), data.len() as u64)?;
        let start = offset as usize;
        data[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }
}

/// Image file on the host filesystem.
#[derive(Debug)]
pub struct FileBackend {
    file: Mutex<File>,
    len: u64,
    read_only: bool,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path.as_ref())?;
        Self::from_file(file, read_only)
    }

    pub fn from_file(file: File, read_only: bool) -> Result<Self, BackendError> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
            read_only,
        })
    }
}

impl BlockBackend for FileBackend {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<(), BackendError> {
        check_bounds(offset, dst.len(), self.len)?;
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), BackendError> {
        if self.read_only {
            return Err(BackendError::ReadOnly);
        }
        check_bounds(offset, src.len(), self.len)?;
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(src)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), BackendError> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}
