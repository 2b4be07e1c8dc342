//! Read-only memory-mapped file access.

use crate::infra::error::{SimulationError, SimulationResult};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::time::SystemTime;

/// A file opened and mapped for reading, together with the metadata the range
/// cache keys on.
pub struct MappedFile {
    // Zero-length files cannot be mapped on every platform.
    map: Option<Mmap>,
    last_write: SystemTime,
}

impl MappedFile {
    /// Open and map `path` read-only.
    pub fn open(path: &Path) -> SimulationResult<Self> {
        let file = File::open(path).map_err(|e| {
            SimulationError::IoError(format!("Failed to open {}: {e}", path.display()))
        })?;
        Self::from_file(&file)
    }

    /// Map an already opened file.
    pub fn from_file(file: &File) -> SimulationResult<Self> {
        let metadata = file.metadata()?;
        let last_write = metadata.modified()?;
        let map = if metadata.len() == 0 {
            None
        } else {
            // SAFETY: read-only mapping owned by this value. The file must not be
            // truncated by another process while mapped.
            Some(unsafe { Mmap::map(file)? })
        };
        Ok(Self { map, last_write })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn last_write(&self) -> SystemTime {
        self.last_write
    }
}
