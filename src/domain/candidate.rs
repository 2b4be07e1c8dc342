//! A file under evaluation and the attributes computed for it on demand.

use crate::domain::pe::{FileVersion, FileVersionInfo};
use crate::infra::file_map::MappedFile;
use crate::services::hash_engine::CodeIntegrityHashes;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// Candidate file, owned by the worker evaluating it.
#[derive(Debug)]
pub struct CandidateFile {
    path: PathBuf,
    extension: Option<String>,
    hashes: OnceCell<CodeIntegrityHashes>,
    version_info: OnceCell<FileVersionInfo>,
}

impl CandidateFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()));
        Self {
            path,
            extension,
            hashes: OnceCell::new(),
            version_info: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase extension with its leading dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Hashes recorded by the hash stage.
    #[must_use]
    pub fn hashes(&self) -> Option<&CodeIntegrityHashes> {
        self.hashes.get()
    }

    /// Record hashes; the first recorded value wins.
    pub fn record_hashes(&self, hashes: CodeIntegrityHashes) -> &CodeIntegrityHashes {
        self.hashes.get_or_init(|| hashes)
    }

    /// Version resource of the file, read on first use. Unreadable files
    /// have no version information.
    pub fn version_info(&self) -> &FileVersionInfo {
        self.version_info.get_or_init(|| match MappedFile::open(&self.path) {
            Ok(map) => FileVersionInfo::from_image(map.bytes()),
            Err(e) => {
                log::debug!("No version information for {}: {e}", self.path.display());
                FileVersionInfo::default()
            }
        })
    }

    #[must_use]
    pub fn file_version(&self) -> Option<FileVersion> {
        self.version_info().version
    }
}
