//! Index of security catalog members: uppercase digest to catalog path.
//!
//! Built once per run before any file is evaluated and only read afterwards.

use crate::domain::pkcs7::ctl::CatalogMember;
use crate::infra::error::{SimulationError, SimulationResult};
use dashmap::DashMap;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// An open catalog. Dropping it closes the catalog.
pub trait CatalogLog {
    /// Next member, or `None` once every member has been read.
    fn next_member(&mut self) -> SimulationResult<Option<CatalogMember>>;
}

/// Platform catalog enumeration seam.
pub trait CatalogReader: Send + Sync {
    fn open<'a>(&'a self, catalog: &Path) -> SimulationResult<Box<dyn CatalogLog + 'a>>;
}

/// Recursively collect `*.cat` files under `roots`. Unreadable directories
/// are skipped.
#[must_use]
pub fn discover_catalog_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending: Vec<PathBuf> = roots.to_vec();
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Skipping catalog directory {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("cat"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// Digest to catalog lookup.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    entries: DashMap<String, PathBuf>,
    catalogs: usize,
}

impl CatalogIndex {
    /// Index with no catalogs, used when catalog scanning is disabled.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan every catalog under `roots` on a pool of `threads` threads.
    ///
    /// Catalogs that cannot be read are logged and skipped. Only failing to
    /// create the pool is an error.
    pub fn build(
        reader: &dyn CatalogReader,
        roots: &[PathBuf],
        threads: usize,
    ) -> SimulationResult<Self> {
        let files = discover_catalog_files(roots);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("catalog-scan-{i}"))
            .build()
            .map_err(|e| {
                SimulationError::CatalogError(format!("Failed to create catalog scan pool: {e}"))
            })?;

        let entries = DashMap::new();
        pool.install(|| {
            files.par_iter().for_each(|catalog| {
                if let Err(e) = index_catalog(reader, catalog, &entries) {
                    log::warn!("Skipping catalog {}: {e}", catalog.display());
                }
            });
        });

        let index = Self {
            entries,
            catalogs: files.len(),
        };
        log::info!(
            "Indexed {} catalog hashes from {} catalog file(s)",
            index.len(),
            index.catalogs
        );
        Ok(index)
    }

    /// Catalog containing `digest`, compared case-insensitively.
    #[must_use]
    pub fn lookup(&self, digest: &str) -> Option<PathBuf> {
        self.entries
            .get(&digest.to_ascii_uppercase())
            .map(|entry| entry.value().clone())
    }

    /// Number of indexed digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of catalog files scanned.
    #[must_use]
    pub fn catalog_count(&self) -> usize {
        self.catalogs
    }
}

fn index_catalog(
    reader: &dyn CatalogReader,
    catalog: &Path,
    entries: &DashMap<String, PathBuf>,
) -> SimulationResult<()> {
    let mut log = reader.open(catalog)?;
    while let Some(member) = log.next_member()? {
        for hash in member.hashes() {
            entries.insert(hash, catalog.to_path_buf());
        }
    }
    Ok(())
}
