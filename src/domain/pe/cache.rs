//! Concurrent cache of resolved authenticode hash ranges.

use super::layout::{resolve_hash_ranges, HashRange};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Ranges resolved for one file, valid while size and last-write time match.
#[derive(Debug, Clone)]
pub struct HashRangeCacheEntry {
    ranges: Arc<[HashRange]>,
    file_size: u64,
    last_write: SystemTime,
}

impl HashRangeCacheEntry {
    #[must_use]
    pub fn ranges(&self) -> &Arc<[HashRange]> {
        &self.ranges
    }

    fn is_current(&self, file_size: u64, last_write: SystemTime) -> bool {
        self.file_size == file_size && self.last_write == last_write
    }
}

/// Path-keyed range cache shared by all workers.
///
/// Two workers racing on the same path may both resolve; the later insert
/// replaces the earlier one. Each insert swaps in a complete entry.
#[derive(Debug, Default)]
pub struct HashRangeCache {
    entries: DashMap<PathBuf, HashRangeCacheEntry>,
    resolutions: AtomicUsize,
}

impl HashRangeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached ranges for `path`, resolving them from `image` when the
    /// entry is missing or stale.
    pub fn ranges_for(&self, path: &Path, image: &[u8], last_write: SystemTime) -> Arc<[HashRange]> {
        let file_size = image.len() as u64;
        // The read guard must be released before inserting.
        let cached = self
            .entries
            .get(path)
            .filter(|entry| entry.is_current(file_size, last_write))
            .map(|entry| Arc::clone(entry.ranges()));
        if let Some(ranges) = cached {
            log::trace!("Hash range cache hit for {}", path.display());
            return ranges;
        }

        let ranges: Arc<[HashRange]> = resolve_hash_ranges(image).into();
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            path.to_path_buf(),
            HashRangeCacheEntry {
                ranges: Arc::clone(&ranges),
                file_size,
                last_write,
            },
        );
        ranges
    }

    /// Drop the entry for `path` once its hashing is complete.
    pub fn evict(&self, path: &Path) {
        self.entries.remove(path);
    }

    /// Number of times ranges were parsed instead of served from cache.
    #[must_use]
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stale_entries_are_replaced() {
        let cache = HashRangeCache::new();
        let path = Path::new("a.bin");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let t1 = t0 + Duration::from_secs(1);

        let first = cache.ranges_for(path, &[0u8; 32], t0);
        let again = cache.ranges_for(path, &[0u8; 32], t0);
        assert_eq!(first, again);
        assert_eq!(cache.resolutions(), 1);

        cache.ranges_for(path, &[0u8; 32], t1);
        assert_eq!(cache.resolutions(), 2);

        let grown = cache.ranges_for(path, &[0u8; 48], t1);
        assert_eq!(grown[0].len, 48);
        assert_eq!(cache.resolutions(), 3);
        assert_eq!(cache.len(), 1);

        cache.evict(path);
        assert!(cache.is_empty());
    }
}
