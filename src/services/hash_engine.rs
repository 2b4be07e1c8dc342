//! Multi-algorithm authenticode hashing.
//!
//! Legacy SHA1/SHA256 authenticode and page hashes come from a
//! [`HashPrimitive`]. Every other digest is computed here over the resolved
//! hash ranges, reading the memory map in fixed-size chunks and feeding each
//! chunk to every open digest context before moving on.

use crate::domain::constants::DEFAULT_HASH_CHUNK_MIB;
use crate::domain::crypto::DynDigest;
use crate::domain::pe::{HashRange, HashRangeCache};
use crate::infra::config::SimulationConfiguration;
use crate::infra::error::{SimulationError, SimulationResult};
use crate::infra::file_map::MappedFile;
use crate::HashAlgorithm;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Non-zero status returned by a [`HashPrimitive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveStatus(pub i32);

impl fmt::Display for PrimitiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {:#010x}", self.0)
    }
}

/// A file handed to a [`HashPrimitive`]: its path, mapped bytes and the
/// authenticode ranges already resolved for it.
#[derive(Debug, Clone, Copy)]
pub struct HashSource<'a> {
    pub path: &'a Path,
    pub bytes: &'a [u8],
    pub ranges: &'a [HashRange],
}

/// Platform hashing seam.
///
/// Both digest calls follow a two-call protocol: with `out == None` they
/// return the digest size, with a buffer they fill it and return the number
/// of bytes written.
pub trait HashPrimitive: Send + Sync {
    /// Authenticode digest of the file.
    fn authenticode_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
        out: Option<&mut [u8]>,
    ) -> Result<usize, PrimitiveStatus>;

    /// First-page hash. A size of zero means the file has no page hash.
    fn page_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
        out: Option<&mut [u8]>,
    ) -> Result<usize, PrimitiveStatus>;

    /// Whether flat whole-file SHA3 digests are available on this host.
    fn supports_flat_hashes(&self) -> bool;
}

/// The digests the hash stage compares against policy hash rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeIntegrityHashes {
    pub authenticode_sha1: String,
    pub authenticode_sha256: String,
    pub page_sha1: Option<String>,
    pub page_sha256: Option<String>,
}

/// Every digest the engine computes for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeIntegrityHashesV2 {
    #[serde(flatten)]
    pub code_integrity: CodeIntegrityHashes,
    pub authenticode_sha384: String,
    pub authenticode_sha512: String,
    pub authenticode_sha3_256: String,
    pub authenticode_sha3_384: String,
    pub authenticode_sha3_512: String,
    pub flat_sha3_384: Option<String>,
    pub flat_sha3_512: Option<String>,
}

/// Algorithms computed over the ranges by the engine itself.
const MANUAL_ALGORITHMS: [HashAlgorithm; 5] = [
    HashAlgorithm::Sha384,
    HashAlgorithm::Sha512,
    HashAlgorithm::Sha3_256,
    HashAlgorithm::Sha3_384,
    HashAlgorithm::Sha3_512,
];

/// Hashing service shared by all workers of a run.
pub struct HashEngine {
    primitive: Arc<dyn HashPrimitive>,
    cache: Arc<HashRangeCache>,
    chunk_size: usize,
    flat_hashes: bool,
}

impl HashEngine {
    #[must_use]
    pub fn new(primitive: Arc<dyn HashPrimitive>) -> Self {
        Self {
            primitive,
            cache: Arc::new(HashRangeCache::new()),
            chunk_size: DEFAULT_HASH_CHUNK_MIB as usize * 1024 * 1024,
            flat_hashes: true,
        }
    }

    #[must_use]
    pub fn from_config(primitive: Arc<dyn HashPrimitive>, config: &SimulationConfiguration) -> Self {
        Self::new(primitive)
            .with_chunk_size(config.hash_chunk_size())
            .with_flat_hashes(config.compute_flat_hashes)
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<HashRangeCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_flat_hashes(mut self, enabled: bool) -> Self {
        self.flat_hashes = enabled;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<HashRangeCache> {
        &self.cache
    }

    /// Legacy authenticode and page hashes.
    pub fn ci_hashes(&self, path: &Path) -> SimulationResult<CodeIntegrityHashes> {
        let file = MappedFile::open(path)?;
        self.ci_hashes_mapped(path, &file)
    }

    /// All digests. The range cache entry for `path` is evicted afterwards,
    /// whether hashing succeeded or not.
    pub fn all_hashes(&self, path: &Path) -> SimulationResult<CodeIntegrityHashesV2> {
        let result = self.all_hashes_inner(path);
        self.cache.evict(path);
        result
    }

    fn all_hashes_inner(&self, path: &Path) -> SimulationResult<CodeIntegrityHashesV2> {
        let file = MappedFile::open(path)?;
        let code_integrity = self.ci_hashes_mapped(path, &file)?;

        let ranges = self.cache.ranges_for(path, file.bytes(), file.last_write());
        let manual = self.range_digests(file.bytes(), &ranges, &MANUAL_ALGORITHMS);
        let [sha384, sha512, sha3_256, sha3_384, sha3_512] = match <[String; 5]>::try_from(manual)
        {
            Ok(digests) => digests,
            Err(_) => {
                return Err(SimulationError::HashingError(
                    "Digest count mismatch".to_string(),
                ))
            }
        };

        let (flat_sha3_384, flat_sha3_512) = match self.flat_digests(&file) {
            Some((a, b)) => (Some(a), Some(b)),
            None => (None, None),
        };

        Ok(CodeIntegrityHashesV2 {
            code_integrity,
            authenticode_sha384: sha384,
            authenticode_sha512: sha512,
            authenticode_sha3_256: sha3_256,
            authenticode_sha3_384: sha3_384,
            authenticode_sha3_512: sha3_512,
            flat_sha3_384,
            flat_sha3_512,
        })
    }

    /// Authenticode digests for `algorithms`, computed by the engine in a
    /// single pass over the ranges.
    pub fn authenticode_digests(
        &self,
        path: &Path,
        algorithms: &[HashAlgorithm],
    ) -> SimulationResult<Vec<(HashAlgorithm, String)>> {
        let file = MappedFile::open(path)?;
        let ranges = self.cache.ranges_for(path, file.bytes(), file.last_write());
        let digests = self.range_digests(file.bytes(), &ranges, algorithms);
        Ok(algorithms.iter().copied().zip(digests).collect())
    }

    /// Flat SHA3-384 and SHA3-512 of the whole file, when enabled and
    /// supported by the primitive.
    pub fn flat_hashes(&self, path: &Path) -> SimulationResult<Option<(String, String)>> {
        let file = MappedFile::open(path)?;
        Ok(self.flat_digests(&file))
    }

    fn flat_digests(&self, file: &MappedFile) -> Option<(String, String)> {
        if !self.flat_hashes || !self.primitive.supports_flat_hashes() {
            return None;
        }
        let whole = [HashRange::new(0, file.len())];
        let mut digests = self
            .range_digests(
                file.bytes(),
                &whole,
                &[HashAlgorithm::Sha3_384, HashAlgorithm::Sha3_512],
            )
            .into_iter();
        Some((digests.next()?, digests.next()?))
    }

    fn ci_hashes_mapped(&self, path: &Path, file: &MappedFile) -> SimulationResult<CodeIntegrityHashes> {
        let ranges = self.cache.ranges_for(path, file.bytes(), file.last_write());
        let source = HashSource {
            path,
            bytes: file.bytes(),
            ranges: &ranges,
        };

        let authenticode_sha1 = self.legacy_digest(&source, HashAlgorithm::Sha1)?;
        let authenticode_sha256 = self.legacy_digest(&source, HashAlgorithm::Sha256)?;
        let page_sha1 = self.page_digest(&source, HashAlgorithm::Sha1)?;
        let page_sha256 = self.page_digest(&source, HashAlgorithm::Sha256)?;

        Ok(CodeIntegrityHashes {
            authenticode_sha1,
            authenticode_sha256,
            page_sha1,
            page_sha256,
        })
    }

    fn legacy_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
    ) -> SimulationResult<String> {
        let digest = two_call(source, algorithm, |out| {
            self.primitive.authenticode_digest(source, algorithm, out)
        })?;
        if digest.is_empty() {
            return Err(SimulationError::HashingError(format!(
                "No {algorithm} authenticode digest for {}",
                source.path.display()
            )));
        }
        Ok(hex::encode_upper(digest))
    }

    fn page_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
    ) -> SimulationResult<Option<String>> {
        let digest = two_call(source, algorithm, |out| {
            self.primitive.page_digest(source, algorithm, out)
        })?;
        Ok((!digest.is_empty()).then(|| hex::encode_upper(digest)))
    }

    fn range_digests(
        &self,
        bytes: &[u8],
        ranges: &[HashRange],
        algorithms: &[HashAlgorithm],
    ) -> Vec<String> {
        let mut contexts: Vec<Box<dyn DynDigest>> =
            algorithms.iter().map(|alg| alg.new_digest()).collect();
        for range in ranges {
            let end = range.end().min(bytes.len());
            let start = range.start.min(end);
            for chunk in bytes[start..end].chunks(self.chunk_size) {
                for context in &mut contexts {
                    context.update(chunk);
                }
            }
        }
        contexts
            .into_iter()
            .map(|context| hex::encode_upper(context.finalize()))
            .collect()
    }
}

impl fmt::Debug for HashEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashEngine")
            .field("chunk_size", &self.chunk_size)
            .field("flat_hashes", &self.flat_hashes)
            .field("cached_ranges", &self.cache.len())
            .finish()
    }
}

/// Query the size, then fill a buffer of that size.
fn two_call<F>(
    source: &HashSource<'_>,
    algorithm: HashAlgorithm,
    mut call: F,
) -> SimulationResult<Vec<u8>>
where
    F: FnMut(Option<&mut [u8]>) -> Result<usize, PrimitiveStatus>,
{
    let failed = |status: PrimitiveStatus| {
        SimulationError::HashingError(format!(
            "{algorithm} hash of {} failed with {status}",
            source.path.display()
        ))
    };
    let size = call(None).map_err(failed)?;
    if size == 0 {
        return Ok(Vec::new());
    }
    let mut buffer = vec![0u8; size];
    let written = call(Some(&mut buffer)).map_err(failed)?;
    buffer.truncate(written);
    Ok(buffer)
}
