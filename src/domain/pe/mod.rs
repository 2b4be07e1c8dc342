//! PE (Portable Executable) domain types and operations.
//!
//! Provides the pieces of PE handling needed to reproduce authenticode
//! digests:
//! - Hash range resolution excluding the checksum and certificate table
//! - A concurrent, staleness-checked cache of resolved ranges
//! - Certificate table (`WIN_CERTIFICATE`) access
//! - File version extraction from the version resource

pub mod cache;
pub mod layout;
pub mod version;

pub use cache::{HashRangeCache, HashRangeCacheEntry};
pub use layout::{
    certificate_directory, embedded_signature, header_offsets, header_page, resolve_hash_ranges,
    CertificateDirectory, HashRange, HeaderPage, PeHeaderOffsets,
};
pub use version::{FileVersion, FileVersionInfo};
