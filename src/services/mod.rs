//! Service layer module root.
//! Hashing, signer extraction, catalog indexing, rule arbitration and file
//! collection.

pub mod arbitrator;
pub mod catalog_index;
pub mod file_collector;
pub mod hash_engine;
pub mod signer_extractor;

pub use arbitrator::{Arbitrator, SignerLevel};
pub use catalog_index::{discover_catalog_files, CatalogIndex, CatalogLog, CatalogReader};
pub use file_collector::{collect_files, is_supported};
pub use hash_engine::{
    CodeIntegrityHashes, CodeIntegrityHashesV2, HashEngine, HashPrimitive, HashSource,
    PrimitiveStatus,
};
pub use signer_extractor::{
    ProviderData, SignerExtractor, SignerRecord, TrustState, TrustStatus, TrustVerifier,
};
