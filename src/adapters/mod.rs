//! Adapter layer: portable implementations of the platform seams.
//!
//! Provides:
//! - Authenticode and page hashing over mapped bytes
//! - Trust verification of embedded and catalog signatures
//! - Security catalog reading through certificate trust list decoding

pub mod ctl_catalog;
pub mod portable_hash;
pub mod portable_trust;

pub use ctl_catalog::CtlCatalogReader;
pub use portable_hash::PortableHashPrimitive;
pub use portable_trust::PortableTrustVerifier;
