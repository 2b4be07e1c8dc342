//! Foundational cryptographic domain types.
//!
//! Provides:
//! - Hash algorithms and boxed digest contexts for single-pass multi-hashing
//! - Certificate summaries (display names, validity, EKUs, TBS hash)
//! - Leaf-first certificate chains with root/intermediate/leaf roles

mod cert;
mod hash;

pub use cert::{
    name_attribute, simple_display_name, tbs_hash, CertificateChain, ChainCertificate,
};
pub use hash::{DynDigest, HashAlgorithm};
