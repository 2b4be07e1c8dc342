//! Hash algorithm domain type and boxed digest contexts.
//!
//! `HashAlgorithm` covers every digest a verdict can reference. Contexts are
//! handed out as `Box<dyn DynDigest>` so one pass over a file can feed any
//! mix of SHA-1, SHA-2 and SHA-3 at once.

pub use crate::HashAlgorithm;

use crate::domain::constants::{
    OID_SHA1, OID_SHA256, OID_SHA384, OID_SHA3_256, OID_SHA3_384, OID_SHA3_512, OID_SHA512,
};
use const_oid::ObjectIdentifier;
use sha2::Digest;

/// Object-safe digest context.
pub trait DynDigest: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

impl<D> DynDigest for D
where
    D: Digest + Send + 'static,
{
    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Digest::finalize(*self).to_vec()
    }
}

impl HashAlgorithm {
    /// Fresh digest context for this algorithm.
    #[must_use]
    pub fn new_digest(self) -> Box<dyn DynDigest> {
        match self {
            HashAlgorithm::Sha1 => Box::new(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Box::new(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => Box::new(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => Box::new(sha2::Sha512::new()),
            HashAlgorithm::Sha3_256 => Box::new(sha3::Sha3_256::new()),
            HashAlgorithm::Sha3_384 => Box::new(sha3::Sha3_384::new()),
            HashAlgorithm::Sha3_512 => Box::new(sha3::Sha3_512::new()),
        }
    }

    /// One-shot digest of `data`.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut context = self.new_digest();
        context.update(data);
        context.finalize()
    }

    #[must_use]
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            HashAlgorithm::Sha1 => OID_SHA1,
            HashAlgorithm::Sha256 => OID_SHA256,
            HashAlgorithm::Sha384 => OID_SHA384,
            HashAlgorithm::Sha512 => OID_SHA512,
            HashAlgorithm::Sha3_256 => OID_SHA3_256,
            HashAlgorithm::Sha3_384 => OID_SHA3_384,
            HashAlgorithm::Sha3_512 => OID_SHA3_512,
        }
    }

    /// Map a digest algorithm OID back to the enum.
    #[must_use]
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        HashAlgorithm::ALL.into_iter().find(|alg| alg.oid() == *oid)
    }
}
