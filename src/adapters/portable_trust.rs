//! Pure-Rust [`TrustVerifier`].
//!
//! Reads the PKCS#7 signature embedded in a PE certificate table, or the
//! whole file for `.cat` catalogs. Index 0 is the primary signature and
//! nested signatures follow in attribute order.
//!
//! Verification covers what the simulation needs: the signed authenticode
//! digest must match the file, and an expired signer must be timestamped.
//! Chains are built from the certificates embedded in the message.

use crate::domain::crypto::HashAlgorithm;
use crate::domain::pe::{embedded_signature, resolve_hash_ranges};
use crate::domain::pkcs7::SignedMessage;
use crate::infra::error::SimulationResult;
use crate::infra::file_map::MappedFile;
use crate::services::signer_extractor::{ProviderData, TrustState, TrustStatus, TrustVerifier};
use chrono::{DateTime, Utc};
use std::path::Path;

/// `TRUST_E_BAD_DIGEST`, reported for digest algorithms that cannot be checked.
pub const TRUST_E_BAD_DIGEST: u32 = 0x8009_6010;

/// Verifies signatures from file contents alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableTrustVerifier {
    verification_time: Option<DateTime<Utc>>,
}

impl PortableTrustVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate certificate expiry at `at` instead of the current time.
    #[must_use]
    pub fn with_verification_time(mut self, at: DateTime<Utc>) -> Self {
        self.verification_time = Some(at);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.verification_time.unwrap_or_else(Utc::now)
    }
}

fn is_catalog(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cat"))
}

/// Recompute the authenticode digest with the message's algorithm.
fn digest_status(bytes: &[u8], message: &SignedMessage) -> SimulationResult<TrustStatus> {
    let Some((oid, signed)) = message.indirect_digest()? else {
        return Ok(TrustStatus::Success);
    };
    let Some(algorithm) = HashAlgorithm::from_oid(&oid) else {
        return Ok(TrustStatus::Untrusted(TRUST_E_BAD_DIGEST));
    };
    let mut context = algorithm.new_digest();
    for range in resolve_hash_ranges(bytes) {
        context.update(&bytes[range.start..range.end().min(bytes.len())]);
    }
    if context.finalize() == signed {
        Ok(TrustStatus::Success)
    } else {
        Ok(TrustStatus::HashMismatch)
    }
}

impl TrustVerifier for PortableTrustVerifier {
    fn open(&self, path: &Path, index: u32) -> SimulationResult<TrustState> {
        let file = MappedFile::open(path)?;
        let bytes = file.bytes();
        let (blob, signs_image) = match embedded_signature(bytes) {
            Some(blob) => (blob, true),
            None if is_catalog(path) && !bytes.is_empty() => (bytes, false),
            None => return Ok(TrustState::new(TrustStatus::NoSignature)),
        };

        let primary = SignedMessage::decode(blob)?;
        let nested_count = primary.nested_signatures().len();
        let message = match index as usize {
            0 => primary,
            n if n <= nested_count => {
                SignedMessage::decode(&primary.nested_signatures()[n - 1])?
            }
            _ => return Ok(TrustState::new(TrustStatus::NoSignature)),
        };

        let mut status = if signs_image {
            digest_status(bytes, &message)?
        } else {
            TrustStatus::Success
        };
        if status == TrustStatus::Success {
            let expired = message
                .signer_certificate()
                .is_some_and(|cert| cert.is_expired_at(self.now()));
            if expired && !message.is_timestamped() {
                status = TrustStatus::CertExpired;
            }
        }

        let chain = message.signer_chain();
        let mut state = TrustState::new(status).with_provider(ProviderData::new(
            message.as_der().to_vec(),
            Some(chain),
        ));
        if index == 0 {
            state.secondary_signers = u32::try_from(nested_count).ok();
        }
        Ok(state)
    }

    fn close(&self, state: &mut TrustState) {
        state.provider = None;
    }
}
