//! Signer and certificate chain extraction.
//!
//! A file may carry several signatures. The [`TrustVerifier`] is asked for
//! them one index at a time; the first response that reports the number of
//! secondary signers bounds the loop.

use crate::domain::crypto::CertificateChain;
use crate::domain::pkcs7::SignedMessage;
use crate::infra::error::{SimulationError, SimulationResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Outcome of verifying one signature index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    Success,
    NoSignature,
    /// The signer certificate expired and the signature is not timestamped.
    CertExpired,
    /// The file no longer matches its signed digest.
    HashMismatch,
    /// Any other verification failure, with the platform status code.
    Untrusted(u32),
}

/// Provider data retained by a verification: the encoded signed message and
/// the chain built for its signer.
#[derive(Debug, Default)]
pub struct ProviderData {
    encoded_message: Vec<u8>,
    chain: Option<CertificateChain>,
}

impl ProviderData {
    #[must_use]
    pub fn new(encoded_message: Vec<u8>, chain: Option<CertificateChain>) -> Self {
        Self {
            encoded_message,
            chain,
        }
    }

    /// Size of the encoded message, for sizing the copy buffer.
    #[must_use]
    pub fn encoded_message_len(&self) -> usize {
        self.encoded_message.len()
    }

    /// Copy the encoded message into `out`, returning the bytes copied.
    pub fn copy_encoded_message(&self, out: &mut [u8]) -> usize {
        let len = self.encoded_message.len().min(out.len());
        out[..len].copy_from_slice(&self.encoded_message[..len]);
        len
    }

    /// Take ownership of the signer chain.
    pub fn take_signer_chain(&mut self) -> Option<CertificateChain> {
        self.chain.take()
    }
}

/// State of one open verification.
#[derive(Debug)]
pub struct TrustState {
    pub status: TrustStatus,
    /// Number of signatures beyond the primary one, when known.
    pub secondary_signers: Option<u32>,
    pub provider: Option<ProviderData>,
}

impl TrustState {
    #[must_use]
    pub fn new(status: TrustStatus) -> Self {
        Self {
            status,
            secondary_signers: None,
            provider: None,
        }
    }

    #[must_use]
    pub fn with_secondary_signers(mut self, count: u32) -> Self {
        self.secondary_signers = Some(count);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ProviderData) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Platform trust verification seam.
pub trait TrustVerifier: Send + Sync {
    /// Verify the signature at `index` and keep its state open.
    fn open(&self, path: &Path, index: u32) -> SimulationResult<TrustState>;

    /// Release the state returned by [`TrustVerifier::open`].
    fn close(&self, state: &mut TrustState);
}

/// Open verification closed exactly once when dropped.
struct TrustSession<'a> {
    verifier: &'a dyn TrustVerifier,
    state: TrustState,
}

impl<'a> TrustSession<'a> {
    fn open(verifier: &'a dyn TrustVerifier, path: &Path, index: u32) -> SimulationResult<Self> {
        let state = verifier.open(path, index)?;
        Ok(Self { verifier, state })
    }
}

impl Drop for TrustSession<'_> {
    fn drop(&mut self) {
        self.verifier.close(&mut self.state);
    }
}

/// A signed message with the chain of its signer. Owned by the caller that
/// extracted it.
pub struct SignerRecord {
    message: SignedMessage,
    chain: CertificateChain,
}

impl SignerRecord {
    #[must_use]
    pub fn new(message: SignedMessage, chain: CertificateChain) -> Self {
        Self { message, chain }
    }

    #[must_use]
    pub fn message(&self) -> &SignedMessage {
        &self.message
    }

    #[must_use]
    pub fn chain(&self) -> &CertificateChain {
        &self.chain
    }

    /// EKUs of the primary signer certificate.
    #[must_use]
    pub fn signer_ekus(&self) -> Vec<String> {
        self.message
            .signer_certificate()
            .map(|cert| cert.ekus().to_vec())
            .unwrap_or_default()
    }
}

impl fmt::Debug for SignerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerRecord")
            .field("message", &self.message)
            .field("chain", &self.chain)
            .finish()
    }
}

/// Enumerates every signer of a file through a [`TrustVerifier`].
#[derive(Clone)]
pub struct SignerExtractor {
    verifier: Arc<dyn TrustVerifier>,
}

impl SignerExtractor {
    #[must_use]
    pub fn new(verifier: Arc<dyn TrustVerifier>) -> Self {
        Self { verifier }
    }

    /// Extract all signers of `path`.
    ///
    /// Expired, untimestamped signers are skipped. A hash mismatch on any
    /// index aborts with [`SimulationError::HashMismatch`].
    pub fn extract(&self, path: &Path) -> SimulationResult<Vec<SignerRecord>> {
        let mut records = Vec::new();
        let mut max_signers: Option<u32> = None;
        let mut index: u32 = 0;

        while index <= max_signers.unwrap_or(0) {
            let mut session = TrustSession::open(self.verifier.as_ref(), path, index)?;
            if max_signers.is_none() {
                max_signers = session.state.secondary_signers;
            }

            match session.state.status {
                TrustStatus::CertExpired => {
                    log::debug!("Skipping expired signer {index} of {}", path.display());
                    index += 1;
                    continue;
                }
                TrustStatus::HashMismatch => {
                    return Err(SimulationError::HashMismatch {
                        path: path.to_path_buf(),
                    });
                }
                _ => {}
            }

            if let Some(provider) = session.state.provider.as_mut() {
                let mut encoded = vec![0u8; provider.encoded_message_len()];
                let copied = provider.copy_encoded_message(&mut encoded);
                encoded.truncate(copied);
                let message = SignedMessage::decode(&encoded)?;
                let chain = provider.take_signer_chain().unwrap_or_default();
                records.push(SignerRecord::new(message, chain));
            }
            index += 1;
        }

        log::trace!("{} signer(s) extracted from {}", records.len(), path.display());
        Ok(records)
    }
}

impl fmt::Debug for SignerExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignerExtractor")
    }
}
