//! App Control Simulator Library
//!
//! Simulates whether an App Control (WDAC) code-integrity policy would allow
//! a set of files to run. Each file goes through an ordered list of decision
//! stages (file path, hash, unsigned extension, signature/catalog) and ends in
//! exactly one [`Verdict`].
//!
//! The platform services a real enforcement engine relies on (authenticode
//! hashing, trust verification, catalog enumeration) sit behind traits with
//! portable implementations in [`adapters`].

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

use std::fmt;
use std::str::FromStr;

pub use domain::candidate::CandidateFile;
pub use domain::policy::{PolicyModel, SignerRule};
pub use domain::verdict::{
    CertificateSummary, Decision, DenialReason, SignerDecision, Verdict, VerdictSource,
};
pub use infra::cancel::CancellationToken;
pub use infra::config::{ConfigManager, ExportFormat, SimulationConfiguration};
pub use infra::error::{SimulationError, SimulationResult};
pub use pipelines::simulate::{Simulation, SimulationReport, SimulationRequest};
pub use services::hash_engine::{CodeIntegrityHashes, CodeIntegrityHashesV2, HashEngine};
pub use services::signer_extractor::{SignerExtractor, SignerRecord};

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    #[serde(rename = "sha3-256")]
    Sha3_256,
    #[serde(rename = "sha3-384")]
    Sha3_384,
    #[serde(rename = "sha3-512")]
    Sha3_512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 7] = [
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_384,
        HashAlgorithm::Sha3_512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Sha3_384 => "sha3-384",
            HashAlgorithm::Sha3_512 => "sha3-512",
        }
    }

    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha3_384 => 48,
            HashAlgorithm::Sha512 | HashAlgorithm::Sha3_512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        HashAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == wanted)
            .ok_or_else(|| SimulationError::InvalidInput(format!("Unknown hash algorithm: {s}")))
    }
}
