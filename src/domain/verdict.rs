//! Per-file simulation verdicts.
//!
//! Each decision variant carries only the data its source produces, so a
//! hash verdict can never be read for certificate metadata it does not have.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Certificate metadata attached to signer and catalog verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub subject_cn: String,
    pub issuer_cn: String,
    pub not_after: DateTime<Utc>,
    pub tbs_hash: String,
}

/// Why a signature-stage verdict denied the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum DenialReason {
    /// Signed, but no signer rule matched.
    NotAllowed,
    /// The file changed after signing.
    HashMismatch,
    /// The file could not be read or hashed.
    Inaccessible,
    /// Any other failure while extracting or comparing signers.
    Unexpected(String),
}

/// Outcome of the signature stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum SignerDecision {
    Allowed {
        /// Signer rule level that matched, e.g. `Publisher`.
        level: String,
        /// File attribute behind a file-level match, e.g. `OriginalFileName`.
        match_criteria: Option<String>,
        rule_id: String,
        rule_name: String,
        certificate: CertificateSummary,
    },
    Denied(DenialReason),
}

/// Terminal decision for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum Decision {
    AllowAllRule,
    FilePath,
    Hash,
    CatalogSigned {
        catalog_path: PathBuf,
        /// The catalog's own signer.
        certificate: CertificateSummary,
    },
    Signer(SignerDecision),
    Unsigned,
}

/// Source tag of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerdictSource {
    AllowAllRule,
    FilePath,
    Hash,
    CatalogSigned,
    Signer,
    Unsigned,
}

impl VerdictSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictSource::AllowAllRule => "AllowAllRule",
            VerdictSource::FilePath => "FilePath",
            VerdictSource::Hash => "Hash",
            VerdictSource::CatalogSigned => "CatalogSigned",
            VerdictSource::Signer => "Signer",
            VerdictSource::Unsigned => "Unsigned",
        }
    }
}

impl fmt::Display for VerdictSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Decision {
    #[must_use]
    pub fn source(&self) -> VerdictSource {
        match self {
            Decision::AllowAllRule => VerdictSource::AllowAllRule,
            Decision::FilePath => VerdictSource::FilePath,
            Decision::Hash => VerdictSource::Hash,
            Decision::CatalogSigned { .. } => VerdictSource::CatalogSigned,
            Decision::Signer(_) => VerdictSource::Signer,
            Decision::Unsigned => VerdictSource::Unsigned,
        }
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        match self {
            Decision::AllowAllRule
            | Decision::FilePath
            | Decision::Hash
            | Decision::CatalogSigned { .. } => true,
            Decision::Signer(SignerDecision::Allowed { .. }) => true,
            Decision::Signer(SignerDecision::Denied(_)) | Decision::Unsigned => false,
        }
    }

    /// Human readable reason, matching the wording of App Control reports.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Decision::AllowAllRule => "Has AllowAll rule".to_string(),
            Decision::FilePath => "Allowed By File Path".to_string(),
            Decision::Hash => "Hash Level".to_string(),
            Decision::CatalogSigned { .. } => "Catalog Hash".to_string(),
            Decision::Unsigned => "Not Allowed".to_string(),
            Decision::Signer(SignerDecision::Allowed { level, .. }) => level.clone(),
            Decision::Signer(SignerDecision::Denied(reason)) => match reason {
                DenialReason::NotAllowed => "Not Allowed".to_string(),
                DenialReason::HashMismatch => "Hash Mismatch".to_string(),
                DenialReason::Inaccessible => "Not processed, Inaccessible file".to_string(),
                DenialReason::Unexpected(message) => format!("UnknownError: {message}"),
            },
        }
    }

    /// Certificate metadata, for the variants that carry it.
    #[must_use]
    pub fn certificate(&self) -> Option<&CertificateSummary> {
        match self {
            Decision::CatalogSigned { certificate, .. } => Some(certificate),
            Decision::Signer(SignerDecision::Allowed { certificate, .. }) => Some(certificate),
            _ => None,
        }
    }
}

/// One file's verdict. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    file_name: String,
    file_path: PathBuf,
    decision: Decision,
}

impl Verdict {
    #[must_use]
    pub fn new(file_path: &Path, decision: Decision) -> Self {
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());
        Self {
            file_name,
            file_path: file_path.to_path_buf(),
            decision,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    #[must_use]
    pub fn source(&self) -> VerdictSource {
        self.decision.source()
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.decision.is_authorized()
    }

    #[must_use]
    pub fn reason(&self) -> String {
        self.decision.reason()
    }
}
