//! Signer rule arbitration.
//!
//! Compares the certificate chains of a file's signers against the policy's
//! allow signer rules. Rules are tried in policy order and the first rule
//! that matches any element of any chain authorizes the file.
//!
//! A rule that lists file attributes only authorizes at the levels that
//! consult them (`FilePublisher`, `SignedVersion`, `WHQLFilePublisher`).

use crate::domain::candidate::CandidateFile;
use crate::domain::constants::WHQL_EKU;
use crate::domain::crypto::{CertificateChain, ChainCertificate};
use crate::domain::pe::FileVersionInfo;
use crate::domain::policy::{FileAttribute, PolicyModel, SignerRule};
use crate::domain::verdict::{DenialReason, SignerDecision};
use crate::services::signer_extractor::SignerRecord;
use std::fmt;

/// Rule level a signer matched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerLevel {
    Whql,
    WhqlPublisher,
    WhqlFilePublisher,
    FilePublisher,
    SignedVersion,
    Publisher,
    /// An intermediate pinned without a publisher constraint.
    PcaCertificate,
    LeafCertificate,
}

impl SignerLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerLevel::Whql => "WHQL",
            SignerLevel::WhqlPublisher => "WHQLPublisher",
            SignerLevel::WhqlFilePublisher => "WHQLFilePublisher",
            SignerLevel::FilePublisher => "FilePublisher",
            SignerLevel::SignedVersion => "SignedVersion",
            SignerLevel::Publisher => "Publisher",
            SignerLevel::PcaCertificate => "PcaCertificate/RootCertificate",
            SignerLevel::LeafCertificate => "LeafCertificate",
        }
    }
}

impl fmt::Display for SignerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule matched against one certificate of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerMatch<'c> {
    pub level: SignerLevel,
    /// The file attribute that decided a file-level match, e.g.
    /// `OriginalFileName`, or `Version` for `SignedVersion`.
    pub criteria: Option<String>,
    pub certificate: &'c ChainCertificate,
}

impl<'c> SignerMatch<'c> {
    fn new(level: SignerLevel, certificate: &'c ChainCertificate) -> Self {
        Self {
            level,
            criteria: None,
            certificate,
        }
    }

    fn with_criteria(mut self, criteria: Option<String>) -> Self {
        self.criteria = criteria;
        self
    }
}

/// Matches signer records against a policy's signer rules.
#[derive(Debug, Clone, Copy)]
pub struct Arbitrator<'p> {
    policy: &'p PolicyModel,
}

impl<'p> Arbitrator<'p> {
    #[must_use]
    pub fn new(policy: &'p PolicyModel) -> Self {
        Self { policy }
    }

    /// Decide whether any signer in `records` satisfies an allow rule.
    ///
    /// `ekus` are the primary signer's EKUs. File attributes are read from
    /// `candidate`'s version resource.
    #[must_use]
    pub fn arbitrate(
        &self,
        records: &[SignerRecord],
        ekus: &[String],
        candidate: &CandidateFile,
    ) -> SignerDecision {
        let info = candidate.version_info();
        for rule in self.policy.signers() {
            if let Some(found) = match_rule(rule, records, ekus, info) {
                log::debug!(
                    "{} matched rule {} at {}",
                    candidate.path().display(),
                    rule.id,
                    found.level
                );
                return SignerDecision::Allowed {
                    level: found.level.to_string(),
                    match_criteria: found.criteria,
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    certificate: found.certificate.summary(),
                };
            }
        }
        SignerDecision::Denied(DenialReason::NotAllowed)
    }
}

fn match_rule<'r>(
    rule: &SignerRule,
    records: &'r [SignerRecord],
    ekus: &[String],
    info: &FileVersionInfo,
) -> Option<SignerMatch<'r>> {
    if !rule.allowed {
        return None;
    }
    if !rule.cert_ekus.is_empty() {
        if !eku_allowed(rule, ekus) {
            return None;
        }
        if rule.whql {
            return match_whql(rule, records, info);
        }
    }
    records
        .iter()
        .find_map(|record| match_chain(rule, record.chain(), info))
}

fn eku_allowed(rule: &SignerRule, ekus: &[String]) -> bool {
    rule.cert_ekus.is_empty()
        || rule
            .cert_ekus
            .iter()
            .any(|wanted| ekus.iter().any(|eku| eku == wanted))
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn pins(rule: &SignerRule, cert: &ChainCertificate) -> bool {
    same(cert.tbs_hash(), &rule.cert_root) && same(cert.subject_cn(), &rule.name)
}

fn eligible_attributes<'r>(rule: &'r SignerRule, info: &FileVersionInfo) -> Vec<&'r FileAttribute> {
    rule.file_attributes
        .iter()
        .filter(|attribute| {
            if attribute.minimum_version.is_none() {
                log::debug!("File attribute {} has no minimum version", attribute.id);
            }
            attribute.version_satisfied(info)
        })
        .collect()
}

fn named_attribute<'r>(
    eligible: &[&'r FileAttribute],
    info: &FileVersionInfo,
) -> Option<&'r FileAttribute> {
    eligible
        .iter()
        .copied()
        .find(|attribute| attribute.names_match(info))
}

/// WHQL rules pin an intermediate of a chain whose leaf carries the WHQL EKU.
/// The OEM program name, when the rule has one, must appear in the opus info
/// of one of those signatures.
fn match_whql<'r>(
    rule: &SignerRule,
    records: &'r [SignerRecord],
    info: &FileVersionInfo,
) -> Option<SignerMatch<'r>> {
    let whql_records: Vec<&SignerRecord> = records
        .iter()
        .filter(|record| {
            record
                .chain()
                .leaf()
                .is_some_and(|leaf| leaf.ekus().iter().any(|eku| eku.contains(WHQL_EKU)))
        })
        .collect();
    let oem_matches = rule.cert_oem_id.as_deref().is_some_and(|oem_id| {
        whql_records
            .iter()
            .any(|record| record.message().program_names().contains(&oem_id))
    });

    for record in whql_records.iter().copied() {
        for intermediate in record.chain().intermediates() {
            if !pins(rule, intermediate) {
                continue;
            }
            if oem_matches && !rule.file_attributes.is_empty() {
                let eligible = eligible_attributes(rule, info);
                if let Some(attribute) = named_attribute(&eligible, info) {
                    return Some(
                        SignerMatch::new(SignerLevel::WhqlFilePublisher, intermediate)
                            .with_criteria(attribute.specific_file_name_level.clone()),
                    );
                }
            } else if oem_matches {
                return Some(SignerMatch::new(SignerLevel::WhqlPublisher, intermediate));
            } else if rule.file_attributes.is_empty() {
                return Some(SignerMatch::new(SignerLevel::Whql, intermediate));
            }
        }
    }
    None
}

fn match_chain<'c>(
    rule: &SignerRule,
    chain: &'c CertificateChain,
    info: &FileVersionInfo,
) -> Option<SignerMatch<'c>> {
    let leaf = chain.leaf();
    let has_attributes = !rule.file_attributes.is_empty();

    for intermediate in chain.intermediates() {
        if !pins(rule, intermediate) {
            continue;
        }
        let publisher_matches = rule
            .cert_publisher
            .as_deref()
            .zip(leaf)
            .is_some_and(|(publisher, leaf)| same(publisher, leaf.subject_cn()));

        if publisher_matches && has_attributes {
            let eligible = eligible_attributes(rule, info);
            if eligible.iter().any(|attribute| attribute.is_wildcard()) {
                return Some(
                    SignerMatch::new(SignerLevel::SignedVersion, intermediate)
                        .with_criteria(Some("Version".to_string())),
                );
            }
            if let Some(attribute) = named_attribute(&eligible, info) {
                return Some(
                    SignerMatch::new(SignerLevel::FilePublisher, intermediate)
                        .with_criteria(attribute.specific_file_name_level.clone()),
                );
            }
        } else if publisher_matches {
            return Some(SignerMatch::new(SignerLevel::Publisher, intermediate));
        } else if !has_attributes {
            return Some(SignerMatch::new(SignerLevel::PcaCertificate, intermediate));
        }
    }

    if let Some(leaf) = leaf {
        if pins(rule, leaf) && !has_attributes {
            return Some(SignerMatch::new(SignerLevel::LeafCertificate, leaf));
        }
    }

    let root = chain.root()?;
    let named = same(root.subject_cn(), &rule.name)
        || rule
            .cert_publisher
            .as_deref()
            .is_some_and(|publisher| same(root.subject_cn(), publisher));
    if !same(root.tbs_hash(), &rule.cert_root) || !named {
        return None;
    }
    if !has_attributes {
        return Some(SignerMatch::new(SignerLevel::Publisher, root));
    }
    let eligible = eligible_attributes(rule, info);
    // The root only grants SignedVersion through a single eligible attribute.
    if let [only] = eligible.as_slice() {
        if only.is_wildcard() {
            return Some(
                SignerMatch::new(SignerLevel::SignedVersion, root)
                    .with_criteria(Some("Version".to_string())),
            );
        }
    }
    named_attribute(&eligible, info).map(|attribute| {
        SignerMatch::new(SignerLevel::FilePublisher, root)
            .with_criteria(attribute.specific_file_name_level.clone())
    })
}
