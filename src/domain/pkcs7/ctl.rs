//! Certificate trust list (catalog) content.
//!
//! ```text
//! CertificateTrustList ::= SEQUENCE {
//!     version            INTEGER OPTIONAL,
//!     subjectUsage       SEQUENCE OF OBJECT IDENTIFIER,
//!     listIdentifier     OCTET STRING OPTIONAL,
//!     sequenceNumber     INTEGER OPTIONAL,
//!     ctlThisUpdate      Time,
//!     ctlNextUpdate      Time OPTIONAL,
//!     subjectAlgorithm   AlgorithmIdentifier,
//!     trustedSubjects    SEQUENCE OF TrustedSubject OPTIONAL,
//!     ctlExtensions      [0] EXPLICIT Extensions OPTIONAL }
//!
//! TrustedSubject ::= SEQUENCE {
//!     subjectIdentifier  OCTET STRING,
//!     subjectAttributes  SET OF Attribute OPTIONAL }
//! ```

use super::indirect_data_digest;
use crate::domain::asn1;
use crate::domain::constants::OID_SPC_INDIRECT_DATA;
use crate::infra::error::SimulationResult;
use der::{Any, Encode, Tag, Tagged};

/// One catalog member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMember {
    /// Subject identifier as text: the UTF-16 tag when it decodes to one,
    /// otherwise uppercase hex of the raw identifier bytes.
    pub reference_tag: String,
    /// Uppercase hex digests from the member's indirect data attributes.
    pub digests: Vec<String>,
}

impl CatalogMember {
    /// Every hash this member vouches for, uppercase, without duplicates.
    #[must_use]
    pub fn hashes(&self) -> Vec<String> {
        let mut hashes = Vec::with_capacity(self.digests.len() + 1);
        if is_hex_digest(&self.reference_tag) {
            hashes.push(self.reference_tag.to_ascii_uppercase());
        }
        for digest in &self.digests {
            if !hashes.contains(digest) {
                hashes.push(digest.clone());
            }
        }
        hashes
    }
}

fn is_hex_digest(tag: &str) -> bool {
    matches!(tag.len(), 40 | 64 | 96 | 128) && tag.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse the members of a DER `CertificateTrustList`.
pub fn parse_trust_list(content: &[u8]) -> SimulationResult<Vec<CatalogMember>> {
    let list = asn1::parse(content)?;
    let Some(subjects) = asn1::children(&list)?
        .into_iter()
        .find(|item| is_trusted_subjects(item))
    else {
        return Ok(Vec::new());
    };

    asn1::children(&subjects)?
        .iter()
        .map(parse_member)
        .collect()
}

/// `trustedSubjects` is the only SEQUENCE whose elements are SEQUENCEs
/// starting with an OCTET STRING.
fn is_trusted_subjects(item: &Any) -> bool {
    if item.tag() != Tag::Sequence {
        return false;
    }
    let Ok(entries) = asn1::children(item) else {
        return false;
    };
    entries.first().is_some_and(|entry| {
        entry.tag() == Tag::Sequence
            && asn1::children(entry)
                .ok()
                .and_then(|fields| fields.first().map(|first| first.tag() == Tag::OctetString))
                .unwrap_or(false)
    })
}

fn parse_member(subject: &Any) -> SimulationResult<CatalogMember> {
    let fields = asn1::children(subject)?;
    let identifier = match fields.first() {
        Some(first) => asn1::octets(first)?.to_vec(),
        None => Vec::new(),
    };
    let reference_tag = asn1::utf16le_string(&identifier)
        .filter(|tag| !tag.is_empty() && tag.chars().all(|c| c.is_ascii_graphic()))
        .unwrap_or_else(|| hex::encode_upper(&identifier));

    let mut digests = Vec::new();
    if let Some(attributes) = fields.get(1) {
        for attribute in asn1::children(attributes)? {
            let parts = asn1::children(&attribute)?;
            let (Some(kind), Some(values)) = (parts.first(), parts.get(1)) else {
                continue;
            };
            if asn1::oid(kind)? != OID_SPC_INDIRECT_DATA {
                continue;
            }
            for value in asn1::children(values)? {
                let (_, digest) = indirect_data_digest(&value.to_der()?)?;
                digests.push(hex::encode_upper(digest));
            }
        }
    }

    Ok(CatalogMember {
        reference_tag,
        digests,
    })
}
