//! Certificates as the simulator sees them: display names, validity, EKUs
//! and the TBS hash that policy signer rules pin.

use crate::domain::asn1;
use crate::domain::constants::{
    OID_COMMON_NAME, OID_EXTENDED_KEY_USAGE, OID_ORGANIZATION, OID_ORGANIZATIONAL_UNIT,
    OID_SUBJECT_KEY_IDENTIFIER,
};
use crate::domain::verdict::CertificateSummary;
use crate::infra::error::{SimulationError, SimulationResult};
use crate::HashAlgorithm;
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Decode, Encode};
use std::fmt;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::name::Name;
use x509_cert::time::Time;
use x509_cert::Certificate;

/// Digest applied to the TBS portion, chosen from the certificate's own
/// signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TbsDigest {
    Md5,
    Hash(HashAlgorithm),
}

fn tbs_digest_for(signature_algorithm: &str) -> Option<TbsDigest> {
    let digest = match signature_algorithm {
        "1.2.840.113549.1.1.4" => TbsDigest::Md5,
        "1.2.840.113549.1.1.5" | "1.3.14.3.2.29" | "1.2.840.10040.4.3" | "1.2.840.10045.4.1" => {
            TbsDigest::Hash(HashAlgorithm::Sha1)
        }
        "1.2.840.113549.1.1.11" | "2.16.840.1.101.3.4.3.2" | "1.2.840.10045.4.3.2" => {
            TbsDigest::Hash(HashAlgorithm::Sha256)
        }
        "1.2.840.113549.1.1.12" | "2.16.840.1.101.3.4.3.3" | "1.2.840.10045.4.3.3" => {
            TbsDigest::Hash(HashAlgorithm::Sha384)
        }
        "1.2.840.113549.1.1.13" | "2.16.840.1.101.3.4.3.4" | "1.2.840.10045.4.3.4" => {
            TbsDigest::Hash(HashAlgorithm::Sha512)
        }
        "2.16.840.1.101.3.4.3.14" => TbsDigest::Hash(HashAlgorithm::Sha3_256),
        "2.16.840.1.101.3.4.3.15" => TbsDigest::Hash(HashAlgorithm::Sha3_384),
        "2.16.840.1.101.3.4.3.16" => TbsDigest::Hash(HashAlgorithm::Sha3_512),
        _ => return None,
    };
    Some(digest)
}

/// Uppercase hex digest of the raw `TBSCertificate` bytes inside `der`.
pub fn tbs_hash(der: &[u8], signature_algorithm: &ObjectIdentifier) -> SimulationResult<String> {
    let oid = signature_algorithm.to_string();
    let digest = tbs_digest_for(&oid).ok_or_else(|| {
        SimulationError::CertificateError(format!(
            "Unsupported certificate signature algorithm: {oid}"
        ))
    })?;

    let outer = asn1::parse(asn1::trim_top_level(der)?)?;
    let tbs = asn1::children(&outer)?
        .into_iter()
        .next()
        .ok_or_else(|| SimulationError::CertificateError("Certificate has no TBS".to_string()))?
        .to_der()?;

    let bytes = match digest {
        TbsDigest::Md5 => md5::compute(&tbs).0.to_vec(),
        TbsDigest::Hash(alg) => alg.digest(&tbs),
    };
    Ok(hex::encode_upper(bytes))
}

/// First value of attribute `oid` in `name`.
#[must_use]
pub fn name_attribute(name: &Name, oid: ObjectIdentifier) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| asn1::directory_string(&atv.value))
}

/// Simple display name: CN, else OU, else O, else the full DN.
#[must_use]
pub fn simple_display_name(name: &Name) -> String {
    [OID_COMMON_NAME, OID_ORGANIZATIONAL_UNIT, OID_ORGANIZATION]
        .into_iter()
        .find_map(|oid| name_attribute(name, oid))
        .unwrap_or_else(|| name.to_string())
}

fn to_utc(time: &Time) -> SimulationResult<DateTime<Utc>> {
    let secs = time.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| SimulationError::CertificateError(format!("Time out of range: {time:?}")))
}

/// One certificate of a signer's chain.
#[derive(Clone, PartialEq, Eq)]
pub struct ChainCertificate {
    der: Box<[u8]>,
    subject_cn: String,
    issuer_cn: String,
    subject: String,
    subject_name_der: Vec<u8>,
    issuer_name_der: Vec<u8>,
    serial: Vec<u8>,
    subject_key_id: Option<Vec<u8>>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    tbs_hash: String,
    ekus: Vec<String>,
}

impl ChainCertificate {
    /// Decode a DER certificate.
    pub fn from_der(der: &[u8]) -> SimulationResult<Self> {
        let der = asn1::trim_top_level(der)?;
        let certificate = Certificate::from_der(der).map_err(|e| {
            SimulationError::CertificateError(format!("Failed to parse certificate: {e}"))
        })?;
        Self::from_certificate(&certificate)
    }

    pub fn from_certificate(certificate: &Certificate) -> SimulationResult<Self> {
        let der = certificate.to_der()?;
        let tbs = &certificate.tbs_certificate;

        let mut ekus = Vec::new();
        let mut subject_key_id = None;
        for extension in tbs.extensions.iter().flatten() {
            if extension.extn_id == OID_EXTENDED_KEY_USAGE {
                let usage = ExtendedKeyUsage::from_der(extension.extn_value.as_bytes())?;
                ekus.extend(usage.0.iter().map(ToString::to_string));
            } else if extension.extn_id == OID_SUBJECT_KEY_IDENTIFIER {
                let key_id = OctetString::from_der(extension.extn_value.as_bytes())?;
                subject_key_id = Some(key_id.as_bytes().to_vec());
            }
        }

        Ok(Self {
            tbs_hash: tbs_hash(&der, &certificate.signature_algorithm.oid)?,
            subject_cn: simple_display_name(&tbs.subject),
            issuer_cn: simple_display_name(&tbs.issuer),
            subject: tbs.subject.to_string(),
            subject_name_der: tbs.subject.to_der()?,
            issuer_name_der: tbs.issuer.to_der()?,
            serial: tbs.serial_number.as_bytes().to_vec(),
            subject_key_id,
            not_before: to_utc(&tbs.validity.not_before)?,
            not_after: to_utc(&tbs.validity.not_after)?,
            ekus,
            der: der.into_boxed_slice(),
        })
    }

    /// Certificate known only by the fields policy matching looks at.
    #[must_use]
    pub fn from_parts(
        subject_cn: &str,
        issuer_cn: &str,
        tbs_hash: &str,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            der: Box::default(),
            subject_cn: subject_cn.to_string(),
            issuer_cn: issuer_cn.to_string(),
            subject: format!("CN={subject_cn}"),
            subject_name_der: subject_cn.as_bytes().to_vec(),
            issuer_name_der: issuer_cn.as_bytes().to_vec(),
            serial: Vec::new(),
            subject_key_id: None,
            not_before: DateTime::<Utc>::MIN_UTC,
            not_after,
            tbs_hash: tbs_hash.to_ascii_uppercase(),
            ekus: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_ekus(mut self, ekus: Vec<String>) -> Self {
        self.ekus = ekus;
        self
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub fn subject_cn(&self) -> &str {
        &self.subject_cn
    }

    #[must_use]
    pub fn issuer_cn(&self) -> &str {
        &self.issuer_cn
    }

    /// Full subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    #[must_use]
    pub fn tbs_hash(&self) -> &str {
        &self.tbs_hash
    }

    #[must_use]
    pub fn ekus(&self) -> &[String] {
        &self.ekus
    }

    #[must_use]
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }

    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.subject_name_der == self.issuer_name_der
    }

    /// Whether `issuer` is named as this certificate's issuer.
    #[must_use]
    pub fn is_issued_by(&self, issuer: &ChainCertificate) -> bool {
        self.issuer_name_der == issuer.subject_name_der
    }

    #[must_use]
    pub fn matches_issuer_serial(&self, issuer_name_der: &[u8], serial: &[u8]) -> bool {
        self.issuer_name_der == issuer_name_der && self.serial == serial
    }

    #[must_use]
    pub fn matches_key_id(&self, key_id: &[u8]) -> bool {
        self.subject_key_id.as_deref() == Some(key_id)
    }

    #[must_use]
    pub fn summary(&self) -> CertificateSummary {
        CertificateSummary {
            subject_cn: self.subject_cn.clone(),
            issuer_cn: self.issuer_cn.clone(),
            not_after: self.not_after,
            tbs_hash: self.tbs_hash.clone(),
        }
    }
}

impl fmt::Debug for ChainCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChainCertificate(subject={:?}, issuer={:?}, tbs={})",
            self.subject_cn, self.issuer_cn, self.tbs_hash
        )
    }
}

/// Certificate chain ordered leaf first, root last.
///
/// A single element is a root on its own. With two or more the first is the
/// leaf, the last is the root and anything in between is an intermediate.
#[derive(Clone, Default)]
pub struct CertificateChain {
    elements: Vec<ChainCertificate>,
}

/// Longest chain followed when linking issuers.
const MAX_CHAIN_DEPTH: usize = 16;

impl CertificateChain {
    #[must_use]
    pub fn new(elements: Vec<ChainCertificate>) -> Self {
        Self { elements }
    }

    /// Link `leaf` to its issuers found in `pool`, stopping at a self-issued
    /// certificate or when no issuer is available.
    #[must_use]
    pub fn build(leaf: &ChainCertificate, pool: &[ChainCertificate]) -> Self {
        let mut elements = vec![leaf.clone()];
        while elements.len() < MAX_CHAIN_DEPTH {
            let Some(current) = elements.last() else {
                break;
            };
            if current.is_self_issued() {
                break;
            }
            let issuer = pool.iter().find(|candidate| {
                current.is_issued_by(candidate)
                    && !elements.iter().any(|seen| seen.tbs_hash == candidate.tbs_hash)
            });
            match issuer {
                Some(issuer) => elements.push(issuer.clone()),
                None => break,
            }
        }
        Self { elements }
    }

    #[must_use]
    pub fn elements(&self) -> &[ChainCertificate] {
        &self.elements
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&ChainCertificate> {
        if self.elements.len() >= 2 {
            self.elements.first()
        } else {
            None
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&ChainCertificate> {
        self.elements.last()
    }

    #[must_use]
    pub fn intermediates(&self) -> &[ChainCertificate] {
        if self.elements.len() > 2 {
            &self.elements[1..self.elements.len() - 1]
        } else {
            &[]
        }
    }
}

impl fmt::Debug for CertificateChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateChain(len={})", self.elements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(subject: &str, issuer: &str) -> ChainCertificate {
        ChainCertificate::from_parts(subject, issuer, subject, Utc::now())
    }

    #[test]
    fn chain_roles_by_length() {
        let root = cert("Root", "Root");
        let single = CertificateChain::new(vec![root.clone()]);
        assert!(single.leaf().is_none());
        assert_eq!(single.root().unwrap().subject_cn(), "Root");
        assert!(single.intermediates().is_empty());

        let chain = CertificateChain::new(vec![cert("Leaf", "PCA"), cert("PCA", "Root"), root]);
        assert_eq!(chain.leaf().unwrap().subject_cn(), "Leaf");
        assert_eq!(chain.intermediates().len(), 1);
        assert_eq!(chain.root().unwrap().subject_cn(), "Root");
    }

    #[test]
    fn build_links_issuers() {
        let pool = vec![cert("Root", "Root"), cert("PCA", "Root"), cert("Other", "Other")];
        let chain = CertificateChain::build(&cert("Leaf", "PCA"), &pool);
        let names: Vec<_> = chain.elements().iter().map(|c| c.subject_cn()).collect();
        assert_eq!(names, vec!["Leaf", "PCA", "Root"]);

        let orphan = CertificateChain::build(&cert("Leaf", "Missing"), &pool);
        assert_eq!(orphan.len(), 1);
    }

    #[test]
    fn tbs_digest_selection() {
        assert_eq!(
            tbs_digest_for("1.2.840.113549.1.1.11"),
            Some(TbsDigest::Hash(HashAlgorithm::Sha256))
        );
        assert_eq!(tbs_digest_for("1.2.840.113549.1.1.4"), Some(TbsDigest::Md5));
        assert_eq!(tbs_digest_for("1.2.840.113549.1.1.2"), None);
    }
}
