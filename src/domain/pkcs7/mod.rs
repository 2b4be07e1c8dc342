//! PKCS#7 `SignedData` as produced by Authenticode and catalog signing.
//!
//! Decoding keeps the pieces the simulator reads back: embedded certificates,
//! the primary signer's certificate, nested signatures carried in the primary
//! signer's unsigned attributes, timestamp countersignatures and the
//! encapsulated content (indirect data digest or certificate trust list).

pub mod ctl;

use crate::domain::asn1;
use crate::domain::constants::{
    OID_COUNTER_SIGNATURE, OID_RFC3161_COUNTER_SIGNATURE, OID_SIGNED_DATA,
    OID_SPC_INDIRECT_DATA, OID_SPC_NESTED_SIGNATURE, OID_SPC_SP_OPUS_INFO,
};
use crate::domain::crypto::{CertificateChain, ChainCertificate};
use crate::infra::error::{SimulationError, SimulationResult};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::{Any, Decode, Encode};
use std::fmt;

/// Per-`SignerInfo` facts kept after decoding.
#[derive(Debug, Clone)]
struct SignerSummary {
    certificate: Option<usize>,
    digest_algorithm: ObjectIdentifier,
    timestamped: bool,
    program_name: Option<String>,
}

/// A decoded signed message.
pub struct SignedMessage {
    der: Vec<u8>,
    content_type: ObjectIdentifier,
    content: Option<Vec<u8>>,
    certificates: Vec<ChainCertificate>,
    signers: Vec<SignerSummary>,
    nested: Vec<Vec<u8>>,
}

impl SignedMessage {
    /// Decode a DER `ContentInfo` wrapping `SignedData`. Trailing padding is
    /// ignored.
    pub fn decode(der: &[u8]) -> SimulationResult<Self> {
        let der = asn1::trim_top_level(der)?;
        let content_info = ContentInfo::from_der(der)
            .map_err(|e| SimulationError::Pkcs7Error(format!("Invalid ContentInfo: {e}")))?;
        if content_info.content_type != OID_SIGNED_DATA {
            return Err(SimulationError::Pkcs7Error(format!(
                "Expected SignedData, found content type {}",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der()?)
            .map_err(|e| SimulationError::Pkcs7Error(format!("Invalid SignedData: {e}")))?;

        let certificates = embedded_certificates(&signed_data);
        let mut signers = Vec::new();
        let mut nested = Vec::new();
        for (index, signer_info) in signed_data.signer_infos.0.iter().enumerate() {
            signers.push(summarize_signer(signer_info, &certificates)?);
            if index == 0 {
                nested = nested_signatures(signer_info)?;
            }
        }

        let content = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(Encode::to_der)
            .transpose()?;

        Ok(Self {
            der: der.to_vec(),
            content_type: signed_data.encap_content_info.econtent_type,
            content,
            certificates,
            signers,
            nested,
        })
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// Type of the encapsulated content.
    #[must_use]
    pub fn content_type(&self) -> ObjectIdentifier {
        self.content_type
    }

    /// DER of the encapsulated content, if present.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// All certificates embedded in the message.
    #[must_use]
    pub fn certificates(&self) -> &[ChainCertificate] {
        &self.certificates
    }

    #[must_use]
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Certificate of the primary signer.
    #[must_use]
    pub fn signer_certificate(&self) -> Option<&ChainCertificate> {
        let index = self.signers.first()?.certificate?;
        self.certificates.get(index)
    }

    /// Digest algorithm of the primary signer.
    #[must_use]
    pub fn digest_algorithm(&self) -> Option<ObjectIdentifier> {
        self.signers.first().map(|signer| signer.digest_algorithm)
    }

    /// Whether the primary signer carries a timestamp countersignature.
    #[must_use]
    pub fn is_timestamped(&self) -> bool {
        self.signers.first().is_some_and(|signer| signer.timestamped)
    }

    /// Opus program names (CertOemID) of every signer, in signer order.
    #[must_use]
    pub fn program_names(&self) -> Vec<&str> {
        self.signers
            .iter()
            .filter_map(|signer| signer.program_name.as_deref())
            .collect()
    }

    /// DER `ContentInfo` blobs of nested signatures, in attribute order.
    #[must_use]
    pub fn nested_signatures(&self) -> &[Vec<u8>] {
        &self.nested
    }

    /// Chain from the primary signer's certificate through the embedded
    /// certificates. Empty when the signer certificate is not embedded.
    #[must_use]
    pub fn signer_chain(&self) -> CertificateChain {
        match self.signer_certificate() {
            Some(leaf) => CertificateChain::build(leaf, &self.certificates),
            None => CertificateChain::default(),
        }
    }

    /// `(digest algorithm, digest)` from `SpcIndirectDataContent`, or `None`
    /// when the message does not sign indirect data.
    pub fn indirect_digest(&self) -> SimulationResult<Option<(ObjectIdentifier, Vec<u8>)>> {
        if self.content_type != OID_SPC_INDIRECT_DATA {
            return Ok(None);
        }
        let Some(content) = self.content.as_deref() else {
            return Ok(None);
        };
        indirect_data_digest(content).map(Some)
    }
}

impl fmt::Debug for SignedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignedMessage(len={}, content_type={}, signers={}, certificates={}, nested={})",
            self.der.len(),
            self.content_type,
            self.signers.len(),
            self.certificates.len(),
            self.nested.len()
        )
    }
}

/// `SpcIndirectDataContent ::= SEQUENCE { data SpcAttributeTypeAndOptionalValue, messageDigest DigestInfo }`
pub fn indirect_data_digest(content: &[u8]) -> SimulationResult<(ObjectIdentifier, Vec<u8>)> {
    let indirect = asn1::parse(content)?;
    let items = asn1::children(&indirect)?;
    let digest = items.get(1).ok_or_else(|| {
        SimulationError::Pkcs7Error("SpcIndirectDataContent lacks messageDigest".to_string())
    })?;
    asn1::digest_info(digest)
}

fn embedded_certificates(signed_data: &SignedData) -> Vec<ChainCertificate> {
    let Some(set) = signed_data.certificates.as_ref() else {
        return Vec::new();
    };
    set.0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(certificate) => {
                match ChainCertificate::from_certificate(certificate) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        log::debug!("Skipping embedded certificate: {e}");
                        None
                    }
                }
            }
            _ => None,
        })
        .collect()
}

fn summarize_signer(
    signer_info: &SignerInfo,
    certificates: &[ChainCertificate],
) -> SimulationResult<SignerSummary> {
    let certificate = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => {
            let issuer = id.issuer.to_der()?;
            let serial = id.serial_number.as_bytes();
            certificates
                .iter()
                .position(|cert| cert.matches_issuer_serial(&issuer, serial))
        }
        SignerIdentifier::SubjectKeyIdentifier(key_id) => certificates
            .iter()
            .position(|cert| cert.matches_key_id(key_id.0.as_bytes())),
    };

    let timestamped = signer_info.unsigned_attrs.iter().flat_map(|attrs| attrs.iter()).any(
        |attr| attr.oid == OID_COUNTER_SIGNATURE || attr.oid == OID_RFC3161_COUNTER_SIGNATURE,
    );

    let program_name = signer_info
        .signed_attrs
        .iter()
        .flat_map(|attrs| attrs.iter())
        .filter(|attr| attr.oid == OID_SPC_SP_OPUS_INFO)
        .find_map(|attr| attr.values.iter().next().and_then(opus_program_name));

    Ok(SignerSummary {
        certificate,
        digest_algorithm: signer_info.digest_alg.oid,
        timestamped,
        program_name,
    })
}

/// ```text
/// SpcSpOpusInfo ::= SEQUENCE {
///     programName  [0] EXPLICIT SpcString OPTIONAL,
///     moreInfo     [1] EXPLICIT SpcLink OPTIONAL }
///
/// SpcString ::= CHOICE {
///     unicode  [0] IMPLICIT BMPString,
///     ascii    [1] IMPLICIT IA5String }
/// ```
fn opus_program_name(value: &Any) -> Option<String> {
    let fields = asn1::children(value).ok()?;
    let program = fields
        .iter()
        .find(|field| asn1::context_number(field) == Some(0))?;
    let text = asn1::children(program).ok()?.into_iter().next()?;
    let name = match asn1::context_number(&text)? {
        0 => asn1::utf16be_string(text.value())?,
        1 => text.value().iter().map(|&b| b as char).collect(),
        _ => return None,
    };
    let name = name.trim_end_matches('\0').to_string();
    (!name.is_empty()).then_some(name)
}


fn nested_signatures(signer_info: &SignerInfo) -> SimulationResult<Vec<Vec<u8>>> {
    let mut nested = Vec::new();
    for attr in signer_info.unsigned_attrs.iter().flat_map(|attrs| attrs.iter()) {
        if attr.oid == OID_SPC_NESTED_SIGNATURE {
            for value in attr.values.iter() {
                nested.push(value.to_der()?);
            }
        }
    }
    Ok(nested)
}
