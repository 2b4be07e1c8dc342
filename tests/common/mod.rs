//! Shared fixtures for integration tests: synthetic PE images, a small
//! certificate hierarchy, Authenticode and catalog `SignedData` builders, and
//! call-counting test doubles.

#![allow(dead_code)]

use appcontrol_simulator::adapters::{CtlCatalogReader, PortableTrustVerifier};
use appcontrol_simulator::domain::crypto::ChainCertificate;
use appcontrol_simulator::domain::pe::resolve_hash_ranges;
use appcontrol_simulator::services::{
    CatalogLog, CatalogReader, TrustState, TrustVerifier,
};
use appcontrol_simulator::{HashAlgorithm, SimulationResult};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, OctetString, SetOfVec, UtcTime};
use der::{Any, Decode, Encode};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const OID_SPC_INDIRECT_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.4");
pub const OID_SPC_PE_IMAGE_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.15");
pub const OID_SPC_NESTED_SIGNATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.4.1");
pub const OID_CTL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.10.1");
pub const OID_CATALOG_LIST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.12.1.1");
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub const OID_SPC_SP_OPUS_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.12");
pub const CODE_SIGNING_EKU: &str = "1.3.6.1.5.5.7.3.3";
pub const WHQL_EKU: &str = "1.3.6.1.4.1.311.10.3.5";

/// 2020-01-01T00:00:00Z
const NOT_BEFORE: u64 = 1_577_836_800;
/// 2040-01-01T00:00:00Z
const NOT_AFTER: u64 = 2_208_988_800;
/// 2021-01-01T00:00:00Z
const EXPIRED_NOT_AFTER: u64 = 1_609_459_200;

// ---------------------------------------------------------------------------
// PE images
// ---------------------------------------------------------------------------

pub const PE_OFFSET: usize = 0x80;
pub const OPTIONAL_HEADER: usize = PE_OFFSET + 24;
pub const CHECKSUM_FIELD: usize = OPTIONAL_HEADER + 64;
pub const CERT_DIRECTORY: usize = OPTIONAL_HEADER + 128;
pub const HEADERS_LEN: usize = 0x200;

/// A PE32 image with headers only followed by `body_len` bytes of a pattern
/// derived from `seed`. The total length is a multiple of eight.
pub fn build_pe(body_len: usize, seed: u8) -> Vec<u8> {
    let body_len = (body_len + 7) & !7;
    let mut pe = vec![0u8; HEADERS_LEN + body_len];
    pe[0..2].copy_from_slice(b"MZ");
    pe[0x3c..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());
    pe[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
    pe[PE_OFFSET + 4..PE_OFFSET + 6].copy_from_slice(&0x14cu16.to_le_bytes());
    pe[PE_OFFSET + 20..PE_OFFSET + 22].copy_from_slice(&0xe0u16.to_le_bytes());
    pe[OPTIONAL_HEADER..OPTIONAL_HEADER + 2].copy_from_slice(&0x10bu16.to_le_bytes());
    pe[OPTIONAL_HEADER + 60..OPTIONAL_HEADER + 64]
        .copy_from_slice(&(HEADERS_LEN as u32).to_le_bytes());
    pe[CHECKSUM_FIELD..CHECKSUM_FIELD + 4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    for (i, byte) in pe[HEADERS_LEN..].iter_mut().enumerate() {
        *byte = ((i * 7 + seed as usize) % 251) as u8;
    }
    pe
}

/// Write a `VS_FIXEDFILEINFO` block carrying `version` into the body.
pub fn set_file_version(pe: &mut [u8], version: (u16, u16, u16, u16)) {
    let at = HEADERS_LEN + 16;
    let ms = (u32::from(version.0) << 16) | u32::from(version.1);
    let ls = (u32::from(version.2) << 16) | u32::from(version.3);
    pe[at..at + 4].copy_from_slice(&[0xbd, 0x04, 0xef, 0xfe]);
    pe[at + 4..at + 8].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    pe[at + 8..at + 12].copy_from_slice(&ms.to_le_bytes());
    pe[at + 12..at + 16].copy_from_slice(&ls.to_le_bytes());
}

fn utf16z(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

fn version_block(key: &str, value: &[u8], text: bool, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; 6];
    out.extend(utf16z(key));
    pad4(&mut out);
    out.extend_from_slice(value);
    for child in children {
        pad4(&mut out);
        out.extend_from_slice(child);
    }
    let value_length = if text { value.len() / 2 } else { value.len() };
    let length = out.len() as u16;
    out[0..2].copy_from_slice(&length.to_le_bytes());
    out[2..4].copy_from_slice(&(value_length as u16).to_le_bytes());
    out[4..6].copy_from_slice(&u16::from(text).to_le_bytes());
    out
}

/// A `VS_VERSIONINFO` resource with an en-US Unicode string table.
pub fn version_resource(version: (u16, u16, u16, u16), strings: &[(&str, &str)]) -> Vec<u8> {
    let mut fixed = vec![0u8; 52];
    fixed[0..4].copy_from_slice(&[0xbd, 0x04, 0xef, 0xfe]);
    fixed[4..8].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    let ms = (u32::from(version.0) << 16) | u32::from(version.1);
    let ls = (u32::from(version.2) << 16) | u32::from(version.3);
    fixed[8..12].copy_from_slice(&ms.to_le_bytes());
    fixed[12..16].copy_from_slice(&ls.to_le_bytes());

    let entries: Vec<Vec<u8>> = strings
        .iter()
        .map(|(key, value)| version_block(key, &utf16z(value), true, &[]))
        .collect();
    let translation: Vec<u8> = [0x0409u16, 0x04b0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    version_block(
        "VS_VERSION_INFO",
        &fixed,
        false,
        &[
            version_block(
                "StringFileInfo",
                &[],
                true,
                &[version_block("040904B0", &[], true, &entries)],
            ),
            version_block(
                "VarFileInfo",
                &[],
                true,
                &[version_block("Translation", &translation, false, &[])],
            ),
        ],
    )
}

/// Write a version resource into the body. The image needs room for it.
pub fn set_version_info(pe: &mut [u8], version: (u16, u16, u16, u16), strings: &[(&str, &str)]) {
    let resource = version_resource(version, strings);
    let at = HEADERS_LEN + 16;
    pe[at..at + resource.len()].copy_from_slice(&resource);
}

/// Authenticode digest of an image, computed independently of the engine.
pub fn authenticode_digest(pe: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    let mut data = Vec::new();
    for range in resolve_hash_ranges(pe) {
        data.extend_from_slice(&pe[range.start..range.end()]);
    }
    algorithm.digest(&data)
}

/// Append a `WIN_CERTIFICATE` holding `pkcs7` and point the certificate
/// directory at it.
pub fn embed_signature(mut pe: Vec<u8>, pkcs7: &[u8]) -> Vec<u8> {
    assert_eq!(pe.len() % 8, 0, "image must be quadword aligned");
    let offset = pe.len();
    let length = (8 + pkcs7.len() + 7) & !7;
    pe.extend_from_slice(&(length as u32).to_le_bytes());
    pe.extend_from_slice(&0x0200u16.to_le_bytes());
    pe.extend_from_slice(&0x0002u16.to_le_bytes());
    pe.extend_from_slice(pkcs7);
    pe.resize(offset + length, 0);
    pe[CERT_DIRECTORY..CERT_DIRECTORY + 4].copy_from_slice(&(offset as u32).to_le_bytes());
    pe[CERT_DIRECTORY + 4..CERT_DIRECTORY + 8].copy_from_slice(&(length as u32).to_le_bytes());
    pe
}

/// Sign `pe` with the PKI leaf, optionally nesting further signatures.
pub fn sign_pe(pe: Vec<u8>, signer: &TestSigner, nested: &[&TestSigner]) -> Vec<u8> {
    let digest = authenticode_digest(&pe, HashAlgorithm::Sha256);
    let content = indirect_data(HashAlgorithm::Sha256, &digest);
    let nested: Vec<Vec<u8>> = nested
        .iter()
        .map(|extra| signed_data(OID_SPC_INDIRECT_DATA, &content, extra, &[]))
        .collect();
    let pkcs7 = signed_data(OID_SPC_INDIRECT_DATA, &content, signer, &nested);
    embed_signature(pe, &pkcs7)
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

fn utc(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap())
}

fn algorithm(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}

/// Build an (unsigned-in-practice) certificate with the given names.
pub fn make_certificate(
    subject: &str,
    issuer: &str,
    serial: u8,
    ekus: &[&str],
    expired: bool,
) -> Certificate {
    let extensions = if ekus.is_empty() {
        None
    } else {
        let usage = ExtendedKeyUsage(
            ekus.iter()
                .map(|eku| ObjectIdentifier::new_unwrap(eku))
                .collect(),
        );
        Some(vec![Extension {
            extn_id: ObjectIdentifier::new_unwrap("2.5.29.37"),
            critical: false,
            extn_value: OctetString::new(usage.to_der().unwrap()).unwrap(),
        }])
    };

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[0x01, serial]).unwrap(),
        signature: algorithm(OID_SHA256_WITH_RSA),
        issuer: Name::from_str(issuer).unwrap(),
        validity: Validity {
            not_before: utc(NOT_BEFORE),
            not_after: utc(if expired { EXPIRED_NOT_AFTER } else { NOT_AFTER }),
        },
        subject: Name::from_str(subject).unwrap(),
        subject_public_key_info: SubjectPublicKeyInfoOwned {
            algorithm: algorithm(OID_RSA_ENCRYPTION),
            subject_public_key: BitString::from_bytes(&[serial; 16]).unwrap(),
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions,
    };

    Certificate {
        tbs_certificate,
        signature_algorithm: algorithm(OID_SHA256_WITH_RSA),
        signature: BitString::from_bytes(&[0u8; 32]).unwrap(),
    }
}

/// Leaf, PCA and root certificates of one publisher.
pub struct TestSigner {
    pub root: Certificate,
    pub pca: Certificate,
    pub leaf: Certificate,
    /// Carried in the signer's `SpcSpOpusInfo` attribute.
    pub program_name: Option<String>,
}

pub const ROOT_DN: &str = "CN=Contoso Root Authority,O=Contoso";
pub const PCA_DN: &str = "CN=Contoso Code Signing PCA,O=Contoso";
pub const LEAF_DN: &str = "CN=Contoso Apps,O=Contoso";

impl TestSigner {
    pub fn contoso() -> Self {
        Self::with_leaf(LEAF_DN, 3, false)
    }

    /// Same root and PCA, different leaf.
    pub fn with_leaf(leaf_dn: &str, serial: u8, expired: bool) -> Self {
        Self {
            root: make_certificate(ROOT_DN, ROOT_DN, 1, &[], false),
            pca: make_certificate(PCA_DN, ROOT_DN, 2, &[], false),
            leaf: make_certificate(leaf_dn, PCA_DN, serial, &[CODE_SIGNING_EKU], expired),
            program_name: None,
        }
    }

    /// Contoso chain whose leaf carries the WHQL EKU, with an optional OEM
    /// program name in the opus info.
    pub fn whql(program_name: Option<&str>) -> Self {
        Self {
            leaf: make_certificate(LEAF_DN, PCA_DN, 4, &[CODE_SIGNING_EKU, WHQL_EKU], false),
            program_name: program_name.map(str::to_string),
            ..Self::contoso()
        }
    }

    pub fn tbs_hash(certificate: &Certificate) -> String {
        ChainCertificate::from_certificate(certificate)
            .unwrap()
            .tbs_hash()
            .to_string()
    }

    pub fn root_tbs(&self) -> String {
        Self::tbs_hash(&self.root)
    }

    pub fn pca_tbs(&self) -> String {
        Self::tbs_hash(&self.pca)
    }

    pub fn leaf_tbs(&self) -> String {
        Self::tbs_hash(&self.leaf)
    }
}

// ---------------------------------------------------------------------------
// Signed messages
// ---------------------------------------------------------------------------

/// Minimal DER TLV with definite length.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }
    out.extend_from_slice(content);
    out
}

pub fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x30, &parts.concat())
}

pub fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x31, &parts.concat())
}

pub fn oid(value: ObjectIdentifier) -> Vec<u8> {
    value.to_der().unwrap()
}

/// `SpcIndirectDataContent` carrying `digest`.
pub fn indirect_data(algorithm: HashAlgorithm, digest: &[u8]) -> Vec<u8> {
    sequence(&[
        sequence(&[oid(OID_SPC_PE_IMAGE_DATA), sequence(&[])]),
        sequence(&[
            sequence(&[oid(algorithm.oid()), vec![0x05, 0x00]]),
            tlv(0x04, digest),
        ]),
    ])
}

/// DER `ContentInfo` wrapping `SignedData` signed (nominally) by
/// `signer.leaf`, embedding the whole chain.
pub fn signed_data(
    content_type: ObjectIdentifier,
    content: &[u8],
    signer: &TestSigner,
    nested: &[Vec<u8>],
) -> Vec<u8> {
    let certificates: Vec<CertificateChoices> = [&signer.leaf, &signer.pca, &signer.root]
        .into_iter()
        .map(|cert| CertificateChoices::Certificate(cert.clone()))
        .collect();

    let unsigned_attrs = if nested.is_empty() {
        None
    } else {
        let values: Vec<Any> = nested
            .iter()
            .map(|blob| Any::from_der(blob).unwrap())
            .collect();
        let attribute = Attribute {
            oid: OID_SPC_NESTED_SIGNATURE,
            values: SetOfVec::try_from(values).unwrap(),
        };
        Some(SetOfVec::try_from(vec![attribute]).unwrap())
    };

    let signed_attrs = signer.program_name.as_deref().map(|program| {
        let attribute = Attribute {
            oid: OID_SPC_SP_OPUS_INFO,
            values: SetOfVec::try_from(vec![Any::from_der(&opus_info(program)).unwrap()])
                .unwrap(),
        };
        SetOfVec::try_from(vec![attribute]).unwrap()
    });

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: signer.leaf.tbs_certificate.issuer.clone(),
            serial_number: signer.leaf.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: algorithm(HashAlgorithm::Sha256.oid()),
        signed_attrs,
        signature_algorithm: algorithm(OID_RSA_ENCRYPTION),
        signature: OctetString::new(vec![0u8; 32]).unwrap(),
        unsigned_attrs,
    };

    let signed = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![algorithm(HashAlgorithm::Sha256.oid())])
            .unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: content_type,
            econtent: Some(Any::from_der(content).unwrap()),
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certificates).unwrap())),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };

    ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::from_der(&signed.to_der().unwrap()).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// `SpcSpOpusInfo` naming `program` as a BMPString.
pub fn opus_info(program: &str) -> Vec<u8> {
    let bmp: Vec<u8> = program.encode_utf16().flat_map(u16::to_be_bytes).collect();
    sequence(&[tlv(0xa0, &tlv(0x80, &bmp))])
}

/// UTF-16LE encoding of `text`, as catalog member tags are stored.
pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// A catalog file whose members vouch for the given SHA1 authenticode
/// digests.
pub fn catalog(sha1_digests: &[Vec<u8>], signer: &TestSigner) -> Vec<u8> {
    let members: Vec<Vec<u8>> = sha1_digests
        .iter()
        .map(|digest| {
            let tag = hex::encode_upper(digest);
            sequence(&[
                tlv(0x04, &utf16le(&tag)),
                set(&[sequence(&[
                    oid(OID_SPC_INDIRECT_DATA),
                    set(&[indirect_data(HashAlgorithm::Sha1, digest)]),
                ])]),
            ])
        })
        .collect();

    let trust_list = sequence(&[
        sequence(&[oid(OID_CATALOG_LIST)]),
        tlv(0x04, &[0x01, 0x02, 0x03, 0x04]),
        tlv(0x17, b"240101000000Z"),
        sequence(&[oid(HashAlgorithm::Sha1.oid()), vec![0x05, 0x00]]),
        sequence(&members),
    ]);
    signed_data(OID_CTL, &trust_list, signer, &[])
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Portable verifier that counts every open and close.
#[derive(Default)]
pub struct CountingVerifier {
    inner: PortableTrustVerifier,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl CountingVerifier {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TrustVerifier for CountingVerifier {
    fn open(&self, path: &Path, index: u32) -> SimulationResult<TrustState> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path, index)
    }

    fn close(&self, state: &mut TrustState) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close(state);
    }
}

/// CTL reader that counts opened catalogs.
#[derive(Default)]
pub struct CountingCatalogReader {
    inner: CtlCatalogReader,
    pub opened: AtomicUsize,
}

impl CatalogReader for CountingCatalogReader {
    fn open<'a>(&'a self, catalog: &Path) -> SimulationResult<Box<dyn CatalogLog + 'a>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open(catalog)
    }
}
