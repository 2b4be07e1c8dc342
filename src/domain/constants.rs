//! Centralized constants for PE offsets, object identifiers and defaults.
//! Keep this intentionally small; only broadly reused literals should live here.

use const_oid::ObjectIdentifier;

// === PE layout ===

/// Smallest file that can hold a DOS header
pub const DOS_HEADER_LEN: usize = 64;

/// Offset of `e_lfanew` within the DOS header
pub const E_LFANEW_OFFSET: usize = 0x3c;

/// `PE\0\0` signature + `IMAGE_FILE_HEADER`
pub const NT_SIGNATURE_AND_FILE_HEADER_LEN: usize = 4 + 20;

/// Offset of `CheckSum` within the optional header (identical for PE32 and PE32+)
pub const CHECKSUM_OFFSET_IN_OPTIONAL_HEADER: usize = 64;

/// Offset of `SizeOfHeaders` within the optional header
pub const SIZE_OF_HEADERS_OFFSET_IN_OPTIONAL_HEADER: usize = 60;

/// Data directories start 96 bytes into a PE32 optional header
pub const PE32_DATA_DIRECTORIES_OFFSET: usize = 96;

/// Data directories start 112 bytes into a PE32+ optional header
pub const PE32_PLUS_DATA_DIRECTORIES_OFFSET: usize = 112;

/// `IMAGE_DIRECTORY_ENTRY_SECURITY`
pub const CERTIFICATE_DIRECTORY_INDEX: usize = 4;

pub const PE32_PLUS_MAGIC: u16 = 0x20b;

/// `WIN_CERT_REVISION_2_0`
pub const WIN_CERT_REVISION_2_0: u16 = 0x0200;

/// `WIN_CERT_TYPE_PKCS_SIGNED_DATA`
pub const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;

/// Page size used for first-page hashes
pub const PAGE_SIZE: usize = 4096;

/// `VS_FIXEDFILEINFO.dwSignature` as it appears on disk
pub const VS_FIXEDFILEINFO_SIGNATURE: [u8; 4] = [0xbd, 0x04, 0xef, 0xfe];

// === Defaults ===

pub const DEFAULT_HASH_CHUNK_MIB: u32 = 32;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_CATALOG_ROOT: &str = r"C:\Windows\System32\CatRoot";

/// Extensions Authenticode cannot embed a signature in.
pub const DEFAULT_UNSIGNED_EXTENSIONS: &[&str] = &[".ocx", ".bat", ".bin"];

/// Extensions App Control evaluates when expanding folders.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".sys", ".exe", ".com", ".dll", ".rll", ".ocx", ".msp", ".mst", ".msi", ".js", ".vbs",
    ".ps1", ".appx", ".bin", ".bat", ".hxs", ".mui", ".lex", ".mof",
];

// === Object identifiers ===

pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const OID_SPC_INDIRECT_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.4");
pub const OID_SPC_NESTED_SIGNATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.4.1");
/// `SPC_SP_OPUS_INFO_OBJID`; carries the program name (CertOemID) of a signature
pub const OID_SPC_SP_OPUS_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.12");
pub const OID_CTL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.10.1");
pub const OID_COUNTER_SIGNATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.6");
pub const OID_RFC3161_COUNTER_SIGNATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.3.3.1");

/// Windows Hardware Driver Verification EKU
pub const WHQL_EKU: &str = "1.3.6.1.4.1.311.10.3.5";

pub const OID_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
pub const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

pub const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
pub const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

pub const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");
pub const OID_SHA3_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.8");
pub const OID_SHA3_384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.9");
pub const OID_SHA3_512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.10");
