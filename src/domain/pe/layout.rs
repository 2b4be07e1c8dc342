//! PE file layout: authenticode hash ranges and the certificate table.
//!
//! Everything here works on raw little-endian offsets instead of a full PE
//! parse. Images that a strict parser would reject still have to be hashed,
//! and anything that does not look like a PE is hashed as a whole.

use crate::domain::constants::{
    CERTIFICATE_DIRECTORY_INDEX, CHECKSUM_OFFSET_IN_OPTIONAL_HEADER, DOS_HEADER_LEN,
    E_LFANEW_OFFSET, NT_SIGNATURE_AND_FILE_HEADER_LEN, PE32_DATA_DIRECTORIES_OFFSET,
    PE32_PLUS_DATA_DIRECTORIES_OFFSET, PE32_PLUS_MAGIC, SIZE_OF_HEADERS_OFFSET_IN_OPTIONAL_HEADER,
    WIN_CERT_REVISION_2_0, WIN_CERT_TYPE_PKCS_SIGNED_DATA,
};

/// A half-open byte range `[start, start + len)` of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashRange {
    pub start: usize,
    pub len: usize,
}

impl HashRange {
    #[must_use]
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Offsets of the header fields excluded from the authenticode digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeHeaderOffsets {
    pub pe_offset: usize,
    pub optional_header: usize,
    pub checksum: usize,
    pub certificate_directory: usize,
    pub pe32_plus: bool,
}

/// `IMAGE_DATA_DIRECTORY` for the certificate table. `offset` is a file
/// offset, not an RVA, despite the field name in the headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateDirectory {
    pub offset: u32,
    pub size: u32,
}

impl CertificateDirectory {
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.offset != 0 && self.size != 0
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Locate the checksum field and certificate directory entry.
///
/// Returns `None` for anything that is not a PE whose headers reach at least
/// through the certificate directory entry.
#[must_use]
pub fn header_offsets(bytes: &[u8]) -> Option<PeHeaderOffsets> {
    if bytes.len() < DOS_HEADER_LEN || &bytes[0..2] != b"MZ" {
        return None;
    }

    let pe_offset = read_u32(bytes, E_LFANEW_OFFSET)? as usize;
    if bytes.get(pe_offset..pe_offset.checked_add(4)?)? != b"PE\0\0" {
        return None;
    }

    let optional_header = pe_offset + NT_SIGNATURE_AND_FILE_HEADER_LEN;
    let magic = read_u16(bytes, optional_header)?;
    let pe32_plus = magic == PE32_PLUS_MAGIC;
    let data_directories = optional_header
        + if pe32_plus {
            PE32_PLUS_DATA_DIRECTORIES_OFFSET
        } else {
            PE32_DATA_DIRECTORIES_OFFSET
        };
    let certificate_directory = data_directories + CERTIFICATE_DIRECTORY_INDEX * 8;
    if certificate_directory + 8 > bytes.len() {
        return None;
    }

    Some(PeHeaderOffsets {
        pe_offset,
        optional_header,
        checksum: optional_header + CHECKSUM_OFFSET_IN_OPTIONAL_HEADER,
        certificate_directory,
        pe32_plus,
    })
}

/// Read the certificate table directory entry.
#[must_use]
pub fn certificate_directory(bytes: &[u8]) -> Option<CertificateDirectory> {
    let offsets = header_offsets(bytes)?;
    Some(CertificateDirectory {
        offset: read_u32(bytes, offsets.certificate_directory)?,
        size: read_u32(bytes, offsets.certificate_directory + 4)?,
    })
}

/// Compute the byte ranges covered by the authenticode digest.
///
/// For a PE image these are the whole file minus the checksum field, the
/// certificate directory entry and the certificate table itself. Anything
/// else yields a single range spanning the file.
#[must_use]
pub fn resolve_hash_ranges(bytes: &[u8]) -> Vec<HashRange> {
    let len = bytes.len();
    let Some(offsets) = header_offsets(bytes) else {
        return whole_file(len);
    };

    let mut end = len;
    if let Some(directory) = certificate_directory(bytes) {
        if directory.is_present() {
            end = (directory.offset as usize).min(len);
        }
    }

    let after_checksum = offsets.checksum + 4;
    let after_directory = offsets.certificate_directory + 8;

    let mut ranges = vec![
        HashRange::new(0, offsets.checksum),
        HashRange::new(after_checksum, offsets.certificate_directory - after_checksum),
    ];
    if after_directory < end {
        ranges.push(HashRange::new(after_directory, end - after_directory));
    }
    ranges
}

fn whole_file(len: usize) -> Vec<HashRange> {
    vec![HashRange::new(0, len)]
}

/// Bounds of the first-page hash: the header page, with the same two
/// header fields excluded as for the authenticode digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPage {
    pub offsets: PeHeaderOffsets,
    /// Bytes of the file belonging to the header page.
    pub len: usize,
}

/// Locate the header page of a PE image. `page_size` caps `SizeOfHeaders`.
#[must_use]
pub fn header_page(bytes: &[u8], page_size: usize) -> Option<HeaderPage> {
    let offsets = header_offsets(bytes)?;
    let size_of_headers =
        read_u32(bytes, offsets.optional_header + SIZE_OF_HEADERS_OFFSET_IN_OPTIONAL_HEADER)?
            as usize;
    let declared = if size_of_headers == 0 {
        page_size
    } else {
        size_of_headers.min(page_size)
    };
    Some(HeaderPage {
        offsets,
        len: declared.min(bytes.len()),
    })
}

/// Return the first PKCS#7 `WIN_CERTIFICATE` payload of the certificate table.
///
/// The payload may carry alignment padding after the DER structure.
#[must_use]
pub fn embedded_signature(bytes: &[u8]) -> Option<&[u8]> {
    let directory = certificate_directory(bytes)?;
    if !directory.is_present() {
        return None;
    }

    let table_start = directory.offset as usize;
    let table_end = table_start.checked_add(directory.size as usize)?.min(bytes.len());
    let mut cursor = table_start;

    while cursor + 8 <= table_end {
        let length = read_u32(bytes, cursor)? as usize;
        let revision = read_u16(bytes, cursor + 4)?;
        let cert_type = read_u16(bytes, cursor + 6)?;
        if length < 8 || cursor + length > table_end {
            log::debug!("Malformed WIN_CERTIFICATE at offset {cursor:#x}");
            return None;
        }
        if revision == WIN_CERT_REVISION_2_0 && cert_type == WIN_CERT_TYPE_PKCS_SIGNED_DATA {
            return Some(&bytes[cursor + 8..cursor + length]);
        }
        // Entries are quadword aligned.
        cursor += (length + 7) & !7;
    }
    None
}
