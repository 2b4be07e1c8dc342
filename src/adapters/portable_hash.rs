//! Pure-Rust [`HashPrimitive`] over mapped file bytes.

use crate::domain::constants::PAGE_SIZE;
use crate::domain::crypto::DynDigest;
use crate::domain::pe::{header_page, HashRange};
use crate::services::hash_engine::{HashPrimitive, HashSource, PrimitiveStatus};
use crate::HashAlgorithm;

/// Status reported when the output buffer is smaller than the digest.
pub const STATUS_BUFFER_TOO_SMALL: i32 = 0x8007_007a_u32 as i32;

/// Computes authenticode and page hashes in process.
#[derive(Debug, Clone, Copy)]
pub struct PortableHashPrimitive {
    page_size: usize,
}

impl Default for PortableHashPrimitive {
    fn default() -> Self {
        Self::new()
    }
}

impl PortableHashPrimitive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE,
        }
    }
}

fn feed(context: &mut dyn DynDigest, bytes: &[u8], range: HashRange) {
    let end = range.end().min(bytes.len());
    let start = range.start.min(end);
    context.update(&bytes[start..end]);
}

fn write_digest(digest: &[u8], out: &mut [u8]) -> Result<usize, PrimitiveStatus> {
    let target = out
        .get_mut(..digest.len())
        .ok_or(PrimitiveStatus(STATUS_BUFFER_TOO_SMALL))?;
    target.copy_from_slice(digest);
    Ok(digest.len())
}

impl HashPrimitive for PortableHashPrimitive {
    fn authenticode_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
        out: Option<&mut [u8]>,
    ) -> Result<usize, PrimitiveStatus> {
        let Some(out) = out else {
            return Ok(algorithm.digest_size());
        };
        let mut context = algorithm.new_digest();
        for range in source.ranges {
            feed(context.as_mut(), source.bytes, *range);
        }
        write_digest(&context.finalize(), out)
    }

    /// Hash of the header page with the checksum and certificate directory
    /// entry removed, zero-padded so exactly one page is hashed.
    fn page_digest(
        &self,
        source: &HashSource<'_>,
        algorithm: HashAlgorithm,
        out: Option<&mut [u8]>,
    ) -> Result<usize, PrimitiveStatus> {
        let Some(page) = header_page(source.bytes, self.page_size) else {
            return Ok(0);
        };
        let Some(out) = out else {
            return Ok(algorithm.digest_size());
        };

        let checksum = page.offsets.checksum;
        let certdir = page.offsets.certificate_directory;
        let spans = [
            HashRange::new(0, checksum.min(page.len)),
            HashRange::new(checksum + 4, certdir.saturating_sub(checksum + 4)),
            HashRange::new(certdir + 8, page.len.saturating_sub(certdir + 8)),
        ];

        let mut context = algorithm.new_digest();
        let mut hashed = 0;
        for span in spans {
            let end = span.end().min(page.len);
            if span.start < end {
                feed(context.as_mut(), source.bytes, HashRange::new(span.start, end - span.start));
                hashed += end - span.start;
            }
        }
        context.update(&vec![0u8; self.page_size.saturating_sub(hashed)]);
        write_digest(&context.finalize(), out)
    }

    fn supports_flat_hashes(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pe::resolve_hash_ranges;
    use std::path::Path;

    #[test]
    fn non_pe_has_no_page_hash_and_hashes_whole_file() {
        let bytes = b"plain text file";
        let ranges = resolve_hash_ranges(bytes);
        let source = HashSource {
            path: Path::new("a.txt"),
            bytes,
            ranges: &ranges,
        };
        let primitive = PortableHashPrimitive::new();
        assert_eq!(primitive.page_digest(&source, HashAlgorithm::Sha1, None), Ok(0));

        let mut out = [0u8; 32];
        let written = primitive
            .authenticode_digest(&source, HashAlgorithm::Sha256, Some(&mut out))
            .unwrap();
        assert_eq!(written, 32);
        assert_eq!(out.to_vec(), HashAlgorithm::Sha256.digest(bytes));
    }

    #[test]
    fn short_buffer_is_reported() {
        let source = HashSource {
            path: Path::new("a.txt"),
            bytes: b"x",
            ranges: &[HashRange::new(0, 1)],
        };
        let mut out = [0u8; 4];
        assert_eq!(
            PortableHashPrimitive::new().authenticode_digest(
                &source,
                HashAlgorithm::Sha1,
                Some(&mut out)
            ),
            Err(PrimitiveStatus(STATUS_BUFFER_TOO_SMALL))
        );
    }
}
