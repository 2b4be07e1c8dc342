//! Small DER helpers over `der::Any` for structures the typed crates do not
//! model (Authenticode indirect data, certificate trust lists, X.500 strings).

use crate::infra::error::{SimulationError, SimulationResult};
use const_oid::ObjectIdentifier;
use der::asn1::OctetStringRef;
use der::{Any, Decode, Encode, Header, Reader, SliceReader, Tag, Tagged};

/// Trim trailing bytes after the first top-level TLV.
///
/// Signature blobs from the certificate table are padded to eight bytes and
/// strict DER decoders reject trailing data.
pub fn trim_top_level(bytes: &[u8]) -> SimulationResult<&[u8]> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    let total = usize::try_from((header.encoded_len()? + header.length)?)?;
    bytes.get(..total).ok_or_else(|| {
        SimulationError::Asn1Error(format!(
            "Top-level element claims {total} bytes but only {} are present",
            bytes.len()
        ))
    })
}

/// Decode the elements of a constructed value (SEQUENCE, SET or context tag).
pub fn children(value: &Any) -> SimulationResult<Vec<Any>> {
    let mut reader = SliceReader::new(value.value())?;
    let mut items = Vec::new();
    while !reader.is_finished() {
        items.push(Any::decode(&mut reader)?);
    }
    Ok(items)
}

/// Decode a standalone DER element.
pub fn parse(bytes: &[u8]) -> SimulationResult<Any> {
    Ok(Any::from_der(bytes)?)
}

pub fn oid(value: &Any) -> SimulationResult<ObjectIdentifier> {
    Ok(value.decode_as::<ObjectIdentifier>()?)
}

pub fn octets(value: &Any) -> SimulationResult<&[u8]> {
    Ok(value.decode_as::<OctetStringRef<'_>>()?.as_bytes())
}

/// `DigestInfo ::= SEQUENCE { AlgorithmIdentifier, OCTET STRING }`
pub fn digest_info(value: &Any) -> SimulationResult<(ObjectIdentifier, Vec<u8>)> {
    let items = children(value)?;
    let [algorithm, digest] = items.as_slice() else {
        return Err(SimulationError::Asn1Error(format!(
            "DigestInfo has {} elements, expected 2",
            items.len()
        )));
    };
    let algorithm = children(algorithm)?;
    let algorithm_oid = algorithm
        .first()
        .ok_or_else(|| SimulationError::Asn1Error("Empty AlgorithmIdentifier".to_string()))?;
    Ok((oid(algorithm_oid)?, octets(digest)?.to_vec()))
}

/// Decode an X.500 directory string. Unsupported string types yield `None`.
#[must_use]
pub fn directory_string(value: &Any) -> Option<String> {
    let bytes = value.value();
    match value.tag() {
        Tag::Utf8String => String::from_utf8(bytes.to_vec()).ok(),
        // T61 is read as Latin-1.
        Tag::PrintableString | Tag::Ia5String | Tag::VisibleString | Tag::TeletexString => {
            Some(bytes.iter().map(|&b| b as char).collect())
        }
        Tag::BmpString => utf16be_string(bytes),
        _ => None,
    }
}

/// Number of a context-specific tag such as `[0]`, or `None` for any other class.
#[must_use]
pub fn context_number(value: &Any) -> Option<u8> {
    match value.tag() {
        Tag::ContextSpecific { number, .. } => Some(number.value()),
        _ => None,
    }
}

/// Big-endian UTF-16, as BMPString content is encoded.
#[must_use]
pub fn utf16be_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Interpret octets as a UTF-16LE string, as catalog member tags are stored.
#[must_use]
pub fn utf16le_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16(&units).ok()?;
    Some(text.trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_padding() {
        let padded = [0x30, 0x03, 0x02, 0x01, 0x05, 0x00, 0x00, 0x00];
        assert_eq!(trim_top_level(&padded).unwrap(), &padded[..5]);
        assert!(trim_top_level(&[0x30, 0x10, 0x00]).is_err());
    }

    #[test]
    fn reads_digest_info() {
        // SEQUENCE { SEQUENCE { OID sha256, NULL }, OCTET STRING 01 02 }
        let der = [
            0x30, 0x13, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01, 0x05, 0x00, 0x04, 0x02, 0x01, 0x02,
        ];
        let (alg, digest) = digest_info(&parse(&der).unwrap()).unwrap();
        assert_eq!(alg.to_string(), "2.16.840.1.101.3.4.2.1");
        assert_eq!(digest, vec![1, 2]);
    }

    #[test]
    fn reads_context_tags() {
        // [0] { [1] IMPLICIT IA5String "ab" }
        let der = [0xa0, 0x04, 0x81, 0x02, b'a', b'b'];
        let outer = parse(&der).unwrap();
        assert_eq!(context_number(&outer), Some(0));
        let inner = children(&outer).unwrap();
        assert_eq!(context_number(&inner[0]), Some(1));
        assert_eq!(context_number(&parse(&[0x05, 0x00]).unwrap()), None);
        assert_eq!(utf16be_string(&[0x00, 0x41, 0x00, 0x42]).as_deref(), Some("AB"));
    }

    #[test]
    fn decodes_member_tags() {
        let tag: Vec<u8> = "AB12\0"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(utf16le_string(&tag).as_deref(), Some("AB12"));
        assert_eq!(utf16le_string(&[0x41]), None);
    }
}
