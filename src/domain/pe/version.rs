//! Four-part file versions and the `VS_VERSIONINFO` resource reader.
//!
//! ```text
//! block ::= wLength u16, wValueLength u16, wType u16 (1 = text),
//!           szKey UTF-16 NUL-terminated, pad to 4,
//!           Value, pad to 4, children (blocks, each 4-aligned)
//!
//! VS_VERSION_INFO  Value = VS_FIXEDFILEINFO
//!   StringFileInfo
//!     "040904B0"        (language + code page, hex)
//!       "OriginalFileName" = text, ...
//!   VarFileInfo
//!     "Translation"     Value = [language u16, code page u16]...
//! ```

use crate::domain::constants::VS_FIXEDFILEINFO_SIGNATURE;
use crate::infra::error::SimulationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Code pages tried after the translation's own: Windows-1252, then Unicode.
const FALLBACK_CODE_PAGES: [u16; 2] = [0x04e4, 0x04b0];

/// `major.minor.build.revision`, ordered component-wise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl FileVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Read the file version from the first `VS_FIXEDFILEINFO` block in `image`.
    #[must_use]
    pub fn from_image(image: &[u8]) -> Option<Self> {
        let start = image
            .windows(VS_FIXEDFILEINFO_SIGNATURE.len())
            .position(|window| window == VS_FIXEDFILEINFO_SIGNATURE)?;
        Self::from_fixed_info(&image[start..])
    }

    /// Version from a `VS_FIXEDFILEINFO` starting at `info[0]`.
    fn from_fixed_info(info: &[u8]) -> Option<Self> {
        if info.get(..4)? != VS_FIXEDFILEINFO_SIGNATURE {
            return None;
        }
        // dwSignature, dwStrucVersion, dwFileVersionMS, dwFileVersionLS
        let fields = info.get(8..16)?;
        let ms = u32::from_le_bytes([fields[0], fields[1], fields[2], fields[3]]);
        let ls = u32::from_le_bytes([fields[4], fields[5], fields[6], fields[7]]);
        Some(Self::new(
            (ms >> 16) as u16,
            (ms & 0xffff) as u16,
            (ls >> 16) as u16,
            (ls & 0xffff) as u16,
        ))
    }
}

/// Version and identifying strings from a file's version resource. Every
/// field is `None` when the resource, or that entry, is missing or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileVersionInfo {
    pub version: Option<FileVersion>,
    pub original_file_name: Option<String>,
    pub internal_name: Option<String>,
    pub file_description: Option<String>,
    pub product_name: Option<String>,
}

impl FileVersionInfo {
    /// Read the first `VS_VERSION_INFO` resource in `image`.
    ///
    /// Without one, only the version is recovered, from a bare
    /// `VS_FIXEDFILEINFO` block.
    #[must_use]
    pub fn from_image(image: &[u8]) -> Self {
        match find_version_resource(image).and_then(parse_version_resource) {
            Some(info) => info,
            None => Self {
                version: FileVersion::from_image(image),
                ..Self::default()
            },
        }
    }
}

struct VersionBlock<'a> {
    key: String,
    is_text: bool,
    value: &'a [u8],
    children: &'a [u8],
}

impl VersionBlock<'_> {
    fn text(&self) -> Option<String> {
        if !self.is_text {
            return None;
        }
        let units: Vec<u16> = self
            .value
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|unit| *unit != 0)
            .collect();
        let text = String::from_utf16(&units).ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Parse the block at the start of `data`, returning it and the offset of
/// the next sibling.
fn read_block(data: &[u8]) -> Option<(VersionBlock<'_>, usize)> {
    let length = usize::from(read_u16(data, 0)?);
    let value_length = usize::from(read_u16(data, 2)?);
    let is_text = read_u16(data, 4)? == 1;
    if length < 6 || length > data.len() {
        return None;
    }
    let block = &data[..length];

    let mut units = Vec::new();
    let mut at = 6;
    loop {
        let unit = read_u16(block, at)?;
        at += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let key = String::from_utf16_lossy(&units);

    let value_start = align4(at).min(length);
    let (value_end, children_start) = if value_length == 0 {
        (value_start, value_start)
    } else if is_text {
        // Text lengths are in characters, though some linkers write bytes;
        // text runs to its terminator and leaves no room for children.
        (length, length)
    } else {
        let end = (value_start + value_length).min(length);
        (end, align4(end).min(length))
    };

    Some((
        VersionBlock {
            key,
            is_text,
            value: &block[value_start..value_end],
            children: &block[children_start..],
        },
        align4(length),
    ))
}

fn child_blocks(data: &[u8]) -> Vec<VersionBlock<'_>> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset + 6 <= data.len() {
        let Some((block, next)) = read_block(&data[offset..]) else {
            break;
        };
        blocks.push(block);
        offset += next;
    }
    blocks
}

fn find_version_resource(image: &[u8]) -> Option<&[u8]> {
    let key: Vec<u8> = "VS_VERSION_INFO\0"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    let key_at = image
        .windows(key.len())
        .position(|window| window == key.as_slice())?;
    image.get(key_at.checked_sub(6)?..)
}

fn parse_version_resource(data: &[u8]) -> Option<FileVersionInfo> {
    let (root, _) = read_block(data)?;
    let version = FileVersion::from_fixed_info(root.value);

    let mut translation = None;
    let mut tables: Vec<(String, HashMap<String, String>)> = Vec::new();
    for section in child_blocks(root.children) {
        if section.key.eq_ignore_ascii_case("VarFileInfo") {
            translation = child_blocks(section.children)
                .into_iter()
                .find(|var| var.key.eq_ignore_ascii_case("Translation"))
                .and_then(|var| Some((read_u16(var.value, 0)?, read_u16(var.value, 2)?)));
        } else if section.key.eq_ignore_ascii_case("StringFileInfo") {
            for table in child_blocks(section.children) {
                let strings = child_blocks(table.children)
                    .into_iter()
                    .filter_map(|entry| {
                        let text = entry.text()?;
                        Some((entry.key.to_ascii_lowercase(), text))
                    })
                    .collect();
                tables.push((table.key.to_ascii_uppercase(), strings));
            }
        }
    }

    let strings = select_string_table(&tables, translation);
    let lookup = |name: &str| strings.and_then(|table| table.get(name).cloned());
    Some(FileVersionInfo {
        version,
        original_file_name: lookup("originalfilename"),
        internal_name: lookup("internalname"),
        file_description: lookup("filedescription"),
        product_name: lookup("productname"),
    })
}

/// The table for the translation's language and code page, then the same
/// language with a fallback code page, then the first table present.
fn select_string_table(
    tables: &[(String, HashMap<String, String>)],
    translation: Option<(u16, u16)>,
) -> Option<&HashMap<String, String>> {
    if let Some((language, code_page)) = translation {
        let wanted = std::iter::once(code_page)
            .chain(FALLBACK_CODE_PAGES)
            .map(|page| format!("{language:04X}{page:04X}"));
        for key in wanted {
            if let Some((_, table)) = tables.iter().find(|(name, _)| *name == key) {
                return Some(table);
            }
        }
    }
    tables.first().map(|(_, table)| table)
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for FileVersion {
    type Err = SimulationError;

    /// Missing trailing components default to zero, as in `1.2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SimulationError::InvalidInput(format!("Invalid file version: '{s}'"));
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid());
        }
        let mut numbers = [0u16; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2], numbers[3]))
    }
}

impl TryFrom<String> for FileVersion {
    type Error = SimulationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileVersion> for String {
    fn from(version: FileVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_orders() {
        let low: FileVersion = "10.0.1".parse().unwrap();
        let high: FileVersion = "10.0.2.0".parse().unwrap();
        assert_eq!(low, FileVersion::new(10, 0, 1, 0));
        assert!(low < high);
        assert!("1.2.3.4.5".parse::<FileVersion>().is_err());
        assert!("1.x".parse::<FileVersion>().is_err());
    }

    #[test]
    fn reads_fixed_file_info() {
        let mut image = vec![0u8; 64];
        image[20..24].copy_from_slice(&VS_FIXEDFILEINFO_SIGNATURE);
        image[28..32].copy_from_slice(&((10u32 << 16) | 1).to_le_bytes());
        image[32..36].copy_from_slice(&((19041u32 << 16) | 508).to_le_bytes());
        assert_eq!(
            FileVersion::from_image(&image),
            Some(FileVersion::new(10, 1, 19041, 508))
        );
        assert_eq!(FileVersion::from_image(&[0u8; 64]), None);
    }

    fn utf16z(text: &str) -> Vec<u8> {
        text.encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    fn pad(bytes: &mut Vec<u8>) {
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
    }

    fn block(key: &str, value: &[u8], text: bool, children: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0u8; 6];
        out.extend(utf16z(key));
        pad(&mut out);
        out.extend_from_slice(value);
        for child in children {
            pad(&mut out);
            out.extend_from_slice(child);
        }
        let value_length = if text { value.len() / 2 } else { value.len() };
        let length = out.len() as u16;
        out[0..2].copy_from_slice(&length.to_le_bytes());
        out[2..4].copy_from_slice(&(value_length as u16).to_le_bytes());
        out[4..6].copy_from_slice(&u16::from(text).to_le_bytes());
        out
    }

    fn resource(table: &str, translation: [u16; 2], strings: &[(&str, &str)]) -> Vec<u8> {
        let mut fixed = vec![0u8; 52];
        fixed[0..4].copy_from_slice(&VS_FIXEDFILEINFO_SIGNATURE);
        fixed[8..12].copy_from_slice(&((2u32 << 16) | 5).to_le_bytes());
        fixed[12..16].copy_from_slice(&((100u32 << 16) | 1).to_le_bytes());
        let entries: Vec<Vec<u8>> = strings
            .iter()
            .map(|(key, value)| block(key, &utf16z(value), true, &[]))
            .collect();
        let translation: Vec<u8> = translation.iter().flat_map(|v| v.to_le_bytes()).collect();
        block(
            "VS_VERSION_INFO",
            &fixed,
            false,
            &[
                block("StringFileInfo", &[], true, &[block(table, &[], true, &entries)]),
                block(
                    "VarFileInfo",
                    &[],
                    true,
                    &[block("Translation", &translation, false, &[])],
                ),
            ],
        )
    }

    #[test]
    fn reads_version_resource_strings() {
        let mut image = vec![0xccu8; 37];
        image.extend(resource(
            "040904B0",
            [0x0409, 0x04b0],
            &[
                ("OriginalFileName", "contoso.exe"),
                ("InternalName", "contoso"),
                ("FileDescription", "  "),
                ("ProductName", "Contoso Suite"),
            ],
        ));
        image.extend([0u8; 16]);

        let info = FileVersionInfo::from_image(&image);
        assert_eq!(info.version, Some(FileVersion::new(2, 5, 100, 1)));
        assert_eq!(info.original_file_name.as_deref(), Some("contoso.exe"));
        assert_eq!(info.internal_name.as_deref(), Some("contoso"));
        assert_eq!(info.file_description, None);
        assert_eq!(info.product_name.as_deref(), Some("Contoso Suite"));
    }

    #[test]
    fn string_table_falls_back_to_unicode_code_page() {
        let image = resource("040704B0", [0x0407, 0x0000], &[("ProductName", "Werkzeug")]);
        let info = FileVersionInfo::from_image(&image);
        assert_eq!(info.product_name.as_deref(), Some("Werkzeug"));
    }

    #[test]
    fn bare_fixed_info_yields_version_only() {
        let mut image = vec![0u8; 64];
        image[8..12].copy_from_slice(&VS_FIXEDFILEINFO_SIGNATURE);
        image[16..20].copy_from_slice(&(3u32 << 16).to_le_bytes());
        let info = FileVersionInfo::from_image(&image);
        assert_eq!(info.version, Some(FileVersion::new(3, 0, 0, 0)));
        assert_eq!(info.original_file_name, None);
        assert_eq!(FileVersionInfo::from_image(b"MZ"), FileVersionInfo::default());
    }
}
