//! Byte encodings for child process streams.
//!
//! Windows tool suites (Perforce among them) write their console output in a
//! legacy OEM code page. Decoding never fails: undecodable UTF-8 sequences
//! are replaced, and the OEM code pages map every byte.

use oem_cp::code_table::{DECODING_TABLE_CP437, DECODING_TABLE_CP850};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Encoding used to decode child output and encode stdin payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8, with a leading byte order mark stripped.
    #[default]
    Utf8,
    /// IBM code page 437 (US OEM).
    Cp437,
    /// IBM code page 850 (Western European OEM).
    Cp850,
}

impl Encoding {
    fn high_table(self) -> Option<&'static [char; 128]> {
        match self {
            Encoding::Utf8 => None,
            Encoding::Cp437 => Some(&DECODING_TABLE_CP437),
            Encoding::Cp850 => Some(&DECODING_TABLE_CP850),
        }
    }

    /// Decodes `bytes`, substituting anything that cannot be represented.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self.high_table() {
            None => {
                let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8_lossy(bytes).into_owned()
            }
            Some(table) => bytes
                .iter()
                .map(|&b| {
                    if b < 0x80 {
                        b as char
                    } else {
                        table[(b - 0x80) as usize]
                    }
                })
                .collect(),
        }
    }

    /// Encodes `text`; characters missing from a code page become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self.high_table() {
            None => text.as_bytes().to_vec(),
            Some(table) => text
                .chars()
                .map(|c| {
                    if c.is_ascii() {
                        c as u8
                    } else {
                        table
                            .iter()
                            .position(|&candidate| candidate == c)
                            .map(|index| 0x80 + index as u8)
                            .unwrap_or(b'?')
                    }
                })
                .collect(),
        }
    }
}
