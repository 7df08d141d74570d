//! Byte encoding detection
//!
//! NFO files come from many tools and eras, so the bytes on disk are not
//! guaranteed to be UTF-8. Detection runs before any format parser and
//! follows a fixed order:
//!
//! 1. A byte-order mark decides the encoding outright (UTF-8, UTF-16LE/BE)
//! 2. Bytes that decode as strict UTF-8 are UTF-8
//! 3. Anything else is decoded as windows-1252, which accepts every byte
//!
//! The detected encoding travels with the parsed model so a writer can save
//! the file back in the encoding it was read in.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use serde::Serialize;
use tracing::warn;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Text encoding of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// UTF-8 without a byte-order mark
    #[default]
    Utf8,
    /// UTF-8 preceded by a byte-order mark
    Utf8Bom,
    /// UTF-16 little endian (always written with its BOM)
    Utf16Le,
    /// UTF-16 big endian (always written with its BOM)
    Utf16Be,
    /// Single-byte Latin-1 family fallback
    Windows1252,
}

impl TextEncoding {
    /// WHATWG label of the encoding
    pub fn name(&self) -> &'static str {
        self.encoding().name()
    }

    fn encoding(&self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 | TextEncoding::Utf8Bom => UTF_8,
            TextEncoding::Utf16Le => UTF_16LE,
            TextEncoding::Utf16Be => UTF_16BE,
            TextEncoding::Windows1252 => WINDOWS_1252,
        }
    }

    fn bom(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8Bom => UTF8_BOM,
            TextEncoding::Utf16Le => UTF16LE_BOM,
            TextEncoding::Utf16Be => UTF16BE_BOM,
            TextEncoding::Utf8 | TextEncoding::Windows1252 => &[],
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How sure the sniffer is about an encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingConfidence {
    /// Permissive fallback, every byte sequence decodes
    Low,
    /// Strict UTF-8 decode succeeded
    High,
    /// A byte-order mark named the encoding
    Certain,
}

/// Result of encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingDetection {
    pub encoding: TextEncoding,
    pub confidence: EncodingConfidence,
    /// Length of the byte-order mark at the start of the input
    pub bom_len: usize,
}

/// Detect the encoding of raw file bytes
pub fn detect_encoding(bytes: &[u8]) -> EncodingDetection {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let encoding = if encoding == UTF_8 {
            TextEncoding::Utf8Bom
        } else if encoding == UTF_16LE {
            TextEncoding::Utf16Le
        } else {
            TextEncoding::Utf16Be
        };
        return EncodingDetection {
            encoding,
            confidence: EncodingConfidence::Certain,
            bom_len,
        };
    }

    if std::str::from_utf8(bytes).is_ok() {
        EncodingDetection {
            encoding: TextEncoding::Utf8,
            confidence: EncodingConfidence::High,
            bom_len: 0,
        }
    } else {
        EncodingDetection {
            encoding: TextEncoding::Windows1252,
            confidence: EncodingConfidence::Low,
            bom_len: 0,
        }
    }
}

/// Decode raw file bytes, stripping any byte-order mark
pub fn decode(bytes: &[u8]) -> (String, EncodingDetection) {
    let detection = detect_encoding(bytes);
    let body = &bytes[detection.bom_len..];
    let (text, had_errors) = detection
        .encoding
        .encoding()
        .decode_without_bom_handling(body);
    if had_errors {
        warn!(
            encoding = detection.encoding.name(),
            "Malformed sequences replaced while decoding"
        );
    }
    (text.into_owned(), detection)
}

/// Whether `encoding` can hold every character of `text`
pub fn can_encode(text: &str, encoding: TextEncoding) -> bool {
    match encoding {
        TextEncoding::Windows1252 => !WINDOWS_1252.encode(text).2,
        _ => true,
    }
}

/// Encode text for writing in the given encoding
///
/// Text that windows-1252 cannot represent is written as UTF-8 rather than
/// with replacement characters.
pub fn encode(text: &str, encoding: TextEncoding) -> Cow<'_, [u8]> {
    match encoding {
        TextEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
        TextEncoding::Utf8Bom => {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
            out.extend_from_slice(UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            Cow::Owned(out)
        }
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            let little = encoding == TextEncoding::Utf16Le;
            let mut out = Vec::with_capacity(2 + text.len() * 2);
            out.extend_from_slice(encoding.bom());
            for unit in text.encode_utf16() {
                let bytes = if little {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                };
                out.extend_from_slice(&bytes);
            }
            Cow::Owned(out)
        }
        TextEncoding::Windows1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if unmappable {
                warn!("Text not representable in windows-1252, writing UTF-8 instead");
                Cow::Borrowed(text.as_bytes())
            } else {
                bytes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_encode() {
        assert!(can_encode("Amélie", TextEncoding::Windows1252));
        assert!(!can_encode("東京", TextEncoding::Windows1252));
        assert!(can_encode("東京", TextEncoding::Utf16Le));
    }

    #[test]
    fn test_detect_plain_utf8() {
        let detection = detect_encoding("Title: Amélie".as_bytes());
        assert_eq!(detection.encoding, TextEncoding::Utf8);
        assert_eq!(detection.confidence, EncodingConfidence::High);
        assert_eq!(detection.bom_len, 0);
    }

    #[test]
    fn test_detect_utf8_bom() {
        let detection = detect_encoding(b"\xEF\xBB\xBF<movie/>");
        assert_eq!(detection.encoding, TextEncoding::Utf8Bom);
        assert_eq!(detection.confidence, EncodingConfidence::Certain);
        assert_eq!(detection.bom_len, 3);
    }

    #[test]
    fn test_detect_utf16_bom() {
        let detection = detect_encoding(&[0xFF, 0xFE, b'<', 0x00]);
        assert_eq!(detection.encoding, TextEncoding::Utf16Le);
        assert_eq!(detection.confidence, EncodingConfidence::Certain);

        let detection = detect_encoding(&[0xFE, 0xFF, 0x00, b'<']);
        assert_eq!(detection.encoding, TextEncoding::Utf16Be);
    }

    #[test]
    fn test_detect_latin1_fallback() {
        // "Amélie" in windows-1252
        let detection = detect_encoding(b"Title: Am\xE9lie");
        assert_eq!(detection.encoding, TextEncoding::Windows1252);
        assert_eq!(detection.confidence, EncodingConfidence::Low);
    }

    #[test]
    fn test_decode_strips_bom() {
        let (text, detection) = decode(b"\xEF\xBB\xBFTitle: X");
        assert_eq!(text, "Title: X");
        assert_eq!(detection.encoding, TextEncoding::Utf8Bom);
    }

    #[test]
    fn test_decode_latin1() {
        let (text, _) = decode(b"Title: Am\xE9lie");
        assert_eq!(text, "Title: Amélie");
    }

    #[test]
    fn test_encode_matches_source_bytes() {
        let original: &[u8] = b"Title: Am\xE9lie";
        let (text, detection) = decode(original);
        assert_eq!(encode(&text, detection.encoding).as_ref(), original);

        let original: &[u8] = b"\xEF\xBB\xBFTitle: X";
        let (text, detection) = decode(original);
        assert_eq!(encode(&text, detection.encoding).as_ref(), original);
    }

    #[test]
    fn test_encode_utf16_round_trip() {
        let bytes = encode("<a>é</a>", TextEncoding::Utf16Be);
        let (text, detection) = decode(&bytes);
        assert_eq!(text, "<a>é</a>");
        assert_eq!(detection.encoding, TextEncoding::Utf16Be);
    }

    #[test]
    fn test_encode_unmappable_latin1_falls_back_to_utf8() {
        let bytes = encode("Title: 東京", TextEncoding::Windows1252);
        assert_eq!(bytes.as_ref(), "Title: 東京".as_bytes());
    }
}
