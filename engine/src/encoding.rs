//! FILENAME: engine/src/encoding.rs
//! PURPOSE: Charset conversion of column data coming from a datasource.
//! CONTEXT: Drivers hand over raw bytes. When a query declares an encoding
//! the bytes are converted to UTF-8 into a scratch buffer that grows as
//! needed and is reused between rows. Undecodable input is skipped rather
//! than failing the row.

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
    /// Bytes above 0x7F are dropped.
    Ascii,
}

impl Encoding {
    /// Looks an encoding up by name, ignoring case and punctuation
    /// (`UTF-8`, `utf8`, `ISO-8859-1`, `latin1`, `US-ASCII`).
    pub fn from_name(name: &str) -> EngineResult<Self> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "iso88591" | "latin1" | "l1" => Ok(Encoding::Latin1),
            "ascii" | "usascii" => Ok(Encoding::Ascii),
            _ => Err(EngineError::UnsupportedEncoding(name.to_string())),
        }
    }

    /// Decodes `bytes` into `scratch`, replacing its previous content.
    pub fn decode_into<'s>(&self, bytes: &[u8], scratch: &'s mut String) -> &'s str {
        scratch.clear();
        scratch.reserve(bytes.len());
        match self {
            Encoding::Utf8 => decode_utf8_lossless(bytes, scratch),
            Encoding::Latin1 => scratch.extend(bytes.iter().map(|&b| char::from(b))),
            Encoding::Ascii => scratch.extend(
                bytes
                    .iter()
                    .filter(|b| b.is_ascii())
                    .map(|&b| char::from(b)),
            ),
        }
        scratch.as_str()
    }
}

/// Appends the valid UTF-8 runs of `bytes`, skipping invalid sequences.
fn decode_utf8_lossless(mut bytes: &[u8], out: &mut String) {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // valid_up_to() marks a proven UTF-8 prefix
                if let Ok(valid) = std::str::from_utf8(valid) {
                    out.push_str(valid);
                }
                match e.error_len() {
                    Some(len) => bytes = &rest[len..],
                    // Truncated sequence at the end
                    None => return,
                }
            }
        }
    }
}

/// Decodes column bytes: converted when an encoding is set, otherwise
/// taken as UTF-8 with invalid sequences skipped.
pub fn decode_column<'s>(
    bytes: &[u8],
    encoding: Option<Encoding>,
    scratch: &'s mut String,
) -> &'s str {
    encoding
        .unwrap_or(Encoding::Utf8)
        .decode_into(bytes, scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_variants() {
        assert_eq!(Encoding::from_name("UTF-8").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_name("iso-8859-1").unwrap(), Encoding::Latin1);
        assert_eq!(Encoding::from_name("LATIN1").unwrap(), Encoding::Latin1);
        assert_eq!(Encoding::from_name("US-ASCII").unwrap(), Encoding::Ascii);
        assert!(matches!(
            Encoding::from_name("EBCDIC"),
            Err(EngineError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_latin1_to_utf8() {
        let mut scratch = String::new();
        let text = Encoding::Latin1.decode_into(b"Gr\xfc\xdfe", &mut scratch);
        assert_eq!(text, "Grüße");
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let mut scratch = String::new();
        assert_eq!(Encoding::Utf8.decode_into(b"a\xffb\xc3", &mut scratch), "ab");
        assert_eq!(Encoding::Utf8.decode_into("é".as_bytes(), &mut scratch), "é");
    }

    #[test]
    fn test_ascii_drops_high_bytes() {
        let mut scratch = String::new();
        assert_eq!(Encoding::Ascii.decode_into(b"a\xe9z", &mut scratch), "az");
    }

    #[test]
    fn test_scratch_is_reused() {
        let mut scratch = String::with_capacity(2);
        decode_column(b"a long enough value", None, &mut scratch);
        assert!(scratch.capacity() >= 19);
        assert_eq!(decode_column(b"x", None, &mut scratch), "x");
    }
}
