//! Content-encoding interpretation for string values.
//!
//! The only recognized binary encodings are base16/hex. Decoding accepts
//! upper and lower case, a single leading `0x`/`0X` (or Postgres-style `\x`)
//! prefix, and an odd number of digits, which is read as if left-padded with
//! one zero nibble. Both leniencies are deliberately non-standard and kept
//! as-is; downstream consumers rely on them. Whitespace anywhere in the
//! value is an error, never trimmed.

use thiserror::Error;

/// Value-level decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hexadecimal string: {0:?}")]
    InvalidHex(String),

    #[error("binary column values must be hex strings, got: {0}")]
    NotAString(String),
}

/// Whether a declared contentEncoding marks the property as binary.
pub fn is_binary_encoding(encoding: &str) -> bool {
    matches!(encoding, "base16" | "hex")
}

/// Decode a base16 string to bytes.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix("\\x"))
        .unwrap_or(value);

    let mut nibbles = Vec::with_capacity(digits.len() + 1);
    if digits.len() % 2 == 1 {
        nibbles.push(0);
    }
    for ch in digits.chars() {
        let nibble = ch
            .to_digit(16)
            .ok_or_else(|| DecodeError::InvalidHex(value.to_string()))?;
        nibbles.push(nibble as u8);
    }

    Ok(nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_hex() {
        assert_eq!(decode_hex("01AF").unwrap(), vec![0x01, 0xAF]);
        assert_eq!(decode_hex("01af").unwrap(), vec![0x01, 0xAF]);
    }

    #[test]
    fn odd_length_is_left_padded() {
        assert_eq!(decode_hex("1af").unwrap(), vec![0x01, 0xAF]);
        assert_eq!(decode_hex("f").unwrap(), vec![0x0F]);
    }

    #[test]
    fn prefixes_are_stripped() {
        assert_eq!(decode_hex("0x1234").unwrap(), vec![0x12, 0x34]);
        assert_eq!(decode_hex("0X1234").unwrap(), vec![0x12, 0x34]);
        assert_eq!(decode_hex("\\x1234").unwrap(), vec![0x12, 0x34]);
    }

    #[test]
    fn surrounding_whitespace_is_an_error() {
        assert!(decode_hex(" 0x1234 ").is_err());
        assert!(decode_hex("1234 ").is_err());
    }

    #[test]
    fn embedded_whitespace_is_an_error() {
        assert!(decode_hex("12 34").is_err());
    }

    #[test]
    fn non_hex_characters_are_an_error() {
        assert!(decode_hex("House").is_err());
    }

    #[test]
    fn empty_string_decodes_to_no_bytes() {
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn recognized_encodings() {
        assert!(is_binary_encoding("base16"));
        assert!(is_binary_encoding("hex"));
        assert!(!is_binary_encoding("base64"));
    }
}
