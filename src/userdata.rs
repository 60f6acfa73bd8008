//! Byte containers for user supplied secrets and init data
//!
//! `UserData` holds raw bytes only. Text encodings (hex, base32, base64) are
//! applied when data enters or leaves the container. The backing buffer is
//! wiped when the container is dropped or overwritten, so passwords and HMAC
//! keys do not linger in memory on any exit path.

use std::fmt;

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use zeroize::Zeroizing;

/// Standard base64 that accepts input with or without padding.
pub(crate) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Text encoding used when importing or exporting bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Pass-through; the text is the data. Used for typed passphrases.
    Ascii,
    Base16,
    Base32,
    #[default]
    Base64,
}

impl Encoding {
    pub const ALL: [Encoding; 4] = [
        Encoding::Ascii,
        Encoding::Base16,
        Encoding::Base32,
        Encoding::Base64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Base16 => "base16",
            Encoding::Base32 => "base32",
            Encoding::Base64 => "base64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|enc| enc.name().eq_ignore_ascii_case(name))
    }

    /// Decodes `text` into raw bytes. Returns `None` on malformed input.
    pub fn decode(self, text: &[u8]) -> Option<Vec<u8>> {
        match self {
            Encoding::Ascii => Some(text.to_vec()),
            Encoding::Base16 => hex::decode(text).ok(),
            Encoding::Base32 => {
                let text = std::str::from_utf8(text).ok()?;
                let normalized = Zeroizing::new(text.trim_end_matches('=').to_ascii_uppercase());
                base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &normalized)
            }
            Encoding::Base64 => BASE64.decode(text).ok(),
        }
    }

    /// Encodes raw bytes as text. `Ascii` is lossy for non-UTF-8 data.
    pub fn encode(self, data: &[u8]) -> String {
        match self {
            Encoding::Ascii => String::from_utf8_lossy(data).into_owned(),
            Encoding::Base16 => hex::encode(data),
            Encoding::Base32 => base32::encode(base32::Alphabet::Rfc4648 { padding: true }, data),
            Encoding::Base64 => BASE64.encode(data),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Splits a `"<scheme>:<payload>"` string into payload and encoding.
///
/// Recognized schemes are `hex`, `base32`, `base64` and `utf8`. A scheme
/// must be followed by at least one payload character to count; anything
/// else is returned whole with `default`.
pub fn parse_prefixed(input: &str, default: Encoding) -> (&str, Encoding) {
    const SCHEMES: [(&str, Encoding); 4] = [
        ("hex:", Encoding::Base16),
        ("base32:", Encoding::Base32),
        ("base64:", Encoding::Base64),
        ("utf8:", Encoding::Ascii),
    ];
    for (prefix, encoding) in SCHEMES {
        if let Some(payload) = input.strip_prefix(prefix) {
            if !payload.is_empty() {
                return (payload, encoding);
            }
        }
    }
    (input, default)
}

/// Loads a possibly prefixed string into `data`. Returns whether any bytes
/// resulted; decode failures and empty payloads both count as absent.
pub fn set_user_data(input: &str, data: &mut UserData, default: Encoding) -> bool {
    let (payload, encoding) = parse_prefixed(input, default);
    data.set(payload.as_bytes(), encoding)
}

/// An owned byte sequence that is zeroed when dropped.
///
/// A length of zero means "absent" throughout the crate.
#[derive(Clone, Default)]
pub struct UserData {
    data: Zeroizing<Vec<u8>>,
}

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: Zeroizing::new(bytes.to_vec()),
        }
    }

    /// Replaces the content with `input` decoded from `encoding`.
    ///
    /// On malformed input the container is left empty and `false` is
    /// returned; callers treat that as "no data supplied".
    pub fn set(&mut self, input: &[u8], encoding: Encoding) -> bool {
        match encoding.decode(input) {
            Some(decoded) => self.data = Zeroizing::new(decoded),
            None => self.clear(),
        }
        !self.data.is_empty()
    }

    pub fn set_bytes(&mut self, bytes: &[u8]) {
        self.data = Zeroizing::new(bytes.to_vec());
    }

    /// Exports the content in `encoding`.
    pub fn get(&self, encoding: Encoding) -> String {
        encoding.encode(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data = Zeroizing::new(Vec::new());
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for UserData {}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodings_roundtrip_raw_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let data = UserData::from_bytes(&bytes);
        for encoding in [Encoding::Base16, Encoding::Base32, Encoding::Base64] {
            let text = data.get(encoding);
            let mut back = UserData::new();
            assert!(back.set(text.as_bytes(), encoding), "{} failed", encoding);
            assert_eq!(back, data, "{} did not round-trip", encoding);
        }
    }

    #[test]
    fn test_ascii_is_pass_through() {
        let mut data = UserData::new();
        assert!(data.set(b"correct horse", Encoding::Ascii));
        assert_eq!(data.as_bytes(), b"correct horse");
        assert_eq!(data.get(Encoding::Ascii), "correct horse");
    }

    #[test]
    fn test_known_encodings() {
        let data = UserData::from_bytes(b"foobar");
        assert_eq!(data.get(Encoding::Base16), "666f6f626172");
        assert_eq!(data.get(Encoding::Base32), "MZXW6YTBOI======");
        assert_eq!(data.get(Encoding::Base64), "Zm9vYmFy");
    }

    #[test]
    fn test_base64_without_padding() {
        let mut data = UserData::new();
        assert!(data.set(b"Zm9vYg", Encoding::Base64));
        assert_eq!(data.as_bytes(), b"foob");
    }

    #[test]
    fn test_base32_lowercase_and_unpadded() {
        let mut data = UserData::new();
        assert!(data.set(b"mzxw6ytboi", Encoding::Base32));
        assert_eq!(data.as_bytes(), b"foobar");
    }

    #[test]
    fn test_base32_prefixed_secret() {
        let mut key = UserData::new();
        assert!(set_user_data("base32:onswg4tfoq", &mut key, Encoding::Ascii));
        assert_eq!(key.as_bytes(), b"secret");
    }

    #[test]
    fn test_malformed_input_clears() {
        let mut data = UserData::from_bytes(b"previous");
        assert!(!data.set(b"not$base64", Encoding::Base64));
        assert!(data.is_empty());

        let mut data = UserData::from_bytes(b"previous");
        assert!(!data.set(b"xyz", Encoding::Base16));
        assert!(data.is_empty());
    }

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(parse_prefixed("hex:00ff", Encoding::Ascii), ("00ff", Encoding::Base16));
        assert_eq!(parse_prefixed("base32:MY", Encoding::Ascii), ("MY", Encoding::Base32));
        assert_eq!(parse_prefixed("base64:AA==", Encoding::Ascii), ("AA==", Encoding::Base64));
        assert_eq!(parse_prefixed("utf8:pass", Encoding::Base64), ("pass", Encoding::Ascii));
        assert_eq!(parse_prefixed("plain", Encoding::Base64), ("plain", Encoding::Base64));
    }

    #[test]
    fn test_prefix_requires_payload() {
        assert_eq!(parse_prefixed("hex:", Encoding::Ascii), ("hex:", Encoding::Ascii));

        let mut data = UserData::new();
        assert!(set_user_data("hex:", &mut data, Encoding::Ascii));
        assert_eq!(data.as_bytes(), b"hex:");
    }

    #[test]
    fn test_set_user_data_empty_is_absent() {
        let mut data = UserData::new();
        assert!(!set_user_data("", &mut data, Encoding::Ascii));
        assert!(!set_user_data("base64:!!!", &mut data, Encoding::Ascii));
        assert!(data.is_empty());
    }

    #[test]
    fn test_debug_hides_content() {
        let data = UserData::from_bytes(b"hunter2");
        let printed = format!("{:?}", data);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("len"));
    }

    #[test]
    fn test_encoding_names() {
        for encoding in Encoding::ALL {
            assert_eq!(Encoding::from_name(encoding.name()), Some(encoding));
        }
        assert_eq!(Encoding::from_name("BASE64"), Some(Encoding::Base64));
        assert_eq!(Encoding::from_name("base58"), None);
    }
}
