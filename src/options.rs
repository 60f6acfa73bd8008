//! Parameter sets describing how a payload is protected

use std::fmt;

use crate::error::{CryptError, Result};
use crate::kdf;
use crate::registry::{Cipher, Hash, IvPolicy, KeyDerivation, Mode};
use crate::userdata::{Encoding, UserData};

pub const DEFAULT_SALT_BYTES: usize = 16;
pub const MAX_SALT_BYTES: usize = 255;

/// Line ending used when the armored output is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eol {
    Windows,
    #[default]
    Unix,
}

impl Eol {
    pub fn name(self) -> &'static str {
        match self {
            Eol::Windows => "windows",
            Eol::Unix => "unix",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "windows" => Some(Eol::Windows),
            "unix" => Some(Eol::Unix),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Eol::Windows => "\r\n",
            Eol::Unix => "\n",
        }
    }
}

/// How the final artifact is rendered as text. Not part of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingOptions {
    pub enc: Encoding,
    pub eol: Eol,
    /// Maximum characters per line; 0 disables wrapping.
    pub line_length: usize,
    pub uppercase: bool,
}

/// Key derivation settings.
///
/// The meaning of `options` depends on `algorithm`:
/// pbkdf2 `[hash id, digest bytes (0 = hash default), iterations]`,
/// bcrypt `[log2 rounds, unused, unused]`,
/// scrypt `[log2 N, r, p]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOptions {
    pub algorithm: KeyDerivation,
    pub options: [u32; 3],
    /// Derived key length in bytes.
    pub length: usize,
    pub salt_bytes: usize,
}

impl KeyOptions {
    pub fn new(algorithm: KeyDerivation, length: usize) -> Self {
        Self {
            algorithm,
            options: kdf::default_options(algorithm),
            length,
            salt_bytes: DEFAULT_SALT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptOptions {
    pub cipher: Cipher,
    /// `None` for stream ciphers.
    pub mode: Option<Mode>,
    pub key: KeyOptions,
    pub iv: IvPolicy,
    pub encoding: EncodingOptions,
}

impl Default for CryptOptions {
    fn default() -> Self {
        let cipher = Cipher::Rijndael;
        Self {
            cipher,
            mode: cipher.default_mode(),
            key: KeyOptions::new(KeyDerivation::Scrypt, cipher.default_key_length()),
            iv: IvPolicy::Random,
            encoding: EncodingOptions::default(),
        }
    }
}

impl CryptOptions {
    pub fn iv_len(&self) -> usize {
        self.cipher.iv_len(self.mode)
    }

    pub fn tag_len(&self) -> usize {
        self.mode.map_or(0, Mode::tag_len)
    }

    pub fn is_aead(&self) -> bool {
        self.mode.is_some_and(Mode::is_aead)
    }

    /// Number of bytes the key derivation has to produce.
    pub fn kdf_output_len(&self) -> usize {
        if self.iv == IvPolicy::KeyDerivation {
            self.key.length + self.iv_len()
        } else {
            self.key.length
        }
    }

    /// Checks every cross-field constraint of a resolved parameter set.
    pub fn validate(&self) -> Result<()> {
        if !self.cipher.accepts(self.mode) {
            return Err(match self.mode {
                Some(mode) => CryptError::invalid(
                    "cipher",
                    format!("{} does not support mode {}", self.cipher, mode),
                ),
                None => CryptError::invalid("cipher", format!("{} requires a mode", self.cipher)),
            });
        }
        if !self.cipher.supports_key_length(self.key.length) {
            return Err(CryptError::invalid(
                "cipher",
                format!(
                    "{} does not support {}-bit keys",
                    self.cipher,
                    self.key.length * 8
                ),
            ));
        }
        if self.key.salt_bytes == 0 || self.key.salt_bytes > MAX_SALT_BYTES {
            return Err(CryptError::invalid(
                "salt",
                format!("length must be between 1 and {} bytes", MAX_SALT_BYTES),
            ));
        }
        kdf::check(&self.key)
    }
}

impl fmt::Display for CryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cipher, self.key.length * 8)?;
        if let Some(mode) = self.mode {
            write!(f, "-{}", mode)?;
        }
        match self.iv_len() {
            0 => write!(f, ", iv: none")?,
            len => write!(f, ", iv: {} bytes ({})", len, self.iv)?,
        }
        write!(f, ", {}", kdf::describe(&self.key))?;
        write!(f, ", encoding: {}", self.encoding.enc)
    }
}

/// Per-operation instance data. Empty fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitData {
    pub salt: UserData,
    pub iv: UserData,
    pub tag: UserData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOptions {
    pub algorithm: Hash,
    /// Digest length in bytes.
    pub digest_length: usize,
    pub use_key: bool,
    pub key: UserData,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            algorithm: Hash::Sha2,
            digest_length: Hash::Sha2.default_digest_length(),
            use_key: false,
            key: UserData::new(),
        }
    }
}

impl HashOptions {
    pub fn new(algorithm: Hash) -> Self {
        Self {
            algorithm,
            digest_length: algorithm.default_digest_length(),
            ..Self::default()
        }
    }

    /// Display name such as `sha2-256`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.algorithm, self.digest_length * 8)
    }
}

/// HMAC descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacOptions {
    pub enable: bool,
    pub hash: HashOptions,
    /// Negative: the key is supplied directly. Otherwise an index into the
    /// key preset store.
    pub keypreset_id: i32,
}

impl Default for HmacOptions {
    fn default() -> Self {
        Self {
            enable: false,
            hash: HashOptions::default(),
            keypreset_id: -1,
        }
    }
}

impl HmacOptions {
    pub fn uses_preset(&self) -> bool {
        self.keypreset_id >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_options_are_valid() {
        let options = CryptOptions::default();
        options.validate().unwrap();
        assert_eq!(options.mode, Some(Mode::Gcm));
        assert_eq!(options.key.options, [14, 8, 1]);
        assert_eq!(options.key.salt_bytes, 16);
    }

    #[test]
    fn test_summary() {
        let options = CryptOptions::default();
        assert_eq!(
            options.to_string(),
            "rijndael-256-gcm, iv: 12 bytes (random), scrypt (N:2^14, r:8, p:1), encoding: base64"
        );

        let stream = CryptOptions {
            cipher: Cipher::Salsa20,
            mode: None,
            key: KeyOptions::new(KeyDerivation::Bcrypt, 32),
            iv: IvPolicy::Zero,
            encoding: EncodingOptions::default(),
        };
        assert_eq!(
            stream.to_string(),
            "salsa20-256, iv: 8 bytes (zero), bcrypt (2^4 rounds), encoding: base64"
        );
    }

    #[test]
    fn test_kdf_output_len_includes_derived_iv() {
        let mut options = CryptOptions::default();
        assert_eq!(options.kdf_output_len(), 32);
        options.iv = IvPolicy::KeyDerivation;
        assert_eq!(options.kdf_output_len(), 44);
    }

    #[test]
    fn test_validate_rejects_mismatched_mode() {
        let options = CryptOptions {
            cipher: Cipher::Camellia,
            mode: Some(Mode::Gcm),
            ..CryptOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert_eq!(err.field, Some("cipher"));

        let options = CryptOptions {
            cipher: Cipher::Chacha20,
            mode: Some(Mode::Cbc),
            ..CryptOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_key_length() {
        let mut options = CryptOptions::default();
        options.key.length = 20;
        assert_eq!(options.validate().unwrap_err().field, Some("cipher"));
    }

    #[test]
    fn test_validate_salt_bounds() {
        let mut options = CryptOptions::default();
        options.key.salt_bytes = 0;
        assert_eq!(options.validate().unwrap_err().field, Some("salt"));
        options.key.salt_bytes = 256;
        assert_eq!(options.validate().unwrap_err().field, Some("salt"));
        options.key.salt_bytes = 255;
        options.validate().unwrap();
    }

    #[test]
    fn test_hash_label() {
        assert_eq!(HashOptions::default().label(), "sha2-256");
        assert_eq!(HashOptions::new(Hash::Md5).label(), "md5-128");
    }
}
