//! Static tables of the supported algorithms
//!
//! Every algorithm has a stable numeric id (used in the header), a name
//! (used on the command line) and a set of capabilities. Capability queries
//! are plain lookups; nothing here is mutable at runtime.

use std::fmt;

/// Authentication tag length of every AEAD mode, in bytes.
pub const AEAD_TAG_LEN: usize = 16;

/// Nonce length used with GCM and CCM, in bytes.
const AEAD_NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    Rijndael,
    Camellia,
    Chacha20,
    Salsa20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Block { block_size: usize },
    Stream { iv_len: usize },
}

#[derive(Debug)]
pub struct CipherInfo {
    pub cipher: Cipher,
    pub id: u8,
    pub name: &'static str,
    pub kind: CipherKind,
    pub key_lengths: &'static [usize],
    pub default_key_length: usize,
    pub modes: &'static [Mode],
}

const BLOCK_KEYS: &[usize] = &[16, 24, 32];

static CIPHERS: [CipherInfo; 4] = [
    CipherInfo {
        cipher: Cipher::Rijndael,
        id: 1,
        name: "rijndael",
        kind: CipherKind::Block { block_size: 16 },
        key_lengths: BLOCK_KEYS,
        default_key_length: 32,
        modes: &[
            Mode::Ecb,
            Mode::Cbc,
            Mode::Cfb,
            Mode::Ofb,
            Mode::Ctr,
            Mode::Eax,
            Mode::Ccm,
            Mode::Gcm,
        ],
    },
    CipherInfo {
        cipher: Cipher::Camellia,
        id: 2,
        name: "camellia",
        kind: CipherKind::Block { block_size: 16 },
        key_lengths: BLOCK_KEYS,
        default_key_length: 32,
        modes: &[Mode::Ecb, Mode::Cbc, Mode::Cfb, Mode::Ofb, Mode::Ctr],
    },
    CipherInfo {
        cipher: Cipher::Chacha20,
        id: 3,
        name: "chacha20",
        kind: CipherKind::Stream { iv_len: 12 },
        key_lengths: &[32],
        default_key_length: 32,
        modes: &[],
    },
    CipherInfo {
        cipher: Cipher::Salsa20,
        id: 4,
        name: "salsa20",
        kind: CipherKind::Stream { iv_len: 8 },
        key_lengths: &[32],
        default_key_length: 32,
        modes: &[],
    },
];

impl Cipher {
    pub fn all() -> impl Iterator<Item = Cipher> {
        CIPHERS.iter().map(|info| info.cipher)
    }

    pub fn info(self) -> &'static CipherInfo {
        // The table is ordered like the enum.
        &CIPHERS[self as usize]
    }

    pub fn from_id(id: u8) -> Option<Self> {
        CIPHERS.iter().find(|info| info.id == id).map(|info| info.cipher)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CIPHERS
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| info.cipher)
    }

    pub fn id(self) -> u8 {
        self.info().id
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn is_stream(self) -> bool {
        matches!(self.info().kind, CipherKind::Stream { .. })
    }

    pub fn key_lengths(self) -> &'static [usize] {
        self.info().key_lengths
    }

    pub fn default_key_length(self) -> usize {
        self.info().default_key_length
    }

    pub fn supports_key_length(self, len: usize) -> bool {
        self.info().key_lengths.contains(&len)
    }

    pub fn supports_mode(self, mode: Mode) -> bool {
        self.info().modes.contains(&mode)
    }

    /// The mode used when none is requested: gcm where offered, cbc
    /// otherwise, and no mode at all for stream ciphers.
    pub fn default_mode(self) -> Option<Mode> {
        if self.is_stream() {
            None
        } else if self.supports_mode(Mode::Gcm) {
            Some(Mode::Gcm)
        } else {
            Some(Mode::Cbc)
        }
    }

    /// Whether `mode` is a legal pairing: `None` for stream ciphers, an
    /// offered mode for block ciphers.
    pub fn accepts(self, mode: Option<Mode>) -> bool {
        match mode {
            None => self.is_stream(),
            Some(mode) => self.supports_mode(mode),
        }
    }

    /// Length of the IV (or nonce) the cipher consumes under `mode`.
    pub fn iv_len(self, mode: Option<Mode>) -> usize {
        match self.info().kind {
            CipherKind::Stream { iv_len } => iv_len,
            CipherKind::Block { block_size } => match mode {
                Some(Mode::Ecb) => 0,
                Some(Mode::Gcm | Mode::Ccm) => AEAD_NONCE_LEN,
                _ => block_size,
            },
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Ecb,
    Cbc,
    CbcCts,
    Cfb,
    Ofb,
    Ctr,
    Eax,
    Ccm,
    Gcm,
}

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::Ecb,
        Mode::Cbc,
        Mode::CbcCts,
        Mode::Cfb,
        Mode::Ofb,
        Mode::Ctr,
        Mode::Eax,
        Mode::Ccm,
        Mode::Gcm,
    ];

    /// Header id. Zero is reserved for "no mode".
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Ecb => "ecb",
            Mode::Cbc => "cbc",
            Mode::CbcCts => "cbc_cts",
            Mode::Cfb => "cfb",
            Mode::Ofb => "ofb",
            Mode::Ctr => "ctr",
            Mode::Eax => "eax",
            Mode::Ccm => "ccm",
            Mode::Gcm => "gcm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    pub fn is_aead(self) -> bool {
        matches!(self, Mode::Eax | Mode::Ccm | Mode::Gcm)
    }

    pub fn tag_len(self) -> usize {
        if self.is_aead() { AEAD_TAG_LEN } else { 0 }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header id of an optional mode.
pub fn mode_id(mode: Option<Mode>) -> u8 {
    mode.map_or(0, Mode::id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hash {
    Crc32,
    Md5,
    Sha1,
    Sha2,
    Sha3,
}

const SHA_DIGESTS: &[usize] = &[28, 32, 48, 64];

impl Hash {
    pub const ALL: [Hash; 5] = [Hash::Crc32, Hash::Md5, Hash::Sha1, Hash::Sha2, Hash::Sha3];

    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|hash| hash.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Hash::Crc32 => "crc32",
            Hash::Md5 => "md5",
            Hash::Sha1 => "sha1",
            Hash::Sha2 => "sha2",
            Hash::Sha3 => "sha3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|hash| hash.name().eq_ignore_ascii_case(name))
    }

    /// Offered digest lengths in bytes.
    pub fn digest_lengths(self) -> &'static [usize] {
        match self {
            Hash::Crc32 => &[4],
            Hash::Md5 => &[16],
            Hash::Sha1 => &[20],
            Hash::Sha2 | Hash::Sha3 => SHA_DIGESTS,
        }
    }

    pub fn default_digest_length(self) -> usize {
        match self {
            Hash::Crc32 => 4,
            Hash::Md5 => 16,
            Hash::Sha1 => 20,
            Hash::Sha2 | Hash::Sha3 => 32,
        }
    }

    pub fn supports_digest_length(self, len: usize) -> bool {
        self.digest_lengths().contains(&len)
    }

    /// Whether the hash can be keyed (used as an HMAC).
    pub fn supports_key(self) -> bool {
        !matches!(self, Hash::Crc32)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDerivation {
    Pbkdf2,
    Bcrypt,
    Scrypt,
}

impl KeyDerivation {
    pub const ALL: [KeyDerivation; 3] = [
        KeyDerivation::Pbkdf2,
        KeyDerivation::Bcrypt,
        KeyDerivation::Scrypt,
    ];

    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kdf| kdf.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyDerivation::Pbkdf2 => "pbkdf2",
            KeyDerivation::Bcrypt => "bcrypt",
            KeyDerivation::Scrypt => "scrypt",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kdf| kdf.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the IV comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IvPolicy {
    #[default]
    Random,
    Zero,
    /// Taken from the tail of the key derivation output; never stored.
    KeyDerivation,
    Custom,
}

impl IvPolicy {
    pub const ALL: [IvPolicy; 4] = [
        IvPolicy::Random,
        IvPolicy::Zero,
        IvPolicy::KeyDerivation,
        IvPolicy::Custom,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            IvPolicy::Random => "random",
            IvPolicy::Zero => "zero",
            IvPolicy::KeyDerivation => "keyderivation",
            IvPolicy::Custom => "custom",
        }
    }

    /// Whether IV bytes travel with the ciphertext under this policy.
    pub fn stores_iv(self) -> bool {
        matches!(self, IvPolicy::Random | IvPolicy::Custom)
    }
}

impl fmt::Display for IvPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
