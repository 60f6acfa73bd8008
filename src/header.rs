//! Self-describing parameter header
//!
//! The binary format (all integers big-endian) is:
//! - marker: 1 byte (`0xC1`, format version 1)
//! - flags: 1 byte (salt, iv, tag, hmac presence bits)
//! - cipher id, mode id (0 = none), kdf id, iv policy id: 1 byte each
//! - key length: 2 bytes
//! - kdf tunables: 3 x 4 bytes
//! - ciphertext length: 8 bytes
//! - salt, iv, tag when flagged: 1 length byte followed by the bytes
//! - when hmac is flagged: hash id (1), digest length (1), key preset id (2, signed)
//! - ciphertext
//! - when hmac is flagged: the MAC over every preceding byte
//!
//! Decoding never copies the ciphertext; it hands out views into the input.

use std::mem::size_of;

use tracing::debug;

use crate::digest;
use crate::error::{CryptError, Result};
use crate::options::{CryptOptions, DEFAULT_SALT_BYTES, EncodingOptions, HashOptions, HmacOptions, InitData, KeyOptions};
use crate::registry::{Cipher, Hash, IvPolicy, KeyDerivation, Mode, mode_id};
use crate::userdata::UserData;

/// First byte of every version 1 header.
pub const MARKER: u8 = 0xC1;

/// Size of the fixed part of the header, marker included.
pub const FIXED_LEN: usize = 28;

const FLAG_SALT: u8 = 0x01;
const FLAG_IV: u8 = 0x02;
const FLAG_TAG: u8 = 0x04;
const FLAG_HMAC: u8 = 0x08;
const KNOWN_FLAGS: u8 = FLAG_SALT | FLAG_IV | FLAG_TAG | FLAG_HMAC;

/// Result of looking for a header at the start of a buffer.
#[derive(Debug)]
pub enum Decoded<'a> {
    /// The buffer does not start with a header; all of it is ciphertext.
    NoHeader(&'a [u8]),
    Header(ParsedHeader<'a>),
}

/// A successfully parsed header with views into the original buffer.
#[derive(Debug)]
pub struct ParsedHeader<'a> {
    pub options: CryptOptions,
    pub init: InitData,
    /// The HMAC descriptor as stored. The key is never part of the header,
    /// so `hmac.hash.key` is always empty here.
    pub hmac: HmacOptions,
    header: &'a [u8],
    encrypted: &'a [u8],
    mac: &'a [u8],
}

impl<'a> ParsedHeader<'a> {
    /// The header bytes, excluding the trailing MAC.
    pub fn header_bytes(&self) -> &'a [u8] {
        self.header
    }

    pub fn encrypted(&self) -> &'a [u8] {
        self.encrypted
    }

    /// The stored MAC; empty when HMAC is disabled.
    pub fn mac(&self) -> &'a [u8] {
        self.mac
    }

    /// The byte ranges covered by the MAC, in order.
    pub fn authenticated(&self) -> [&'a [u8]; 2] {
        [self.header, self.encrypted]
    }

    /// Verifies the stored MAC with the key carried in `hmac`.
    pub fn check_hmac(&self, hmac: &HmacOptions) -> bool {
        crate::auth::check_hmac(self, hmac)
    }
}

fn push_field(out: &mut Vec<u8>, data: &UserData, name: &str) -> Result<()> {
    let len = u8::try_from(data.len())
        .map_err(|_| CryptError::internal(format!("{} is longer than 255 bytes", name)))?;
    out.push(len);
    out.extend_from_slice(data.as_bytes());
    Ok(())
}

fn check_init(options: &CryptOptions, init: &InitData) -> Result<()> {
    // Without a salt field the decoder can only assume the default length.
    if init.salt.is_empty() && options.key.salt_bytes != DEFAULT_SALT_BYTES {
        return Err(CryptError::internal(format!(
            "no salt to carry a length of {} bytes",
            options.key.salt_bytes
        )));
    }
    if !init.salt.is_empty() && init.salt.len() != options.key.salt_bytes {
        return Err(CryptError::internal(format!(
            "salt is {} bytes but options declare {}",
            init.salt.len(),
            options.key.salt_bytes
        )));
    }
    if !init.iv.is_empty() {
        if !options.iv.stores_iv() {
            return Err(CryptError::internal(format!(
                "IV bytes present under the {} policy",
                options.iv
            )));
        }
        if init.iv.len() != options.iv_len() {
            return Err(CryptError::internal(format!(
                "IV is {} bytes but the cipher uses {}",
                init.iv.len(),
                options.iv_len()
            )));
        }
    }
    if !init.tag.is_empty() && init.tag.len() != options.tag_len() {
        return Err(CryptError::internal(format!(
            "tag is {} bytes but the mode produces {}",
            init.tag.len(),
            options.tag_len()
        )));
    }
    Ok(())
}

fn check_hmac_descriptor(hmac: &HmacOptions) -> Result<i16> {
    let hash = hmac.hash.algorithm;
    if !hash.supports_key() {
        return Err(CryptError::invalid("hmac", format!("{} cannot be keyed", hash)));
    }
    if !hash.supports_digest_length(hmac.hash.digest_length) {
        return Err(CryptError::invalid(
            "hmac",
            format!("{} has no {}-bit variant", hash, hmac.hash.digest_length * 8),
        ));
    }
    if hmac.keypreset_id < 0 {
        return Ok(-1);
    }
    i16::try_from(hmac.keypreset_id)
        .map_err(|_| CryptError::invalid("key-preset", format!("id {} too large", hmac.keypreset_id)))
}

/// Serializes the header for a ciphertext of `ciphertext_len` bytes.
///
/// The MAC, if enabled, is not part of the result; see [`seal`].
pub fn encode(
    options: &CryptOptions,
    init: &InitData,
    hmac: &HmacOptions,
    ciphertext_len: usize,
) -> Result<Vec<u8>> {
    options.validate()?;
    check_init(options, init)?;
    let preset = if hmac.enable {
        Some(check_hmac_descriptor(hmac)?)
    } else {
        None
    };
    let key_len = u16::try_from(options.key.length)
        .map_err(|_| CryptError::internal("key length does not fit the header"))?;

    let mut flags = 0u8;
    if !init.salt.is_empty() {
        flags |= FLAG_SALT;
    }
    if !init.iv.is_empty() {
        flags |= FLAG_IV;
    }
    if !init.tag.is_empty() {
        flags |= FLAG_TAG;
    }
    if preset.is_some() {
        flags |= FLAG_HMAC;
    }

    let mut out = Vec::with_capacity(
        FIXED_LEN + 3 + init.salt.len() + init.iv.len() + init.tag.len() + 4,
    );
    out.push(MARKER);
    out.push(flags);
    out.push(options.cipher.id());
    out.push(mode_id(options.mode));
    out.push(options.key.algorithm.id());
    out.push(options.iv.id());
    out.extend_from_slice(&key_len.to_be_bytes());
    for value in options.key.options {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&(ciphertext_len as u64).to_be_bytes());

    if flags & FLAG_SALT != 0 {
        push_field(&mut out, &init.salt, "salt")?;
    }
    if flags & FLAG_IV != 0 {
        push_field(&mut out, &init.iv, "iv")?;
    }
    if flags & FLAG_TAG != 0 {
        push_field(&mut out, &init.tag, "tag")?;
    }
    if let Some(preset) = preset {
        out.push(hmac.hash.algorithm.id());
        out.push(hmac.hash.digest_length as u8);
        out.extend_from_slice(&preset.to_be_bytes());
    }
    Ok(out)
}

/// Produces the complete artifact `header ‖ ciphertext ‖ mac`.
///
/// When HMAC is enabled, `hmac.hash.key` must already hold the key (preset
/// keys are looked up before sealing).
pub fn seal(
    options: &CryptOptions,
    init: &InitData,
    hmac: &HmacOptions,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let mut out = encode(options, init, hmac, ciphertext.len())?;
    let header_len = out.len();
    out.extend_from_slice(ciphertext);
    if hmac.enable {
        if hmac.hash.key.is_empty() {
            return Err(CryptError::missing("hmac", "no key to compute the MAC with"));
        }
        let mac = digest::hmac(
            hmac.hash.algorithm,
            hmac.hash.digest_length,
            hmac.hash.key.as_bytes(),
            &[&out[..header_len], ciphertext],
        )?;
        out.extend_from_slice(&mac);
    }
    Ok(out)
}

/// Bounds-checked cursor over the input.
struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                CryptError::malformed(format!("input likely truncated while reading {}", what))
            })?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let bytes = self.take(N, what)?;
        bytes
            .try_into()
            .map_err(|_| CryptError::internal(format!("failed to read {}", what)))
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array::<{ size_of::<u16>() }>(what)?))
    }

    fn i16(&mut self, what: &str) -> Result<i16> {
        Ok(i16::from_be_bytes(self.array::<{ size_of::<i16>() }>(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array::<{ size_of::<u32>() }>(what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array::<{ size_of::<u64>() }>(what)?))
    }

    /// A length-prefixed field. Zero lengths are not allowed; absent fields
    /// are expressed through the flags instead.
    fn field(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.u8(what)?;
        if len == 0 {
            return Err(CryptError::malformed(format!("{} is flagged but empty", what)));
        }
        self.take(usize::from(len), what)
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }
}

fn lookup<T>(found: Option<T>, what: &str, id: u8) -> Result<T> {
    found.ok_or_else(|| CryptError::malformed(format!("unknown {} id {}", what, id)))
}

/// Looks for a header at the start of `input`.
///
/// Returns [`Decoded::NoHeader`] when the marker is absent and an error of
/// kind `MalformedHeader` when the marker is present but the layout does
/// not check out. Nothing is returned for a partially valid header.
pub fn decode(input: &[u8]) -> Result<Decoded<'_>> {
    if input.first() != Some(&MARKER) {
        debug!(len = input.len(), "no header marker; treating input as raw ciphertext");
        return Ok(Decoded::NoHeader(input));
    }
    let mut reader = Reader { input, pos: 1 };

    let flags = reader.u8("flags")?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(CryptError::malformed(format!("unknown flag bits {:#04x}", flags)));
    }
    let id = reader.u8("cipher")?;
    let cipher = lookup(Cipher::from_id(id), "cipher", id)?;
    let id = reader.u8("mode")?;
    let mode = match id {
        0 => None,
        id => Some(lookup(Mode::from_id(id), "mode", id)?),
    };
    if !cipher.accepts(mode) {
        return Err(CryptError::malformed(format!(
            "{} cannot be used with mode id {}",
            cipher, id
        )));
    }
    let id = reader.u8("key derivation")?;
    let algorithm = lookup(KeyDerivation::from_id(id), "key derivation", id)?;
    let id = reader.u8("iv policy")?;
    let iv_policy = lookup(IvPolicy::from_id(id), "iv policy", id)?;
    let key_len = usize::from(reader.u16("key length")?);
    if !cipher.supports_key_length(key_len) {
        return Err(CryptError::malformed(format!(
            "{} does not offer {}-byte keys",
            cipher, key_len
        )));
    }
    let kdf_options = [
        reader.u32("key derivation options")?,
        reader.u32("key derivation options")?,
        reader.u32("key derivation options")?,
    ];
    let ciphertext_len = usize::try_from(reader.u64("ciphertext length")?).map_err(|_| {
        CryptError::malformed("ciphertext length exceeds this system's address space")
    })?;

    let mut options = CryptOptions {
        cipher,
        mode,
        key: KeyOptions {
            algorithm,
            options: kdf_options,
            length: key_len,
            salt_bytes: DEFAULT_SALT_BYTES,
        },
        iv: iv_policy,
        encoding: EncodingOptions::default(),
    };
    let mut init = InitData::default();

    if flags & FLAG_SALT != 0 {
        let salt = reader.field("salt")?;
        options.key.salt_bytes = salt.len();
        init.salt.set_bytes(salt);
    }
    if flags & FLAG_IV != 0 {
        let iv = reader.field("iv")?;
        if !iv_policy.stores_iv() {
            return Err(CryptError::malformed(format!(
                "IV bytes present under the {} policy",
                iv_policy
            )));
        }
        if iv.len() != options.iv_len() {
            return Err(CryptError::malformed(format!(
                "IV is {} bytes but the cipher uses {}",
                iv.len(),
                options.iv_len()
            )));
        }
        init.iv.set_bytes(iv);
    }
    if flags & FLAG_TAG != 0 {
        let tag = reader.field("tag")?;
        if tag.len() != options.tag_len() {
            return Err(CryptError::malformed(format!(
                "tag of {} bytes does not fit the mode",
                tag.len()
            )));
        }
        init.tag.set_bytes(tag);
    }

    let mut hmac = HmacOptions::default();
    if flags & FLAG_HMAC != 0 {
        let id = reader.u8("hmac hash")?;
        let hash = lookup(Hash::from_id(id), "hash", id)?;
        let digest_length = usize::from(reader.u8("hmac digest length")?);
        if !hash.supports_key() || !hash.supports_digest_length(digest_length) {
            return Err(CryptError::malformed(format!(
                "{} with a {}-byte digest cannot be used as HMAC",
                hash, digest_length
            )));
        }
        let preset = reader.i16("hmac key preset")?;
        hmac = HmacOptions {
            enable: true,
            hash: HashOptions {
                algorithm: hash,
                digest_length,
                use_key: true,
                key: UserData::new(),
            },
            keypreset_id: i32::from(preset.max(-1)),
        };
    }

    options
        .validate()
        .map_err(|e| CryptError::malformed(e.message().to_string()))?;

    let header_len = reader.pos;
    let encrypted = reader.take(ciphertext_len, "ciphertext")?;
    let mac = if hmac.enable {
        reader.take(hmac.hash.digest_length, "hmac")?
    } else {
        &[]
    };
    if reader.remaining() > 0 {
        return Err(CryptError::malformed(format!(
            "{} unexpected bytes after the declared layout",
            reader.remaining()
        )));
    }

    debug!(
        header_len,
        ciphertext_len,
        hmac = hmac.enable,
        "parsed header"
    );
    Ok(Decoded::Header(ParsedHeader {
        options,
        init,
        hmac,
        header: &input[..header_len],
        encrypted,
        mac,
    }))
}
