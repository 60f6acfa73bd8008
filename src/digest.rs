//! Hash and HMAC primitives over the registered hash algorithms

use hmac::{Hmac, Mac};
use sha2::Digest;

use crate::error::{CryptError, Result};
use crate::registry::Hash;

/// Runs `$body` with `$D` aliased to the digest type selected by
/// `($hash, $len)`. crc32 is not a `Digest` and must be handled by the caller.
macro_rules! with_digest {
    ($hash:expr, $len:expr, $D:ident => $body:expr) => {
        match ($hash, $len) {
            (Hash::Md5, _) => {
                type $D = md5::Md5;
                Ok($body)
            }
            (Hash::Sha1, _) => {
                type $D = sha1::Sha1;
                Ok($body)
            }
            (Hash::Sha2, 28) => {
                type $D = sha2::Sha224;
                Ok($body)
            }
            (Hash::Sha2, 32) => {
                type $D = sha2::Sha256;
                Ok($body)
            }
            (Hash::Sha2, 48) => {
                type $D = sha2::Sha384;
                Ok($body)
            }
            (Hash::Sha2, 64) => {
                type $D = sha2::Sha512;
                Ok($body)
            }
            (Hash::Sha3, 28) => {
                type $D = sha3::Sha3_224;
                Ok($body)
            }
            (Hash::Sha3, 32) => {
                type $D = sha3::Sha3_256;
                Ok($body)
            }
            (Hash::Sha3, 48) => {
                type $D = sha3::Sha3_384;
                Ok($body)
            }
            (Hash::Sha3, 64) => {
                type $D = sha3::Sha3_512;
                Ok($body)
            }
            (hash, len) => Err(CryptError::invalid(
                "hash",
                format!("{} has no {}-bit variant", hash, len * 8),
            )),
        }
    };
}

/// Maps a requested digest length to a concrete one: 0 selects the hash's
/// default, anything else must be offered by the hash.
pub fn resolve_digest_length(hash: Hash, len: usize) -> Result<usize> {
    if len == 0 {
        return Ok(hash.default_digest_length());
    }
    if !hash.supports_digest_length(len) {
        return Err(CryptError::invalid(
            "hash",
            format!("{} has no {}-bit variant", hash, len * 8),
        ));
    }
    Ok(len)
}

/// Plain digest of the concatenation of `parts`.
pub fn digest(hash: Hash, len: usize, parts: &[&[u8]]) -> Result<Vec<u8>> {
    if hash == Hash::Crc32 {
        let mut hasher = crc32fast::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        return Ok(hasher.finalize().to_be_bytes().to_vec());
    }
    with_digest!(hash, len, D => {
        let mut hasher = D::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().to_vec()
    })
}

fn keyed<D>(key: &[u8]) -> Result<D>
where
    D: Mac + hmac::digest::KeyInit,
{
    <D as hmac::digest::KeyInit>::new_from_slice(key)
        .map_err(|_| CryptError::internal("HMAC rejected key length"))
}

/// HMAC of the concatenation of `parts`.
pub fn hmac(hash: Hash, len: usize, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    if !hash.supports_key() {
        return Err(CryptError::invalid(
            "hash",
            format!("{} cannot be used with a key", hash),
        ));
    }
    with_digest!(hash, len, D => {
        let mut mac = keyed::<Hmac<D>>(key)?;
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().to_vec()
    })
}

/// Constant-time comparison of the HMAC of `parts` against `expected`.
pub fn verify_hmac(
    hash: Hash,
    len: usize,
    key: &[u8],
    parts: &[&[u8]],
    expected: &[u8],
) -> Result<bool> {
    if !hash.supports_key() {
        return Err(CryptError::invalid(
            "hash",
            format!("{} cannot be used with a key", hash),
        ));
    }
    with_digest!(hash, len, D => {
        let mut mac = keyed::<Hmac<D>>(key)?;
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(expected).is_ok()
    })
}

/// PBKDF2 with HMAC over the selected hash, filling `out`.
pub fn pbkdf2(
    hash: Hash,
    len: usize,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<()> {
    if !hash.supports_key() {
        return Err(CryptError::invalid(
            "key-derivation",
            format!("pbkdf2 cannot use {}", hash),
        ));
    }
    with_digest!(hash, len, D => {
        pbkdf2::pbkdf2_hmac::<D>(password, salt, iterations, out)
    })
}
