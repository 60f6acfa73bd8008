//! Password based key derivation
//!
//! Three algorithms are supported, each reading its tunables from the
//! three positional slots of [`KeyOptions::options`].

use scrypt::{Params, scrypt};
use tracing::debug;
use zeroize::Zeroizing;

use crate::digest;
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::options::KeyOptions;
use crate::registry::{Hash, KeyDerivation};

pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 50_000;
pub const PBKDF2_MAX_ITERATIONS: u32 = 10_000_000;
pub const BCRYPT_DEFAULT_LOG_ROUNDS: u32 = 4;
pub const BCRYPT_MAX_LOG_ROUNDS: u32 = 10;
pub const BCRYPT_SALT_BYTES: usize = 16;
pub const SCRYPT_DEFAULT_LOG_N: u32 = 14;
pub const SCRYPT_DEFAULT_R: u32 = 8;
pub const SCRYPT_DEFAULT_P: u32 = 1;

/// Compiled-in tunables for `algorithm`.
pub fn default_options(algorithm: KeyDerivation) -> [u32; 3] {
    match algorithm {
        KeyDerivation::Pbkdf2 => [
            u32::from(Hash::Sha2.id()),
            Hash::Sha2.default_digest_length() as u32,
            PBKDF2_DEFAULT_ITERATIONS,
        ],
        KeyDerivation::Bcrypt => [BCRYPT_DEFAULT_LOG_ROUNDS, 0, 0],
        KeyDerivation::Scrypt => [SCRYPT_DEFAULT_LOG_N, SCRYPT_DEFAULT_R, SCRYPT_DEFAULT_P],
    }
}

fn out_of_range(what: &str, value: u32, min: u32, max: u32) -> CryptError {
    CryptError::invalid(
        "key-derivation",
        format!("{} {} out of range {}..={}", what, value, min, max),
    )
}

fn check_range(what: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(out_of_range(what, value, min, max));
    }
    Ok(())
}

/// The pbkdf2 hash and concrete digest length encoded in `options`.
fn pbkdf2_hash(options: &[u32; 3]) -> Result<(Hash, usize)> {
    let hash = u8::try_from(options[0])
        .ok()
        .and_then(Hash::from_id)
        .ok_or_else(|| {
            CryptError::invalid("key-derivation", format!("unknown pbkdf2 hash id {}", options[0]))
        })?;
    if !hash.supports_key() {
        return Err(CryptError::invalid(
            "key-derivation",
            format!("pbkdf2 cannot use {}", hash),
        ));
    }
    let len = digest::resolve_digest_length(hash, options[1] as usize)
        .map_err(|_| {
            CryptError::invalid(
                "key-derivation",
                format!("{} has no {}-bit variant", hash, u64::from(options[1]) * 8),
            )
        })?;
    Ok((hash, len))
}

/// Validates the tunables and salt length for the chosen algorithm.
pub fn check(key: &KeyOptions) -> Result<()> {
    let [a, b, c] = key.options;
    match key.algorithm {
        KeyDerivation::Pbkdf2 => {
            pbkdf2_hash(&key.options)?;
            check_range("iterations", c, 1, PBKDF2_MAX_ITERATIONS)
        }
        KeyDerivation::Bcrypt => {
            check_range("log2 rounds", a, 0, BCRYPT_MAX_LOG_ROUNDS)?;
            if key.salt_bytes != BCRYPT_SALT_BYTES {
                return Err(CryptError::invalid(
                    "salt",
                    format!("bcrypt requires a {}-byte salt", BCRYPT_SALT_BYTES),
                ));
            }
            Ok(())
        }
        KeyDerivation::Scrypt => {
            check_range("log2 N", a, 1, 20)?;
            check_range("r", b, 1, 64)?;
            check_range("p", c, 1, 16)
        }
    }
}

/// Short human description, e.g. `scrypt (N:2^14, r:8, p:1)`.
pub fn describe(key: &KeyOptions) -> String {
    let [a, b, c] = key.options;
    match key.algorithm {
        KeyDerivation::Pbkdf2 => match pbkdf2_hash(&key.options) {
            Ok((hash, len)) => format!("pbkdf2 ({}-{}, {} iterations)", hash, len * 8, c),
            Err(_) => format!("pbkdf2 (hash id {}, {} iterations)", a, c),
        },
        KeyDerivation::Bcrypt => format!("bcrypt (2^{} rounds)", a),
        KeyDerivation::Scrypt => format!("scrypt (N:2^{}, r:{}, p:{})", a, b, c),
    }
}

fn kdf_error(msg: impl Into<String>) -> CryptError {
    CryptError::new(ErrorCategory::Internal, ErrorKind::KdfFailure, msg)
}

/// Derives `out_len` bytes from `password` and `salt`.
pub fn derive(
    key: &KeyOptions,
    password: &[u8],
    salt: &[u8],
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    check(key)?;
    if salt.len() != key.salt_bytes {
        return Err(CryptError::internal(format!(
            "salt is {} bytes but {} were configured",
            salt.len(),
            key.salt_bytes
        )));
    }

    let mut out = Zeroizing::new(vec![0u8; out_len]);
    let [a, b, c] = key.options;
    debug!(algorithm = %key.algorithm, out_len, "deriving key");
    match key.algorithm {
        KeyDerivation::Pbkdf2 => {
            let (hash, len) = pbkdf2_hash(&key.options)?;
            digest::pbkdf2(hash, len, password, salt, c, &mut out)?;
        }
        KeyDerivation::Bcrypt => {
            let password = std::str::from_utf8(password).map_err(|e| {
                CryptError::with_source(
                    ErrorCategory::User,
                    ErrorKind::InvalidParameter,
                    "bcrypt requires a UTF-8 password",
                    e,
                )
            })?;
            bcrypt_pbkdf::bcrypt_pbkdf(password, salt, 1u32 << a, &mut out)
                .map_err(|e| kdf_error(format!("bcrypt key derivation failed: {}", e)))?;
        }
        KeyDerivation::Scrypt => {
            // The params length is only used for PHC strings; the output
            // length comes from the buffer.
            let params = Params::new(a as u8, b, c, Params::RECOMMENDED_LEN)
                .map_err(|e| kdf_error(format!("failed to create scrypt params: {}", e)))?;
            scrypt(password, salt, &params, &mut out)
                .map_err(|e| kdf_error(format!("scrypt key derivation failed: {}", e)))?;
        }
    }
    Ok(out)
}
