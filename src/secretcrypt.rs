//! Encryption/decryption for every registered cipher and mode
//!
//! The key (and, for the `keyderivation` IV policy, the IV) is derived from
//! the password with the configured KDF. Salt and random IVs are generated
//! on encryption when the caller has not supplied them; AEAD modes leave
//! their detached tag in [`InitData::tag`].
//!
//! Block modes without authentication (ecb, cbc) use PKCS#7 padding. cfb,
//! ofb, ctr and the stream ciphers produce ciphertext of the same length as
//! the plaintext.

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, Nonce, Tag};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use camellia::{Camellia128, Camellia192, Camellia256};
use ccm::Ccm;
use cipher::block_padding::Pkcs7;
use cipher::{
    AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
};
use eax::Eax;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::kdf;
use crate::options::{CryptOptions, InitData};
use crate::registry::{Cipher, IvPolicy, Mode};

fn cipher_error(msg: impl Into<String>) -> CryptError {
    CryptError::new(ErrorCategory::User, ErrorKind::CipherFailure, msg)
}

fn key_error<E>(_: E) -> CryptError {
    CryptError::internal("cipher rejected key or IV length")
}

fn unsupported(options: &CryptOptions) -> CryptError {
    CryptError::invalid("cipher", format!("unsupported combination {}", options))
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Runs `$body` with `$C` aliased to the block cipher selected by
/// cipher and key length.
macro_rules! with_block_cipher {
    ($options:expr, $C:ident => $body:expr) => {
        match ($options.cipher, $options.key.length) {
            (Cipher::Rijndael, 16) => {
                type $C = Aes128;
                $body
            }
            (Cipher::Rijndael, 24) => {
                type $C = Aes192;
                $body
            }
            (Cipher::Rijndael, 32) => {
                type $C = Aes256;
                $body
            }
            (Cipher::Camellia, 16) => {
                type $C = Camellia128;
                $body
            }
            (Cipher::Camellia, 24) => {
                type $C = Camellia192;
                $body
            }
            (Cipher::Camellia, 32) => {
                type $C = Camellia256;
                $body
            }
            _ => Err(unsupported($options)),
        }
    };
}

/// Runs `$body` with `$A` aliased to the AEAD selected by mode and key
/// length. Only rijndael offers AEAD modes.
macro_rules! with_aead {
    ($options:expr, $A:ident => $body:expr) => {
        match ($options.cipher, $options.mode, $options.key.length) {
            (Cipher::Rijndael, Some(Mode::Gcm), 16) => {
                type $A = Aes128Gcm;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Gcm), 24) => {
                type $A = AesGcm<Aes192, U12>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Gcm), 32) => {
                type $A = Aes256Gcm;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Ccm), 16) => {
                type $A = Ccm<Aes128, U16, U12>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Ccm), 24) => {
                type $A = Ccm<Aes192, U16, U12>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Ccm), 32) => {
                type $A = Ccm<Aes256, U16, U12>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Eax), 16) => {
                type $A = Eax<Aes128>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Eax), 24) => {
                type $A = Eax<Aes192>;
                $body
            }
            (Cipher::Rijndael, Some(Mode::Eax), 32) => {
                type $A = Eax<Aes256>;
                $body
            }
            _ => Err(unsupported($options)),
        }
    };
}

fn aead_nonce<A: AeadInPlace>(iv: &[u8]) -> Result<Nonce<A>> {
    GenericArray::from_exact_iter(iv.iter().copied())
        .ok_or_else(|| CryptError::internal("nonce length does not match the AEAD"))
}

fn aead_seal<A: AeadInPlace + KeyInit>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let aead = A::new_from_slice(key).map_err(key_error)?;
    let nonce = aead_nonce::<A>(iv)?;
    let mut buffer = data.to_vec();
    let tag = aead
        .encrypt_in_place_detached(&nonce, &[], &mut buffer)
        .map_err(|_| cipher_error("encryption failed"))?;
    Ok((buffer, tag.to_vec()))
}

fn aead_open<A: AeadInPlace + KeyInit>(key: &[u8], iv: &[u8], tag: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let aead = A::new_from_slice(key).map_err(key_error)?;
    let nonce = aead_nonce::<A>(iv)?;
    let tag: Tag<A> = GenericArray::from_exact_iter(tag.iter().copied())
        .ok_or_else(|| CryptError::invalid("tag", "length does not match the mode"))?;
    let mut buffer = data.to_vec();
    aead.decrypt_in_place_detached(&nonce, &[], &mut buffer, &tag)
        .map_err(|_| cipher_error("decryption failed; wrong password or corrupted data"))?;
    Ok(buffer)
}

fn block_encrypt(options: &CryptOptions, mode: Mode, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    with_block_cipher!(options, C => {
        let mut buffer = data.to_vec();
        match mode {
            Mode::Ecb => Ok(ecb::Encryptor::<C>::new_from_slice(key)
                .map_err(key_error)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)),
            Mode::Cbc => Ok(cbc::Encryptor::<C>::new_from_slices(key, iv)
                .map_err(key_error)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)),
            Mode::Cfb => {
                cfb_mode::Encryptor::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .encrypt(&mut buffer);
                Ok(buffer)
            }
            Mode::Ofb => {
                ofb::Ofb::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .apply_keystream(&mut buffer);
                Ok(buffer)
            }
            Mode::Ctr => {
                ctr::Ctr128BE::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .apply_keystream(&mut buffer);
                Ok(buffer)
            }
            _ => Err(unsupported(options)),
        }
    })
}

fn block_decrypt(options: &CryptOptions, mode: Mode, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bad_padding = |_| cipher_error("decryption failed; wrong password or corrupted data");
    with_block_cipher!(options, C => {
        let mut buffer = data.to_vec();
        match mode {
            Mode::Ecb => ecb::Decryptor::<C>::new_from_slice(key)
                .map_err(key_error)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(bad_padding),
            Mode::Cbc => cbc::Decryptor::<C>::new_from_slices(key, iv)
                .map_err(key_error)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(bad_padding),
            Mode::Cfb => {
                cfb_mode::Decryptor::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .decrypt(&mut buffer);
                Ok(buffer)
            }
            Mode::Ofb => {
                ofb::Ofb::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .apply_keystream(&mut buffer);
                Ok(buffer)
            }
            Mode::Ctr => {
                ctr::Ctr128BE::<C>::new_from_slices(key, iv)
                    .map_err(key_error)?
                    .apply_keystream(&mut buffer);
                Ok(buffer)
            }
            _ => Err(unsupported(options)),
        }
    })
}

/// Stream ciphers are their own inverse.
fn stream_apply(options: &CryptOptions, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = data.to_vec();
    match options.cipher {
        Cipher::Chacha20 => chacha20::ChaCha20::new_from_slices(key, iv)
            .map_err(key_error)?
            .apply_keystream(&mut buffer),
        Cipher::Salsa20 => salsa20::Salsa20::new_from_slices(key, iv)
            .map_err(key_error)?
            .apply_keystream(&mut buffer),
        _ => return Err(unsupported(options)),
    }
    Ok(buffer)
}

/// Derived key material, split into key and (optionally) IV.
struct Material {
    bytes: Zeroizing<Vec<u8>>,
    key_len: usize,
}

impl Material {
    fn derive(options: &CryptOptions, password: &[u8], salt: &[u8]) -> Result<Self> {
        let bytes = kdf::derive(&options.key, password, salt, options.kdf_output_len())?;
        Ok(Self {
            bytes,
            key_len: options.key.length,
        })
    }

    fn key(&self) -> &[u8] {
        &self.bytes[..self.key_len]
    }

    fn derived_iv(&self) -> &[u8] {
        &self.bytes[self.key_len..]
    }
}

/// The IV for the cipher under a policy that does not store it.
fn implicit_iv(options: &CryptOptions, material: &Material) -> Vec<u8> {
    match options.iv {
        IvPolicy::KeyDerivation => material.derived_iv().to_vec(),
        _ => vec![0u8; options.iv_len()],
    }
}

fn run_cipher(
    options: &CryptOptions,
    encrypting: bool,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    match options.mode {
        None => stream_apply(options, key, iv, data),
        Some(mode) if encrypting => block_encrypt(options, mode, key, iv, data),
        Some(mode) => block_decrypt(options, mode, key, iv, data),
    }
}

/// Encrypts `plaintext`, filling in missing salt/IV and the AEAD tag.
///
/// A salt already present in `init` must have `options.key.salt_bytes`
/// bytes. A present IV is reused under the `random` policy only when it has
/// the right length; under `custom` it must have the right length.
pub fn encrypt(
    options: &CryptOptions,
    password: &[u8],
    init: &mut InitData,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    options.validate()?;

    if init.salt.is_empty() {
        init.salt.set_bytes(&random_bytes(options.key.salt_bytes));
        debug!(len = options.key.salt_bytes, "generated salt");
    }
    let material = Material::derive(options, password, init.salt.as_bytes())?;

    let iv_len = options.iv_len();
    // ecb takes no IV, so no policy stores one for it.
    if iv_len == 0 || !options.iv.stores_iv() {
        init.iv.clear();
    } else if init.iv.len() != iv_len {
        if options.iv == IvPolicy::Custom {
            return Err(CryptError::invalid(
                "iv",
                format!("custom IV must be {} bytes, got {}", iv_len, init.iv.len()),
            ));
        }
        init.iv.set_bytes(&random_bytes(iv_len));
        debug!(len = iv_len, "generated IV");
    }
    let iv = if options.iv.stores_iv() {
        init.iv.as_bytes().to_vec()
    } else {
        implicit_iv(options, &material)
    };

    if options.is_aead() {
        let (ciphertext, tag) = with_aead!(options, A => aead_seal::<A>(material.key(), &iv, plaintext))?;
        init.tag.set_bytes(&tag);
        return Ok(ciphertext);
    }
    init.tag.clear();
    run_cipher(options, true, material.key(), &iv, plaintext)
}

/// Decrypts `ciphertext` using the salt, IV and tag carried in `init`.
pub fn decrypt(
    options: &CryptOptions,
    password: &[u8],
    init: &InitData,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    options.validate()?;

    if init.salt.is_empty() {
        return Err(CryptError::missing("salt", "decryption requires the salt"));
    }
    let material = Material::derive(options, password, init.salt.as_bytes())?;

    let iv_len = options.iv_len();
    let iv = if iv_len > 0 && options.iv.stores_iv() {
        if init.iv.is_empty() {
            return Err(CryptError::missing("iv", "decryption requires the IV"));
        }
        if init.iv.len() != iv_len {
            return Err(CryptError::invalid(
                "iv",
                format!("expected {} bytes, got {}", iv_len, init.iv.len()),
            ));
        }
        init.iv.as_bytes().to_vec()
    } else {
        implicit_iv(options, &material)
    };

    if options.is_aead() {
        if init.tag.is_empty() {
            return Err(CryptError::missing("tag", "authenticated modes require the tag"));
        }
        if init.tag.len() != options.tag_len() {
            return Err(CryptError::invalid(
                "tag",
                format!("expected {} bytes, got {}", options.tag_len(), init.tag.len()),
            ));
        }
        return with_aead!(options, A => aead_open::<A>(material.key(), &iv, init.tag.as_bytes(), ciphertext));
    }
    run_cipher(options, false, material.key(), &iv, ciphertext)
}
