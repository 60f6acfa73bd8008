//! cryptheader - Password-based encryption into self-describing blobs
//!
//! Everything needed to decrypt (cipher, mode, key derivation, salt, IV,
//! tag and an optional HMAC descriptor) travels in a binary header in
//! front of the ciphertext.

#![forbid(unsafe_code)]

pub mod armor;
pub mod auth;
pub mod config;
pub mod digest;
pub mod error;
pub mod file_ops;
pub mod header;
pub mod kdf;
pub mod options;
pub mod prompt;
pub mod registry;
pub mod resolve;
pub mod secretcrypt;
pub mod settings;
pub mod userdata;
