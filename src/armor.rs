//! Text armoring of the final artifact
//!
//! Renders bytes according to an [`EncodingOptions`] descriptor (encoding,
//! line ending, line length, letter case) and reads such text back. The
//! `ascii` encoding passes raw bytes through untouched.

use crate::error::{CryptError, Result};
use crate::options::EncodingOptions;
use crate::userdata::Encoding;

/// Encodes `body` for output.
pub fn wrap(body: &[u8], encoding: &EncodingOptions) -> Vec<u8> {
    if encoding.enc == Encoding::Ascii {
        return body.to_vec();
    }
    let mut text = encoding.enc.encode(body);
    // base64 is case sensitive; base32 is uppercase already.
    if encoding.uppercase && encoding.enc == Encoding::Base16 {
        text.make_ascii_uppercase();
    }
    if encoding.line_length == 0 || text.len() <= encoding.line_length {
        return text.into_bytes();
    }

    let eol = encoding.eol.as_str();
    let mut out = Vec::with_capacity(text.len() + text.len() / encoding.line_length * eol.len());
    for (index, line) in text.as_bytes().chunks(encoding.line_length).enumerate() {
        if index > 0 {
            out.extend_from_slice(eol.as_bytes());
        }
        out.extend_from_slice(line);
    }
    out
}

/// Decodes armored input, ignoring any whitespace.
pub fn unwrap(armored: &[u8], encoding: &EncodingOptions) -> Result<Vec<u8>> {
    if encoding.enc == Encoding::Ascii {
        return Ok(armored.to_vec());
    }
    let compact: Vec<u8> = armored
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Ok(Vec::new());
    }
    encoding.enc.decode(&compact).ok_or_else(|| {
        CryptError::invalid(
            "encoding",
            format!("input is not valid {}", encoding.enc),
        )
    })
}
