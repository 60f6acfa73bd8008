//! HMAC authentication of header and ciphertext
//!
//! The MAC covers the header (without the MAC itself) followed by the
//! ciphertext. Keys are either typed in directly or taken from an indexed
//! key preset store.

use tracing::{debug, warn};

use crate::digest;
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::header::ParsedHeader;
use crate::options::HmacOptions;
use crate::userdata::UserData;

/// Indexed store of HMAC keys.
pub trait KeyPresetStore {
    /// The key at `id`, or `None` when `id >= count()`.
    fn get_key(&self, id: usize) -> Option<UserData>;

    fn count(&self) -> usize;
}

/// A labelled key in a [`MemoryKeyPresets`] store.
#[derive(Debug, Clone)]
pub struct KeyPreset {
    pub label: String,
    pub key: UserData,
}

/// Key presets held in memory, typically loaded from the preferences file.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyPresets {
    presets: Vec<KeyPreset>,
}

impl MemoryKeyPresets {
    pub fn new(presets: Vec<KeyPreset>) -> Self {
        Self { presets }
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.presets.get(id).map(|preset| preset.label.as_str())
    }
}

impl KeyPresetStore for MemoryKeyPresets {
    fn get_key(&self, id: usize) -> Option<UserData> {
        self.presets.get(id).map(|preset| preset.key.clone())
    }

    fn count(&self) -> usize {
        self.presets.len()
    }
}

fn out_of_range(id: i32, count: usize) -> CryptError {
    CryptError::new(
        ErrorCategory::User,
        ErrorKind::KeyPresetOutOfRange,
        format!("key preset {} does not exist ({} configured)", id, count),
    )
}

/// Loads the key for a preset reference into `hmac.hash.key`.
///
/// Does nothing for a direct key (`keypreset_id < 0`). An id beyond the
/// store, or a missing store, is a `KeyPresetOutOfRange` error.
pub fn load_preset_key(store: Option<&dyn KeyPresetStore>, hmac: &mut HmacOptions) -> Result<()> {
    if !hmac.uses_preset() {
        return Ok(());
    }
    let count = store.map_or(0, |store| store.count());
    let key = usize::try_from(hmac.keypreset_id)
        .ok()
        .and_then(|id| store.and_then(|store| store.get_key(id)))
        .filter(|key| !key.is_empty())
        .ok_or_else(|| out_of_range(hmac.keypreset_id, count))?;
    debug!(id = hmac.keypreset_id, "using key preset");
    hmac.hash.key = key;
    hmac.hash.use_key = true;
    Ok(())
}

/// Computes the MAC over `parts` with the key in `hmac`.
pub fn compute(hmac: &HmacOptions, parts: &[&[u8]]) -> Result<Vec<u8>> {
    if hmac.hash.key.is_empty() {
        return Err(CryptError::missing("hmac", "no key to compute the MAC with"));
    }
    digest::hmac(
        hmac.hash.algorithm,
        hmac.hash.digest_length,
        hmac.hash.key.as_bytes(),
        parts,
    )
}

/// Recomputes the MAC of a parsed header and compares it in constant time.
///
/// The algorithm comes from the header; the key from `hmac`. Returns
/// `false` on mismatch, on a missing key and when the header carries no MAC.
pub fn check_hmac(parsed: &ParsedHeader<'_>, hmac: &HmacOptions) -> bool {
    if !parsed.hmac.enable {
        return false;
    }
    if hmac.hash.key.is_empty() {
        warn!("no HMAC key available; cannot authenticate");
        return false;
    }
    let stored = &parsed.hmac.hash;
    digest::verify_hmac(
        stored.algorithm,
        stored.digest_length,
        hmac.hash.key.as_bytes(),
        &parsed.authenticated(),
        parsed.mac(),
    )
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{self, Decoded};
    use crate::options::{CryptOptions, HashOptions, InitData};

    fn keyed(key: &[u8]) -> HmacOptions {
        HmacOptions {
            enable: true,
            hash: HashOptions {
                use_key: true,
                key: UserData::from_bytes(key),
                ..HashOptions::default()
            },
            keypreset_id: -1,
        }
    }

    fn sealed(hmac: &HmacOptions) -> Vec<u8> {
        let mut options = CryptOptions::default();
        options.key.options = [10, 8, 1];
        let init = InitData {
            salt: UserData::from_bytes(&[5; 16]),
            iv: UserData::from_bytes(&[6; 12]),
            tag: UserData::from_bytes(&[7; 16]),
        };
        header::seal(&options, &init, hmac, b"some ciphertext").unwrap()
    }

    fn parse(input: &[u8]) -> ParsedHeader<'_> {
        match header::decode(input).unwrap() {
            Decoded::Header(parsed) => parsed,
            Decoded::NoHeader(_) => panic!("expected a header"),
        }
    }

    #[test]
    fn test_correct_key_verifies() {
        let blob = sealed(&keyed(b"secret"));
        let parsed = parse(&blob);
        assert!(check_hmac(&parsed, &keyed(b"secret")));
        assert!(parsed.check_hmac(&keyed(b"secret")));
    }

    #[test]
    fn test_wrong_or_missing_key_fails() {
        let blob = sealed(&keyed(b"secret"));
        let parsed = parse(&blob);
        assert!(!check_hmac(&parsed, &keyed(b"wrong")));
        assert!(!check_hmac(&parsed, &keyed(b"")));
    }

    #[test]
    fn test_mac_covers_header_and_ciphertext() {
        let hmac = keyed(b"secret");
        let blob = sealed(&hmac);
        let parsed = parse(&blob);
        let expected = compute(&hmac, &parsed.authenticated()).unwrap();
        assert_eq!(expected, parsed.mac());

        let mut joined = parsed.header_bytes().to_vec();
        joined.extend_from_slice(parsed.encrypted());
        assert_eq!(compute(&hmac, &[joined.as_slice()]).unwrap(), expected);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut blob = sealed(&keyed(b"secret"));
        let position = blob.len() - 40;
        blob[position] ^= 0x01;
        let parsed = parse(&blob);
        assert!(!check_hmac(&parsed, &keyed(b"secret")));
    }

    #[test]
    fn test_preset_lookup() {
        let store = MemoryKeyPresets::new(vec![
            KeyPreset {
                label: "work".into(),
                key: UserData::from_bytes(b"k0"),
            },
            KeyPreset {
                label: "home".into(),
                key: UserData::from_bytes(b"k1"),
            },
        ]);
        let mut hmac = HmacOptions {
            enable: true,
            keypreset_id: 1,
            ..HmacOptions::default()
        };
        load_preset_key(Some(&store as &dyn KeyPresetStore), &mut hmac).unwrap();
        assert_eq!(hmac.hash.key.as_bytes(), b"k1");
        assert_eq!(store.label(1), Some("home"));

        hmac.keypreset_id = 2;
        let err = load_preset_key(Some(&store as &dyn KeyPresetStore), &mut hmac).unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeyPresetOutOfRange);

        let err = load_preset_key(None, &mut hmac).unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeyPresetOutOfRange);
    }

    #[test]
    fn test_direct_key_ignores_store() {
        let mut hmac = keyed(b"direct");
        load_preset_key(None, &mut hmac).unwrap();
        assert_eq!(hmac.hash.key.as_bytes(), b"direct");
    }
}
