//! Encryption, decryption and in-place update of byte buffers and files
//!
//! These functions tie the pieces together: parameter resolution, the
//! cipher, the header codec, HMAC authentication and armoring.

use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::armor;
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::header::{self, Decoded};
use crate::options::{EncodingOptions, InitData};
use crate::resolve::{Resolved, Resolver};
use crate::secretcrypt;
use crate::settings::{CryptSettings, SettingsStore};
use crate::userdata::Encoding;

/// Removes the text armor from `input`.
///
/// Input that starts with the header marker is binary already and is
/// returned as is, whatever `encoding` says.
pub fn unarmor<'a>(input: &'a [u8], encoding: &EncodingOptions) -> Result<Cow<'a, [u8]>> {
    if input.first() == Some(&header::MARKER) || encoding.enc == Encoding::Ascii {
        return Ok(Cow::Borrowed(input));
    }
    armor::unwrap(input, encoding)
        .map(Cow::Owned)
        .map_err(|e| e.with_context("failed to remove armor"))
}

/// Encrypts `plaintext` with resolved parameters and returns the armored
/// artifact.
///
/// Salt, IV and tag produced along the way are left in `resolved.init`.
/// Without `with_header` only the ciphertext is emitted, and the caller is
/// responsible for handing out the init data.
pub fn encrypt_bytes(resolved: &mut Resolved, plaintext: &[u8], with_header: bool) -> Result<Vec<u8>> {
    if !with_header && resolved.hmac.enable {
        return Err(CryptError::invalid("hmac", "an HMAC cannot be emitted without the header"));
    }
    let ciphertext = secretcrypt::encrypt(
        &resolved.options,
        resolved.password.as_bytes(),
        &mut resolved.init,
        plaintext,
    )
    .map_err(|e| e.with_context("encryption failed"))?;

    let blob = if with_header {
        header::seal(&resolved.options, &resolved.init, &resolved.hmac, &ciphertext)?
    } else {
        ciphertext
    };
    Ok(armor::wrap(&blob, &resolved.options.encoding))
}

/// Authenticates and decrypts a decoded input.
///
/// When the header declares an HMAC it is verified first; on failure the
/// cipher is never run.
pub fn decrypt_bytes(resolved: &Resolved, decoded: &Decoded<'_>) -> Result<Vec<u8>> {
    let ciphertext = match decoded {
        Decoded::Header(parsed) => {
            if parsed.hmac.enable {
                if !parsed.check_hmac(&resolved.hmac) {
                    return Err(CryptError::new(
                        ErrorCategory::User,
                        ErrorKind::AuthenticationFailed,
                        "HMAC verification failed: wrong key or tampered data",
                    ));
                }
                info!("HMAC verified");
            }
            parsed.encrypted()
        }
        Decoded::NoHeader(data) => *data,
    };
    secretcrypt::decrypt(
        &resolved.options,
        resolved.password.as_bytes(),
        &resolved.init,
        ciphertext,
    )
    .map_err(|e| e.with_context("decryption failed"))
}

/// Replaces the content of the encrypted file at `crypt_path` with the
/// content of `plain_path`, encrypted the way the existing file was.
///
/// The existing file is decrypted first, which validates the password and
/// HMAC key and prevents changing them by accident. Its settings go through
/// `store`; only salt and IV are generated anew. The file is replaced
/// atomically. `encoding` describes the armor of the existing file.
pub fn update_file(
    plain_path: &Path,
    crypt_path: &Path,
    encoding: &EncodingOptions,
    resolver: Resolver<'_>,
    store: &mut dyn SettingsStore,
) -> Result<()> {
    let existing = read_file(crypt_path)?;
    let was_binary = existing.first() == Some(&header::MARKER);
    let data = unarmor(&existing, encoding)?;
    let decoded = header::decode(&data)?;
    let parsed = match &decoded {
        Decoded::Header(parsed) => parsed,
        Decoded::NoHeader(_) => {
            return Err(CryptError::invalid(
                "output",
                format!("{} has no parameter header to update from", crypt_path.display()),
            ));
        }
    };

    let mut resolved = resolver.resolve_decryption(Some(parsed))?;
    drop(Zeroizing::new(decrypt_bytes(&resolved, &decoded)?));

    let mut options = resolved.options;
    if was_binary {
        options.encoding.enc = Encoding::Ascii;
    }
    store.remember(
        crypt_path,
        CryptSettings {
            options,
            hmac: resolved.hmac.clone(),
        },
    );
    let settings = store
        .recall(crypt_path)
        .cloned()
        .ok_or_else(|| CryptError::internal("settings vanished from the store"))?;

    resolved.options = settings.options;
    resolved.hmac = settings.hmac;
    resolved.init = InitData::default();

    let plaintext = read_file(plain_path)?;
    let armored = encrypt_bytes(&mut resolved, &plaintext, true)?;
    write_file_atomic(crypt_path, &armored)?;
    debug!(path = %crypt_path.display(), "updated encrypted file");
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| CryptError::io(format!("failed to read from {}", path.display()), e))
}

/// Write file with secure permissions (0o600 on Unix)
pub fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| CryptError::io(format!("failed to open {}", path.display()), e))?;

        file.write_all(contents)
            .map_err(|e| CryptError::io(format!("failed to write {}", path.display()), e))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .map_err(|e| CryptError::io(format!("failed to write {}", path.display()), e))
    }
}

/// Replaces `path` with `contents` via tempfile + fsync + rename, so that
/// either the old or the new file exists, never a partial one.
fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| CryptError::io("failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| CryptError::io("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| CryptError::io("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| CryptError::io("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| CryptError::io("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| CryptError::io("failed to set tempfile permissions", e))?;
    }
    temp_file.persist(path).map_err(|e| {
        CryptError::io(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CryptOptions, HmacOptions};
    use crate::prompt::ScriptedPrompt;
    use crate::registry::{Cipher, Mode};
    use crate::resolve::{ParameterArgs, SecretArg};
    use crate::settings::MemorySettingsStore;
    use crate::userdata::UserData;
    use tempfile::TempDir;
    use zeroize::Zeroizing;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn args(password: &str) -> ParameterArgs {
        ParameterArgs {
            password: Some(SecretArg::Text(Zeroizing::new(password.to_string()))),
            key_derivation: Some("scrypt:4".into()),
            ..ParameterArgs::default()
        }
    }

    fn encrypt(args: ParameterArgs, plaintext: &[u8]) -> Vec<u8> {
        let mut prompt = ScriptedPrompt::default();
        let mut resolved = Resolver::new(args, &mut prompt, false).resolve_encryption().unwrap();
        encrypt_bytes(&mut resolved, plaintext, true).unwrap()
    }

    fn decrypt(args: ParameterArgs, armored: &[u8]) -> Result<Vec<u8>> {
        let data = unarmor(armored, &EncodingOptions::default())?;
        let decoded = header::decode(&data)?;
        let parsed = match &decoded {
            Decoded::Header(parsed) => Some(parsed),
            Decoded::NoHeader(_) => None,
        };
        let mut prompt = ScriptedPrompt::default();
        let resolved = Resolver::new(args, &mut prompt, false).resolve_decryption(parsed)?;
        decrypt_bytes(&resolved, &decoded)
    }

    #[test]
    fn test_hello_world_roundtrip() {
        let armored = encrypt(args("test"), b"hello world");
        let data = unarmor(&armored, &EncodingOptions::default()).unwrap();
        let Decoded::Header(parsed) = header::decode(&data).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(parsed.options.cipher, Cipher::Rijndael);
        assert_eq!(parsed.options.mode, Some(Mode::Gcm));
        assert_eq!(parsed.init.salt.len(), 16);
        assert_eq!(parsed.init.iv.len(), 12);
        assert_eq!(parsed.init.tag.len(), 16);
        assert!(!parsed.hmac.enable);

        assert_eq!(decrypt(args("test"), &armored).unwrap(), b"hello world");
    }

    #[test]
    fn test_wrong_password_fails() {
        let armored = encrypt(args("correct"), b"secret");
        let err = decrypt(args("wrong"), &armored).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CipherFailure);
    }

    #[test]
    fn test_hmac_gate() {
        let keyed = |key: &str| ParameterArgs {
            hmac: Some("sha2:256".into()),
            hash_key: Some(SecretArg::Text(Zeroizing::new(key.to_string()))),
            ..args("test")
        };
        let armored = encrypt(keyed("secret"), b"payload");
        assert_eq!(decrypt(keyed("secret"), &armored).unwrap(), b"payload");

        let err = decrypt(keyed("wrong"), &armored).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_no_header_needs_explicit_init_data() {
        // Raw ciphertext that happens to start with the marker byte would
        // be taken for a header.
        let (armored, init) = loop {
            let mut prompt = ScriptedPrompt::default();
            let mut resolved = Resolver::new(args("test"), &mut prompt, false)
                .resolve_encryption()
                .unwrap();
            let armored = encrypt_bytes(&mut resolved, b"bare", false).unwrap();
            let raw = unarmor(&armored, &EncodingOptions::default()).unwrap();
            if raw[0] != header::MARKER {
                break (armored, resolved.init.clone());
            }
        };

        let explicit = ParameterArgs {
            salt: Some(init.salt.get(Encoding::Base64)),
            iv: Some(init.iv.get(Encoding::Base64)),
            tag: Some(init.tag.get(Encoding::Base64)),
            ..args("test")
        };
        assert_eq!(decrypt(explicit, &armored).unwrap(), b"bare");

        let err = decrypt(args("test"), &armored).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredValue);
    }

    #[test]
    fn test_hmac_requires_header() {
        let keyed = ParameterArgs {
            hmac: Some("sha2:256".into()),
            hash_key: Some(SecretArg::Text(Zeroizing::new("secret".to_string()))),
            ..args("test")
        };
        let mut prompt = ScriptedPrompt::default();
        let mut resolved = Resolver::new(keyed, &mut prompt, false).resolve_encryption().unwrap();
        let err = encrypt_bytes(&mut resolved, b"payload", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert_eq!(err.field, Some("hmac"));
    }

    #[test]
    fn test_binary_output_is_recognized() {
        let ascii = ParameterArgs {
            encoding: Some("ascii".into()),
            ..args("test")
        };
        let blob = encrypt(ascii, b"raw");
        assert_eq!(blob[0], header::MARKER);
        assert_eq!(decrypt(args("test"), &blob).unwrap(), b"raw");
    }

    #[test]
    fn test_update_file_keeps_settings() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("crypt.txt");

        let camellia = ParameterArgs {
            cipher: Some("camellia:128".into()),
            ..args("test")
        };
        write_file_secure(&crypt_path, &encrypt(camellia, b"Initial content")).unwrap();
        let before = fs::read(&crypt_path).unwrap();

        fs::write(&plain_path, b"Updated content").unwrap();
        let mut store = MemorySettingsStore::new();
        let mut prompt = ScriptedPrompt::default();
        let resolver = Resolver::new(args("test"), &mut prompt, false);
        update_file(&plain_path, &crypt_path, &EncodingOptions::default(), resolver, &mut store).unwrap();

        let after = fs::read(&crypt_path).unwrap();
        assert_ne!(before, after);
        assert_eq!(decrypt(args("test"), &after).unwrap(), b"Updated content");

        let remembered = store.recall(&crypt_path).unwrap();
        assert_eq!(remembered.options.cipher, Cipher::Camellia);
        assert_eq!(remembered.options.key.length, 16);
        assert_eq!(remembered.hmac, HmacOptions::default());
    }

    #[test]
    fn test_update_reads_the_given_encoding() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("crypt.txt");
        let base16 = || ParameterArgs {
            encoding: Some("base16".into()),
            ..args("test")
        };
        let encoding = EncodingOptions {
            enc: Encoding::Base16,
            ..EncodingOptions::default()
        };

        write_file_secure(&crypt_path, &encrypt(base16(), b"one")).unwrap();
        fs::write(&plain_path, b"two").unwrap();
        let mut store = MemorySettingsStore::new();
        let mut prompt = ScriptedPrompt::default();
        let resolver = Resolver::new(base16(), &mut prompt, false);
        update_file(&plain_path, &crypt_path, &encoding, resolver, &mut store).unwrap();

        let after = fs::read(&crypt_path).unwrap();
        assert!(after.iter().all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace()));
        let data = unarmor(&after, &encoding).unwrap();
        let decoded = header::decode(&data).unwrap();
        let Decoded::Header(parsed) = &decoded else {
            panic!("expected a header");
        };
        let mut prompt = ScriptedPrompt::default();
        let resolved = Resolver::new(base16(), &mut prompt, false)
            .resolve_decryption(Some(parsed))
            .unwrap();
        assert_eq!(decrypt_bytes(&resolved, &decoded).unwrap(), b"two");
    }

    #[test]
    fn test_update_with_wrong_password_fails() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("crypt.txt");

        write_file_secure(&crypt_path, &encrypt(args("correct"), b"Initial")).unwrap();
        let before = fs::read(&crypt_path).unwrap();
        fs::write(&plain_path, b"Updated").unwrap();

        let mut store = MemorySettingsStore::new();
        let mut prompt = ScriptedPrompt::default();
        let resolver = Resolver::new(args("wrong"), &mut prompt, false);
        let err = update_file(&plain_path, &crypt_path, &EncodingOptions::default(), resolver, &mut store)
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::CipherFailure);
        assert!(store.is_empty());
        assert_eq!(fs::read(&crypt_path).unwrap(), before);
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let crypt_path = temp_dir.path().join("crypt.txt");
        write_file_secure(&crypt_path, b"data").unwrap();

        let metadata = fs::metadata(&crypt_path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

        write_file_atomic(&crypt_path, b"other").unwrap();
        let metadata = fs::metadata(&crypt_path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        assert_eq!(fs::read(&crypt_path).unwrap(), b"other");
    }

    #[test]
    fn test_empty_plaintext() {
        let armored = encrypt(args("test"), b"");
        assert_eq!(decrypt(args("test"), &armored).unwrap(), b"");
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_file(&temp_dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_defaults_match_resolved_defaults() {
        let mut prompt = ScriptedPrompt::default();
        let resolved = Resolver::new(
            ParameterArgs {
                password: Some(SecretArg::Raw(Zeroizing::new(b"x".to_vec()))),
                ..ParameterArgs::default()
            },
            &mut prompt,
            false,
        )
        .resolve_encryption()
        .unwrap();
        assert_eq!(resolved.options, CryptOptions::default());
        assert_eq!(resolved.password, UserData::from_bytes(b"x"));
    }
}
