//! Parameter resolution
//!
//! Every field is filled from, in order of precedence, an explicitly
//! supplied value (command line flag or parsed header), an interactive
//! prompt (only when interaction is allowed and the field is still
//! missing), and finally the compiled-in default. Fields are resolved in a
//! fixed order because later fields depend on earlier ones:
//!
//! password, cipher, key derivation, tag (decryption only), iv, salt,
//! encoding, hmac, output file.
//!
//! Mini-grammars accepted for the textual parameters:
//! - cipher: `name[:keybits[:mode]]`, e.g. `camellia:256:cbc`
//! - key derivation: `pbkdf2[:hash[:bits[:iterations]]]`, `bcrypt[:log2rounds]`,
//!   `scrypt[:log2N[:r[:p]]]`
//! - encoding: `enc[:eol[:linelength[:uppercase]]]`, e.g. `base16:unix:64:true`
//! - iv: `random`, `zero`, `keyderivation` or custom data
//! - hmac / hash: `hash[:bits]`, e.g. `sha3:512`
//! - secrets and init data: `[(utf8|hex|base32|base64):]payload`

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::auth::{self, KeyPresetStore};
use crate::digest;
use crate::error::{CryptError, ErrorKind, Result};
use crate::header::ParsedHeader;
use crate::kdf;
use crate::options::{CryptOptions, EncodingOptions, Eol, HashOptions, HmacOptions, InitData, MAX_SALT_BYTES};
use crate::registry::{Cipher, Hash, IvPolicy, KeyDerivation, Mode};
use crate::userdata::{Encoding, UserData, set_user_data};

const PASSWORD_RETRIES: usize = 3;
const HMAC_KEY_RETRIES: usize = 2;
const INIT_DATA_RETRIES: usize = 2;

/// A secret handed over on the command line or through stdin.
pub enum SecretArg {
    /// Text that may carry an encoding prefix; plain text is taken as UTF-8.
    Text(Zeroizing<String>),
    /// Bytes taken verbatim.
    Raw(Zeroizing<Vec<u8>>),
}

impl SecretArg {
    /// Copies the secret into a `UserData`. Both sides wipe their buffers
    /// when dropped.
    fn to_user_data(&self) -> UserData {
        let mut data = UserData::new();
        match self {
            SecretArg::Text(text) => {
                set_user_data(text, &mut data, Encoding::Ascii);
            }
            SecretArg::Raw(bytes) => data.set_bytes(bytes),
        }
        data
    }
}

/// Explicitly supplied parameters, as they come from the command line or
/// the preferences file. `None` means "not given".
#[derive(Default)]
pub struct ParameterArgs {
    pub password: Option<SecretArg>,
    pub cipher: Option<String>,
    pub key_derivation: Option<String>,
    pub tag: Option<String>,
    pub iv: Option<String>,
    pub salt: Option<String>,
    pub encoding: Option<String>,
    pub hmac: Option<String>,
    pub hash_key: Option<SecretArg>,
    pub key_preset: Option<i32>,
    pub output: Option<PathBuf>,
}

/// A complete, validated parameter set for one operation.
#[derive(Debug)]
pub struct Resolved {
    pub options: CryptOptions,
    pub init: InitData,
    pub hmac: HmacOptions,
    pub password: UserData,
}

fn number<T: FromStr>(field: &'static str, what: &str, text: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| CryptError::invalid(field, format!("{} '{}' is not a valid number", what, text)))
}

/// Converts a bit count to bytes, rejecting counts that are not whole bytes.
fn bits_to_bytes(field: &'static str, text: &str) -> Result<usize> {
    let bits: usize = number(field, "bit length", text)?;
    if bits % 8 != 0 {
        return Err(CryptError::invalid(
            field,
            format!("bit length {} is not a multiple of 8", bits),
        ));
    }
    Ok(bits / 8)
}

/// Parses `name[:keybits[:mode]]` into cipher, key length in bytes and mode.
pub fn parse_cipher(spec: &str) -> Result<(Cipher, usize, Option<Mode>)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 3 {
        return Err(CryptError::invalid("cipher", format!("too many fields in '{}'", spec)));
    }
    let cipher = Cipher::from_name(parts[0])
        .ok_or_else(|| CryptError::invalid("cipher", format!("unknown cipher '{}'", parts[0])))?;

    let key_len = match parts.get(1) {
        Some(bits) => bits_to_bytes("cipher", bits)?,
        None => cipher.default_key_length(),
    };
    if !cipher.supports_key_length(key_len) {
        return Err(CryptError::invalid(
            "cipher",
            format!("{} does not support {}-bit keys", cipher, key_len * 8),
        ));
    }

    let mode = match parts.get(2) {
        None => cipher.default_mode(),
        Some(_) if cipher.is_stream() => {
            return Err(CryptError::invalid(
                "cipher",
                format!("{} is a stream cipher and takes no mode", cipher),
            ));
        }
        Some(name) => {
            let mode = Mode::from_name(name)
                .ok_or_else(|| CryptError::invalid("cipher", format!("unknown mode '{}'", name)))?;
            if !cipher.supports_mode(mode) {
                return Err(CryptError::invalid(
                    "cipher",
                    format!("{} does not support mode {}", cipher, mode),
                ));
            }
            Some(mode)
        }
    };
    Ok((cipher, key_len, mode))
}

/// Parses a key derivation spec. Omitted trailing options take the
/// algorithm's defaults; a pbkdf2 hash given without bits uses the hash's
/// default digest length (stored as 0).
pub fn parse_key_derivation(spec: &str) -> Result<(KeyDerivation, [u32; 3])> {
    let parts: Vec<&str> = spec.split(':').collect();
    let algorithm = KeyDerivation::from_name(parts[0]).ok_or_else(|| {
        CryptError::invalid("key-derivation", format!("unknown algorithm '{}'", parts[0]))
    })?;
    let mut options = kdf::default_options(algorithm);
    let args = &parts[1..];

    match algorithm {
        KeyDerivation::Pbkdf2 => {
            if args.len() > 3 {
                return Err(CryptError::invalid("key-derivation", "pbkdf2 takes at most 3 options"));
            }
            if let Some(name) = args.first() {
                let hash = Hash::from_name(name).filter(|hash| hash.supports_key()).ok_or_else(|| {
                    CryptError::invalid("key-derivation", format!("pbkdf2 cannot use hash '{}'", name))
                })?;
                options[0] = u32::from(hash.id());
                options[1] = 0;
                if let Some(bits) = args.get(1) {
                    let len = bits_to_bytes("key-derivation", bits)?;
                    digest::resolve_digest_length(hash, len)
                        .map_err(|e| CryptError::invalid("key-derivation", e.message().to_string()))?;
                    options[1] = len as u32;
                }
            }
            if let Some(iterations) = args.get(2) {
                options[2] = number("key-derivation", "iteration count", iterations)?;
            }
        }
        KeyDerivation::Bcrypt => {
            if args.len() > 1 {
                return Err(CryptError::invalid("key-derivation", "bcrypt takes at most 1 option"));
            }
            if let Some(rounds) = args.first() {
                options[0] = number("key-derivation", "log2 rounds", rounds)?;
            }
        }
        KeyDerivation::Scrypt => {
            if args.len() > 3 {
                return Err(CryptError::invalid("key-derivation", "scrypt takes at most 3 options"));
            }
            for (slot, (value, what)) in args.iter().zip(["log2 N", "r", "p"]).enumerate() {
                options[slot] = number("key-derivation", what, value)?;
            }
        }
    }
    Ok((algorithm, options))
}

/// Parses `enc[:eol[:linelength[:uppercase]]]`.
pub fn parse_encoding(spec: &str) -> Result<EncodingOptions> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 4 {
        return Err(CryptError::invalid("encoding", format!("too many fields in '{}'", spec)));
    }
    let mut encoding = EncodingOptions {
        enc: Encoding::from_name(parts[0])
            .ok_or_else(|| CryptError::invalid("encoding", format!("unknown encoding '{}'", parts[0])))?,
        ..EncodingOptions::default()
    };
    if let Some(eol) = parts.get(1) {
        encoding.eol = Eol::from_name(eol)
            .ok_or_else(|| CryptError::invalid("encoding", format!("unknown line ending '{}'", eol)))?;
    }
    if let Some(len) = parts.get(2) {
        encoding.line_length = number("encoding", "line length", len)?;
    }
    if let Some(upper) = parts.get(3) {
        encoding.uppercase = match *upper {
            "true" => true,
            "false" => false,
            other => {
                return Err(CryptError::invalid(
                    "encoding",
                    format!("uppercase must be 'true' or 'false', not '{}'", other),
                ));
            }
        };
    }
    Ok(encoding)
}

/// Parses `hash[:bits]` into a hash and a concrete digest length.
pub fn parse_hash(field: &'static str, spec: &str) -> Result<(Hash, usize)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 2 {
        return Err(CryptError::invalid(field, format!("too many fields in '{}'", spec)));
    }
    let hash = Hash::from_name(parts[0])
        .ok_or_else(|| CryptError::invalid(field, format!("unknown hash '{}'", parts[0])))?;
    let len = match parts.get(1) {
        Some(bits) => bits_to_bytes(field, bits)?,
        None => 0,
    };
    let len = digest::resolve_digest_length(hash, len)
        .map_err(|e| CryptError::invalid(field, e.message().to_string()))?;
    Ok((hash, len))
}

/// Parses an `--iv` value: one of the policy keywords, matched exactly and
/// case-sensitively, or custom IV data.
fn parse_iv(spec: &str) -> std::result::Result<IvPolicy, UserData> {
    match spec {
        "random" => Ok(IvPolicy::Random),
        "zero" => Ok(IvPolicy::Zero),
        "keyderivation" => Ok(IvPolicy::KeyDerivation),
        data => {
            let mut iv = UserData::new();
            set_user_data(data, &mut iv, Encoding::Base64);
            Err(iv)
        }
    }
}

/// Checks that `path` could be written without touching its content.
fn check_writable(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(CryptError::invalid(
            "output",
            format!("{} is a directory", path.display()),
        )),
        Ok(_) => fs::OpenOptions::new()
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| CryptError::io(format!("cannot write to {}", path.display()), e)),
        Err(_) => {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            match fs::metadata(parent) {
                Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(()),
                Ok(_) => Err(CryptError::invalid(
                    "output",
                    format!("cannot create files in {}", parent.display()),
                )),
                Err(e) => Err(CryptError::io(
                    format!("cannot write to {}", path.display()),
                    e,
                )),
            }
        }
    }
}

/// Fills in crypto parameters from explicit values, prompts and defaults.
pub struct Resolver<'a> {
    args: ParameterArgs,
    prompt: &'a mut dyn crate::prompt::Prompt,
    interactive: bool,
    presets: Option<&'a dyn KeyPresetStore>,
}

impl<'a> Resolver<'a> {
    pub fn new(args: ParameterArgs, prompt: &'a mut dyn crate::prompt::Prompt, interactive: bool) -> Self {
        Self {
            args,
            prompt,
            interactive,
            presets: None,
        }
    }

    pub fn with_presets(mut self, presets: &'a dyn KeyPresetStore) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Prompts for a missing mandatory `field`.
    fn ask(
        &mut self,
        field: &'static str,
        label: &str,
        encoding: Encoding,
        retries: usize,
        confirm: bool,
        echo: bool,
    ) -> Result<UserData> {
        if !self.interactive {
            return Err(CryptError::missing(field, "no value given and interaction is disabled"));
        }
        self.prompt
            .ask(label, encoding, retries, confirm, echo)
            .map_err(|mut e| {
                if e.kind == ErrorKind::MissingRequiredValue {
                    e.field.get_or_insert(field);
                }
                e
            })
    }

    /// Resolves the password. New passwords must be typed twice.
    pub fn password(&mut self, password: &mut UserData, confirm: bool) -> Result<()> {
        // Dropping the taken argument wipes it.
        if let Some(secret) = self.args.password.take() {
            *password = secret.to_user_data();
        }
        if password.is_empty() {
            *password = self.ask("password", "password", Encoding::Ascii, PASSWORD_RETRIES, confirm, false)?;
        }
        Ok(())
    }

    pub fn cipher(&self, options: &mut CryptOptions) -> Result<()> {
        if let Some(spec) = &self.args.cipher {
            let (cipher, key_len, mode) = parse_cipher(spec)?;
            options.cipher = cipher;
            options.key.length = key_len;
            options.mode = mode;
        }
        debug!(cipher = %options.cipher, key_len = options.key.length, "cipher resolved");
        Ok(())
    }

    pub fn key_derivation(&self, options: &mut CryptOptions) -> Result<()> {
        if let Some(spec) = &self.args.key_derivation {
            let (algorithm, kdf_options) = parse_key_derivation(spec)?;
            options.key.algorithm = algorithm;
            options.key.options = kdf_options;
        }
        kdf::check(&options.key).or_else(|e| {
            // The salt length is settled later.
            if e.field == Some("salt") { Ok(()) } else { Err(e) }
        })
    }

    /// Resolves the authentication tag of an AEAD mode. Does nothing for
    /// other modes.
    pub fn tag(&mut self, options: &CryptOptions, tag: &mut UserData) -> Result<()> {
        if !options.is_aead() {
            return Ok(());
        }
        if let Some(spec) = &self.args.tag {
            if !set_user_data(spec, tag, Encoding::Base64) {
                warn!("could not decode the given tag");
            }
        }
        if tag.is_empty() {
            *tag = self.ask("tag", "tag", Encoding::Base64, INIT_DATA_RETRIES, false, true)?;
        }
        Ok(())
    }

    pub fn iv(&mut self, options: &mut CryptOptions, iv: &mut UserData, decryption: bool) -> Result<()> {
        if let Some(spec) = &self.args.iv {
            match parse_iv(spec) {
                Ok(policy) => {
                    options.iv = policy;
                    if !policy.stores_iv() {
                        iv.clear();
                    }
                }
                Err(data) => {
                    options.iv = IvPolicy::Custom;
                    if data.is_empty() && !decryption {
                        return Err(CryptError::invalid("iv", "could not decode custom IV data"));
                    }
                    *iv = data;
                }
            }
        }
        if decryption && options.iv.stores_iv() && options.iv_len() > 0 && iv.is_empty() {
            *iv = self.ask("iv", "iv", Encoding::Base64, INIT_DATA_RETRIES, false, true)?;
        }
        Ok(())
    }

    /// Encryption: the salt flag is the number of salt bytes to generate.
    pub fn salt_length(&self, options: &mut CryptOptions) -> Result<()> {
        if let Some(spec) = &self.args.salt {
            let len: usize = number("salt", "salt length", spec)?;
            if len == 0 || len > MAX_SALT_BYTES {
                return Err(CryptError::invalid(
                    "salt",
                    format!("length must be between 1 and {} bytes", MAX_SALT_BYTES),
                ));
            }
            options.key.salt_bytes = len;
        }
        Ok(())
    }

    /// Decryption: the salt flag is the salt itself.
    pub fn salt(&mut self, options: &mut CryptOptions, salt: &mut UserData) -> Result<()> {
        if let Some(spec) = &self.args.salt {
            if !set_user_data(spec, salt, Encoding::Base64) {
                warn!("could not decode the given salt");
            }
        }
        if salt.is_empty() {
            *salt = self.ask("salt", "salt", Encoding::Base64, INIT_DATA_RETRIES, false, true)?;
        }
        options.key.salt_bytes = salt.len();
        Ok(())
    }

    pub fn encoding(&self, options: &mut CryptOptions) -> Result<()> {
        if let Some(spec) = &self.args.encoding {
            options.encoding = parse_encoding(spec)?;
        }
        Ok(())
    }

    /// Resolves the HMAC descriptor and its key.
    ///
    /// `--key-preset` alone enables HMAC with the default hash.
    pub fn hmac(&mut self, hmac: &mut HmacOptions, confirm: bool) -> Result<()> {
        if let Some(spec) = &self.args.hmac {
            let (hash, len) = parse_hash("hmac", spec)?;
            if !hash.supports_key() {
                return Err(CryptError::invalid("hmac", format!("{} cannot be keyed", hash)));
            }
            hmac.enable = true;
            hmac.hash.algorithm = hash;
            hmac.hash.digest_length = len;
            hmac.hash.use_key = true;
        }
        if let Some(id) = self.args.key_preset {
            hmac.enable = true;
            hmac.hash.use_key = true;
            hmac.keypreset_id = id;
        }
        if !hmac.enable {
            return Ok(());
        }
        if hmac.uses_preset() {
            return auth::load_preset_key(self.presets, hmac);
        }
        if let Some(secret) = self.args.hash_key.take() {
            hmac.hash.key = secret.to_user_data();
        }
        if hmac.hash.key.is_empty() {
            hmac.hash.key = self.ask("hmac", "HMAC key", Encoding::Ascii, HMAC_KEY_RETRIES, confirm, false)?;
        }
        Ok(())
    }

    pub fn output(&self) -> Result<()> {
        match &self.args.output {
            Some(path) => check_writable(path),
            None => Ok(()),
        }
    }

    /// Resolves the options of the hash action from `spec` and `--hash-key`.
    ///
    /// A key given for a hash that cannot be keyed is ignored with a warning.
    pub fn hash(&mut self, spec: &str) -> Result<HashOptions> {
        let (algorithm, digest_length) = parse_hash("hash", spec)?;
        let mut options = HashOptions {
            algorithm,
            digest_length,
            ..HashOptions::default()
        };
        if let Some(secret) = &self.args.hash_key {
            options.key = secret.to_user_data();
            if options.key.is_empty() {
                options.key = self.ask("hash-key", "key", Encoding::Ascii, HMAC_KEY_RETRIES, true, false)?;
            }
            options.use_key = true;
        }
        if options.use_key && !algorithm.supports_key() {
            warn!("{} does not support key input. ignoring --hash-key", algorithm);
            options.use_key = false;
            options.key.clear();
        }
        Ok(options)
    }

    /// Resolves everything needed to encrypt.
    pub fn resolve_encryption(mut self) -> Result<Resolved> {
        let mut options = CryptOptions::default();
        let mut init = InitData::default();
        let mut hmac = HmacOptions::default();
        let mut password = UserData::new();

        self.password(&mut password, true)?;
        self.cipher(&mut options)?;
        self.key_derivation(&mut options)?;
        self.iv(&mut options, &mut init.iv, false)?;
        self.salt_length(&mut options)?;
        self.encoding(&mut options)?;
        self.hmac(&mut hmac, true)?;
        self.output()?;
        options.validate()?;

        info!("options: {}", options);
        Ok(Resolved {
            options,
            init,
            hmac,
            password,
        })
    }

    /// Resolves everything needed to decrypt, starting from the parsed
    /// header if there is one.
    pub fn resolve_decryption(mut self, header: Option<&ParsedHeader<'_>>) -> Result<Resolved> {
        let (mut options, mut init, mut hmac) = match header {
            Some(parsed) => (parsed.options, parsed.init.clone(), parsed.hmac.clone()),
            None => (CryptOptions::default(), InitData::default(), HmacOptions::default()),
        };
        let mut password = UserData::new();

        self.password(&mut password, false)?;
        self.cipher(&mut options)?;
        self.key_derivation(&mut options)?;
        self.tag(&options, &mut init.tag)?;
        self.iv(&mut options, &mut init.iv, true)?;
        self.salt(&mut options, &mut init.salt)?;
        self.encoding(&mut options)?;
        self.hmac(&mut hmac, false)?;
        self.output()?;
        options.validate()?;

        info!("options: {}", options);
        Ok(Resolved {
            options,
            init,
            hmac,
            password,
        })
    }
}
