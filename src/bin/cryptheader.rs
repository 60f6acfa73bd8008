//! cryptheader CLI - Password-based encryption with an embedded parameter header
//!
//! Encrypts and decrypts files or literal strings, computes hashes, and
//! updates encrypted files in place with their previous settings.

use clap::Parser;
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use cryptheader::config::Preferences;
use cryptheader::digest;
use cryptheader::error::{CryptError, Result};
use cryptheader::file_ops;
use cryptheader::header::{self, Decoded};
use cryptheader::options::EncodingOptions;
use cryptheader::prompt::{TerminalPrompt, read_secret};
use cryptheader::resolve::{self, ParameterArgs, Resolver, SecretArg};
use cryptheader::settings::MemorySettingsStore;
use cryptheader::userdata::Encoding;

/// Hashes listed when a file is hashed without `-a`.
const DEFAULT_FILE_HASHES: [&str; 5] = ["crc32", "md5", "sha1", "sha2:256", "sha3:256"];

/// Hash used for a literal string without `-a`.
const DEFAULT_STRING_HASH: &str = "md5";

#[derive(Parser)]
#[command(name = "cryptheader")]
#[command(version)]
#[command(about = "Password-based encryption with a self-describing parameter header.", long_about = None)]
struct Cli {
    /// Action (enc, dec, hash or update). A lone argument is hashed.
    #[arg(value_name = "ACTION")]
    first: String,

    /// File to read, or a literal string if no such file exists
    #[arg(value_name = "INPUT")]
    second: Option<String>,

    /// Hash algorithm for the hash action: hash[:bits]
    #[arg(short, long, value_name = "HASH")]
    algorithm: Option<String>,

    /// Password, optionally prefixed with hex:, base32:, base64: or utf8:
    #[arg(short, long, value_name = "PASSWORD", conflicts_with = "password_stdin")]
    password: Option<String>,

    /// Read the password from stdin instead of from the terminal
    #[arg(long)]
    password_stdin: bool,

    /// File to write the result to (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Cipher: name[:keybits[:mode]]
    #[arg(short, long, value_name = "CIPHER")]
    cipher: Option<String>,

    /// Key derivation: pbkdf2[:hash[:bits[:iterations]]], bcrypt[:log2rounds] or scrypt[:log2N[:r[:p]]]
    #[arg(short, long, value_name = "KDF")]
    key_derivation: Option<String>,

    /// Encoding: enc[:eol[:linelength[:uppercase]]]
    #[arg(short, long, value_name = "ENCODING")]
    encoding: Option<String>,

    /// Authentication tag (decryption without header)
    #[arg(short, long, value_name = "TAG")]
    tag: Option<String>,

    /// Salt length in bytes when encrypting; salt data when decrypting
    #[arg(short, long, value_name = "SALT")]
    salt: Option<String>,

    /// IV: random, zero, keyderivation or custom IV data
    #[arg(short = 'v', long, value_name = "IV")]
    iv: Option<String>,

    /// Authenticate header and ciphertext with an HMAC: hash[:bits]
    #[arg(long, value_name = "HASH")]
    hmac: Option<String>,

    /// Key for --hmac or for the hash action
    #[arg(long, value_name = "KEY")]
    hash_key: Option<String>,

    /// Use a configured key preset as HMAC key
    #[arg(long, value_name = "ID")]
    key_preset: Option<i32>,

    /// Emit only the ciphertext and print salt, IV and tag to stderr
    #[arg(long)]
    noheader: bool,

    /// Only print warnings and errors
    #[arg(long)]
    silent: bool,

    /// Never prompt; fail if a required value is missing
    #[arg(long)]
    auto: bool,

    /// Preferences file with defaults and key presets
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Encrypt,
    Decrypt,
    Hash,
    Update,
}

impl Action {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "enc" | "encrypt" => Some(Action::Encrypt),
            "dec" | "decrypt" => Some(Action::Decrypt),
            "hash" => Some(Action::Hash),
            "update" => Some(Action::Update),
            _ => None,
        }
    }
}

/// Input as given on the command line.
struct Input {
    data: Vec<u8>,
    path: Option<PathBuf>,
}

impl Input {
    fn load(arg: &str) -> Result<Self> {
        let path = Path::new(arg);
        if path.is_file() {
            debug!(path = %path.display(), "reading input file");
            Ok(Self {
                data: file_ops::read_file(path)?,
                path: Some(path.to_path_buf()),
            })
        } else {
            Ok(Self {
                data: arg.as_bytes().to_vec(),
                path: None,
            })
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.silent);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn init_logging(silent: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if silent { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_target(false)
                .without_time(),
        )
        .init();
}

/// Joins the messages of an error and its sources.
fn error_chain(err: &CryptError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !text.ends_with(&message) {
            text.push_str(": ");
            text.push_str(&message);
        }
        source = cause.source();
    }
    text
}

fn run(cli: Cli) -> Result<()> {
    let (action, input) = match (&cli.first, &cli.second) {
        (action, Some(input)) => {
            let action = Action::from_name(action).ok_or_else(|| {
                CryptError::invalid("action", format!("unknown action '{}'", action))
            })?;
            (action, input.clone())
        }
        (input, None) => (Action::Hash, input.clone()),
    };

    let prefs = match &cli.config {
        Some(path) => Preferences::load(path)?,
        None => Preferences::default(),
    };
    let presets = prefs.key_presets();
    let mut args = parameter_args(&cli)?;
    let mut prompt = TerminalPrompt::new();
    let interactive = !cli.auto;

    match action {
        Action::Encrypt => {
            if cli.noheader && (cli.hmac.is_some() || cli.key_preset.is_some()) {
                return Err(CryptError::invalid(
                    "hmac",
                    "an HMAC needs the header; it cannot be combined with --noheader",
                ));
            }
            prefs.apply_defaults(&mut args);
            if cli.noheader && args.hmac.take().is_some() {
                warn!("ignoring the configured HMAC default for output without header");
            }
            let input = Input::load(&input)?;
            let resolver = Resolver::new(args, &mut prompt, interactive).with_presets(&presets);
            let mut resolved = resolver.resolve_encryption()?;
            let output = file_ops::encrypt_bytes(&mut resolved, &input.data, !cli.noheader)?;
            if cli.noheader {
                for (name, data) in [
                    ("salt", &resolved.init.salt),
                    ("iv", &resolved.init.iv),
                    ("tag", &resolved.init.tag),
                ] {
                    if !data.is_empty() {
                        eprintln!("{}: {}", name, data.get(Encoding::Base64));
                    }
                }
            }
            write_output(cli.output.as_deref(), &output)
        }
        Action::Decrypt => {
            prefs.apply_input_defaults(&mut args);
            let input = Input::load(&input)?;
            let encoding = input_encoding(&args)?;
            let data = file_ops::unarmor(&input.data, &encoding)?;
            let decoded = header::decode(&data)?;
            let parsed = match &decoded {
                Decoded::Header(parsed) => Some(parsed),
                Decoded::NoHeader(_) => {
                    info!("no header found; parameters must be given explicitly");
                    None
                }
            };
            let resolver = Resolver::new(args, &mut prompt, interactive).with_presets(&presets);
            let resolved = resolver.resolve_decryption(parsed)?;
            let plaintext = Zeroizing::new(file_ops::decrypt_bytes(&resolved, &decoded)?);
            write_output(cli.output.as_deref(), &plaintext)
        }
        Action::Update => {
            prefs.apply_input_defaults(&mut args);
            let Some(crypt_path) = cli.output.clone() else {
                return Err(CryptError::missing("output", "update needs the encrypted file as -o"));
            };
            if !Path::new(&input).is_file() {
                return Err(CryptError::invalid(
                    "input",
                    format!("{} is not a file", input),
                ));
            }
            let encoding = input_encoding(&args)?;
            let mut store = MemorySettingsStore::new();
            let resolver = Resolver::new(args, &mut prompt, interactive).with_presets(&presets);
            file_ops::update_file(Path::new(&input), &crypt_path, &encoding, resolver, &mut store)?;
            info!("updated {}", crypt_path.display());
            Ok(())
        }
        Action::Hash => {
            let input = Input::load(&input)?;
            let encoding = match &args.encoding {
                Some(spec) => resolve::parse_encoding(spec)?,
                None => EncodingOptions {
                    enc: Encoding::Base16,
                    ..EncodingOptions::default()
                },
            };
            let specs: Vec<&str> = match (&cli.algorithm, &input.path) {
                (Some(spec), _) => vec![spec.as_str()],
                (None, Some(_)) => DEFAULT_FILE_HASHES.to_vec(),
                (None, None) => vec![DEFAULT_STRING_HASH],
            };
            let mut resolver = Resolver::new(args, &mut prompt, interactive);
            let mut lines = String::new();
            for spec in specs {
                let options = resolver.hash(spec)?;
                let value = if options.use_key {
                    digest::hmac(
                        options.algorithm,
                        options.digest_length,
                        options.key.as_bytes(),
                        &[input.data.as_slice()],
                    )?
                } else {
                    digest::digest(options.algorithm, options.digest_length, &[input.data.as_slice()])?
                };
                let mut text = encoding.enc.encode(&value);
                if encoding.uppercase && encoding.enc == Encoding::Base16 {
                    text.make_ascii_uppercase();
                }
                lines.push_str(&format!("{}: {}\n", options.label(), text));
            }
            write_output(cli.output.as_deref(), lines.as_bytes())
        }
    }
}

/// Armor of encrypted input: `-e` or the configured default, else base64.
fn input_encoding(args: &ParameterArgs) -> Result<EncodingOptions> {
    match &args.encoding {
        Some(spec) => resolve::parse_encoding(spec),
        None => Ok(EncodingOptions::default()),
    }
}

/// Collects the explicitly given parameters. Secrets move into wiping
/// buffers right away.
fn parameter_args(cli: &Cli) -> Result<ParameterArgs> {
    let password = if cli.password_stdin {
        Some(SecretArg::Raw(read_secret(&mut io::stdin())?))
    } else {
        cli.password
            .as_ref()
            .map(|text| SecretArg::Text(Zeroizing::new(text.clone())))
    };
    Ok(ParameterArgs {
        password,
        cipher: cli.cipher.clone(),
        key_derivation: cli.key_derivation.clone(),
        tag: cli.tag.clone(),
        iv: cli.iv.clone(),
        salt: cli.salt.clone(),
        encoding: cli.encoding.clone(),
        hmac: cli.hmac.clone(),
        hash_key: cli
            .hash_key
            .as_ref()
            .map(|text| SecretArg::Text(Zeroizing::new(text.clone()))),
        key_preset: cli.key_preset,
        output: cli.output.clone(),
    })
}

fn write_output(path: Option<&Path>, contents: &[u8]) -> Result<()> {
    match path {
        Some(path) => file_ops::write_file_secure(path, contents)
            .map_err(|e| e.with_context(format!("failed to write to {}", path.display()))),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(contents)
                .and_then(|()| stdout.flush())
                .map_err(|e| CryptError::io("failed to write to stdout", e))
        }
    }
}
