//! Golden test vector validation
//!
//! `golden-headers.json` pins the byte layout of sealed artifacts;
//! `golden-ciphertexts.json` pins the output of the cipher and key
//! derivation combinations for fixed salt and IV.

use serde::Deserialize;

use cryptheader::auth;
use cryptheader::header::{self, Decoded, ParsedHeader};
use cryptheader::options::{CryptOptions, HashOptions, HmacOptions, InitData, KeyOptions};
use cryptheader::registry::{Cipher, Hash, IvPolicy, KeyDerivation, Mode};
use cryptheader::resolve;
use cryptheader::secretcrypt;
use cryptheader::userdata::UserData;

#[derive(Debug, Deserialize)]
struct HmacVector {
    hash: String,
    bits: usize,
    key: String,
}

#[derive(Debug, Deserialize)]
struct HeaderVector {
    comment: String,
    cipher: String,
    key_bits: usize,
    mode: Option<String>,
    key_derivation: String,
    kdf_options: [u32; 3],
    iv_policy: String,
    salt: String,
    iv: String,
    tag: String,
    ciphertext: String,
    hmac: Option<HmacVector>,
    sealed: String,
}

#[derive(Debug, Deserialize)]
struct CipherVector {
    comment: String,
    cipher: String,
    key_derivation: String,
    iv: String,
    password: String,
    salt: String,
    iv_data: String,
    plaintext: String,
    ciphertext: String,
    tag: String,
}

fn load_header_vectors() -> Result<Vec<HeaderVector>, serde_json::Error> {
    serde_json::from_str(include_str!("../testdata/golden-headers.json"))
}

fn load_cipher_vectors() -> Result<Vec<CipherVector>, serde_json::Error> {
    serde_json::from_str(include_str!("../testdata/golden-ciphertexts.json"))
}

fn iv_policy(name: &str) -> IvPolicy {
    match name {
        "random" => IvPolicy::Random,
        "zero" => IvPolicy::Zero,
        "keyderivation" => IvPolicy::KeyDerivation,
        "custom" => IvPolicy::Custom,
        other => panic!("unknown IV policy {}", other),
    }
}

fn bytes(text: &str) -> UserData {
    UserData::from_bytes(&hex::decode(text).expect("invalid hex in vector"))
}

fn header_options(vector: &HeaderVector) -> CryptOptions {
    let algorithm = KeyDerivation::from_name(&vector.key_derivation).expect("unknown kdf");
    let mut key = KeyOptions::new(algorithm, vector.key_bits / 8);
    key.options = vector.kdf_options;
    let salt_len = vector.salt.len() / 2;
    if salt_len > 0 {
        key.salt_bytes = salt_len;
    }
    CryptOptions {
        cipher: Cipher::from_name(&vector.cipher).expect("unknown cipher"),
        mode: vector
            .mode
            .as_deref()
            .map(|name| Mode::from_name(name).expect("unknown mode")),
        key,
        iv: iv_policy(&vector.iv_policy),
        ..CryptOptions::default()
    }
}

fn header_hmac(vector: &HeaderVector) -> HmacOptions {
    match &vector.hmac {
        Some(hmac) => HmacOptions {
            enable: true,
            hash: HashOptions {
                algorithm: Hash::from_name(&hmac.hash).expect("unknown hash"),
                digest_length: hmac.bits / 8,
                use_key: true,
                key: UserData::from_bytes(hmac.key.as_bytes()),
            },
            keypreset_id: -1,
        },
        None => HmacOptions::default(),
    }
}

fn parse(input: &[u8]) -> ParsedHeader<'_> {
    match header::decode(input).expect("golden artifact must decode") {
        Decoded::Header(parsed) => parsed,
        Decoded::NoHeader(_) => panic!("golden artifact has no header"),
    }
}

#[test]
fn test_golden_headers() {
    let vectors = load_header_vectors().expect("failed to load golden headers");
    assert!(!vectors.is_empty(), "No golden vectors were tested");

    for (i, vector) in vectors.iter().enumerate() {
        let options = header_options(vector);
        let init = InitData {
            salt: bytes(&vector.salt),
            iv: bytes(&vector.iv),
            tag: bytes(&vector.tag),
        };
        let hmac = header_hmac(vector);
        let ciphertext = hex::decode(&vector.ciphertext).unwrap();

        let sealed = header::seal(&options, &init, &hmac, &ciphertext)
            .unwrap_or_else(|e| panic!("vector {} ({}): seal failed: {}", i, vector.comment, e));
        assert_eq!(
            hex::encode(&sealed),
            vector.sealed,
            "vector {} ({}): layout mismatch",
            i,
            vector.comment
        );

        let expected = hex::decode(&vector.sealed).unwrap();
        let parsed = parse(&expected);
        assert_eq!(parsed.options, options, "vector {}: options", i);
        assert_eq!(parsed.init, init, "vector {}: init data", i);
        assert_eq!(parsed.encrypted(), ciphertext.as_slice(), "vector {}: ciphertext", i);
        assert_eq!(parsed.hmac.enable, hmac.enable, "vector {}: hmac flag", i);
        if hmac.enable {
            assert!(auth::check_hmac(&parsed, &hmac), "vector {}: hmac", i);
        }
    }
}

/// The concrete scenario of a header authenticated with the key "secret".
#[test]
fn test_golden_hmac_keys() {
    let vectors = load_header_vectors().unwrap();
    let vector = vectors
        .iter()
        .find(|vector| vector.hmac.is_some())
        .expect("no authenticated vector");
    let sealed = hex::decode(&vector.sealed).unwrap();
    let parsed = parse(&sealed);

    let mut key = header_hmac(vector);
    assert!(parsed.check_hmac(&key));
    key.hash.key = UserData::from_bytes(b"wrong");
    assert!(!parsed.check_hmac(&key));
}

#[test]
fn test_golden_ciphertexts() {
    let vectors = load_cipher_vectors().expect("failed to load golden ciphertexts");
    assert!(!vectors.is_empty(), "No golden vectors were tested");

    for (i, vector) in vectors.iter().enumerate() {
        let (cipher, key_len, mode) = resolve::parse_cipher(&vector.cipher).unwrap();
        let (algorithm, kdf_options) = resolve::parse_key_derivation(&vector.key_derivation).unwrap();
        let mut key = KeyOptions::new(algorithm, key_len);
        key.options = kdf_options;
        key.salt_bytes = vector.salt.len() / 2;
        let options = CryptOptions {
            cipher,
            mode,
            key,
            iv: iv_policy(&vector.iv),
            ..CryptOptions::default()
        };
        let plaintext = hex::decode(&vector.plaintext).unwrap();

        let mut init = InitData {
            salt: bytes(&vector.salt),
            iv: bytes(&vector.iv_data),
            tag: UserData::new(),
        };
        let ciphertext = secretcrypt::encrypt(&options, vector.password.as_bytes(), &mut init, &plaintext)
            .unwrap_or_else(|e| panic!("vector {} ({}): encrypt failed: {}", i, vector.comment, e));
        assert_eq!(
            hex::encode(&ciphertext),
            vector.ciphertext,
            "vector {} ({}): ciphertext mismatch",
            i,
            vector.comment
        );
        assert_eq!(hex::encode(init.tag.as_bytes()), vector.tag, "vector {}: tag", i);

        let decrypted = secretcrypt::decrypt(&options, vector.password.as_bytes(), &init, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext, "vector {}: plaintext mismatch", i);
    }
}
