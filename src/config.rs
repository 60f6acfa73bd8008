//! Preferences file
//!
//! An optional TOML file supplies defaults for the parameter flags and the
//! list of HMAC key presets:
//!
//! ```toml
//! [defaults]
//! cipher = "camellia:256:cbc"
//! key_derivation = "pbkdf2:sha2:256:100000"
//! iv = "random"
//! encoding = "base64:unix:76"
//! hmac = "sha2:256"
//!
//! [[key_presets]]
//! label = "work"
//! key = "hex:0011223344"
//! ```
//!
//! Defaults use the same syntax as the flags and only apply where no flag
//! was given. Preset keys default to base64 unless prefixed.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::auth::{KeyPreset, MemoryKeyPresets};
use crate::error::{CryptError, Result};
use crate::resolve::{self, ParameterArgs};
use crate::userdata::{Encoding, UserData, set_user_data};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub cipher: Option<String>,
    pub key_derivation: Option<String>,
    pub iv: Option<String>,
    pub encoding: Option<String>,
    pub hmac: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetEntry {
    pub label: String,
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preferences {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub key_presets: Vec<PresetEntry>,
}

impl Preferences {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CryptError::io(format!("failed to read {}", path.display()), e))?;
        let prefs = Self::parse(&text)
            .map_err(|e| e.with_context(format!("failed to load {}", path.display())))?;
        debug!(path = %path.display(), presets = prefs.key_presets.len(), "loaded preferences");
        Ok(prefs)
    }

    /// Parses and checks a preferences document.
    pub fn parse(text: &str) -> Result<Self> {
        let prefs: Self = toml::from_str(text)
            .map_err(|e| CryptError::invalid("config", e.message().to_string()))?;
        prefs.check()?;
        Ok(prefs)
    }

    /// Rejects defaults that would fail once applied, so mistakes in the
    /// file are reported as such.
    fn check(&self) -> Result<()> {
        let defaults = &self.defaults;
        if let Some(spec) = &defaults.cipher {
            resolve::parse_cipher(spec)?;
        }
        if let Some(spec) = &defaults.key_derivation {
            resolve::parse_key_derivation(spec)?;
        }
        if let Some(spec) = &defaults.encoding {
            resolve::parse_encoding(spec)?;
        }
        if let Some(spec) = &defaults.hmac {
            resolve::parse_hash("hmac", spec)?;
        }
        for preset in &self.key_presets {
            let mut key = UserData::new();
            if !set_user_data(&preset.key, &mut key, Encoding::Base64) {
                return Err(CryptError::invalid(
                    "config",
                    format!("key preset '{}' has no usable key", preset.label),
                ));
            }
        }
        Ok(())
    }

    /// Fills parameters the command line left out.
    pub fn apply_defaults(&self, args: &mut ParameterArgs) {
        let defaults = &self.defaults;
        fill(&mut args.cipher, &defaults.cipher);
        fill(&mut args.key_derivation, &defaults.key_derivation);
        fill(&mut args.iv, &defaults.iv);
        fill(&mut args.encoding, &defaults.encoding);
        fill(&mut args.hmac, &defaults.hmac);
    }

    /// Decryption takes its parameters from the header; only the encoding
    /// of the input is filled in.
    pub fn apply_input_defaults(&self, args: &mut ParameterArgs) {
        fill(&mut args.encoding, &self.defaults.encoding);
    }

    pub fn key_presets(&self) -> MemoryKeyPresets {
        MemoryKeyPresets::new(
            self.key_presets
                .iter()
                .map(|preset| {
                    let mut key = UserData::new();
                    set_user_data(&preset.key, &mut key, Encoding::Base64);
                    KeyPreset {
                        label: preset.label.clone(),
                        key,
                    }
                })
                .collect(),
        )
    }
}

fn fill(slot: &mut Option<String>, default: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(default);
    }
}
