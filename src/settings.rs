//! Remembered encryption settings per file
//!
//! When an encrypted file is opened, the settings it was protected with are
//! remembered under its path so that saving new content later can reuse
//! them. The store lives for a single process and is only touched from the
//! thread that owns it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::options::{CryptOptions, HmacOptions};

/// Settings needed to re-encrypt a file the way it was encrypted before.
///
/// Salt and IV are not part of it; they are generated fresh on every save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptSettings {
    pub options: CryptOptions,
    pub hmac: HmacOptions,
}

/// Maps a file path to the settings it was last encrypted with.
pub trait SettingsStore {
    fn remember(&mut self, path: &Path, settings: CryptSettings);

    fn recall(&self, path: &Path) -> Option<&CryptSettings>;

    /// Drops the entry for `path`, returning it if there was one.
    fn forget(&mut self, path: &Path) -> Option<CryptSettings>;
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: HashMap<PathBuf, CryptSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn remember(&mut self, path: &Path, settings: CryptSettings) {
        debug!(path = %path.display(), "remembering encryption settings");
        self.entries.insert(path.to_path_buf(), settings);
    }

    fn recall(&self, path: &Path) -> Option<&CryptSettings> {
        self.entries.get(path)
    }

    fn forget(&mut self, path: &Path) -> Option<CryptSettings> {
        self.entries.remove(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Cipher, Mode};

    fn settings(cipher: Cipher, mode: Option<Mode>) -> CryptSettings {
        CryptSettings {
            options: CryptOptions {
                cipher,
                mode,
                ..CryptOptions::default()
            },
            hmac: HmacOptions::default(),
        }
    }

    #[test]
    fn test_remember_and_recall() {
        let mut store = MemorySettingsStore::new();
        let path = Path::new("/tmp/notes.txt");
        assert!(store.recall(path).is_none());

        store.remember(path, settings(Cipher::Camellia, Some(Mode::Cbc)));
        assert_eq!(store.recall(path).unwrap().options.cipher, Cipher::Camellia);
        assert!(store.recall(Path::new("/tmp/other.txt")).is_none());
    }

    #[test]
    fn test_remember_replaces() {
        let mut store = MemorySettingsStore::new();
        let path = Path::new("a");
        store.remember(path, settings(Cipher::Camellia, Some(Mode::Cbc)));
        store.remember(path, settings(Cipher::Chacha20, None));
        assert_eq!(store.len(), 1);
        assert_eq!(store.recall(path).unwrap().options.cipher, Cipher::Chacha20);
    }

    #[test]
    fn test_forget() {
        let mut store = MemorySettingsStore::new();
        let path = Path::new("a");
        store.remember(path, settings(Cipher::Rijndael, Some(Mode::Gcm)));
        assert!(store.forget(path).is_some());
        assert!(store.forget(path).is_none());
        assert!(store.is_empty());
    }
}
