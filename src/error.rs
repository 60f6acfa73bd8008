use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A parameter was malformed or names something unsupported. The
    /// offending field is available through [`CryptError::field`].
    InvalidParameter,
    /// A mandatory value was absent and could not be obtained interactively.
    MissingRequiredValue,
    /// The input starts with a header marker but the header is inconsistent.
    MalformedHeader,
    /// The HMAC over header and ciphertext did not verify.
    AuthenticationFailed,
    /// A header or the command line referenced a key preset that does not exist.
    KeyPresetOutOfRange,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
    /// The cipher rejected the data: wrong password, bad tag or padding,
    /// or tampered-with ciphertext.
    CipherFailure,
    /// The key derivation function failed.
    KdfFailure,
    /// Unexpected state reached within cryptheader logic.
    InternalInvariant,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct CryptError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition tag, always provided.
    pub kind: ErrorKind,
    /// Name of the parameter the error is about, if any.
    pub field: Option<&'static str>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl CryptError {
    /// Creates a new error with a required category, kind and display message.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            field: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            field: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// A value supplied for `field` is malformed or unsupported.
    pub fn invalid(field: &'static str, msg: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::User,
            kind: ErrorKind::InvalidParameter,
            field: Some(field),
            source: None,
            msg: format!("invalid {}: {}", field, msg.into()),
        }
    }

    /// `field` is required but no value was supplied.
    pub fn missing(field: &'static str, msg: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::User,
            kind: ErrorKind::MissingRequiredValue,
            field: Some(field),
            source: None,
            msg: format!("missing {}: {}", field, msg.into()),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::MalformedHeader,
            format!("malformed header: {}", msg.into()),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorKind::InternalInvariant, msg)
    }

    pub fn io(msg: impl Into<String>, source: std::io::Error) -> Self {
        let category = if source.kind() == std::io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        Self::with_source(category, ErrorKind::Io, msg, source)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        let field = self.field;
        Self {
            category,
            kind,
            field,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CryptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names_field() {
        let err = CryptError::invalid("cipher", "unknown cipher 'foo'");
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert_eq!(err.field, Some("cipher"));
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.message(), "invalid cipher: unknown cipher 'foo'");
    }

    #[test]
    fn test_context_preserves_kind_and_field() {
        let err = CryptError::missing("tag", "interaction disabled").with_context("decryption failed");
        assert_eq!(err.kind, ErrorKind::MissingRequiredValue);
        assert_eq!(err.field, Some("tag"));
        assert_eq!(err.message(), "decryption failed");
        assert!(err.source_error().is_some());
    }

    #[test]
    fn test_io_not_found_is_user_error() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CryptError::io("failed to read from x", source);
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.category, ErrorCategory::User);
    }
}
