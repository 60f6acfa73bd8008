//! Interactive input of secrets and parameters

use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Write};

use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::userdata::{Encoding, UserData, set_user_data};

/// Source of interactively typed values.
pub trait Prompt {
    /// Shows `label` and reads one line, without the line terminator.
    ///
    /// With `echo` false the typed characters are not displayed.
    fn read_line(&mut self, label: &str, echo: bool) -> Result<Zeroizing<String>>;

    /// Asks for a value until a usable one is entered or `retries` attempts
    /// are used up.
    ///
    /// Input may carry an encoding prefix (`hex:`, `base64:`, ...);
    /// otherwise it is decoded with `encoding`. Undecodable or empty input
    /// counts as a failed attempt, and so does a confirmation that does not
    /// match. Exhaustion is a `MissingRequiredValue` error.
    fn ask(
        &mut self,
        label: &str,
        encoding: Encoding,
        retries: usize,
        confirm: bool,
        echo: bool,
    ) -> Result<UserData> {
        for _ in 0..retries {
            let first = self.read_line(&format!("{}: ", label), echo)?;
            let mut data = UserData::new();
            if !set_user_data(&first, &mut data, encoding) {
                warn!("{}: invalid or empty input", label);
                continue;
            }
            if confirm {
                let second = self.read_line(&format!("{} (repeat): ", label), echo)?;
                if *second != *first {
                    warn!("{}: inputs do not match", label);
                    continue;
                }
            }
            return Ok(data);
        }
        Err(CryptError::new(
            ErrorCategory::User,
            ErrorKind::MissingRequiredValue,
            format!("no valid {} after {} attempts", label, retries),
        ))
    }
}

fn io_error(msg: &str, e: io::Error) -> CryptError {
    CryptError::with_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("{}: {}", msg, e),
        e,
    )
}

/// Prompts on stderr and reads from the terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for TerminalPrompt {
    /// Note: hidden input is limited to UTF-8 by rpassword. For arbitrary
    /// bytes use a `hex:` or `base64:` prefix, or `--password-stdin`.
    fn read_line(&mut self, label: &str, echo: bool) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(CryptError::new(
                ErrorCategory::User,
                ErrorKind::MissingRequiredValue,
                "cannot prompt - stdin is not a terminal",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(label.as_bytes())
            .map_err(|e| io_error("failed to write prompt", e))?;
        stderr
            .flush()
            .map_err(|e| io_error("failed to flush prompt", e))?;

        if echo {
            let mut line = Zeroizing::new(String::new());
            io::stdin()
                .read_line(&mut line)
                .map_err(|e| io_error("failed to read input", e))?;
            let trimmed = line.trim_end_matches(['\r', '\n']).len();
            line.truncate(trimmed);
            Ok(line)
        } else {
            let line = rpassword::read_password()
                .map_err(|e| io_error("failed to read hidden input", e))?;
            Ok(Zeroizing::new(line))
        }
    }
}

/// Replays canned answers; used where no terminal is available.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<Zeroizing<String>>,
    labels: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers
                .into_iter()
                .map(|answer| Zeroizing::new(answer.into()))
                .collect(),
            labels: Vec::new(),
        }
    }

    /// Labels of every prompt shown so far.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn calls(&self) -> usize {
        self.labels.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn read_line(&mut self, label: &str, _echo: bool) -> Result<Zeroizing<String>> {
        self.labels.push(label.to_string());
        self.answers.pop_front().ok_or_else(|| {
            CryptError::new(
                ErrorCategory::User,
                ErrorKind::MissingRequiredValue,
                format!("no answer available for '{}'", label.trim_end_matches(": ")),
            )
        })
    }
}

/// Reads a secret from any io::Read source, such as stdin.
///
/// The content is taken verbatim, including any trailing newline.
pub fn read_secret(reader: &mut dyn Read) -> Result<Zeroizing<Vec<u8>>> {
    let mut data = Zeroizing::new(Vec::new());
    reader
        .read_to_end(&mut data)
        .map_err(|e| io_error("error reading secret", e))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_accepts_first_valid_answer() {
        let mut prompt = ScriptedPrompt::new(["hunter2"]);
        let data = prompt.ask("password", Encoding::Ascii, 3, false, false).unwrap();
        assert_eq!(data.as_bytes(), b"hunter2");
        assert_eq!(prompt.calls(), 1);
        assert_eq!(prompt.labels(), ["password: "]);
    }

    #[test]
    fn test_ask_with_confirmation() {
        let mut prompt = ScriptedPrompt::new(["one", "two", "pw", "pw"]);
        let data = prompt.ask("password", Encoding::Ascii, 3, true, false).unwrap();
        assert_eq!(data.as_bytes(), b"pw");
        assert_eq!(prompt.calls(), 4);
        assert_eq!(prompt.labels()[1], "password (repeat): ");
    }

    #[test]
    fn test_ask_exhausts_retries() {
        let mut prompt = ScriptedPrompt::new(["a", "b", "c", "d", "e", "f"]);
        let err = prompt.ask("password", Encoding::Ascii, 3, true, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredValue);
        assert_eq!(prompt.calls(), 6);
    }

    #[test]
    fn test_ask_skips_undecodable_input() {
        let mut prompt = ScriptedPrompt::new(["%%%", "", "AAEC"]);
        let data = prompt.ask("salt", Encoding::Base64, 3, false, true).unwrap();
        assert_eq!(data.as_bytes(), &[0, 1, 2]);
    }

    #[test]
    fn test_ask_honours_prefix() {
        let mut prompt = ScriptedPrompt::new(["hex:00ff"]);
        let data = prompt.ask("tag", Encoding::Base64, 2, false, true).unwrap();
        assert_eq!(data.as_bytes(), &[0x00, 0xff]);
    }

    #[test]
    fn test_ask_without_answers_fails() {
        let mut prompt = ScriptedPrompt::default();
        let err = prompt.ask("iv", Encoding::Base64, 2, false, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredValue);
    }

    #[test]
    fn test_read_secret_keeps_bytes_verbatim() {
        let data: &[u8] = &[0xff, 0xfe, b'\n'];
        let mut reader = data;
        assert_eq!(&*read_secret(&mut reader).unwrap(), data);
    }

    /// Tests the terminal prompt. This is ignored by default and must be run
    /// explicitly and with human input:
    ///
    /// cargo test test_terminal_prompt_interactive -- --ignored --nocapture
    #[test]
    #[ignore]
    fn test_terminal_prompt_interactive() {
        let mut prompt = TerminalPrompt::new();
        let data = prompt
            .ask("test password", Encoding::Ascii, 1, false, false)
            .unwrap();
        assert!(!data.is_empty(), "Expected non-empty input");
    }
}
