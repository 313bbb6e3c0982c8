//! Interactive credential entry.

use std::io::{self, BufRead, Write};

/// Asks a human for the identity and secret.
///
/// `Ok(None)` means the user cancelled (closed the input) rather than an I/O
/// failure.
pub trait Prompter: Send + Sync {
    fn identity(&self, default: &str) -> io::Result<Option<String>>;
    fn secret(&self, identity: &str) -> io::Result<Option<String>>;
}

/// Prompts on stderr, reads the identity from stdin and the secret without
/// echo via `rpassword`.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn identity(&self, default: &str) -> io::Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "Identity [{default}]: ")?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let entered = line.trim();
        if entered.is_empty() {
            Ok(Some(default.to_string()))
        } else {
            Ok(Some(entered.to_string()))
        }
    }

    fn secret(&self, identity: &str) -> io::Result<Option<String>> {
        match rpassword::prompt_password(format!("Secret for {identity}: ")) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}
