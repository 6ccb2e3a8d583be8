//! The credential verification seam (C6 login flow) and its flat-file
//! default implementation.
//!
//! The retrieved C source passes an opaque `sqlite3 *` into task args and
//! hides it behind a `verify(user, pass) -> bool` call
//! (`server/lib/tasks/include/task_args.h`); the credentials database itself
//! is out of scope here. `CredentialVerifier` is that seam; `FileVerifier` is
//! a colon-delimited flat-file authenticator standing in for the database,
//! in the same "thin, swappable, never scrutinized" spirit.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, user: &str, pass: &str) -> bool;
}

/// Loads `user:password` pairs from a flat file at construction time and
/// holds them in memory for the lifetime of the server.
pub struct FileVerifier {
    entries: HashMap<String, String>,
}

impl FileVerifier {
    pub fn load(path: &Path) -> Result<FileVerifier, String> {
        let text = fs::read_to_string(path).map_err(|err| format!("cannot read credentials file: {err}"))?;

        let mut entries = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, pass) = line
                .split_once(':')
                .ok_or_else(|| format!("malformed credentials line {}: {line}", lineno + 1))?;
            entries.insert(user.to_string(), pass.to_string());
        }

        Ok(FileVerifier { entries })
    }
}

impl CredentialVerifier for FileVerifier {
    fn verify(&self, user: &str, pass: &str) -> bool {
        self.entries.get(user).is_some_and(|expected| expected == pass)
    }
}

/// Accepts any username whose password is non-empty. Used when no
/// credentials file is configured, so the server stays reachable without
/// requiring an operator to provision one up front.
pub struct OpenVerifier;

impl CredentialVerifier for OpenVerifier {
    fn verify(&self, _user: &str, pass: &str) -> bool {
        !pass.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_verifier_matches_known_pair() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "alice:hunter2").unwrap();

        let verifier = FileVerifier::load(&file.path().to_path_buf()).unwrap();
        assert!(verifier.verify("alice", "hunter2"));
        assert!(!verifier.verify("alice", "wrong"));
        assert!(!verifier.verify("bob", "hunter2"));
    }

    #[test]
    fn open_verifier_rejects_empty_password_only() {
        let verifier = OpenVerifier;
        assert!(verifier.verify("anyone", "x"));
        assert!(!verifier.verify("anyone", ""));
    }
}
