use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How long a successful login is honored, in milliseconds.
pub const SESSION_TTL_MS: i64 = 3600 * 1000;

/// Lowercase hex SHA-256 of the raw input.
pub fn hash_password(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The server hash has not arrived yet.
    NotReady,
    Mismatch,
}

impl LoginError {
    pub fn message(&self) -> &'static str {
        match self {
            LoginError::NotReady => "密码系统未初始化，请稍后重试",
            LoginError::Mismatch => "密码错误",
        }
    }
}

pub fn verify_password(input: &str, expected_hash: Option<&str>) -> Result<(), LoginError> {
    let expected = expected_hash.ok_or(LoginError::NotReady)?;
    if hash_password(input).eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(LoginError::Mismatch)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    ts: i64,
}

/// The persisted "already logged in" flag.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    /// Whether a stored login is still inside its one hour window. Expired or
    /// unreadable entries are removed.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return false,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "cannot read session file");
                return false;
            }
        };
        let valid = serde_json::from_str::<StoredSession>(&contents)
            .map(|stored| {
                let elapsed = now_ms.saturating_sub(stored.ts);
                (0..=SESSION_TTL_MS).contains(&elapsed)
            })
            .unwrap_or(false);
        if !valid {
            self.discard();
        }
        valid
    }

    pub fn persist(&self, now_ms: i64) -> AnyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string(&StoredSession { ts: now_ms })?;
        fs::write(&self.path, payload)
            .with_context(|| format!("无法写入 {}", self.path.display()))?;
        Ok(())
    }

    pub fn discard(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "cannot remove session file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_HASH: &str = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";

    #[test]
    fn hash_matches_known_digest() {
        assert_eq!(hash_password("secret"), SECRET_HASH);
    }

    #[test]
    fn verify_requires_loaded_hash() {
        assert_eq!(verify_password("secret", None), Err(LoginError::NotReady));
        assert_eq!(
            verify_password("wrong", Some(SECRET_HASH)),
            Err(LoginError::Mismatch)
        );
        assert!(verify_password("secret", Some(&SECRET_HASH.to_uppercase())).is_ok());
    }

    #[test]
    fn session_valid_for_one_hour() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionStore::new(&path);
        let login_at = 1_700_000_000_000;
        assert!(!store.is_valid(login_at));

        store.persist(login_at).unwrap();
        assert!(store.is_valid(login_at));
        assert!(store.is_valid(login_at + 3600 * 1000));
        assert!(!store.is_valid(login_at + 3601 * 1000));
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_session_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = SessionStore::new(&path);
        store.persist(0).unwrap();
        fs::write(&path, "not json").unwrap();
        assert!(!store.is_valid(1));
        assert!(!path.exists());
    }

    #[test]
    fn future_timestamps_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.persist(10_000).unwrap();
        assert!(!store.is_valid(0));
    }
}
