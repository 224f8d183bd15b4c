//! Credential file maintenance
//!
//! Adds or replaces a user's bcrypt entry in an htpasswd-style file while
//! leaving every other line untouched.

use crate::auth::store::PasswordHash;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

/// Default bcrypt cost for new entries
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Credential file update errors
#[derive(Error, Debug)]
pub enum PasswdError {
    #[error("Invalid username {0:?}: must be non-empty and contain no ':' or newline")]
    InvalidUsername(String),

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("bcrypt cost {0} out of range 4..=31")]
    InvalidCost(u32),

    #[error("Failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Failed to update credential file: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether `set_password` added a new user or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswdChange {
    Added,
    Updated,
}

/// Set `username`'s password in the credential file at `path`.
///
/// The file is created if missing and rewritten via a uniquely named
/// temporary file in the same directory and a rename, so a concurrent reload
/// never sees a half-written file. The existing file's permissions carry
/// over; a new file is owner-only.
pub fn set_password(
    path: &Path,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<PasswdChange, PasswdError> {
    if username.is_empty() || username.contains([':', '\n', '\r']) {
        return Err(PasswdError::InvalidUsername(username.to_string()));
    }
    if password.is_empty() {
        return Err(PasswdError::EmptyPassword);
    }
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        return Err(PasswdError::InvalidCost(cost));
    }

    let (existing, permissions) = match std::fs::read_to_string(path) {
        Ok(contents) => (contents, Some(std::fs::metadata(path)?.permissions())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (String::new(), None),
        Err(e) => return Err(e.into()),
    };

    let entry = format!("{}:{}", username, PasswordHash::bcrypt(password, cost)?.encode());
    let (contents, change) = upsert_entry(&existing, username, &entry);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    // Temp files start out 0600.
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;

    info!(path = %path.display(), username, ?change, "credential file updated");
    Ok(change)
}

fn upsert_entry(existing: &str, username: &str, entry: &str) -> (String, PasswdChange) {
    let mut change = PasswdChange::Added;
    let mut lines = Vec::new();

    for line in existing.lines() {
        let is_user = line
            .trim()
            .split_once(':')
            .is_some_and(|(user, _)| user == username);
        if is_user {
            // Collapse duplicates into the single new entry.
            if change == PasswdChange::Added {
                lines.push(entry.to_string());
                change = PasswdChange::Updated;
            }
        } else {
            lines.push(line.to_string());
        }
    }

    if change == PasswdChange::Added {
        lines.push(entry.to_string());
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    (contents, change)
}
