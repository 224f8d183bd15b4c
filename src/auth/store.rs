//! Credential store
//!
//! An immutable snapshot of `username -> password hash` loaded from an
//! htpasswd-style file or built from a single static entry.
//!
//! # Supported encodings
//!
//! - bcrypt: `$2a$`, `$2b$`, `$2x$`, `$2y$`
//! - `{SHA}`: base64 SHA-1 digest
//! - `{SSHA}`: base64 of SHA-1(password + salt) followed by the salt
//! - SHA-crypt: `$5$` (SHA-256) and `$6$` (SHA-512)
//! - Apache MD5: `$apr1$`, the `htpasswd` default
//!
//! # Example
//!
//! ```
//! use dumbproxy_auth::auth::store::CredentialStore;
//!
//! let store = CredentialStore::parse("user:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\n", |_, _| {});
//! assert!(store.verify("user", "password"));
//! assert!(!store.verify("user", "wrong"));
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::Md5;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

const SHA1_LEN: usize = 20;

const APR1_MAGIC: &str = "$apr1$";
const APR1_ROUNDS: usize = 1000;
const APR1_MAX_SALT: usize = 8;
const APR1_CHECKSUM_LEN: usize = 22;
const CRYPT_ALPHABET: &[u8; 64] =
    b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Errors loading a credential file
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read credential file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a single credential line is skipped
#[derive(Error, Debug)]
pub enum LineError {
    #[error("missing ':' separator")]
    MissingSeparator,

    #[error("empty username")]
    EmptyUsername,

    #[error("unsupported hash encoding")]
    UnsupportedHash,

    #[error("malformed {scheme} hash: {reason}")]
    MalformedHash {
        scheme: &'static str,
        reason: String,
    },
}

/// A verifiable password hash
#[derive(Debug, Clone)]
pub enum PasswordHash {
    Bcrypt(String),
    Sha1([u8; SHA1_LEN]),
    SaltedSha1 {
        digest: [u8; SHA1_LEN],
        salt: Vec<u8>,
    },
    Sha256Crypt(String),
    Sha512Crypt(String),
    Apr1 {
        salt: String,
        checksum: String,
    },
}

impl PasswordHash {
    /// Parse an encoded hash, detecting its scheme from the prefix
    pub fn parse(encoded: &str) -> Result<Self, LineError> {
        if let Some(b64) = encoded.strip_prefix("{SHA}") {
            let raw = decode_b64("SHA", b64)?;
            let digest = <[u8; SHA1_LEN]>::try_from(raw.as_slice()).map_err(|_| {
                LineError::MalformedHash {
                    scheme: "SHA",
                    reason: format!("expected {} digest bytes, got {}", SHA1_LEN, raw.len()),
                }
            })?;
            return Ok(Self::Sha1(digest));
        }

        if let Some(b64) = encoded.strip_prefix("{SSHA}") {
            let raw = decode_b64("SSHA", b64)?;
            if raw.len() <= SHA1_LEN {
                return Err(LineError::MalformedHash {
                    scheme: "SSHA",
                    reason: "missing salt".into(),
                });
            }
            let (digest, salt) = raw.split_at(SHA1_LEN);
            let mut fixed = [0u8; SHA1_LEN];
            fixed.copy_from_slice(digest);
            return Ok(Self::SaltedSha1 {
                digest: fixed,
                salt: salt.to_vec(),
            });
        }

        if ["$2a$", "$2b$", "$2x$", "$2y$"]
            .iter()
            .any(|prefix| encoded.starts_with(prefix))
        {
            encoded
                .parse::<bcrypt::HashParts>()
                .map_err(|e| LineError::MalformedHash {
                    scheme: "bcrypt",
                    reason: e.to_string(),
                })?;
            return Ok(Self::Bcrypt(encoded.to_string()));
        }

        if encoded.starts_with("$5$") {
            return Ok(Self::Sha256Crypt(encoded.to_string()));
        }

        if encoded.starts_with("$6$") {
            return Ok(Self::Sha512Crypt(encoded.to_string()));
        }

        if let Some(rest) = encoded.strip_prefix(APR1_MAGIC) {
            let malformed = |reason: &str| LineError::MalformedHash {
                scheme: "apr1",
                reason: reason.to_string(),
            };
            let (salt, checksum) = rest
                .split_once('$')
                .ok_or_else(|| malformed("missing checksum"))?;
            if salt.is_empty() {
                return Err(malformed("empty salt"));
            }
            if checksum.len() != APR1_CHECKSUM_LEN {
                return Err(malformed("checksum must be 22 characters"));
            }
            return Ok(Self::Apr1 {
                salt: salt.to_string(),
                checksum: checksum.to_string(),
            });
        }

        Err(LineError::UnsupportedHash)
    }

    /// Whether checking this hash involves a deliberately expensive KDF
    fn is_slow(&self) -> bool {
        !matches!(self, Self::Sha1(_) | Self::SaltedSha1 { .. })
    }

    /// Hash a password with bcrypt at the given cost
    pub fn bcrypt(password: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self::Bcrypt(bcrypt::hash(password, cost)?))
    }

    /// Name of the hashing scheme
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Bcrypt(_) => "bcrypt",
            Self::Sha1(_) => "SHA",
            Self::SaltedSha1 { .. } => "SSHA",
            Self::Sha256Crypt(_) => "sha256-crypt",
            Self::Sha512Crypt(_) => "sha512-crypt",
            Self::Apr1 { .. } => "apr1",
        }
    }

    /// The hash in its on-disk encoding
    pub fn encode(&self) -> String {
        match self {
            Self::Bcrypt(h) | Self::Sha256Crypt(h) | Self::Sha512Crypt(h) => h.clone(),
            Self::Sha1(digest) => format!("{{SHA}}{}", STANDARD.encode(digest)),
            Self::SaltedSha1 { digest, salt } => {
                let mut raw = digest.to_vec();
                raw.extend_from_slice(salt);
                format!("{{SSHA}}{}", STANDARD.encode(raw))
            }
            Self::Apr1 { salt, checksum } => format!("{}{}${}", APR1_MAGIC, salt, checksum),
        }
    }

    /// Check a candidate password against this hash
    pub fn verify(&self, password: &str) -> bool {
        match self {
            Self::Bcrypt(h) => bcrypt::verify(password, h).unwrap_or(false),
            Self::Sha1(digest) => {
                let computed = Sha1::digest(password.as_bytes());
                digest.as_slice().ct_eq(computed.as_slice()).into()
            }
            Self::SaltedSha1 { digest, salt } => {
                let mut hasher = Sha1::new();
                hasher.update(password.as_bytes());
                hasher.update(salt);
                let computed = hasher.finalize();
                digest.as_slice().ct_eq(computed.as_slice()).into()
            }
            Self::Sha256Crypt(h) => sha_crypt::sha256_check(password, h).is_ok(),
            Self::Sha512Crypt(h) => sha_crypt::sha512_check(password, h).is_ok(),
            Self::Apr1 { salt, checksum } => {
                let computed = apr1_checksum(password.as_bytes(), salt.as_bytes());
                checksum.as_bytes().ct_eq(computed.as_bytes()).into()
            }
        }
    }
}

/// Apache's MD5-crypt variant, as written by `htpasswd -m`
fn apr1_checksum(password: &[u8], salt: &[u8]) -> String {
    let salt = &salt[..salt.len().min(APR1_MAX_SALT)];

    let alternate = Md5::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(password)
        .finalize();

    let mut ctx = Md5::new();
    ctx.update(password);
    ctx.update(APR1_MAGIC.as_bytes());
    ctx.update(salt);
    for chunk in password.chunks(16) {
        ctx.update(&alternate[..chunk.len()]);
    }
    let mut bits = password.len();
    while bits > 0 {
        if bits & 1 == 1 {
            ctx.update([0u8]);
        } else {
            ctx.update(&password[..1]);
        }
        bits >>= 1;
    }
    let mut digest = ctx.finalize();

    for round in 0..APR1_ROUNDS {
        let mut ctx = Md5::new();
        if round % 2 == 1 {
            ctx.update(password);
        } else {
            ctx.update(&digest);
        }
        if round % 3 != 0 {
            ctx.update(salt);
        }
        if round % 7 != 0 {
            ctx.update(password);
        }
        if round % 2 == 1 {
            ctx.update(&digest);
        } else {
            ctx.update(password);
        }
        digest = ctx.finalize();
    }

    let mut out = String::with_capacity(APR1_CHECKSUM_LEN);
    for (a, b, c) in [(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        let group =
            (u32::from(digest[a]) << 16) | (u32::from(digest[b]) << 8) | u32::from(digest[c]);
        push_crypt64(&mut out, group, 4);
    }
    push_crypt64(&mut out, u32::from(digest[11]), 2);
    out
}

fn push_crypt64(out: &mut String, mut value: u32, chars: usize) {
    for _ in 0..chars {
        out.push(char::from(CRYPT_ALPHABET[(value & 0x3f) as usize]));
        value >>= 6;
    }
}

fn decode_b64(scheme: &'static str, b64: &str) -> Result<Vec<u8>, LineError> {
    STANDARD
        .decode(b64)
        .map_err(|e| LineError::MalformedHash {
            scheme,
            reason: e.to_string(),
        })
}

/// Immutable username -> hash mapping
///
/// Never mutated after construction; reloads build a new store and swap it in.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: HashMap<String, PasswordHash>,
    // Checked in place of a missing login so lookups cost the same either way.
    decoy: Option<PasswordHash>,
}

impl CredentialStore {
    /// Store holding exactly one entry
    pub fn single(username: impl Into<String>, hash: PasswordHash) -> Self {
        let mut entries = HashMap::with_capacity(1);
        let decoy = Some(hash.clone());
        entries.insert(username.into(), hash);
        Self { entries, decoy }
    }

    /// Parse htpasswd-style contents.
    ///
    /// Bad lines are handed to `on_error` with their 1-based line number and
    /// skipped; parsing always continues to the end.
    pub fn parse<F>(contents: &str, mut on_error: F) -> Self
    where
        F: FnMut(usize, LineError),
    {
        let mut entries = HashMap::new();
        let mut decoy: Option<PasswordHash> = None;

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((user, encoded)) = line.split_once(':') else {
                on_error(idx + 1, LineError::MissingSeparator);
                continue;
            };
            if user.is_empty() {
                on_error(idx + 1, LineError::EmptyUsername);
                continue;
            }

            match PasswordHash::parse(encoded) {
                Ok(hash) => {
                    let upgrade = match &decoy {
                        None => true,
                        Some(current) => !current.is_slow() && hash.is_slow(),
                    };
                    if upgrade {
                        decoy = Some(hash.clone());
                    }
                    entries.insert(user.to_string(), hash);
                }
                Err(e) => on_error(idx + 1, e),
            }
        }

        Self { entries, decoy }
    }

    /// Load a credential file, logging and skipping malformed lines
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::parse(&contents, |line, err| {
            warn!(path = %path.display(), line, error = %err, "skipping credential line");
        }))
    }

    /// Verify a login/password pair. Unknown logins never match.
    pub fn verify(&self, login: &str, password: &str) -> bool {
        match self.entries.get(login) {
            Some(hash) => hash.verify(password),
            None => {
                if let Some(decoy) = &self.decoy {
                    let _ = decoy.verify(password);
                }
                false
            }
        }
    }

    /// Whether the store has an entry for `login`
    pub fn contains(&self, login: &str) -> bool {
        self.entries.contains_key(login)
    }

    /// Number of usable entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no usable entries were loaded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
