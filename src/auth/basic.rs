//! HTTP Basic proxy authentication
//!
//! Credentials come either from a single static username/password pair or
//! from an htpasswd-style file that is re-read in the background when it
//! changes.
//!
//! # Example
//!
//! ```
//! use dumbproxy_auth::auth::{AuthRequest, Authenticator, BasicAuth};
//!
//! let auth = BasicAuth::from_static("user", "pass", "").unwrap();
//! let request = AuthRequest {
//!     proxy_authorization: Some("Basic dXNlcjpwYXNz".into()),
//!     ..Default::default()
//! };
//! assert_eq!(auth.validate(&request).identity(), "user");
//! ```

use super::challenge;
use super::store::{CredentialStore, PasswordHash, StoreError};
use super::{query_param, AuthError, AuthRequest, Authenticator, Verdict};
use crate::config::parse_duration;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reload interval used when none (or zero, or garbage) is configured
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(15);

/// bcrypt cost for the static password; hashed once at startup
const STATIC_BCRYPT_COST: u32 = 4;

/// Resolve the `reload` parameter. `None` disables periodic reloading.
pub fn reload_interval(option: &str) -> Option<Duration> {
    match parse_duration(option) {
        Ok(d) if d.negative && !d.is_zero() => None,
        Ok(d) if !d.is_zero() => Some(d.magnitude),
        _ => Some(DEFAULT_RELOAD_INTERVAL),
    }
}

/// The current store together with the time it was loaded
struct Snapshot {
    store: Arc<CredentialStore>,
    loaded_at: SystemTime,
}

/// State shared with the reload task
struct Shared {
    path: Option<PathBuf>,
    hidden_domain: String,
    current: RwLock<Snapshot>,
}

impl Shared {
    fn store(&self) -> Arc<CredentialStore> {
        Arc::clone(&self.current.read().store)
    }

    fn reload(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        info!(path = %path.display(), "reloading password file");
        let result = CredentialStore::load(path);

        #[cfg(feature = "metrics")]
        crate::metrics::record_credential_reload(result.is_ok());

        let store = Arc::new(result?);
        let entries = store.len();
        let now = SystemTime::now();

        {
            let mut current = self.current.write();
            current.store = store;
            current.loaded_at = now;
        }

        info!(path = %path.display(), entries, "password file reloaded");
        Ok(())
    }

    fn cond_reload(&self) -> Result<bool, StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        let loaded_at = self.current.read().loaded_at;
        let stale = match modified(path) {
            Ok(mtime) => mtime >= loaded_at,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "can't get password file modtime");
                true
            }
        };

        if stale {
            self.reload()?;
        }
        Ok(stale)
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Basic authenticator over a swappable credential store
pub struct BasicAuth {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    stopped: AtomicBool,
    reloader: Mutex<Option<JoinHandle<()>>>,
}

impl BasicAuth {
    fn with_store(store: CredentialStore, path: Option<PathBuf>, hidden_domain: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                path,
                hidden_domain: hidden_domain.to_lowercase(),
                current: RwLock::new(Snapshot {
                    store: Arc::new(store),
                    loaded_at: SystemTime::now(),
                }),
            }),
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            reloader: Mutex::new(None),
        }
    }

    /// Single static credential. The password is bcrypt-hashed once here.
    pub fn from_static(
        username: &str,
        password: &str,
        hidden_domain: &str,
    ) -> Result<Self, AuthError> {
        if username.is_empty() {
            return Err(AuthError::MissingParameter("username"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingParameter("password"));
        }

        let hash = PasswordHash::bcrypt(password, STATIC_BCRYPT_COST)?;
        let store = CredentialStore::single(username, hash);
        Ok(Self::with_store(store, None, hidden_domain))
    }

    /// Credentials from a file, loaded synchronously before returning.
    ///
    /// With `reload_every` set, a background task re-reads the file whenever
    /// its modification time is not older than the last load. This needs a
    /// Tokio runtime.
    pub fn from_file(
        path: impl Into<PathBuf>,
        hidden_domain: &str,
        reload_every: Option<Duration>,
    ) -> Result<Self, AuthError> {
        let path = path.into();
        let store = CredentialStore::load(&path).map_err(AuthError::InitialLoad)?;
        info!(path = %path.display(), entries = store.len(), "password file loaded");

        let auth = Self::with_store(store, Some(path), hidden_domain);
        if let Some(interval) = reload_every {
            auth.spawn_reloader(interval)?;
        }
        Ok(auth)
    }

    /// `static://?username=U&password=P&hidden_domain=D`
    pub fn from_static_url(url: &url::Url) -> Result<Self, AuthError> {
        Self::from_static(
            &query_param(url, "username"),
            &query_param(url, "password"),
            &query_param(url, "hidden_domain"),
        )
    }

    /// `basicfile://?path=PATH&hidden_domain=D&reload=DURATION`
    pub fn from_file_url(url: &url::Url) -> Result<Self, AuthError> {
        let path = query_param(url, "path");
        if path.is_empty() {
            return Err(AuthError::MissingParameter("path"));
        }
        Self::from_file(
            path,
            &query_param(url, "hidden_domain"),
            reload_interval(&query_param(url, "reload")),
        )
    }

    fn spawn_reloader(&self, interval: Duration) -> Result<(), AuthError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| AuthError::NoRuntime)?;
        let task = handle.spawn(reload_loop(
            Arc::clone(&self.shared),
            interval,
            self.cancel.clone(),
        ));
        *self.reloader.lock() = Some(task);
        Ok(())
    }

    /// Re-read the credential file and swap in the new store.
    ///
    /// On error the previous store stays current. No-op in static mode.
    pub fn reload(&self) -> Result<(), StoreError> {
        self.shared.reload()
    }

    /// Reload if the file's modification time is not older than the last
    /// load, or cannot be determined. Returns whether a reload happened.
    pub fn cond_reload(&self) -> Result<bool, StoreError> {
        self.shared.cond_reload()
    }

    /// The current credential store
    pub fn credentials(&self) -> Arc<CredentialStore> {
        self.shared.store()
    }

    /// When the current store was loaded
    pub fn last_reloaded(&self) -> SystemTime {
        self.shared.current.read().loaded_at
    }

    /// Configured hidden domain (lowercased), empty when disabled
    pub fn hidden_domain(&self) -> &str {
        &self.shared.hidden_domain
    }

    /// Whether a background reload task was started
    pub fn reloads_periodically(&self) -> bool {
        self.reloader.lock().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Wait for the reload task to exit. Returns immediately if there is none.
    pub async fn join(&self) {
        let task = self.reloader.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "password reload task failed");
            }
        }
    }

    fn challenge(&self, request: &AuthRequest) -> Verdict {
        #[cfg(feature = "metrics")]
        crate::metrics::record_auth_attempt("basic", "denied");

        Verdict::Denied(challenge::require_auth(request, &self.shared.hidden_domain))
    }
}

/// Split a `Proxy-Authorization` value into login and password
fn parse_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(token).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}

async fn reload_loop(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?interval, "password reload loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let shared = Arc::clone(&shared);
                match tokio::task::spawn_blocking(move || shared.cond_reload()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, "password file reload failed"),
                    Err(e) => error!(error = %e, "password file reload panicked"),
                }
            }
        }
    }

    debug!("password reload loop stopped");
}

impl Authenticator for BasicAuth {
    fn validate(&self, request: &AuthRequest) -> Verdict {
        let Some(header) = request.proxy_authorization.as_deref() else {
            return self.challenge(request);
        };
        let Some((login, password)) = parse_credentials(header) else {
            debug!("malformed Proxy-Authorization header");
            return self.challenge(request);
        };

        let store = self.shared.store();
        if !store.verify(&login, &password) {
            debug!("proxy credentials rejected");
            return self.challenge(request);
        }

        if challenge::addresses_hidden_domain(request, &self.shared.hidden_domain) {
            #[cfg(feature = "metrics")]
            crate::metrics::record_auth_attempt("basic", "disguised");

            return Verdict::Denied(challenge::auth_triggered());
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_auth_attempt("basic", "granted");

        Verdict::Granted { identity: login }
    }

    fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.cancel.cancel();
        }
    }
}

impl Drop for BasicAuth {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_interval_resolution() {
        assert_eq!(reload_interval(""), Some(DEFAULT_RELOAD_INTERVAL));
        assert_eq!(reload_interval("garbage"), Some(DEFAULT_RELOAD_INTERVAL));
        assert_eq!(reload_interval("0"), Some(DEFAULT_RELOAD_INTERVAL));
        assert_eq!(reload_interval("0s"), Some(DEFAULT_RELOAD_INTERVAL));
        assert_eq!(reload_interval("1m"), Some(Duration::from_secs(60)));
        assert_eq!(reload_interval("-1s"), None);
    }

    #[test]
    fn test_parse_credentials() {
        let header = format!("Basic {}", STANDARD.encode("user:pa:ss"));
        assert_eq!(
            parse_credentials(&header),
            Some(("user".to_string(), "pa:ss".to_string()))
        );

        let lower = format!("bAsIc {}", STANDARD.encode("user:"));
        assert_eq!(
            parse_credentials(&lower),
            Some(("user".to_string(), String::new()))
        );

        assert_eq!(parse_credentials("Basic"), None);
        assert_eq!(parse_credentials("Digest abc"), None);
        assert_eq!(parse_credentials("Basic !!!not-base64"), None);
        assert_eq!(
            parse_credentials(&format!("Basic {}", STANDARD.encode("nocolon"))),
            None
        );
    }

    #[test]
    fn test_static_requires_parameters() {
        assert!(matches!(
            BasicAuth::from_static("", "pass", ""),
            Err(AuthError::MissingParameter("username"))
        ));
        assert!(matches!(
            BasicAuth::from_static("user", "", ""),
            Err(AuthError::MissingParameter("password"))
        ));
    }

    #[test]
    fn test_hidden_domain_is_lowercased() {
        let auth = BasicAuth::from_static("user", "pass", "Example.COM").unwrap();
        assert_eq!(auth.hidden_domain(), "example.com");
    }

    #[test]
    fn test_static_mode_reload_is_noop() {
        let auth = BasicAuth::from_static("user", "pass", "").unwrap();
        let before = auth.last_reloaded();
        auth.reload().unwrap();
        assert!(!auth.cond_reload().unwrap());
        assert_eq!(auth.last_reloaded(), before);
        assert!(!auth.reloads_periodically());
    }

    #[test]
    fn test_file_reload_without_runtime_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = BasicAuth::from_file(file.path(), "", Some(Duration::from_secs(1)));
        assert!(matches!(result, Err(AuthError::NoRuntime)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let auth = BasicAuth::from_static("user", "pass", "").unwrap();
        assert!(!auth.is_stopped());
        auth.stop();
        auth.stop();
        assert!(auth.is_stopped());
        assert!(auth.cancel.is_cancelled());
    }
}
