//! dumbproxy-auth Library
//!
//! Authentication gate for an HTTP/HTTPS forward proxy.
//!
//! # Features
//!
//! - **Pluggable**: `static`, `basicfile`, `cert` and `none` authenticators
//!   behind one [`auth::Authenticator`] trait
//! - **Hot Reload**: credential files are re-read in the background and
//!   swapped in atomically
//! - **Decoy Domain**: valid credentials sent to a hidden domain get a
//!   harmless page instead of access
//!
//! # Example
//!
//! ```no_run
//! use dumbproxy_auth::auth::{new_auth, AuthRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = new_auth("basicfile://?path=/etc/dumbproxy.htpasswd&reload=30s")?;
//!     # let req = hyper::Request::new(());
//!     let verdict = auth.validate(&AuthRequest::from_http(&req));
//!     if !verdict.is_authorized() {
//!         let _response = verdict.into_response();
//!     }
//!     auth.stop();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod passwd;

// Re-export commonly used types
pub use auth::{new_auth, AuthRequest, Authenticator, Verdict};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
