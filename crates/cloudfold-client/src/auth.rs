//! Bearer token and session-expiry signalling.
//!
//! The client never decides what happens when a session ends. A `401` from any
//! request fires the callback held by [`SessionGuard`]; the caller (a UI shell,
//! the CLI) decides whether to redirect, prompt, or exit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Token provider for API authentication.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    /// Static token (from config or env).
    Static(String),

    /// No authentication.
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Read `CLOUDFOLD_TOKEN`, falling back to no auth.
    pub fn from_env() -> Self {
        match std::env::var("CLOUDFOLD_TOKEN") {
            Ok(token) if !token.is_empty() => Self::Static(token),
            _ => Self::None,
        }
    }

    /// Get the current token.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Static(token) => Some(token),
            Self::None => None,
        }
    }

    /// Check if authentication is configured.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::from_env()
    }
}

type ExpiryHook = dyn Fn() + Send + Sync;

/// Holds the caller-supplied session-expiry handler.
///
/// The handler fires at most once per session: concurrent requests that all
/// hit a `401` produce a single teardown. [`SessionGuard::rearm`] starts a new
/// session (after the caller has signed in again).
#[derive(Clone)]
pub struct SessionGuard {
    on_expired: Arc<ExpiryHook>,
    expired: Arc<AtomicBool>,
}

impl SessionGuard {
    pub fn new(on_expired: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_expired: Arc::new(on_expired),
            expired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A guard whose handler does nothing.
    pub fn detached() -> Self {
        Self::new(|| {})
    }

    /// Report a `401`. Returns `true` if this call fired the handler.
    pub fn signal_expired(&self) -> bool {
        if self.expired.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!("session expired, notifying handler");
        (self.on_expired)();
        true
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Start a new session.
    pub fn rearm(&self) {
        self.expired.store(false, Ordering::SeqCst);
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("expired", &self.is_expired())
            .finish_non_exhaustive()
    }
}
