//! Cookie access backends.
//!
//! A [`CookieBackend`] reads, writes and deletes single cookies by name, and
//! can subscribe to changes of one cookie. There are two implementations:
//!
//! - [`NativeBackend`]: uses the native cookie store and its change events.
//! - [`FallbackBackend`]: parses and writes `document.cookie` directly and
//!   detects changes by polling.
//!
//! [`select_backend`] is the single place that decides which one to use. It
//! re-runs feature detection on every call, so flipping a capability on an
//! [`Environment`] takes effect immediately for the free functions in this
//! module. Long-lived consumers (like [`CookieState`](crate::state::CookieState))
//! select once and keep that backend, so one observation session never mixes
//! the two notification strategies.
//!
//! Neither backend invokes subscription callbacks from `set` or `delete`;
//! changes are only ever reported through a [`Subscription`].

mod fallback;
mod native;

use crate::cookies::environment::Environment;
use crate::cookies::notify::{ChangeCallback, Subscription};
use crate::errors::{CookieError, Result};
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;

pub use fallback::FallbackBackend;
pub use native::NativeBackend;

/// Which backend implementation is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Native cookie store with change events
    Native,
    /// `document.cookie` with polling
    DocumentFallback,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::DocumentFallback => write!(f, "document-fallback"),
        }
    }
}

#[async_trait]
pub trait CookieBackend: Send + Sync + Debug {
    fn kind(&self) -> BackendKind;

    /// Returns the value of cookie `name`, or `None` when there is no such cookie.
    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Writes cookie `name`.
    async fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Removes cookie `name`. Removing a missing cookie succeeds.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Calls `on_change` with the new value (or `None` once deleted) whenever
    /// cookie `name` changes, until the returned [`Subscription`] is released.
    ///
    /// `poll_interval` is only used by backends without change events.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    fn subscribe(&self, name: &str, on_change: ChangeCallback, poll_interval: Duration) -> Subscription;
}

pub type CookieBackendHandle = Arc<dyn CookieBackend>;

/// Picks the backend for `env`: native when available, otherwise the
/// `document.cookie` fallback, otherwise [`CookieError::BackendUnavailable`].
pub fn select_backend(env: &Environment) -> Result<CookieBackendHandle> {
    if let Some(store) = env.cookie_store() {
        return Ok(Arc::new(NativeBackend::new(store)));
    }

    match env.document() {
        Some(document) => Ok(Arc::new(FallbackBackend::new(document))),
        None => Err(CookieError::BackendUnavailable),
    }
}

/// Reads cookie `name` through whichever backend `env` currently offers.
pub async fn get_cookie(env: &Environment, name: &str) -> Result<Option<String>> {
    select_backend(env)?.get(name).await
}

/// Writes cookie `name` through whichever backend `env` currently offers.
pub async fn set_cookie(env: &Environment, name: &str, value: &str) -> Result<()> {
    select_backend(env)?.set(name, value).await
}

/// Removes cookie `name` through whichever backend `env` currently offers.
pub async fn delete_cookie(env: &Environment, name: &str) -> Result<()> {
    select_backend(env)?.delete(name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cookies::environment::has_cookie_store;

    #[test]
    fn selection_follows_feature_detection() {
        let env = Environment::new();
        assert!(has_cookie_store(&env));
        assert_eq!(select_backend(&env).unwrap().kind(), BackendKind::Native);

        env.set_cookie_store_available(false);
        assert_eq!(select_backend(&env).unwrap().kind(), BackendKind::DocumentFallback);

        env.set_document_available(false);
        assert_eq!(select_backend(&env).unwrap_err(), CookieError::BackendUnavailable);

        env.set_cookie_store_available(true);
        assert_eq!(select_backend(&env).unwrap().kind(), BackendKind::Native);
    }

    #[tokio::test]
    async fn both_backends_agree_on_values() {
        let env = Environment::new();

        set_cookie(&env, "user", r#"{"name":"Jane","age":25}"#).await.unwrap();
        env.set_cookie_store_available(false);
        assert_eq!(
            get_cookie(&env, "user").await.unwrap().as_deref(),
            Some(r#"{"name":"Jane","age":25}"#)
        );

        set_cookie(&env, "greeting", "hello, world; bye").await.unwrap();
        env.set_cookie_store_available(true);
        // the native store sees the encoded form written by the fallback
        assert_eq!(
            get_cookie(&env, "greeting").await.unwrap().as_deref(),
            Some("hello%2C%20world%3B%20bye")
        );
        env.set_cookie_store_available(false);
        assert_eq!(
            get_cookie(&env, "greeting").await.unwrap().as_deref(),
            Some("hello, world; bye")
        );
        env.set_cookie_store_available(true);

        delete_cookie(&env, "user").await.unwrap();
        env.set_cookie_store_available(false);
        assert_eq!(get_cookie(&env, "user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_backend_is_reported_by_every_operation() {
        let env = Environment::without_document();
        assert_eq!(get_cookie(&env, "a").await, Err(CookieError::BackendUnavailable));
        assert_eq!(set_cookie(&env, "a", "1").await, Err(CookieError::BackendUnavailable));
        assert_eq!(delete_cookie(&env, "a").await, Err(CookieError::BackendUnavailable));
    }
}
