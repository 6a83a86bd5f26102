//! The shared cookie jar behind both cookie views.
//!
//! A [`CookieJar`] holds every cookie of one origin, in insertion order (the
//! order `document.cookie` reports them in). Each mutation is broadcast on the
//! jar's change bus as a [`CookieChangeEvent`], regardless of which view
//! (native store or `document.cookie`) made it. That mirrors browsers, where a
//! `document.cookie` write also fires `cookieStore` change events.
//!
//! ## Concurrency
//! The jar is internally synchronized and is shared as a [`CookieJarHandle`].
//! Events are published while the write lock is held, so subscribers observe
//! mutations in the order they were applied.

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::cookies::cookie::{Cookie, CookieChangeEvent, CookieListItem};
use crate::errors::{CookieError, Result};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Browsers refuse cookies whose name and value together exceed this many bytes.
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Reference-counted handle to a shared jar.
pub type CookieJarHandle = Arc<CookieJar>;

/// Receiver side of the jar's change bus.
pub type ChangeReceiver = broadcast::Receiver<CookieChangeEvent>;

#[derive(Debug)]
struct CookieBus {
    tx: broadcast::Sender<CookieChangeEvent>,
}

impl Default for CookieBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl CookieBus {
    fn subscribe(&self) -> ChangeReceiver {
        self.tx.subscribe()
    }

    fn publish(&self, ev: CookieChangeEvent) {
        // send() only fails when nobody is listening
        let _ = self.tx.send(ev);
    }
}

pub struct CookieJar {
    entries: RwLock<Vec<Cookie>>,
    enabled: AtomicBool,
    bus: CookieBus,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(true),
            bus: CookieBus::default(),
        }
    }
}

impl Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("cookies", &self.entries.read().len())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every future mutation of the jar.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.bus.subscribe()
    }

    /// Enables or disables cookies. While disabled, every operation fails with
    /// [`CookieError::StoreOperationFailed`].
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(CookieError::StoreOperationFailed("cookies are disabled".into()))
        }
    }

    /// Returns the cookie named `name`, or `None` when it does not exist.
    pub fn get(&self, name: &str) -> Result<Option<Cookie>> {
        self.ensure_enabled()?;
        Ok(self.entries.read().iter().find(|c| c.name == name).cloned())
    }

    /// Returns all cookies in insertion order.
    pub fn all(&self) -> Result<Vec<Cookie>> {
        self.ensure_enabled()?;
        Ok(self.entries.read().clone())
    }

    /// Stores `cookie`, replacing an existing cookie with the same name in place.
    pub fn store(&self, cookie: Cookie) -> Result<()> {
        self.ensure_enabled()?;
        validate(&cookie)?;

        let mut entries = self.entries.write();
        let event = CookieChangeEvent::changed(&cookie);
        if let Some(existing) = entries.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            entries.push(cookie);
        }
        self.bus.publish(event);

        Ok(())
    }

    /// Removes the cookie named `name`. Returns whether a cookie was removed.
    ///
    /// Removing a missing cookie is not an error and publishes nothing.
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.ensure_enabled()?;

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|c| c.name != name);
        let removed = entries.len() != before;
        if removed {
            self.bus.publish(CookieChangeEvent::deleted(name));
        }

        Ok(removed)
    }

    /// Removes all cookies, publishing them as a single batch.
    pub fn clear(&self) -> Result<()> {
        self.ensure_enabled()?;

        let mut entries = self.entries.write();
        let mut event = CookieChangeEvent::default();
        for cookie in entries.drain(..) {
            event.deleted.push(CookieListItem {
                name: cookie.name,
                value: None,
            });
        }
        if !event.is_empty() {
            self.bus.publish(event);
        }

        Ok(())
    }
}

fn validate(cookie: &Cookie) -> Result<()> {
    if cookie.name.contains(['=', ';']) || cookie.name.chars().any(char::is_control) {
        return Err(CookieError::StoreOperationFailed(format!(
            "invalid cookie name {:?}",
            cookie.name
        )));
    }
    if cookie.value.contains(';') || cookie.value.chars().any(char::is_control) {
        return Err(CookieError::StoreOperationFailed(format!(
            "invalid value for cookie {:?}",
            cookie.name
        )));
    }
    if cookie.name.len() + cookie.value.len() > MAX_COOKIE_SIZE {
        return Err(CookieError::StoreOperationFailed(format!(
            "cookie {:?} exceeds {} bytes",
            cookie.name, MAX_COOKIE_SIZE
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_basic_contract() {
        let jar = CookieJar::new();

        assert!(jar.get("missing").unwrap().is_none());

        jar.store(Cookie::new("a", "1")).unwrap();
        jar.store(Cookie::new("b", "2")).unwrap();
        assert_eq!(jar.get("a").unwrap().unwrap().value, "1");

        // overwrite keeps insertion order
        jar.store(Cookie::new("a", "ONE")).unwrap();
        let names: Vec<_> = jar.all().unwrap().into_iter().map(|c| (c.name, c.value)).collect();
        assert_eq!(
            names,
            vec![("a".to_string(), "ONE".to_string()), ("b".to_string(), "2".to_string())]
        );

        assert!(jar.remove("b").unwrap());
        assert!(!jar.remove("b").unwrap());
        assert!(jar.get("b").unwrap().is_none());

        jar.clear().unwrap();
        assert!(jar.all().unwrap().is_empty());
    }

    #[test]
    fn mutations_are_broadcast_in_order() {
        let jar = CookieJar::new();
        let mut rx = jar.subscribe();

        jar.store(Cookie::new("a", "1")).unwrap();
        jar.remove("a").unwrap();
        jar.remove("a").unwrap(); // no-op, no event
        jar.store(Cookie::new("b", "2")).unwrap();
        jar.store(Cookie::new("c", "3")).unwrap();
        jar.clear().unwrap();

        assert_eq!(rx.try_recv().unwrap().resolve("a"), Some(Some("1".into())));
        assert_eq!(rx.try_recv().unwrap().resolve("a"), Some(None));
        assert_eq!(rx.try_recv().unwrap().resolve("b"), Some(Some("2".into())));
        assert_eq!(rx.try_recv().unwrap().resolve("c"), Some(Some("3".into())));

        let cleared = rx.try_recv().unwrap();
        assert_eq!(cleared.deleted.len(), 2);
        assert_eq!(cleared.resolve("b"), Some(None));
        assert_eq!(cleared.resolve("c"), Some(None));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_jar_rejects_everything() {
        let jar = CookieJar::new();
        jar.store(Cookie::new("a", "1")).unwrap();
        jar.set_enabled(false);

        assert!(matches!(jar.get("a"), Err(CookieError::StoreOperationFailed(_))));
        assert!(matches!(jar.store(Cookie::new("a", "2")), Err(CookieError::StoreOperationFailed(_))));
        assert!(matches!(jar.remove("a"), Err(CookieError::StoreOperationFailed(_))));

        jar.set_enabled(true);
        assert_eq!(jar.get("a").unwrap().unwrap().value, "1");
    }

    #[test]
    fn oversized_and_malformed_cookies_are_rejected() {
        let jar = CookieJar::new();

        let big = "x".repeat(MAX_COOKIE_SIZE);
        assert!(jar.store(Cookie::new("n", big)).is_err());
        assert!(jar.store(Cookie::new("a=b", "1")).is_err());
        assert!(jar.store(Cookie::new("a", "1;2")).is_err());
        assert!(jar.all().unwrap().is_empty());
    }
}
