//! The browsing environment cookies are accessed from.
//!
//! An [`Environment`] stands in for a page's global scope: it owns (a handle
//! to) the origin's [`CookieJar`] and exposes up to two ways of reaching it:
//!
//! - the native cookie store, when the runtime supports it, and
//! - `document.cookie`, when there is a document at all.
//!
//! Both capabilities can be switched on and off at runtime, which is how tests
//! and polyfills emulate browsers without a native cookie store, or a
//! non-browser runtime with neither.
//!
//! Clones of an environment are the *same* page. [`Environment::new_tab`]
//! opens another page of the same origin: it shares the jar but has its own
//! capability flags.

use crate::cookies::cookie_store::NativeCookieStore;
use crate::cookies::document::DocumentCookies;
use crate::cookies::jar::{CookieJar, CookieJarHandle};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_ENVIRONMENT: Environment = Environment::new();
}

#[derive(Debug, Clone)]
pub struct Environment {
    jar: CookieJarHandle,
    cookie_store_available: Arc<AtomicBool>,
    document_available: Arc<AtomicBool>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment with a fresh jar and both capabilities available.
    pub fn new() -> Self {
        Self::with_jar(Arc::new(CookieJar::new()))
    }

    pub fn with_jar(jar: CookieJarHandle) -> Self {
        Self {
            jar,
            cookie_store_available: Arc::new(AtomicBool::new(true)),
            document_available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// An environment whose runtime lacks the native cookie store (only `document.cookie`).
    pub fn without_cookie_store() -> Self {
        let env = Self::new();
        env.set_cookie_store_available(false);
        env
    }

    /// An environment with neither capability, like a server-side runtime.
    pub fn without_document() -> Self {
        let env = Self::new();
        env.set_cookie_store_available(false);
        env.set_document_available(false);
        env
    }

    /// Process-wide environment shared by everything that does not bring its own.
    pub fn global() -> &'static Environment {
        &GLOBAL_ENVIRONMENT
    }

    /// Opens another page on the same cookie jar, with this page's current capabilities.
    pub fn new_tab(&self) -> Self {
        let tab = Self::with_jar(self.jar.clone());
        tab.set_cookie_store_available(self.cookie_store_available.load(Ordering::SeqCst));
        tab.set_document_available(self.document_available.load(Ordering::SeqCst));
        tab
    }

    pub fn jar(&self) -> &CookieJarHandle {
        &self.jar
    }

    pub fn set_cookie_store_available(&self, available: bool) {
        self.cookie_store_available.store(available, Ordering::SeqCst);
    }

    pub fn set_document_available(&self, available: bool) {
        self.document_available.store(available, Ordering::SeqCst);
    }

    /// Enables or disables cookies for the whole origin (every page sharing the jar).
    pub fn set_cookies_enabled(&self, enabled: bool) {
        self.jar.set_enabled(enabled);
    }

    /// The native cookie store, if this runtime has one.
    pub fn cookie_store(&self) -> Option<NativeCookieStore> {
        if self.cookie_store_available.load(Ordering::SeqCst) {
            Some(NativeCookieStore::new(self.jar.clone()))
        } else {
            None
        }
    }

    /// `document.cookie`, if this runtime has a document.
    pub fn document(&self) -> Option<DocumentCookies> {
        if self.document_available.load(Ordering::SeqCst) {
            Some(DocumentCookies::new(self.jar.clone()))
        } else {
            None
        }
    }
}

/// Feature detection: does `env` provide the native, change-capable cookie store?
pub fn has_cookie_store(env: &Environment) -> bool {
    env.cookie_store().is_some()
}
