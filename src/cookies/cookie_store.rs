//! Native cookie store view over a [`CookieJar`].
//!
//! This is the event-capable API: async `get`/`set`/`delete` on individual
//! cookies, plus a stream of [`CookieChangeEvent`](crate::cookies::CookieChangeEvent)
//! batches. Names and values are stored verbatim.

use crate::cookies::cookie::Cookie;
use crate::cookies::jar::{ChangeReceiver, CookieJarHandle};
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct NativeCookieStore {
    jar: CookieJarHandle,
}

impl NativeCookieStore {
    pub fn new(jar: CookieJarHandle) -> Self {
        Self { jar }
    }

    /// Returns the cookie named `name`, or `None` when it does not exist.
    pub async fn get(&self, name: &str) -> Result<Option<Cookie>> {
        self.jar.get(name)
    }

    pub async fn get_all(&self) -> Result<Vec<Cookie>> {
        self.jar.all()
    }

    /// Sets a session cookie scoped to `/`.
    pub async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.jar.store(Cookie::new(name, value))
    }

    /// Deletes the cookie named `name`. Deleting a missing cookie succeeds.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.jar.remove(name).map(|_| ())
    }

    /// Equivalent of `addEventListener("change", ...)`. Dropping the receiver removes the listener.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.jar.subscribe()
    }
}
