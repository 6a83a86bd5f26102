use crate::cookies::backend::{BackendKind, CookieBackend};
use crate::cookies::cookie_store::NativeCookieStore;
use crate::cookies::notify::{self, ChangeCallback, Subscription};
use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Backend on top of the native cookie store. Changes arrive as events.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    store: NativeCookieStore,
}

impl NativeBackend {
    pub fn new(store: NativeCookieStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CookieBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.store.get(name).await?.map(|c| c.value))
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.store.set(name, value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store.delete(name).await
    }

    fn subscribe(&self, name: &str, on_change: ChangeCallback, _poll_interval: Duration) -> Subscription {
        notify::spawn_event_listener(name, self.store.clone(), on_change)
    }
}
