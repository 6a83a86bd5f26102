//! Cookie change notifications.
//!
//! [`listen_for_cookie_change`] watches a single cookie and calls back with its
//! new value (or `None` once deleted). Depending on the environment it uses
//! one of two strategies:
//!
//! - **Event-driven**: a task listens on the jar's change bus and resolves
//!   each batch with [`CookieChangeEvent::resolve`]. Batches that do not
//!   mention the cookie produce no callback.
//! - **Polling**: a task re-reads the cookie every `poll_interval` and reports
//!   the value on every tick, changed or not. Consumers deduplicate.
//!
//! Either way the result is a [`Subscription`]. Releasing it (explicitly with
//! [`Subscription::unsubscribe`] or by dropping it) guarantees that the
//! callback is never invoked again once the release returns, even when an
//! event or tick is already being processed. A callback may release its own
//! subscription; the release then takes effect once that callback returns.

use crate::cookies::backend::{select_backend, CookieBackendHandle};
use crate::cookies::cookie::CookieChangeEvent;
use crate::cookies::cookie_store::NativeCookieStore;
use crate::cookies::environment::Environment;
use crate::cookies::jar::ChangeReceiver;
use crate::errors::Result;
use log::{debug, warn};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Callback receiving a cookie's new value, or `None` when it was deleted.
pub type ChangeCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// A unique identifier for a subscription, used to correlate log lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Holds the callback until the subscription is released.
///
/// The lock is held for the duration of a callback. It is reentrant so that a
/// callback can release its own slot without waiting on itself.
#[derive(Clone)]
struct CallbackSlot(Arc<ReentrantMutex<RefCell<Option<ChangeCallback>>>>);

impl CallbackSlot {
    fn new(callback: ChangeCallback) -> Self {
        Self(Arc::new(ReentrantMutex::new(RefCell::new(Some(callback)))))
    }

    /// Invokes the callback. Returns `false` once the slot has been released.
    fn notify(&self, value: Option<String>) -> bool {
        let guard = self.0.lock();
        // Cloned out so the borrow is not held while the callback runs.
        let callback = guard.borrow().clone();
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    fn release(&self) {
        let guard = self.0.lock();
        let released = guard.borrow_mut().take();
        drop(guard);
        drop(released);
    }
}

/// Active registration of interest in one cookie.
///
/// Owns the listener or polling task. Dropping the subscription releases it.
pub struct Subscription {
    id: SubscriptionId,
    name: String,
    slot: CallbackSlot,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    fn new(name: &str, callback: ChangeCallback) -> Self {
        Self {
            id: SubscriptionId::new(),
            name: name.to_string(),
            slot: CallbackSlot::new(callback),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the observed cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops notifications and frees the listener or timer.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        // Emptying the slot first waits out any callback that is running right now.
        self.slot.release();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Subscription {} for cookie {:?} released", self.id, self.name);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Watches cookie `name` in `env`, calling `on_change` with every new value.
///
/// The strategy is chosen by the same feature detection as
/// [`select_backend`]: event-driven with the native store, polling every
/// `poll_interval` with the `document.cookie` fallback.
///
/// # Panics
/// Must be called from within a Tokio runtime.
pub fn listen_for_cookie_change<F>(
    env: &Environment,
    name: &str,
    on_change: F,
    poll_interval: Duration,
) -> Result<Subscription>
where
    F: Fn(Option<String>) + Send + Sync + 'static,
{
    let backend = select_backend(env)?;
    Ok(backend.subscribe(name, Arc::new(on_change), poll_interval))
}

/// Starts the event-driven strategy on `store`.
pub(crate) fn spawn_event_listener(name: &str, store: NativeCookieStore, on_change: ChangeCallback) -> Subscription {
    let mut sub = Subscription::new(name, on_change);
    // Subscribe before returning so no change after this call is missed.
    let mut rx = store.subscribe();

    let id = sub.id;
    let name = sub.name.clone();
    let slot = sub.slot.clone();
    let cancel = sub.cancel.clone();

    debug!("Subscription {} listening for changes to cookie {:?}", id, name);
    sub.task = Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = rx.recv() => match res {
                    Ok(event) => {
                        if !deliver(&slot, &event, &name) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscription {} lagged {} change events for cookie {:?}", id, skipped, name);
                        let (latest, closed) = drain_latest(&mut rx, &name);
                        // Only the newest value is reported, so observers never see it move backwards.
                        let value = match latest {
                            Some(value) => Some(value),
                            None => match store.get(&name).await {
                                Ok(cookie) => Some(cookie.map(|c| c.value)),
                                Err(e) => {
                                    warn!("Subscription {}: cannot re-read cookie {:?}: {}", id, name, e);
                                    None
                                }
                            },
                        };
                        if let Some(value) = value {
                            if !slot.notify(value) {
                                break;
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }));

    sub
}

/// Empties the retained backlog and returns the last value it holds for `name`,
/// plus whether the bus has closed.
fn drain_latest(
    rx: &mut ChangeReceiver,
    name: &str,
) -> (Option<Option<String>>, bool) {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(event) => {
                if let Some(value) = event.resolve(name) {
                    latest = Some(value);
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return (latest, false),
            Err(TryRecvError::Closed) => return (latest, true),
        }
    }
}

fn deliver(slot: &CallbackSlot, event: &CookieChangeEvent, name: &str) -> bool {
    match event.resolve(name) {
        Some(value) => slot.notify(value),
        None => true,
    }
}

/// Starts the polling strategy, reading `name` through `backend` every `period`.
pub(crate) fn spawn_poller(
    name: &str,
    backend: CookieBackendHandle,
    on_change: ChangeCallback,
    period: Duration,
) -> Subscription {
    let mut sub = Subscription::new(name, on_change);

    let id = sub.id;
    let name = sub.name.clone();
    let slot = sub.slot.clone();
    let cancel = sub.cancel.clone();

    debug!("Subscription {} polling cookie {:?} every {:?}", id, name, period);
    sub.task = Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match backend.get(&name).await {
                        Ok(value) => {
                            if !slot.notify(value) {
                                break;
                            }
                        }
                        Err(e) => warn!("Subscription {}: cannot poll cookie {:?}: {}", id, name, e),
                    }
                }
            }
        }
    }));

    sub
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::backend::{set_cookie, BackendKind};
    use tokio::sync::mpsc;

    fn recorder() -> (ChangeCallback, mpsc::UnboundedReceiver<Option<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cb: ChangeCallback = Arc::new(move |v| {
            let _ = tx.send(v);
        });
        (cb, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Option<String>>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification timed out")
            .expect("callback dropped")
    }

    #[tokio::test]
    async fn event_driven_reports_changes_and_deletes_for_its_name_only() {
        let env = Environment::new();
        let store = env.cookie_store().unwrap();
        let (cb, mut rx) = recorder();
        let _sub = spawn_event_listener("watched", store.clone(), cb);

        store.set("other", "x").await.unwrap();
        store.set("watched", "1").await.unwrap();
        store.delete("watched").await.unwrap();
        store.set("watched", "").await.unwrap();

        assert_eq!(next(&mut rx).await.as_deref(), Some("1"));
        assert_eq!(next(&mut rx).await, None);
        assert_eq!(next(&mut rx).await.as_deref(), Some(""));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn event_driven_sees_document_writes() {
        let env = Environment::new();
        let (cb, mut rx) = recorder();
        let _sub = spawn_event_listener("a", env.cookie_store().unwrap(), cb);

        env.document().unwrap().set_cookie("a=from-script").unwrap();
        assert_eq!(next(&mut rx).await.as_deref(), Some("from-script"));
    }

    #[tokio::test]
    async fn event_driven_unsubscribe_stops_callbacks() {
        let env = Environment::new();
        let store = env.cookie_store().unwrap();
        let (cb, mut rx) = recorder();
        let sub = spawn_event_listener("a", store.clone(), cb);
        assert!(sub.is_active());

        sub.unsubscribe();
        store.set("a", "1").await.unwrap();
        tokio::task::yield_now().await;

        // the callback (and with it the sender) is gone
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn lagged_listener_reports_current_value() {
        let env = Environment::new();
        let store = env.cookie_store().unwrap();
        let (cb, mut rx) = recorder();
        let _sub = spawn_event_listener("a", store.clone(), cb);

        // overflow the bus before the listener gets to run
        for i in 0..(crate::config::DEFAULT_CHANNEL_CAPACITY + 10) {
            store.set("noise", &i.to_string()).await.unwrap();
        }
        store.set("a", "final").await.unwrap();

        assert_eq!(next(&mut rx).await.as_deref(), Some("final"));
    }

    #[tokio::test]
    async fn lagged_listener_never_reports_older_values() {
        let env = Environment::new();
        let store = env.cookie_store().unwrap();
        let (cb, mut rx) = recorder();
        let _sub = spawn_event_listener("a", store.clone(), cb);

        let writes = crate::config::DEFAULT_CHANNEL_CAPACITY + 72;
        for i in 0..writes {
            store.set("a", &i.to_string()).await.unwrap();
        }
        let last = (writes - 1).to_string();

        assert_eq!(next(&mut rx).await.as_deref(), Some(last.as_str()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        store.set("a", "after").await.unwrap();
        assert_eq!(next(&mut rx).await.as_deref(), Some("after"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callback_can_release_its_own_subscription() {
        let env = Environment::new();
        let store = env.cookie_store().unwrap();
        let holder: Arc<parking_lot::Mutex<Option<Subscription>>> = Arc::new(parking_lot::Mutex::new(None));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let own = holder.clone();
        let sub = spawn_event_listener(
            "a",
            store.clone(),
            Arc::new(move |v| {
                let released = own.lock().take();
                drop(released);
                let _ = tx.send(v);
            }),
        );
        *holder.lock() = Some(sub);

        store.set("a", "1").await.unwrap();
        assert_eq!(next(&mut rx).await.as_deref(), Some("1"));
        assert!(holder.lock().is_none());

        // one-shot: later changes are not reported and the callback is gone
        store.set("a", "2").await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(closed, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_reports_on_every_tick() {
        let env = Environment::without_cookie_store();
        let (cb, mut rx) = recorder();
        let sub = listen_for_cookie_change(
            &env,
            "a",
            move |v| cb(v),
            Duration::from_millis(100),
        )
        .unwrap();

        let start = Instant::now();
        assert_eq!(next(&mut rx).await, None);
        assert!(start.elapsed() >= Duration::from_millis(100));

        set_cookie(&env, "a", "1").await.unwrap();
        assert_eq!(next(&mut rx).await.as_deref(), Some("1"));
        // unchanged value is still reported
        assert_eq!(next(&mut rx).await.as_deref(), Some("1"));
        assert!(start.elapsed() >= Duration::from_millis(300));

        drop(sub);
        set_cookie(&env, "a", "2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_skips_failed_reads() {
        let env = Environment::without_cookie_store();
        let (cb, mut rx) = recorder();
        let _sub = listen_for_cookie_change(&env, "a", move |v| cb(v), Duration::from_millis(10)).unwrap();

        env.set_cookies_enabled(false);
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(rx.try_recv().is_err());

        env.set_cookies_enabled(true);
        assert_eq!(next(&mut rx).await, None);
    }

    #[tokio::test]
    async fn strategy_follows_environment() {
        let env = Environment::new();
        assert_eq!(select_backend(&env).unwrap().kind(), BackendKind::Native);
        let sub = listen_for_cookie_change(&env, "a", |_| {}, Duration::from_secs(1)).unwrap();
        assert_eq!(sub.name(), "a");

        let bare = Environment::without_document();
        assert!(listen_for_cookie_change(&bare, "a", |_| {}, Duration::from_secs(1)).is_err());
    }
}
