//! Cookie-backed reactive state.
//!
//! [`CookieState`] mirrors one cookie into a value a UI layer can observe. It
//! is the combination of a [`CookieBackend`] (to read and write the cookie)
//! and a [`Subscription`] (to learn about changes), with a small lifecycle:
//!
//! ```text
//!  activate ──> Uninitialized ──(initial read | notification)──> Synced
//!                    ^                                              │
//!                    └──────────────── set_name ────────────────────┘
//!  dispose / drop ──> Disposed (from any state, terminal)
//! ```
//!
//! - While `Uninitialized` the observed value is the default passed to
//!   [`CookieState::activate`]. That first value never depends on the store,
//!   so a value rendered before any cookie access (e.g. server-side) matches
//!   the first client-side value.
//! - [`CookieState::update`] and [`CookieState::delete`] only write to the
//!   store. The observed value changes when the resulting notification comes
//!   back, never before, so it always reflects what the store reported.
//! - Every activation runs under a new epoch. Reads and notifications that
//!   belong to an older epoch (previous name, or disposed) are discarded.
//!
//! # Example
//! ```no_run
//! use gosub_cookie_state::config::CookieStateOptions;
//! use gosub_cookie_state::cookies::Environment;
//! use gosub_cookie_state::state::CookieState;
//!
//! # async fn demo() -> Result<(), gosub_cookie_state::errors::CookieError> {
//! let env = Environment::new();
//! let state = CookieState::activate(&env, "theme", Some("light".into()), CookieStateOptions::default());
//! let mut rx = state.watch();
//!
//! state.update("dark").await?;
//! rx.wait_for(|v| v.as_deref() == Some("dark")).await.ok();
//! # Ok(())
//! # }
//! ```

use crate::config::CookieStateOptions;
use crate::cookies::{select_backend, BackendKind, CookieBackendHandle, Environment, Subscription};
use crate::errors::{CookieError, Result};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::fmt::{Debug, Display};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Lifecycle of a [`CookieState`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Showing the default value; the store has not been read yet
    Uninitialized,
    /// Showing the value reported by the store (possibly `None`)
    Synced,
    /// Released; nothing will change anymore
    Disposed,
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Uninitialized => write!(f, "Uninitialized"),
            SyncStatus::Synced => write!(f, "Synced"),
            SyncStatus::Disposed => write!(f, "Disposed"),
        }
    }
}

struct Session {
    name: String,
    epoch: u64,
    status: SyncStatus,
    /// Set once a notification was applied in the current epoch. A late initial
    /// read must not overwrite it.
    notified: bool,
    options: CookieStateOptions,
    subscription: Option<Subscription>,
    last_error: Option<CookieError>,
}

struct Shared {
    session: Mutex<Session>,
    value: watch::Sender<Option<String>>,
}

impl Shared {
    /// Publishes `value`, waking observers only when it differs from the current one.
    fn publish(&self, value: Option<String>) {
        self.value.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    fn apply_initial_read(&self, epoch: u64, result: Result<Option<String>>) {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.status == SyncStatus::Disposed {
            debug!("Discarding stale read of cookie {:?}", session.name);
            return;
        }

        match result {
            Ok(_) if session.notified => {}
            Ok(value) => {
                session.status = SyncStatus::Synced;
                session.last_error = None;
                self.publish(value);
            }
            Err(e) => {
                warn!("Cannot read cookie {:?}, keeping current value: {}", session.name, e);
                session.last_error = Some(e);
            }
        }
    }

    fn apply_notification(&self, epoch: u64, value: Option<String>) {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.status == SyncStatus::Disposed {
            return;
        }

        session.status = SyncStatus::Synced;
        session.notified = true;
        session.last_error = None;
        self.publish(value);
    }
}

/// A cookie mirrored into observable state.
///
/// Must be created inside a Tokio runtime. Dropping it disposes it.
pub struct CookieState {
    backend: Option<CookieBackendHandle>,
    default_value: Option<String>,
    shared: Arc<Shared>,
}

impl Debug for CookieState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieState")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("value", &self.value())
            .field("backend", &self.backend_kind())
            .finish_non_exhaustive()
    }
}

impl CookieState {
    /// Starts observing cookie `name` in `env`.
    ///
    /// The backend is selected once, here, and used for the lifetime of the
    /// state (including after [`set_name`](Self::set_name)). When `env` offers
    /// no cookie access at all the state stays `Uninitialized` showing
    /// `default_value` and [`last_error`](Self::last_error) reports
    /// [`CookieError::BackendUnavailable`].
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn activate(
        env: &Environment,
        name: impl Into<String>,
        default_value: Option<String>,
        options: CookieStateOptions,
    ) -> Self {
        Self::from_selection(select_backend(env), name.into(), default_value, options)
    }

    /// Starts observing cookie `name` through an explicitly chosen backend.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn with_backend(
        backend: CookieBackendHandle,
        name: impl Into<String>,
        default_value: Option<String>,
        options: CookieStateOptions,
    ) -> Self {
        Self::from_selection(Ok(backend), name.into(), default_value, options)
    }

    fn from_selection(
        selection: Result<CookieBackendHandle>,
        name: String,
        default_value: Option<String>,
        options: CookieStateOptions,
    ) -> Self {
        let (backend, last_error) = match selection {
            Ok(backend) => (Some(backend), None),
            Err(e) => {
                error!("Cannot observe cookie {:?}: {}", name, e);
                (None, Some(e))
            }
        };

        let (tx, _rx) = watch::channel(default_value.clone());
        let state = Self {
            backend,
            default_value,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    name,
                    epoch: 0,
                    status: SyncStatus::Uninitialized,
                    notified: false,
                    options,
                    subscription: None,
                    last_error,
                }),
                value: tx,
            }),
        };

        state.start();
        state
    }

    /// Kicks off the initial read and subscribes for the current epoch.
    fn start(&self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };

        let (name, epoch, poll_interval) = {
            let session = self.shared.session.lock();
            (
                session.name.clone(),
                session.epoch,
                session.options.effective_poll_interval(),
            )
        };

        // The callback only holds a weak reference, so a leaked subscription cannot keep the state alive.
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let subscription = backend.subscribe(
            &name,
            Arc::new(move |value: Option<String>| {
                if let Some(shared) = weak.upgrade() {
                    shared.apply_notification(epoch, value);
                }
            }),
            poll_interval,
        );

        let replaced = {
            let mut session = self.shared.session.lock();
            session.subscription.replace(subscription)
        };
        drop(replaced);

        debug!("Observing cookie {:?} (epoch {})", name, epoch);

        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let result = backend.get(&name).await;
            if let Some(shared) = shared.upgrade() {
                shared.apply_initial_read(epoch, result);
            }
        });
    }

    /// Ends the current epoch and releases its subscription.
    ///
    /// Returns `false` when the state is already disposed.
    fn end_epoch(&self, next_status: SyncStatus) -> bool {
        let released = {
            let mut session = self.shared.session.lock();
            if session.status == SyncStatus::Disposed {
                return false;
            }
            session.epoch += 1;
            session.status = next_status;
            session.notified = false;
            session.subscription.take()
        };

        // Dropped outside the session lock: releasing waits for a running callback, which takes that lock.
        drop(released);
        true
    }

    /// Current observed value.
    pub fn value(&self) -> Option<String> {
        self.shared.value.borrow().clone()
    }

    /// Receiver that is notified whenever the observed value changes.
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.shared.value.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.session.lock().status
    }

    /// Name of the observed cookie.
    pub fn name(&self) -> String {
        self.shared.session.lock().name.clone()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn options(&self) -> CookieStateOptions {
        self.shared.session.lock().options.clone()
    }

    /// Backend in use, or `None` when no backend was available at activation.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Most recent error that was not returned to a caller (failed initial
    /// read, or no backend at activation). Cleared once the store reports a
    /// value again.
    pub fn last_error(&self) -> Option<CookieError> {
        self.shared.session.lock().last_error.clone()
    }

    fn target(&self) -> Result<(CookieBackendHandle, String)> {
        let session = self.shared.session.lock();
        if session.status == SyncStatus::Disposed {
            return Err(CookieError::Disposed);
        }
        let backend = self.backend.clone().ok_or(CookieError::BackendUnavailable)?;
        Ok((backend, session.name.clone()))
    }

    /// Writes `value` to the cookie.
    ///
    /// The observed value follows once the change is reported back by the
    /// subscription. Store failures are returned as-is.
    pub async fn update(&self, value: impl Into<String>) -> Result<()> {
        let (backend, name) = self.target()?;
        backend.set(&name, &value.into()).await.map_err(|e| {
            warn!("Cannot update cookie {:?}: {}", name, e);
            e
        })
    }

    /// Removes the cookie. Removing a missing cookie succeeds.
    ///
    /// The observed value becomes `None` once the removal is reported back.
    pub async fn delete(&self) -> Result<()> {
        let (backend, name) = self.target()?;
        backend.delete(&name).await.map_err(|e| {
            warn!("Cannot delete cookie {:?}: {}", name, e);
            e
        })
    }

    /// Switches observation to cookie `name`.
    ///
    /// The old subscription is released first. The state then starts over as
    /// if freshly activated: `Uninitialized`, showing the default value. Reads
    /// still in flight for the old name are discarded when they complete.
    /// Does nothing when `name` is unchanged or the state is disposed.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        {
            let session = self.shared.session.lock();
            if session.status == SyncStatus::Disposed || session.name == name {
                return;
            }
        }

        if !self.end_epoch(SyncStatus::Uninitialized) {
            return;
        }
        {
            let mut session = self.shared.session.lock();
            debug!("Cookie state switching from {:?} to {:?}", session.name, name);
            session.name = name;
            self.shared.publish(self.default_value.clone());
        }
        self.start();
    }

    /// Replaces the options. Resubscribes when the effective poll interval
    /// changes; the observed value is kept and refreshed by a new read.
    pub fn set_options(&mut self, options: CookieStateOptions) {
        let changed = {
            let mut session = self.shared.session.lock();
            if session.status == SyncStatus::Disposed {
                return;
            }
            let changed = session.options.effective_poll_interval() != options.effective_poll_interval();
            session.options = options;
            changed
        };

        if changed {
            let status = self.status();
            if self.end_epoch(status) {
                self.start();
            }
        }
    }

    /// Stops observing. The value is frozen and `update`/`delete` fail with
    /// [`CookieError::Disposed`]. Also happens on drop.
    pub fn dispose(&mut self) {
        if self.end_epoch(SyncStatus::Disposed) {
            debug!("Cookie state for {:?} disposed", self.name());
        }
    }
}

impl Drop for CookieState {
    fn drop(&mut self) {
        self.dispose();
    }
}
