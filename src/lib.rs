//! Mirror a cookie into reactive state.
//!
//! The crate exposes [`CookieState`](state::CookieState), which observes one
//! cookie and keeps an observable value in sync with it, on top of two cookie
//! backends: the native, event-capable cookie store and a `document.cookie`
//! fallback that polls for changes.

pub mod config;
pub mod cookies;
pub mod errors;
pub mod state;

pub use config::CookieStateOptions;
pub use cookies::Environment;
pub use errors::CookieError;
pub use state::{CookieState, SyncStatus};
