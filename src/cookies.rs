//! Cookies: the shared [`CookieJar`], its two views, the access backends and
//! change notifications.

mod backend;
mod cookie;
mod cookie_store;
mod document;
mod environment;
mod jar;
mod notify;

pub use cookie::{Cookie, CookieChangeEvent, CookieListItem};
pub use cookie_store::NativeCookieStore;
pub use document::DocumentCookies;
pub use environment::{has_cookie_store, Environment};
pub use jar::{ChangeReceiver, CookieJar, CookieJarHandle, MAX_COOKIE_SIZE};

pub use backend::{
    delete_cookie, get_cookie, select_backend, set_cookie, BackendKind, CookieBackend, CookieBackendHandle,
    FallbackBackend, NativeBackend,
};
pub use notify::{listen_for_cookie_change, ChangeCallback, Subscription, SubscriptionId};
