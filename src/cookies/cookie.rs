//! Cookie core types.
//!
//! [`Cookie`] is what the jar stores. [`CookieChangeEvent`] is what the jar
//! broadcasts after every mutation, shaped like the `change` event of the
//! native cookie store: one batch holding the cookies that were set and the
//! cookies that were removed.

use serde::{Deserialize, Serialize};

/// A cookie as stored by the jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value. The jar never decodes or encodes it.
    pub value: String,

    /// Path scoping (e.g., `"/"`). Stored, not enforced.
    pub path: Option<String>,

    /// If `true`, cookie is sent only over HTTPS.
    pub secure: bool,

    /// Expiration timestamp as written by the caller (RFC 2822), if any.
    /// Session cookies have `None`.
    pub expires: Option<String>,

    /// SameSite policy (`"Strict"`, `"Lax"`, or `"None"`).
    pub same_site: Option<String>,
}

impl Cookie {
    /// Creates a session cookie scoped to `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: Some("/".to_string()),
            secure: false,
            expires: None,
            same_site: None,
        }
    }
}

/// Name/value record carried by a [`CookieChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieListItem {
    pub name: String,
    /// Always `Some` for changed cookies, `None` for deleted ones.
    pub value: Option<String>,
}

impl From<&Cookie> for CookieListItem {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: Some(cookie.value.clone()),
        }
    }
}

/// One batch of cookie changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieChangeEvent {
    /// Cookies that were created or overwritten.
    pub changed: Vec<CookieListItem>,
    /// Cookies that were removed.
    pub deleted: Vec<CookieListItem>,
}

impl CookieChangeEvent {
    pub fn changed(cookie: &Cookie) -> Self {
        Self {
            changed: vec![cookie.into()],
            deleted: Vec::new(),
        }
    }

    pub fn deleted(name: &str) -> Self {
        Self {
            changed: Vec::new(),
            deleted: vec![CookieListItem {
                name: name.to_string(),
                value: None,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Resolves what this batch means for the cookie `name`.
    ///
    /// Returns `Some(Some(value))` when `name` was changed, `Some(None)` when it
    /// was deleted, and `None` when the batch does not mention it. `changed` is
    /// scanned first and the first match wins, so a name present in both lists
    /// reports its changed value.
    pub fn resolve(&self, name: &str) -> Option<Option<String>> {
        if let Some(item) = self.changed.iter().find(|c| c.name == name) {
            return Some(item.value.clone());
        }

        if self.deleted.iter().any(|c| c.name == name) {
            return Some(None);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, value: Option<&str>) -> CookieListItem {
        CookieListItem {
            name: name.into(),
            value: value.map(String::from),
        }
    }

    #[test]
    fn resolve_reports_changed_value() {
        let ev = CookieChangeEvent::changed(&Cookie::new("a", "1"));
        assert_eq!(ev.resolve("a"), Some(Some("1".to_string())));
        assert_eq!(ev.resolve("b"), None);
    }

    #[test]
    fn resolve_reports_deletion() {
        let ev = CookieChangeEvent::deleted("a");
        assert_eq!(ev.resolve("a"), Some(None));
        assert_eq!(ev.resolve("other"), None);
    }

    #[test]
    fn resolve_first_changed_match_wins() {
        let ev = CookieChangeEvent {
            changed: vec![item("x", Some("ignored")), item("a", Some("first")), item("a", Some("second"))],
            deleted: vec![],
        };
        assert_eq!(ev.resolve("a"), Some(Some("first".to_string())));
    }

    #[test]
    fn resolve_changed_wins_over_deleted() {
        let ev = CookieChangeEvent {
            changed: vec![item("a", Some("kept"))],
            deleted: vec![item("a", None)],
        };
        assert_eq!(ev.resolve("a"), Some(Some("kept".to_string())));
    }

    #[test]
    fn empty_value_is_not_absence() {
        let ev = CookieChangeEvent::changed(&Cookie::new("a", ""));
        assert_eq!(ev.resolve("a"), Some(Some(String::new())));
        assert!(!ev.is_empty());
        assert!(CookieChangeEvent::default().is_empty());
    }
}
