//! `document.cookie` view over a [`CookieJar`].
//!
//! Reading returns every cookie as one `"name=value; name2=value2"` string.
//! Writing takes a single `Set-Cookie`-like line (`name=value; attr=...`) and
//! stores or removes one cookie.
//!
//! ## Parsing behavior
//! - Attributes handled: `Path`, `Expires` (RFC 2822), `Max-Age`, `SameSite`
//!   (`Strict`/`Lax`/`None`, case-insensitive) and `Secure`. Unknown
//!   attributes are ignored.
//! - An `Expires` in the past or a `Max-Age` of zero or less removes the
//!   cookie instead of storing it.
//! - A line without `=` is treated as a cookie with an empty name, as browsers do.
//! - Stored expiry dates are kept but not enforced over time.

use crate::cookies::cookie::Cookie;
use crate::cookies::jar::CookieJarHandle;
use crate::errors::Result;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

/// Script-facing cookie string accessor of one environment.
#[derive(Debug, Clone)]
pub struct DocumentCookies {
    jar: CookieJarHandle,
}

impl DocumentCookies {
    pub fn new(jar: CookieJarHandle) -> Self {
        Self { jar }
    }

    /// Equivalent of reading `document.cookie`.
    pub fn cookie(&self) -> Result<String> {
        Ok(self
            .jar
            .all()?
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    /// Equivalent of assigning `document.cookie = line`.
    pub fn set_cookie(&self, line: &str) -> Result<()> {
        match parse_cookie_line(line, OffsetDateTime::now_utc()) {
            CookieWrite::Store(cookie) => self.jar.store(cookie),
            CookieWrite::Remove(name) => self.jar.remove(&name).map(|_| ()),
        }
    }
}

#[derive(Debug, PartialEq)]
enum CookieWrite {
    Store(Cookie),
    Remove(String),
}

fn parse_cookie_line(line: &str, now: OffsetDateTime) -> CookieWrite {
    let mut parts = line.split(';');
    let pair = parts.next().unwrap_or_default();
    let (name, value) = match pair.split_once('=') {
        Some((n, v)) => (n.trim(), v.trim()),
        None => ("", pair.trim()),
    };

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.to_string(),
        path: None,
        secure: false,
        expires: None,
        same_site: None,
    };
    let mut expired = false;

    for part in parts {
        let part = part.trim();
        if let Some((k, v)) = part.split_once('=') {
            let v = v.trim();
            match k.trim().to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(v.to_string()),
                "expires" => {
                    if let Ok(at) = OffsetDateTime::parse(v, &Rfc2822) {
                        expired = at <= now;
                    }
                    cookie.expires = Some(v.to_string());
                }
                "max-age" => {
                    if let Ok(secs) = v.parse::<i64>() {
                        expired = secs <= 0;
                    }
                }
                "samesite" => {
                    cookie.same_site = if v.eq_ignore_ascii_case("lax") {
                        Some("Lax".to_string())
                    } else if v.eq_ignore_ascii_case("strict") {
                        Some("Strict".to_string())
                    } else if v.eq_ignore_ascii_case("none") {
                        Some("None".to_string())
                    } else {
                        None
                    };
                }
                _ => {}
            }
        } else if part.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        }
    }

    if expired {
        CookieWrite::Remove(cookie.name)
    } else {
        CookieWrite::Store(cookie)
    }
}

/// Formats `at` as an `Expires` attribute value.
pub(crate) fn format_expires(at: OffsetDateTime) -> String {
    // Rfc2822 formatting only fails for years outside 1900..=9999
    at.format(&Rfc2822).unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 +0000".to_string())
}
