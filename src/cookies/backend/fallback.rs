//! `document.cookie` compatibility backend.
//!
//! Encoding follows the widely used js-cookie conventions so that cookies
//! written here stay readable by other scripts on the page and vice versa:
//! names and values are percent-encoded, but characters that are legal in a
//! cookie (like `/`, `:`, `{` or `=`) are left as-is. Reading tolerates values
//! that are not valid percent-encoding by returning them raw.

use crate::cookies::backend::{BackendKind, CookieBackend};
use crate::cookies::document::{format_expires, DocumentCookies};
use crate::cookies::notify::{self, ChangeCallback, Subscription};
use crate::errors::Result;
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Characters escaped in cookie names.
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'^')
    .remove(b'`')
    .remove(b'|');

/// Characters escaped in cookie values.
const VALUE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b',')
    .add(b';')
    .add(b'\\');

/// Attributes appended to every write.
const DEFAULT_ATTRIBUTES: &str = "path=/";

/// Backend that reads and writes `document.cookie`. Changes are detected by polling.
#[derive(Debug, Clone)]
pub struct FallbackBackend {
    document: DocumentCookies,
}

impl FallbackBackend {
    pub fn new(document: DocumentCookies) -> Self {
        Self { document }
    }
}

#[async_trait]
impl CookieBackend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DocumentFallback
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        let cookies = self.document.cookie()?;
        Ok(find_cookie(&cookies, name))
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.document.set_cookie(&format!(
            "{}={}; {}",
            encode_name(name),
            encode_value(value),
            DEFAULT_ATTRIBUTES
        ))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.document.set_cookie(&format!(
            "{}=; {}; expires={}",
            encode_name(name),
            DEFAULT_ATTRIBUTES,
            format_expires(OffsetDateTime::UNIX_EPOCH)
        ))
    }

    fn subscribe(&self, name: &str, on_change: ChangeCallback, poll_interval: Duration) -> Subscription {
        notify::spawn_poller(name, Arc::new(self.clone()), on_change, poll_interval)
    }
}

fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_ENCODE_SET).to_string()
}

fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, VALUE_ENCODE_SET).to_string()
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Finds `name` in a `document.cookie` string. The first match wins.
fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split("; ")
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| {
            let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            if decode(raw_name) != name {
                return None;
            }

            let raw_value = raw_value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(raw_value);
            Some(decode(raw_value))
        })
}
