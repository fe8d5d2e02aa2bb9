//! Session cookie parsing and formatting.

use std::time::Duration;

use http::HeaderMap;
use http::header::{COOKIE, HeaderValue};

/// Returns the value of cookie `name` from all `Cookie` headers.
///
/// The header is a `; `-separated list of `name=value` pairs. Malformed
/// pairs are skipped rather than rejected.
pub(crate) fn find(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_owned())
        .filter(|v| !v.is_empty())
}

/// Attributes shared by the set and the expire form of the cookie.
#[derive(Clone, Debug)]
pub(crate) struct CookieSpec {
    pub name: String,
    pub secure: bool,
}

impl CookieSpec {
    /// `Set-Cookie` value binding `token` for `max_age`.
    pub fn set(&self, token: &str, max_age: Duration) -> Option<HeaderValue> {
        self.render(token, max_age.as_secs())
    }

    /// `Set-Cookie` value telling the browser to drop the cookie.
    pub fn expire(&self) -> Option<HeaderValue> {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age: u64) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
            self.name,
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::try_from(cookie).ok()
    }
}
