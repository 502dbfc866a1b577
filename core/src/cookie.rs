//! Cookie storage read by the session-cookie pipeline step.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

pub const XSRF_TOKEN: &str = "XSRF-TOKEN";
pub const JSESSIONID: &str = "JSESSIONID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `Set-Cookie` header value. Attributes are dropped; only the
    /// `name=value` pair is kept.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        match ::cookie::Cookie::parse(header) {
            Ok(parsed) => Some(Self::new(parsed.name(), parsed.value())),
            Err(e) => {
                debug!(error = %e, "ignoring unparseable Set-Cookie header");
                None
            }
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

pub trait CookieStore: Send + Sync {
    fn cookies(&self) -> Vec<Cookie>;
}

/// In-memory cookie store. One value per cookie name.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Cookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        let cookie = Cookie::new(name, value);
        let mut cookies = self.lock();
        match cookies.iter_mut().find(|existing| existing.name == cookie.name) {
            Some(existing) => existing.value = cookie.value,
            None => cookies.push(cookie),
        }
    }

    /// Store the cookie carried by a `Set-Cookie` header value. Returns
    /// whether the header could be parsed.
    pub fn store_set_cookie(&self, header: &str) -> bool {
        match Cookie::parse_set_cookie(header) {
            Some(cookie) => {
                self.insert(cookie.name, cookie.value);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl CookieStore for CookieJar {
    fn cookies(&self) -> Vec<Cookie> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_value() {
        let jar = CookieJar::new();
        jar.insert(JSESSIONID, "one");
        jar.insert(JSESSIONID, "two");
        assert_eq!(jar.cookies(), vec![Cookie::new(JSESSIONID, "two")]);
    }

    #[test]
    fn set_cookie_header_is_parsed() {
        let jar = CookieJar::new();
        assert!(jar.store_set_cookie("XSRF-TOKEN=abc123; Path=/; Secure"));
        assert!(!jar.store_set_cookie("garbage"));
        assert_eq!(jar.cookies(), vec![Cookie::new(XSRF_TOKEN, "abc123")]);

        jar.clear();
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn set_cookie_attributes_are_dropped() {
        let cookie = Cookie::parse_set_cookie("JSESSIONID=s1; Path=/app; HttpOnly; Max-Age=60").unwrap();
        assert_eq!(cookie, Cookie::new(JSESSIONID, "s1"));
        assert_eq!(cookie.to_string(), "JSESSIONID=s1");
    }

    #[test]
    fn set_cookie_without_a_name_is_rejected() {
        assert_eq!(Cookie::parse_set_cookie("=orphan; Path=/"), None);
        assert_eq!(Cookie::parse_set_cookie(""), None);
    }
}
