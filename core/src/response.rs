//! The outcome of a completed exchange.

use crate::http::HeaderFields;

/// Status, raw body, decoded body, headers and final URL of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    status_code: u16,
    body: Option<Vec<u8>>,
    body_object: Option<T>,
    headers: HeaderFields,
    url: Option<String>,
}

impl<T> Response<T> {
    pub fn new(
        status_code: u16,
        body: Option<Vec<u8>>,
        body_object: Option<T>,
        headers: HeaderFields,
        url: Option<String>,
    ) -> Self {
        Self {
            status_code,
            body,
            body_object,
            headers,
            url,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn body_object(&self) -> Option<&T> {
        self.body_object.as_ref()
    }

    pub fn into_body_object(self) -> Option<T> {
        self.body_object
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}
