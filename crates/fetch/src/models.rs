//! Request and response models.

use serde::{Deserialize, Serialize};
use swkit_storage::{CachedResponse, Method, RequestKey};

/// Everything about a request except where it goes.
///
/// This is what gets persisted when a request has to be replayed later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub method: Method,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}
impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self { method, ..Self::default() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub options: RequestOptions,
}
impl Request {
    pub fn new(url: impl Into<String>, options: RequestOptions) -> Self {
        Self { url: url.into(), options }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, RequestOptions::default())
    }

    pub fn method(&self) -> Method {
        self.options.method
    }

    /// Cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.options.method, self.url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}
impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `2xx` status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Snapshot for a cache store, stamped with the current time.
    pub fn to_cached(&self) -> CachedResponse {
        CachedResponse::new(self.status, self.headers.clone(), self.body.clone())
    }
}
impl From<CachedResponse> for Response {
    fn from(cached: CachedResponse) -> Self {
        Self { status: cached.status, headers: cached.headers, body: cached.body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(199, false)]
    #[case(200, true)]
    #[case(204, true)]
    #[case(299, true)]
    #[case(304, false)]
    #[case(503, false)]
    fn test_is_success(#[case] status: u16, #[case] expected: bool) {
        assert_eq!(Response::new(status, Vec::new()).is_success(), expected);
    }

    #[test]
    fn test_key_uses_method() {
        let request = Request::new("/api/orders", RequestOptions::new(Method::Post).with_body(b"{}".to_vec()));
        assert_eq!(request.key(), RequestKey::new(Method::Post, "/api/orders"));
    }

    #[test]
    fn test_cached_conversion_keeps_headers() {
        let response = Response::ok(b"hi".to_vec()).with_header("etag", "\"abc\"");
        let cached = response.to_cached();
        assert_eq!(cached.header("ETag"), Some("\"abc\""));
        assert_eq!(Response::from(cached), response);
    }
}
