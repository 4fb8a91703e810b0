//! Inbound request model.

use std::net::SocketAddr;
use std::sync::OnceLock;

use bytes::Bytes;
use harmony_router::Params;
use http::{header, HeaderMap, HeaderValue, Method, Uri, Version};

/// A fully received HTTP request.
///
/// The body is collected before dispatch, so handlers and the binder can
/// read it any number of times. Query pairs are parsed on first use.
#[derive(Debug, Default)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: Params,
    query: OnceLock<Vec<(String, String)>>,
}

impl Request {
    /// Creates a bodiless request.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            ..Self::default()
        }
    }

    /// Converts an [`http::Request`] whose body has already been collected.
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            ..Self::default()
        }
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path component of the target.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Protocol version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Protocol as it appears on the request line, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> String {
        format!("{:?}", self.version)
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// `Host` header, falling back to the authority in the target.
    pub fn host(&self) -> &str {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(http::uri::Authority::as_str))
            .unwrap_or_default()
    }

    /// Peer address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Path variables captured by the router.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable path variables.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Replaces the path variables.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Decoded query pairs in the order they appear.
    ///
    /// A malformed query string yields no pairs.
    pub fn query_pairs(&self) -> &[(String, String)] {
        self.query.get_or_init(|| {
            let raw = self.uri.query().unwrap_or_default();
            serde_urlencoded::from_str(raw).unwrap_or_else(|err| {
                tracing::debug!(error = %err, query = raw, "ignoring malformed query string");
                Vec::new()
            })
        })
    }

    /// First value of a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_pairs()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_keeps_parts() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/users/1?verbose=1")
            .header(header::HOST, "example.com")
            .body(Bytes::from_static(b"{}"))
            .unwrap();

        let request = Request::from_http(request);
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.path(), "/users/1");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.body().as_ref(), b"{}");
    }

    #[test]
    fn test_query_decoding() {
        let request = Request::new(
            Method::GET,
            Uri::from_static("/search?q=hello+world&tag=a&tag=b&empty="),
        );

        assert_eq!(request.query("q"), Some("hello world"));
        assert_eq!(request.query("tag"), Some("a"));
        assert_eq!(request.query("empty"), Some(""));
        assert_eq!(request.query("missing"), None);
        assert_eq!(request.query_pairs().len(), 4);
    }

    #[test]
    fn test_host_falls_back_to_authority() {
        let request = Request::new(Method::GET, Uri::from_static("http://api.local:8080/x"));
        assert_eq!(request.host(), "api.local:8080");
    }

    #[test]
    fn test_default_is_empty() {
        let request = Request::default();
        assert_eq!(request.path(), "/");
        assert!(request.params().is_empty());
        assert!(request.body().is_empty());
        assert_eq!(request.remote_addr(), None);
    }
}
