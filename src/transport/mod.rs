//! Transport chain to send requests to a registry.
//!
//! The chain built by [`wrap_transport`] is, from the outermost stage:
//!
//! 1. [`ErrorTransport`]: converts non-successful responses to
//!    [`ClientError`](crate::ClientError).
//! 2. [`BasicTransport`]: retries a request with HTTP Basic credentials
//!    if the registry asks for them.
//! 3. [`TokenTransport`]: gets a token from the authorization service
//!    and retries the request with it.
//! 4. The base transport, usually [`HttpTransport`].

mod basic;
mod challenge;
mod error;
mod http;
mod token;

#[cfg(test)]
pub(crate) mod tests;

use std::{fmt, sync::Arc};

use crate::Result;

pub use basic::BasicTransport;
pub use challenge::{BearerChallenge, Challenge};
pub use error::ErrorTransport;
pub use http::HttpTransport;
pub use token::TokenTransport;

/// The chain returned by [`wrap_transport`].
pub type AuthChain<T> = ErrorTransport<BasicTransport<TokenTransport<T>>>;

/// A component that can send a request to a registry.
///
/// Implementations must be safe to share between threads.
pub trait Transport: Send + Sync {
    /// Send `request`, and return the response.
    ///
    /// The returned [`Response`] owns the full body, so the connection
    /// is released before this method returns.
    fn send(&self, request: &Request) -> Result<Response>;

    /// Last bearer token obtained by the chain, if any.
    ///
    /// Only for diagnostics: with concurrent requests, the value may
    /// come from any of them.
    fn token(&self) -> Option<String> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }

    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }

    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }

    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

/// Build the transport chain to authenticate to the registry at `url`.
///
/// `credentials` are sent to the token service, and used for
/// Basic authentication.
pub fn wrap_transport<T: Transport>(
    transport: T,
    url: &str,
    credentials: Option<Credentials>,
) -> AuthChain<T> {
    let token = TokenTransport::new(transport, credentials.clone());
    let basic = BasicTransport::new(token, url, credentials);
    ErrorTransport::new(basic)
}

/// Username and password for the registry.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Return `None` if both `username` and `password` are empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        let password = password.into();

        if username.is_empty() && password.is_empty() {
            return None;
        }

        Some(Credentials { username, password })
    }

    /// Value for the `Authorization` header.
    pub(crate) fn basic_auth(&self) -> String {
        use base64::Engine as _;

        let pair = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(pair)
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Method {
    Get,
    Head,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the registry.
///
/// Header names can be repeated. They are compared
/// case-insensitively.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    auth_retry: bool,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            auth_retry: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Request::new(Method::Get, url)
    }

    /// Append a header. Previous values with the same name are kept.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Replace all values of a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All values of the header `name`.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        find_headers(&self.headers, name)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// `true` if the request is a retry after an authentication
    /// challenge. Challenges in its response are not solved again.
    pub(crate) fn is_auth_retry(&self) -> bool {
        self.auth_retry
    }

    pub(crate) fn mark_auth_retry(mut self) -> Self {
        self.auth_retry = true;
        self
    }
}

/// A response from the registry, with its body fully read.
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    auth_retry: bool,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Response {
            status,
            headers,
            body,
            auth_retry: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// `true` if the status is 2xx or 3xx.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// First value of the header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the header `name`.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        find_headers(&self.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// `true` if the response comes from a request retried
    /// after an authentication challenge.
    pub(crate) fn is_auth_retry(&self) -> bool {
        self.auth_retry
    }

    pub(crate) fn mark_auth_retry(mut self) -> Self {
        self.auth_retry = true;
        self
    }
}

fn find_headers<'a>(
    headers: &'a [(String, String)],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[test]
fn basic_auth_header() {
    let credentials = Credentials::new("aladdin", "opensesame").unwrap();
    assert_eq!(credentials.basic_auth(), "Basic YWxhZGRpbjpvcGVuc2VzYW1l");

    assert!(Credentials::new("", "").is_none());
    assert!(!format!("{credentials:?}").contains("opensesame"));
}

#[test]
fn replace_and_append_headers() {
    let mut request = Request::get("http://example.com/v2/")
        .header("Accept", "a")
        .header("accept", "b");

    assert_eq!(request.header_values("ACCEPT").collect::<Vec<_>>(), ["a", "b"]);

    request.set_header("Accept", "c");
    assert_eq!(request.header_values("accept").collect::<Vec<_>>(), ["c"]);
}
