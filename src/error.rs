use std::{error::Error as StdError, fmt, io};

use crate::{digest::DigestError, manifest::ManifestError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error for failures reported by custom transports.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request could not be delivered (DNS, TLS, sockets, ...).
    #[error("Connection failed: {0}")]
    Connection(#[source] BoxError),

    /// The registry answered with a non-successful status.
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Invalid digest {digest:?}: {source}")]
    InvalidDigest {
        digest: String,
        #[source]
        source: DigestError,
    },

    #[error("Missing or invalid Docker-Content-Digest header.")]
    MissingDigest(#[source] DigestError),

    #[error("Missing authentication tokens.")]
    MissingTokens,

    #[error("Invalid realm in authentication challenge: {0}")]
    InvalidRealm(#[from] url::ParseError),

    #[error("Failed to read response: {0}")]
    Io(#[from] io::Error),

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    /// HTTP status code, if the registry rejected the request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Client(e) => Some(e.code()),
            _ => None,
        }
    }

    pub fn connection(error: impl Into<BoxError>) -> Self {
        Error::Connection(error.into())
    }
}

impl From<ureq::Transport> for Error {
    fn from(value: ureq::Transport) -> Self {
        Error::Connection(Box::new(value))
    }
}

/// A non-successful response from the registry.
///
/// `code` is the literal HTTP status. The original error is either
/// [`RegistryErrors`], when the body contains the error envelope defined
/// by the distribution API, or [`HttpStatusError`] in any other case.
#[derive(Debug)]
pub struct ClientError {
    code: u16,
    source: BoxError,
}

impl ClientError {
    pub fn new(code: u16, source: impl Into<BoxError>) -> Self {
        ClientError {
            code,
            source: source.into(),
        }
    }

    /// Build the error from a response body.
    pub(crate) fn from_body(code: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<RegistryErrors>(body) {
            Ok(errors) if !errors.errors.is_empty() => ClientError::new(code, errors),
            _ => ClientError::new(
                code,
                HttpStatusError {
                    status: code,
                    body: String::from_utf8_lossy(body).into_owned(),
                },
            ),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn orig_err(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.source
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.source)
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

/// Error envelope returned by registries.
///
/// See <https://distribution.github.io/distribution/spec/api/#errors>.
#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct RegistryErrors {
    pub errors: Vec<ErrorDetail>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    pub code: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl fmt::Display for RegistryErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, e) in self.errors.iter().enumerate() {
            if n > 0 {
                f.write_str("; ")?;
            }

            write!(f, "{}", e.code)?;
            if !e.message.is_empty() {
                write!(f, ": {}", e.message)?;
            }
        }

        Ok(())
    }
}

impl StdError for RegistryErrors {}

/// Response with an unexpected status, and a body that is not
/// a [`RegistryErrors`] envelope.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("http: non-successful response (status={status} body={body:?})")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

#[test]
fn parse_registry_errors() {
    let body = br#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown","detail":{"Tag":"x"}}]}"#;
    let error = ClientError::from_body(404, body);

    assert_eq!(error.code(), 404);
    assert_eq!(error.to_string(), "404: MANIFEST_UNKNOWN: manifest unknown");

    let errors = error.orig_err().downcast_ref::<RegistryErrors>().unwrap();
    assert_eq!(errors.errors[0].code, "MANIFEST_UNKNOWN");
}

#[test]
fn wrap_unknown_bodies() {
    for body in [&b"Not Found"[..], b"", b"{}", br#"{"errors":[]}"#] {
        let error = ClientError::from_body(500, body);
        assert_eq!(error.code(), 500);

        let orig = error.orig_err().downcast_ref::<HttpStatusError>().unwrap();
        assert_eq!(orig.status, 500);
        assert_eq!(orig.body.as_bytes(), body);
    }
}
