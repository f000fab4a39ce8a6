use super::{Challenge, Credentials, Request, Response, Transport};
use crate::Result;

/// Stage to solve `Basic` challenges.
///
/// If the registry responds with a `401` and a `WWW-Authenticate: Basic`
/// header, the request is repeated once with the credentials.
///
/// Only requests to the registry URL are retried, so credentials are
/// never sent to a different host.
pub struct BasicTransport<T> {
    inner: T,
    url: String,
    credentials: Option<Credentials>,
}

impl<T: Transport> BasicTransport<T> {
    pub fn new(inner: T, url: &str, credentials: Option<Credentials>) -> Self {
        BasicTransport {
            inner,
            url: url.trim_end_matches('/').to_owned(),
            credentials,
        }
    }

    /// `true` if `url` is the registry URL, or a path below it.
    fn is_registry_url(&self, url: &str) -> bool {
        match url.strip_prefix(&self.url) {
            Some(rest) => rest.is_empty() || rest.starts_with(['/', '?']),
            None => false,
        }
    }
}

impl<T: Transport> Transport for BasicTransport<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        let response = self.inner.send(request)?;

        let Some(credentials) = &self.credentials else {
            return Ok(response);
        };

        // A response from a retry in the token stage is final.
        if response.status() != 401 || response.is_auth_retry() {
            return Ok(response);
        }

        if !self.is_registry_url(request.url()) {
            return Ok(response);
        }

        let is_basic = Challenge::from_response(&response).any(|c| matches!(c, Challenge::Basic { .. }));
        if !is_basic {
            return Ok(response);
        }

        // The retry goes through the token stage, which must not start
        // a second authentication process.
        let mut retry = request.clone().mark_auth_retry();
        retry.set_header("Authorization", credentials.basic_auth());

        drop(response);
        Ok(self.inner.send(&retry)?.mark_auth_retry())
    }

    fn token(&self) -> Option<String> {
        self.inner.token()
    }
}
