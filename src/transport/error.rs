use super::{Request, Response, Transport};
use crate::{ClientError, Result};

/// Stage to convert non-successful responses to errors.
///
/// Any status outside of 2xx and 3xx is returned as
/// [`Error::Client`](crate::Error::Client), with the status code and
/// the error described in the response body.
pub struct ErrorTransport<T> {
    inner: T,
}

impl<T: Transport> ErrorTransport<T> {
    pub fn new(inner: T) -> Self {
        ErrorTransport { inner }
    }
}

impl<T: Transport> Transport for ErrorTransport<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        let response = self.inner.send(request)?;

        if response.is_success() {
            return Ok(response);
        }

        Err(ClientError::from_body(response.status(), response.body()).into())
    }

    fn token(&self) -> Option<String> {
        self.inner.token()
    }
}
