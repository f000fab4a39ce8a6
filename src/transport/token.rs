use std::sync::RwLock;

use super::{BearerChallenge, Challenge, Credentials, Request, Response, Transport};
use crate::{Error, Result};

/// Stage to solve `Bearer` challenges.
///
/// If the registry responds with a `401` and a `WWW-Authenticate: Bearer`
/// header, it requests a token from the `realm` URL, and repeats the
/// request once with an `Authorization: Bearer` header.
///
/// If the token can't be obtained, the original `401` response is
/// returned.
pub struct TokenTransport<T> {
    inner: T,
    credentials: Option<Credentials>,
    last_token: RwLock<Option<String>>,
}

impl<T: Transport> TokenTransport<T> {
    pub fn new(inner: T, credentials: Option<Credentials>) -> Self {
        TokenTransport {
            inner,
            credentials,
            last_token: RwLock::new(None),
        }
    }

    /// Get a token from the authorization service.
    ///
    /// The response from the `realm` URL must include either
    /// `token` or `access_token`.
    fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        #[derive(serde::Deserialize, Debug)]
        struct Tokens {
            token: Option<String>,
            access_token: Option<String>,
        }

        let mut url = url::Url::parse(&challenge.realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }

            for scope in &challenge.scope {
                query.append_pair("scope", scope);
            }
        }

        let mut request = Request::get(url.as_str());
        if let Some(credentials) = &self.credentials {
            request.set_header("Authorization", credentials.basic_auth());
        }

        let response = self.inner.send(&request)?;
        if response.status() != 200 {
            return Err(crate::ClientError::from_body(response.status(), response.body()).into());
        }

        match response.json()? {
            Tokens { token: Some(t), .. } if !t.is_empty() => Ok(t),
            Tokens {
                access_token: Some(t),
                ..
            } if !t.is_empty() => Ok(t),
            _ => Err(Error::MissingTokens),
        }
    }
}

impl<T: Transport> Transport for TokenTransport<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        let response = self.inner.send(request)?;
        if response.status() != 401 || request.is_auth_retry() {
            return Ok(response);
        }

        let challenge = Challenge::from_response(&response).find_map(|c| match c {
            Challenge::Bearer(b) => Some(b),
            _ => None,
        });

        let Some(challenge) = challenge else {
            return Ok(response);
        };

        let token = match self.fetch_token(&challenge) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Token request to {} failed: {e}", challenge.realm);
                return Ok(response);
            }
        };

        // The retry uses the token obtained by this call, never the
        // shared value, which may come from a concurrent request.
        let mut retry = request.clone().mark_auth_retry();
        retry.set_header("Authorization", format!("Bearer {token}"));

        if let Ok(mut last_token) = self.last_token.write() {
            *last_token = Some(token);
        }

        drop(response);
        Ok(self.inner.send(&retry)?.mark_auth_retry())
    }

    fn token(&self) -> Option<String> {
        self.last_token.read().ok().and_then(|t| t.clone())
    }
}
