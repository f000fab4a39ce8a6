mod catalog;
mod manifests;

use std::{fmt, sync::Arc};

use crate::{
    logger::{Log, Logger},
    transport::{wrap_transport, Credentials, HttpTransport, Request, Response, Transport},
    Result,
};

/// Client for a registry implementing the
/// [distribution API](https://distribution.github.io/distribution/spec/api/).
///
/// A `Registry` can be shared between threads. Every method sends
/// blocking requests in the calling thread.
///
/// # Examples
///
/// ```no_run
/// # use oci_registry_client::*;
/// let registry = Registry::builder("https://registry.example.com")
///     .credentials("user", "secret")
///     .logger(Quiet)
///     .build()?;
///
/// for repository in registry.repositories()? {
///     println!("{repository}");
/// }
/// # Ok::<(), Error>(())
/// ```
pub struct Registry {
    url: String,
    transport: Box<dyn Transport>,
    logger: Arc<dyn Logger>,
}

impl Registry {
    /// Create a client for the registry at `url`, and verify that
    /// it is reachable.
    pub fn new(url: &str, credentials: Option<Credentials>) -> Result<Registry> {
        let mut builder = RegistryBuilder::new(url);
        builder.credentials = credentials;
        builder.build()
    }

    /// Like [`Registry::new`], but TLS certificates are not verified.
    pub fn new_insecure(url: &str, credentials: Option<Credentials>) -> Result<Registry> {
        let mut builder = RegistryBuilder::new(url).insecure(true);
        builder.credentials = credentials;
        builder.build()
    }

    /// Create a client that sends its requests to `transport`.
    ///
    /// `transport` is used as is. To add support for authentication and
    /// error responses, it must be wrapped with
    /// [`wrap_transport`](crate::transport::wrap_transport).
    pub fn from_transport(
        url: &str,
        transport: impl Transport + 'static,
        logger: impl Logger,
    ) -> Result<Registry> {
        let registry = Registry {
            url: url.trim_end_matches('/').to_owned(),
            transport: Box::new(transport),
            logger: Arc::new(logger),
        };

        registry.ping()?;

        Ok(registry)
    }

    pub fn builder(url: &str) -> RegistryBuilder {
        RegistryBuilder::new(url)
    }

    /// Base URL of the registry, with no trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &dyn Transport {
        &*self.transport
    }

    /// Last token obtained from the authorization service.
    pub fn token(&self) -> Option<String> {
        self.transport.token()
    }

    pub fn set_logger(&mut self, logger: impl Logger) {
        self.logger = Arc::new(logger);
    }

    /// Check that the registry implements the API v2.
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint("/v2/");
        self.logf(format_args!("registry.ping url={url}"));
        self.send(Request::get(url))?;
        Ok(())
    }

    /// Full URL for `path`.
    ///
    /// `path` may contain escaped characters, so it is appended
    /// without any processing.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        let mut url = String::with_capacity(self.url.len() + path.len());
        url.push_str(&self.url);
        url.push_str(path);
        url
    }

    pub(crate) fn logf(&self, args: fmt::Arguments<'_>) {
        self.logger.logf(args);
    }

    pub(crate) fn send(&self, request: Request) -> Result<Response> {
        self.transport.send(&request)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("url", &self.url).finish()
    }
}

/// Builder to configure a [`Registry`].
///
/// All settings are optional. By default, requests are sent without
/// credentials, TLS certificates are verified, and messages are sent
/// to the [`log`] crate.
pub struct RegistryBuilder {
    url: String,
    credentials: Option<Credentials>,
    insecure: bool,
    transport: Option<Box<dyn Transport>>,
    logger: Arc<dyn Logger>,
}

impl RegistryBuilder {
    pub fn new(url: &str) -> Self {
        RegistryBuilder {
            url: url.trim_end_matches('/').to_owned(),
            credentials: None,
            insecure: false,
            transport: None,
            logger: Arc::new(Log),
        }
    }

    /// Credentials for the token service and for Basic authentication.
    ///
    /// Empty `username` and `password` are ignored.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Don't verify TLS certificates.
    ///
    /// Ignored if a transport is set with [`transport`](Self::transport).
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Base transport to send requests.
    ///
    /// It is wrapped with the authentication and error stages.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn logger(mut self, logger: impl Logger) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Build the client, and send a ping to the registry.
    ///
    /// It fails if the registry can't be reached, or if it rejects
    /// the credentials.
    pub fn build(self) -> Result<Registry> {
        let base: Box<dyn Transport> = match self.transport {
            Some(t) => t,
            None if self.insecure => Box::new(HttpTransport::insecure()?),
            None => Box::new(HttpTransport::new()),
        };

        let transport = wrap_transport(base, &self.url, self.credentials);

        let registry = Registry {
            url: self.url,
            transport: Box::new(transport),
            logger: self.logger,
        };

        registry.ping()?;

        Ok(registry)
    }
}
