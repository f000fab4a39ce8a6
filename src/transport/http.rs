use std::{io::Read, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms},
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};

use super::{Request, Response, Transport};
use crate::Result;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Base transport to send requests over the network, using [`ureq`].
///
/// Response bodies are always read to the end, so the connection
/// goes back to the pool of the agent.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Transport with the default TLS configuration.
    pub fn new() -> Self {
        HttpTransport::from_agent(ureq::AgentBuilder::new().user_agent(USER_AGENT).build())
    }

    /// Transport that does not verify TLS certificates.
    pub fn insecure() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = AcceptAnyCertificate(provider.signature_verification_algorithms);

        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        let agent = ureq::AgentBuilder::new()
            .user_agent(USER_AGENT)
            .tls_config(Arc::new(config))
            .build();

        Ok(HttpTransport::from_agent(agent))
    }

    /// Use an agent with a custom configuration, like timeouts or proxies.
    pub fn from_agent(agent: ureq::Agent) -> Self {
        HttpTransport { agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut http_request = self.agent.request(request.method().as_str(), request.url());

        // ureq only keeps one value for each header, so repeated
        // headers are joined in a single field.
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in request.headers() {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }

        for name in names {
            let value = request.header_values(name).collect::<Vec<_>>().join(", ");
            http_request = http_request.set(name, &value);
        }

        let result = match request.payload() {
            Some(body) => http_request.send_bytes(body),
            None => http_request.call(),
        };

        let response = match result {
            Ok(r) => r,
            Err(ureq::Error::Status(_, r)) => r,
            Err(ureq::Error::Transport(t)) => return Err(t.into()),
        };

        let status = response.status();
        let headers = response
            .headers_names()
            .into_iter()
            .flat_map(|name| {
                response
                    .all(&name)
                    .into_iter()
                    .map(|v| (name.clone(), v.to_owned()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body)?;

        Ok(Response::new(status, headers, body))
    }
}

/// Certificate verifier for [`HttpTransport::insecure`].
///
/// Any certificate is accepted, but handshake signatures are
/// still verified.
#[derive(Debug)]
struct AcceptAnyCertificate(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}
