use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier, Mutex,
    },
    thread::ThreadId,
    time::Duration,
};

use tiny_http::{Header, Request as HttpRequest, Response as HttpResponse, Server};

use super::*;
use crate::Error;

/// Start a HTTP server in a random port.
///
/// Request are handled in `handler`. The server is stopped when the
/// function returns `false`
///
/// Returns the port number of the server.
pub(crate) fn test_http_server<F>(mut handler: F) -> u16
where
    F: FnMut(u16, HttpRequest) -> bool,
    F: Send + 'static,
{
    let server = Server::http("127.1:0").expect("start HTTP server");
    let port = server.server_addr().to_ip().unwrap().port();

    std::thread::spawn(move || {
        let timeout = Duration::from_secs(60);
        while let Ok(Some(request)) = server.recv_timeout(timeout) {
            if !handler(port, request) {
                break;
            }
        }
    });

    port
}

fn authorization(req: &HttpRequest) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv("authorization"))
        .map(|h| h.value.to_string())
}

/// Transport that replays a list of responses, and records
/// every request.
#[derive(Default)]
pub(crate) struct Replay {
    pub responses: Mutex<VecDeque<Response>>,
    pub requests: Mutex<Vec<Request>>,
}

impl Replay {
    pub fn new(responses: impl IntoIterator<Item = Response>) -> Self {
        Replay {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for Replay {
    fn send(&self, request: &Request) -> crate::Result<Response> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::connection("no more responses"))
    }
}

fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Response {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Response::new(status, headers, body.as_bytes().to_vec())
}

#[test]
fn request_token_after_unauthorized() {
    const SERVICE: &str = "registry.docker.io";
    const SCOPE: &str = "repository:foo/bar:pull";

    let protected_requests = Arc::new(AtomicUsize::new(0));

    let server_port = test_http_server({
        let protected_requests = Arc::clone(&protected_requests);
        move |port, req| {
            // Use the `url` crate to parse the request query.
            let base_url = url::Url::parse("http://0").ok();
            let url_parser = url::Url::options().base_url(base_url.as_ref());

            let req_url = url_parser.parse(req.url()).unwrap();

            let response = match (req_url.path(), authorization(&req)) {
                ("/token", None) => {
                    // Verify the query.
                    for (k, v) in req_url.query_pairs() {
                        if !((k == "service" && v == SERVICE) || (k == "scope" && v == SCOPE)) {
                            panic!("Invalid query: {k:?} = {v:?}")
                        }
                    }

                    let json = r#"
                        {
                          "access_token": "00AA11BB",
                          "expires_in": 300,
                          "issued_at": "Y",
                          "token": "00AA11BB"
                        }
                    "#;
                    HttpResponse::from_string(json)
                }

                ("/v2/foo/bar/test", None) => {
                    protected_requests.fetch_add(1, Ordering::SeqCst);

                    let auth = format!(
                        r#"Bearer realm="http://127.1:{port}/token",service="{SERVICE}",scope="{SCOPE}""#
                    );

                    HttpResponse::from_data(vec![])
                        .with_status_code(401)
                        .with_header(Header::from_bytes("WWW-Authenticate", auth).unwrap())
                }

                ("/v2/foo/bar/test", Some(auth)) => {
                    protected_requests.fetch_add(1, Ordering::SeqCst);
                    HttpResponse::from_string(format!("token={auth}"))
                }

                _ => HttpResponse::from_string("Not Found").with_status_code(404),
            };

            req.respond(response).expect("Send response");

            true
        }
    });

    let base = format!("http://127.0.0.1:{server_port}");
    let transport = wrap_transport(HttpTransport::new(), &base, None);

    // The client must start the authentication process after
    // receiving a 401.
    let response = transport
        .send(&Request::get(format!("{base}/v2/foo/bar/test")))
        .expect("GET /test");

    assert_eq!(response.body(), b"token=Bearer 00AA11BB");
    assert_eq!(transport.token().as_deref(), Some("00AA11BB"));
    assert_eq!(protected_requests.load(Ordering::SeqCst), 2);
}

#[test]
fn send_credentials_to_token_service() {
    let replay = Replay::new([
        response(
            401,
            &[(
                "WWW-Authenticate",
                r#"Bearer realm="https://auth.example.com/token",service="example""#,
            )],
            "",
        ),
        response(200, &[], r#"{"access_token": "T1"}"#),
        response(200, &[], "ok"),
    ]);

    let transport = TokenTransport::new(&replay, Credentials::new("user", "pass"));
    let response = transport
        .send(&Request::get("https://example.com/v2/"))
        .unwrap();

    assert_eq!(response.body(), b"ok");
    assert_eq!(transport.token().as_deref(), Some("T1"));

    let requests = replay.requests();
    assert_eq!(requests.len(), 3);

    assert_eq!(
        requests[1].url(),
        "https://auth.example.com/token?service=example"
    );
    assert_eq!(
        requests[1].header_values("authorization").collect::<Vec<_>>(),
        ["Basic dXNlcjpwYXNz"]
    );

    assert_eq!(
        requests[2].header_values("authorization").collect::<Vec<_>>(),
        ["Bearer T1"]
    );
}

#[test]
fn keep_unauthorized_response_if_token_fails() {
    let challenge = r#"Bearer realm="https://auth.example.com/token",service="x",scope="y""#;

    // Token service returns an error, a body without tokens, or an
    // invalid JSON.
    for token_response in [
        response(500, &[], "down"),
        response(200, &[], r#"{"expires_in": 10}"#),
        response(200, &[], "not json"),
    ] {
        let replay = Replay::new([
            response(401, &[("WWW-Authenticate", challenge)], "denied"),
            token_response,
        ]);

        let transport = ErrorTransport::new(TokenTransport::new(&replay, None));
        let error = transport
            .send(&Request::get("https://example.com/v2/"))
            .unwrap_err();

        assert_eq!(error.status(), Some(401));
        assert_eq!(replay.requests().len(), 2);
        assert_eq!(transport.token(), None);
    }
}

#[test]
fn retry_once_with_bearer_token() {
    let challenge = r#"Bearer realm="https://auth.example.com/token""#;

    // The retried request is also rejected. It must not start a new
    // authentication process.
    let replay = Replay::new([
        response(401, &[("WWW-Authenticate", challenge)], ""),
        response(200, &[], r#"{"token": "T"}"#),
        response(401, &[("WWW-Authenticate", challenge)], ""),
    ]);

    let transport = wrap_transport(&replay, "https://example.com", Credentials::new("a", "b"));
    let error = transport
        .send(&Request::get("https://example.com/v2/"))
        .unwrap_err();

    assert_eq!(error.status(), Some(401));
    assert_eq!(replay.requests().len(), 3);
    assert_eq!(transport.token().as_deref(), Some("T"));
}

#[test]
fn basic_auth_after_unauthorized() {
    let server_port = test_http_server(|_, req| {
        let response = match authorization(&req).as_deref() {
            Some("Basic dXNlcjpwYXNz") => HttpResponse::from_string("welcome"),
            _ => HttpResponse::from_data(vec![])
                .with_status_code(401)
                .with_header(
                    Header::from_bytes("WWW-Authenticate", r#"Basic realm="Registry""#).unwrap(),
                ),
        };

        req.respond(response).expect("Send response");
        true
    });

    let base = format!("http://127.0.0.1:{server_port}");
    let url = format!("{base}/v2/");

    // Without credentials, the 401 is an error.
    let transport = wrap_transport(HttpTransport::new(), &base, None);
    let error = transport.send(&Request::get(&url)).unwrap_err();
    assert_eq!(error.status(), Some(401));

    let transport = wrap_transport(HttpTransport::new(), &base, Credentials::new("user", "pass"));
    let response = transport.send(&Request::get(&url)).unwrap();
    assert_eq!(response.body(), b"welcome");
    assert_eq!(transport.token(), None);
}

#[test]
fn no_basic_auth_for_other_hosts() {
    let replay = Replay::new([response(401, &[("WWW-Authenticate", "Basic")], "")]);

    let transport = wrap_transport(&replay, "https://example.com", Credentials::new("a", "b"));
    let error = transport
        .send(&Request::get("https://other.example.org/v2/"))
        .unwrap_err();

    assert_eq!(error.status(), Some(401));
    assert_eq!(replay.requests().len(), 1);
}

#[test]
fn unknown_challenges_are_not_retried() {
    let replay = Replay::new([response(
        401,
        &[("WWW-Authenticate", r#"Digest realm="x", nonce="y""#)],
        "",
    )]);

    let transport = wrap_transport(&replay, "https://example.com", Credentials::new("a", "b"));
    let error = transport
        .send(&Request::get("https://example.com/v2/"))
        .unwrap_err();

    assert_eq!(error.status(), Some(401));
    assert_eq!(replay.requests().len(), 1);
}

#[test]
fn normalize_error_responses() {
    for status in [400, 401, 403, 404, 500, 503] {
        let replay = Replay::new([response(status, &[], "failed")]);
        let transport = wrap_transport(&replay, "https://example.com", None);

        match transport.send(&Request::get("https://example.com/v2/x")) {
            Err(Error::Client(e)) => {
                assert_eq!(e.code(), status);
                assert!(e.orig_err().to_string().contains("failed"));
            }

            r => panic!("Unexpected result for {status}: {r:?}"),
        }
    }

    // 2xx and 3xx are not modified.
    for status in [200, 201, 202, 204, 301, 307] {
        let replay = Replay::new([response(status, &[("Location", "/x")], "body")]);
        let transport = wrap_transport(&replay, "https://example.com", None);

        let response = transport.send(&Request::get("https://example.com/v2/")).unwrap();
        assert_eq!(response.status(), status);
        assert_eq!(response.header("location"), Some("/x"));
        assert_eq!(response.body(), b"body");
    }
}

#[test]
fn connection_errors_are_not_retried() {
    let replay = Replay::new([]);
    let transport = wrap_transport(&replay, "https://example.com", None);

    let error = transport.send(&Request::get("https://example.com/v2/")).unwrap_err();
    assert!(matches!(error, Error::Connection(_)));
    assert_eq!(replay.requests().len(), 1);
}

#[test]
fn join_repeated_headers() {
    let server_port = test_http_server(|_, req| {
        let accept: Vec<_> = req
            .headers()
            .iter()
            .filter(|h| h.field.equiv("accept"))
            .map(|h| h.value.to_string())
            .collect();

        req.respond(HttpResponse::from_string(accept.join("|")))
            .expect("Send response");
        true
    });

    let request = Request::get(format!("http://127.0.0.1:{server_port}/"))
        .header("Accept", "a/b")
        .header("Accept", "c/d");

    let response = HttpTransport::new().send(&request).unwrap();
    assert_eq!(response.body(), b"a/b, c/d");
}

#[test]
fn no_token_exchange_after_basic_retry() {
    let replay = Replay::new([
        response(401, &[("WWW-Authenticate", "Basic")], ""),
        response(401, &[("WWW-Authenticate", r#"Bearer realm="https://auth.example.com/token""#)], ""),
        response(200, &[], r#"{"token": "T"}"#),
        response(200, &[], "ok"),
    ]);

    let transport = wrap_transport(&replay, "https://example.com", Credentials::new("a", "b"));
    let error = transport
        .send(&Request::get("https://example.com/v2/"))
        .unwrap_err();

    // Only one retry: the Bearer challenge in the response to the
    // Basic retry is not solved.
    assert_eq!(error.status(), Some(401));
    assert_eq!(transport.token(), None);

    let auth: Vec<Vec<_>> = replay
        .requests()
        .iter()
        .map(|r| r.header_values("authorization").map(str::to_owned).collect())
        .collect();

    assert_eq!(auth, [vec![], vec!["Basic YTpi".to_owned()]]);
}

#[test]
fn no_basic_auth_for_lookalike_hosts() {
    for url in [
        "https://example.com.evil.net/v2/",
        "https://example.comx/v2/",
        "https://example.com:8443/v2/",
    ] {
        let replay = Replay::new([response(401, &[("WWW-Authenticate", "Basic")], "")]);

        let transport = wrap_transport(&replay, "https://example.com", Credentials::new("a", "b"));
        let error = transport.send(&Request::get(url)).unwrap_err();

        assert_eq!(error.status(), Some(401), "{url}");
        assert_eq!(replay.requests().len(), 1, "{url}");
    }

    // Paths and queries below the registry URL get the credentials.
    for url in ["https://example.com", "https://example.com/v2/", "https://example.com?x=1"] {
        let replay = Replay::new([
            response(401, &[("WWW-Authenticate", "Basic")], ""),
            response(200, &[], "ok"),
        ]);

        let transport = wrap_transport(&replay, "https://example.com/", Credentials::new("a", "b"));
        assert_eq!(transport.send(&Request::get(url)).unwrap().body(), b"ok", "{url}");
    }
}

/// Registry where every token exchange returns a different token.
///
/// Token requests wait until `threads` tokens have been issued, so
/// every retry is sent after all the exchanges.
struct TokenPerExchange {
    barrier: Barrier,
    issued: Mutex<Vec<(ThreadId, String)>>,
}

impl Transport for TokenPerExchange {
    fn send(&self, request: &Request) -> crate::Result<Response> {
        let thread = std::thread::current().id();

        if request.url().starts_with("https://auth.example.com/") {
            let token = {
                let mut issued = self.issued.lock().unwrap();
                let token = format!("T{}", issued.len());
                issued.push((thread, token.clone()));
                token
            };

            self.barrier.wait();
            return Ok(response(200, &[], &format!(r#"{{"token": "{token}"}}"#)));
        }

        match request.header_values("authorization").next() {
            Some(auth) => Ok(response(200, &[], auth)),
            None => Ok(response(
                401,
                &[("WWW-Authenticate", r#"Bearer realm="https://auth.example.com/token""#)],
                "",
            )),
        }
    }
}

#[test]
fn retry_with_own_token_in_concurrent_requests() {
    const THREADS: usize = 4;

    let registry = TokenPerExchange {
        barrier: Barrier::new(THREADS),
        issued: Mutex::default(),
    };

    let transport = &wrap_transport(&registry, "https://example.com", None);

    let responses: Vec<(ThreadId, String)> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(move || {
                    let response = transport
                        .send(&Request::get("https://example.com/v2/"))
                        .unwrap();

                    let auth = String::from_utf8(response.into_body()).unwrap();
                    (std::thread::current().id(), auth)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let issued = registry.issued.lock().unwrap();
    assert_eq!(issued.len(), THREADS);

    for (thread, auth) in responses {
        let (_, token) = issued.iter().find(|(t, _)| *t == thread).unwrap();
        assert_eq!(auth, format!("Bearer {token}"));
    }
}
