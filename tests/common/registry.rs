use std::{
    io::Read,
    sync::{Arc, Mutex},
    time::Duration,
};

use tiny_http::{Header, Request, Response, Server};

/// A request received by the registry.
#[derive(Clone, Debug)]
pub struct Received {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Received {
    pub fn path(&self) -> &str {
        self.url.split_once('?').map(|(p, _)| p).unwrap_or(&self.url)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response to send from the handler.
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::status(200)
    }

    pub fn status(status: u16) -> Reply {
        Reply {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(body: impl Into<String>) -> Reply {
        Reply::ok()
            .header("Content-Type", "application/json")
            .body(body.into())
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Reply {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Reply {
        self.body = body.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Reply {
        self.status = status;
        self
    }
}

/// Handle to a running registry.
pub struct FakeRegistry {
    pub port: u16,
    received: Arc<Mutex<Vec<Received>>>,
}

impl FakeRegistry {
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// All requests received by the registry.
    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// Requests received for `path`.
    pub fn received_for(&self, path: &str) -> Vec<Received> {
        self.received()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }
}

/// Start a registry server in a random port.
///
/// Every request is sent to `handler`. The port number is passed to
/// the handler, so it can build absolute URLs.
pub fn start_registry<F>(mut handler: F) -> FakeRegistry
where
    F: FnMut(u16, &Received) -> Reply,
    F: Send + 'static,
{
    let server = Server::http("127.1:0").expect("start registry server");
    let port = server.server_addr().to_ip().unwrap().port();

    let received = Arc::new(Mutex::new(Vec::new()));

    std::thread::spawn({
        let received = Arc::clone(&received);
        move || {
            let timeout = Duration::from_secs(30);
            while let Ok(Some(mut request)) = server.recv_timeout(timeout) {
                let info = read_request(&mut request);

                let reply = handler(port, &info);
                received.lock().unwrap().push(info);

                send_reply(request, reply);
            }
        }
    });

    FakeRegistry { port, received }
}

fn read_request(request: &mut Request) -> Received {
    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .expect("Read request body");

    Received {
        method: request.method().to_string(),
        url: request.url().to_owned(),
        headers: request
            .headers()
            .iter()
            .map(|h| (h.field.to_string(), h.value.to_string()))
            .collect(),
        body,
    }
}

fn send_reply(request: Request, reply: Reply) {
    let mut response = Response::from_data(reply.body).with_status_code(reply.status);
    for (name, value) in reply.headers {
        response.add_header(Header::from_bytes(name, value).unwrap());
    }

    request.respond(response).expect("Send response");
}
