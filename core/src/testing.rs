//! Local http server answering scripted replies, used by client tests

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use tiny_http::{Header, Response, Server};

const WAIT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Reply {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

impl Reply {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![],
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub method: String,
    pub url: String,
    pub accept: Vec<String>,
}

/// Answer one reply per received request, in order, then stop
pub struct ScriptedServer {
    address: String,
    handle: JoinHandle<Vec<Received>>,
}

impl ScriptedServer {
    pub fn start(replies: Vec<Reply>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let address = format!("http://{}", server.server_addr().to_ip().unwrap());

        let handle = thread::spawn(move || {
            let mut received = vec![];
            for reply in replies {
                let request = match server.recv_timeout(WAIT_REQUEST_TIMEOUT).unwrap() {
                    Some(request) => request,
                    None => break,
                };
                received.push(Received {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    accept: request
                        .headers()
                        .iter()
                        .filter(|header| header.field.equiv("Accept"))
                        .map(|header| header.value.to_string())
                        .collect(),
                });

                let mut response =
                    Response::from_string(reply.body).with_status_code(reply.status);
                for (name, value) in &reply.headers {
                    let header = Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap();
                    response = response.with_header(header);
                }
                request.respond(response).unwrap();
            }
            received
        });

        Self { address, handle }
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// Wait for the script end and return what was received
    pub fn received(self) -> Vec<Received> {
        self.handle.join().unwrap()
    }
}
