use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}

pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub location: Option<String>,
}

#[allow(dead_code)]
impl StubResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            location: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            location: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            body: String::new(),
            location: Some(location.to_owned()),
        }
    }
}

type Handler = dyn Fn(&RecordedRequest) -> StubResponse + Send + Sync;

/// A local HTTP server that answers through `handler` and records every request.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl StubServer {
    pub fn spawn(
        handler: impl Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static,
    ) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_owned());
                let seen = RecordedRequest {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    authorization,
                    body,
                };
                recorded.lock().unwrap().push(seen.clone());

                let reply = handler(&seen);
                let mut response =
                    tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
                if let Some(location) = reply.location {
                    response = response.with_header(
                        tiny_http::Header::from_bytes("Location", location.as_bytes())
                            .expect("location header"),
                    );
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Discord API stand-in: opens DM channel `dm-1` and accepts every message.
#[allow(dead_code)]
pub fn spawn_discord() -> StubServer {
    StubServer::spawn(|req| match (req.method.as_str(), req.path()) {
        ("POST", "/api/users/@me/channels") => StubResponse::ok(r#"{"id":"dm-1"}"#),
        ("POST", path) if path.starts_with("/api/channels/") && path.ends_with("/messages") => {
            StubResponse::ok(r#"{"id":"msg"}"#)
        }
        _ => StubResponse::status(404),
    })
}

/// Message contents posted to `channel_id`, in order.
#[allow(dead_code)]
pub fn messages_to(discord: &StubServer, channel_id: &str) -> Vec<String> {
    let path = format!("/api/channels/{channel_id}/messages");
    discord
        .requests()
        .into_iter()
        .filter(|req| req.path() == path)
        .map(|req| {
            let value: serde_json::Value = serde_json::from_str(&req.body).expect("json body");
            value["content"].as_str().unwrap_or_default().to_owned()
        })
        .collect()
}
