//! A loopback hyper server that records requests and answers with canned responses.
#![allow(dead_code)]

use {
    bytes::Bytes,
    http_body_util::{BodyExt, Full},
    hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response},
    hyper_util::rt::TokioIo,
    std::{
        convert::Infallible,
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::{net::TcpListener, task::JoinHandle},
};

/// A request as the server saw it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// The request target: path and query string.
    pub target: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split_once('?').map(|(path, _)| path).unwrap_or(&self.target)
    }
}

/// What the server answers with.
#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn json(body: &str) -> Self {
        Self {
            content_type: "application/json",
            ..Self::new(200, body)
        }
    }

    pub fn xml(status: u16, body: &str) -> Self {
        Self {
            content_type: "text/xml",
            ..Self::new(status, body)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;
type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

pub struct MockServer {
    addr: SocketAddr,
    requests: Recorded,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start a server that answers every request with `response`.
    pub async fn respond_with(response: MockResponse) -> Self {
        Self::start(move |_| response.clone()).await
    }

    /// Start a server that answers the n-th request with `responses[n]`, repeating the last one.
    pub async fn sequence(responses: Vec<MockResponse>) -> Self {
        let served = Mutex::new(0usize);
        Self::start(move |_| {
            let mut served = served.lock().unwrap();
            let response = responses[(*served).min(responses.len() - 1)].clone();
            *served += 1;
            response
        })
        .await
    }

    /// Start a server that answers each request with `handler(request)`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let task = {
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let requests = requests.clone();
                    let handler = handler.clone();
                    let service = service_fn(move |request| answer(request, requests.clone(), handler.clone()));

                    tokio::spawn(async move {
                        let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                    });
                }
            })
        };

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The URL of a port nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn answer(
    request: Request<Incoming>,
    requests: Recorded,
    handler: Handler,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();
    let body = body.collect().await.map(|collected| collected.to_bytes().to_vec()).unwrap_or_default();

    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        target: parts.uri.path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).to_string()))
            .collect(),
        body,
    };
    requests.lock().unwrap().push(recorded.clone());

    let response = handler(&recorded);
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    Ok(Response::builder()
        .status(response.status)
        .header("content-type", response.content_type)
        .body(Full::new(Bytes::from(response.body)))
        .unwrap())
}
