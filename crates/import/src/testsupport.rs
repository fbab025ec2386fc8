//! Scripted mock HTTP server for wire-level tests.
//!
//! Serves one request per connection and answers scripted responses in
//! order; once the script is exhausted every further request gets a plain
//! `200 {}`. Requests are recorded with their raw bodies so tests can assert
//! on multipart fields.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One scripted response.
#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    pub status: u16,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// A recorded request: start line plus headers, and the raw body bytes.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Extracts the value of one multipart text field from the body.
    pub fn multipart_value(&self, field: &str) -> Option<String> {
        let body = String::from_utf8_lossy(&self.body);
        let marker = format!("name=\"{field}\"");
        let start = body.find(&marker)?;
        let rest = &body[start + marker.len()..];
        let value_start = rest.find("\r\n\r\n")? + 4;
        let rest = &rest[value_start..];
        let value_end = rest.find("\r\n")?;
        Some(rest[..value_end].to_string())
    }

    /// Returns `true` if the request carries the given header line.
    pub fn has_header(&self, name: &str, value: &str) -> bool {
        let needle = format!("{name}: {value}");
        self.head
            .lines()
            .any(|line| line.eq_ignore_ascii_case(&needle))
    }
}

/// Mock HTTP server bound to an ephemeral localhost port.
pub(crate) struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start(script: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            let mut script = VecDeque::from(script);
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let response = script
                    .pop_front()
                    .unwrap_or_else(|| MockResponse::ok("{}"));
                serve_one(stream, response, Arc::clone(&recorded)).await;
            }
        });

        Self {
            url,
            requests,
            handle,
        }
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    response: MockResponse,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];

    // Read up to the end of the headers.
    let head_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut tmp).await {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(_) => return,
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&tmp[..n]),
            Err(_) => break,
        }
    }

    recorded.lock().unwrap().push(RecordedRequest { head, body });

    let resp = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
