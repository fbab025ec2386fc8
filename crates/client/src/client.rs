use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use agora_protocol::ApiKeyResponse;

use crate::{ClientError, Connection};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reachability probes.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates and normalizes a user-supplied server URL.
///
/// A missing scheme defaults to `https`; any path or query is stripped so
/// the result can serve as a base for API paths.
pub fn validate_url(input: &str) -> Result<Url, ClientError> {
    // A bare "host:port" would parse with "host" as its scheme, so anything
    // not explicitly http(s) gets the https prefix before parsing.
    let attempt = if input.starts_with("http://") || input.starts_with("https://") {
        Url::parse(input)
    } else {
        Url::parse(&format!("https://{input}"))
    };
    let mut url = attempt.map_err(|e| ClientError::InvalidUrl(format!("{input}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ClientError::InvalidUrl(input.to_string()));
    }
    url.set_path("");
    url.set_query(None);
    Ok(url)
}

/// Authenticated HTTP client for one Agora server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    connection: Connection,
    timeout: Duration,
}

impl Client {
    /// Creates a client for `url` with the given connection.
    ///
    /// `verify_cert = false` disables TLS certificate verification on this
    /// client's transport only.
    pub fn new(url: &str, connection: Connection, verify_cert: bool) -> Result<Self, ClientError> {
        let base_url = validate_url(url)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_cert)
            .build()?;
        Ok(Self {
            http,
            base_url,
            connection,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the default per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The validated base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying transport, sharing this client's TLS settings.
    ///
    /// The chunk uploader clones this to post without the default request
    /// timeout, which would cut off large chunk bodies.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The configured connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Resolves an API path against the base URL.
    pub fn url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base_url, path))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .timeout(timeout.unwrap_or(self.timeout))
            .header(CONTENT_TYPE, "application/json");
        if let Some(auth) = self.connection.authorization() {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder
    }

    /// Performs an authenticated GET.
    pub async fn get(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ClientError> {
        Ok(self.request(Method::GET, path, timeout).send().await?)
    }

    /// Performs an authenticated POST with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ClientError> {
        Ok(self
            .request(Method::POST, path, timeout)
            .json(body)
            .send()
            .await?)
    }

    /// GETs `path` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.get(path, None).await?;
        self.parse(response, path).await
    }

    /// POSTs a JSON body to `path` and decodes the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.post(path, body, None).await?;
        self.parse(response, path).await
    }

    async fn parse<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ClientError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    /// Probes server reachability via the version endpoint.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let response = self.get("/api/v1/version/", Some(PING_TIMEOUT)).await?;
        if response.status().as_u16() != 200 {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                path: "/api/v1/version/".into(),
            });
        }
        Ok(())
    }

    /// Verifies that the configured credentials are accepted.
    pub async fn check_connection(&self) -> Result<(), ClientError> {
        let response = self.get("/api/v1/user/current/", Some(PING_TIMEOUT)).await?;
        if response.status().as_u16() != 200 {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                path: "/api/v1/user/current/".into(),
            });
        }
        Ok(())
    }

    /// Resolves the API key for this connection.
    ///
    /// API-key connections return their configured key directly; password
    /// connections fetch it from the server (404 means the user has not
    /// created one yet).
    pub async fn api_key(&self) -> Result<String, ClientError> {
        match &self.connection {
            Connection::ApiKey(key) => Ok(key.clone()),
            Connection::Password { .. } => {
                self.ping().await?;
                let response = self.get("/api/v1/apikey/", None).await?;
                let status = response.status().as_u16();
                if status == 404 {
                    return Err(ClientError::NoApiKey);
                }
                if status > 299 {
                    return Err(ClientError::Status {
                        status,
                        path: "/api/v1/apikey/".into(),
                    });
                }
                let parsed: ApiKeyResponse = response.json().await?;
                debug!("resolved api key via password connection");
                Ok(parsed.key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a mock HTTP server that answers one request per scripted
    /// response, in order, then stops accepting. Request heads are recorded.
    async fn mock_server_seq(
        responses: Vec<(u16, String)>,
    ) -> (String, Arc<Mutex<Vec<String>>>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 16384];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                recorded
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).into_owned());

                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, requests, handle)
    }

    async fn mock_server(status: u16, body: &str) -> (String, Arc<Mutex<Vec<String>>>, tokio::task::JoinHandle<()>) {
        mock_server_seq(vec![(status, body.to_string())]).await
    }

    fn api_client(url: &str) -> Client {
        Client::new(url, Connection::ApiKey("test-key".into()), true).unwrap()
    }

    #[test]
    fn validate_url_defaults_scheme() {
        let url = validate_url("agora.example.com").unwrap();
        assert_eq!(url.as_str(), "https://agora.example.com/");
    }

    #[test]
    fn validate_url_strips_path() {
        let url = validate_url("https://agora.example.com/some/path?q=1").unwrap();
        assert_eq!(url.as_str(), "https://agora.example.com/");
    }

    #[test]
    fn validate_url_keeps_port() {
        let url = validate_url("http://localhost:8080/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn validate_url_bare_host_port() {
        let url = validate_url("localhost:8080").unwrap();
        assert_eq!(url.as_str(), "https://localhost:8080/");
    }

    #[test]
    fn validate_url_rejects_garbage() {
        assert!(validate_url("").is_err());
        assert!(validate_url("https://").is_err());
    }

    #[test]
    fn url_resolves_paths() {
        let client = api_client("https://agora.example.com");
        assert_eq!(
            client.url("/api/v1/import/3/upload/"),
            "https://agora.example.com/api/v1/import/3/upload/"
        );
    }

    #[tokio::test]
    async fn ping_ok() {
        let (url, requests, handle) = mock_server(200, "{}").await;
        let client = api_client(&url);
        client.ping().await.unwrap();

        let recorded = requests.lock().unwrap();
        assert!(recorded[0].starts_with("GET /api/v1/version/"));
        assert!(recorded[0].contains("authorization: X-Agora-Api-Key test-key"));
        handle.abort();
    }

    #[tokio::test]
    async fn ping_non_200_fails() {
        let (url, _requests, handle) = mock_server(503, "{}").await;
        let client = api_client(&url);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503, .. }));
        handle.abort();
    }

    #[tokio::test]
    async fn check_connection_hits_current_user() {
        let (url, requests, handle) = mock_server(200, "{}").await;
        let client = api_client(&url);
        client.check_connection().await.unwrap();
        assert!(requests.lock().unwrap()[0].starts_with("GET /api/v1/user/current/"));
        handle.abort();
    }

    #[tokio::test]
    async fn api_key_connection_returns_key_without_network() {
        let client = api_client("https://agora.example.com");
        assert_eq!(client.api_key().await.unwrap(), "test-key");
    }

    #[tokio::test]
    async fn api_key_password_flow() {
        // ping + apikey
        let (url, requests, handle) = mock_server_seq(vec![
            (200, "{}".into()),
            (200, r#"{"key": "resolved-key"}"#.into()),
        ])
        .await;
        let client = Client::new(
            &url,
            Connection::Password {
                username: "alice".into(),
                password: "secret".into(),
            },
            true,
        )
        .unwrap();

        assert_eq!(client.api_key().await.unwrap(), "resolved-key");

        let recorded = requests.lock().unwrap();
        assert!(recorded[0].starts_with("GET /api/v1/version/"));
        assert!(recorded[1].starts_with("GET /api/v1/apikey/"));
        assert!(recorded[1].contains("authorization: Basic "));
        handle.abort();
    }

    #[tokio::test]
    async fn api_key_password_404_maps_to_no_api_key() {
        let (url, _requests, handle) =
            mock_server_seq(vec![(200, "{}".into()), (404, "{}".into())]).await;
        let client = Client::new(
            &url,
            Connection::Password {
                username: "alice".into(),
                password: "secret".into(),
            },
            true,
        )
        .unwrap();

        let err = client.api_key().await.unwrap_err();
        assert!(matches!(err, ClientError::NoApiKey));
        handle.abort();
    }

    #[tokio::test]
    async fn get_json_status_error() {
        let (url, _requests, handle) = mock_server(500, "{}").await;
        let client = api_client(&url);
        let err = client
            .get_json::<serde_json::Value>("/api/v1/thing/")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, .. }));
        handle.abort();
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let (url, requests, handle) = mock_server(204, "").await;
        let client = api_client(&url);
        let body = serde_json::json!({"folder": "7"});
        let response = client.post("/api/v1/import/1/complete/", &body, None).await.unwrap();
        assert_eq!(response.status().as_u16(), 204);

        let recorded = requests.lock().unwrap();
        assert!(recorded[0].starts_with("POST /api/v1/import/1/complete/"));
        assert!(recorded[0].contains(r#"{"folder":"7"}"#));
        handle.abort();
    }
}
