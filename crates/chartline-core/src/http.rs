//! Blocking HTTP transport.
//!
//! Uses async reqwest internally on a shared tokio runtime, but presents a
//! sync interface: the crawl is strictly sequential and every suspension point
//! is a plain sleep.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::CallError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Credentials attached to one outgoing request.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Authorization {
    #[default]
    None,
    Bearer(String),
    Basic { id: String, secret: String },
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print tokens or secrets
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::Basic { id, .. } => write!(f, "Basic({id}:..)"),
        }
    }
}

/// One fully-shaped HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub auth: Authorization,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            auth: Authorization::None,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, key: &str, value: impl Into<String>) -> Self {
        self.form.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends one request and returns whatever status came back.
///
/// Only transport-level failures (no status at all) are errors here; status
/// classification belongs to the retrying caller.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CallError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CallError> {
        (**self).send(request)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// [`Transport`] backed by reqwest.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CallError> {
        SHARED_RUNTIME.handle().block_on(async {
            let client = http_client();
            let mut builder = match request.method {
                Method::Get => client.get(&request.url),
                Method::Post => client.post(&request.url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if !request.form.is_empty() {
                builder = builder.form(&request.form);
            }
            builder = match &request.auth {
                Authorization::None => builder,
                Authorization::Bearer(token) => builder.bearer_auth(token),
                Authorization::Basic { id, secret } => builder.basic_auth(id, Some(secret)),
            };
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(transport_error)?;
            Ok(HttpResponse { status, body })
        })
    }
}

/// Strip the URL from reqwest errors to avoid leaking query strings in logs
fn transport_error(e: reqwest::Error) -> CallError {
    CallError::Transport(e.without_url().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_query_and_form() {
        let req = HttpRequest::post("https://example.com/token")
            .form("grant_type", "client_credentials")
            .query("a", "1")
            .timeout(Duration::from_secs(5));
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.form, vec![("grant_type".into(), "client_credentials".into())]);
        assert_eq!(req.query_value("a"), Some("1"));
        assert_eq!(req.query_value("b"), None);
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn authorization_debug_hides_secrets() {
        let bearer = Authorization::Bearer("tok-123".into());
        let basic = Authorization::Basic {
            id: "client".into(),
            secret: "hunter2".into(),
        };
        assert_eq!(format!("{bearer:?}"), "Bearer(..)");
        let shown = format!("{basic:?}");
        assert!(shown.contains("client"));
        assert!(!shown.contains("hunter2"));
    }
}
