//! HTTP transport seam.
//!
//! Backends build [`HttpRequest`]s (already signed) and hand them to a
//! [`Transport`]; all they look at in the answer is the status code and the
//! raw body. Tests swap in a scripted transport.

use std::fmt;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request. `url` carries no query string; parameters live in
/// `query` so they can be included in the request signature.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url)
        }
        .header("Content-Type", "application/json")
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// First header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response (DNS, TLS, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends requests and returns whatever the server answered.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "etrade")]
pub use http::HttpTransport;

#[cfg(feature = "etrade")]
mod http {
    use std::time::Duration;

    use log::debug;
    use reqwest::blocking::Client;

    use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};

    /// Blocking `reqwest` transport with a per-request timeout.
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        pub fn new(timeout: Duration) -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| TransportError(format!("failed to build HTTP client: {e}")))?;
            Ok(Self { client })
        }
    }

    impl Transport for HttpTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            debug!("{} {}", request.method, request.url);

            let resp = builder
                .send()
                .map_err(|e| TransportError(format!("{} {} failed: {e}", request.method, request.url)))?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        }
    }
}
