//! Signed E*Trade REST calls.

use log::debug;
use serde::de::DeserializeOwned;

use crate::oauth::AuthorizedCredentials;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// E*Trade API base URLs.
pub const LIVE_BASE_URL: &str = "https://api.etrade.com";
pub const SANDBOX_BASE_URL: &str = "https://apisb.etrade.com";

/// Builds, signs and sends requests against one API base URL.
pub struct ETradeClient {
    transport: Box<dyn Transport>,
    base_url: String,
}

impl ETradeClient {
    pub fn new(transport: Box<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Signed GET. The consumer key is also sent as a `consumerkey` header,
    /// which the balance endpoint requires.
    pub fn get(
        &self,
        creds: AuthorizedCredentials<'_>,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = HttpRequest::get(self.url(path)).header("consumerkey", &creds.consumer.key);
        for (k, v) in query {
            request = request.query(*k, *v);
        }
        self.send(creds.sign(request))
    }

    /// Signed POST with a JSON body, with the same `consumerkey` header.
    pub fn post_json(
        &self,
        creds: AuthorizedCredentials<'_>,
        path: &str,
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        let request = HttpRequest::post_json(self.url(path), body)
            .header("consumerkey", &creds.consumer.key);
        self.send(creds.sign(request))
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("E*Trade {} {}", request.method, request.url);
        self.transport.send(&request)
    }
}

/// Why a response could not be turned into a value.
#[derive(Debug)]
pub enum ResponseError {
    Transport(TransportError),
    Status(u16, String),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseError::Transport(e) => write!(f, "{e}"),
            ResponseError::Status(status, body) => write!(f, "HTTP {status}: {body}"),
            ResponseError::Parse(e) => write!(f, "malformed response: {e}"),
        }
    }
}

/// Require a 2xx status and parse the body as JSON.
pub fn parse_json<T: DeserializeOwned>(
    response: Result<HttpResponse, TransportError>,
) -> Result<T, ResponseError> {
    let response = response.map_err(ResponseError::Transport)?;
    if !response.is_success() {
        return Err(ResponseError::Status(response.status, response.body));
    }
    serde_json::from_str(&response.body).map_err(ResponseError::Parse)
}
