//! Three-legged OAuth handshake.
//!
//! `Unauthenticated -> RequestTokenObtained -> Authorized`. A failed step
//! leaves the state where it was.

use log::{debug, info};

use super::{Token, signing};
use crate::error::{BrokerError, Precondition};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::types::{ConsumerCredentials, HandshakePhase};

/// Where a backend's handshake legs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub request_token_url: String,
    pub access_token_url: String,
    /// Template with `{key}` and `{token}` placeholders.
    pub authorize_url: String,
}

impl OAuthEndpoints {
    /// E*Trade endpoints for an API base URL.
    pub fn etrade(base_url: &str) -> Self {
        Self {
            request_token_url: format!("{base_url}/oauth/request_token"),
            access_token_url: format!("{base_url}/oauth/access_token"),
            authorize_url: "https://us.etrade.com/e/t/etws/authorize?key={key}&token={token}"
                .to_string(),
        }
    }

    pub fn authorize_url_for(&self, consumer_key: &str, request_token: &str) -> String {
        self.authorize_url
            .replace("{key}", &signing::percent_encode(consumer_key))
            .replace("{token}", &signing::percent_encode(request_token))
    }
}

#[derive(Debug)]
enum State {
    Unauthenticated,
    RequestTokenObtained {
        consumer: ConsumerCredentials,
        request_token: Token,
    },
    Authorized {
        consumer: ConsumerCredentials,
        access_token: Token,
    },
}

/// Credentials of an authorized session, used to sign API calls.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizedCredentials<'a> {
    pub consumer: &'a ConsumerCredentials,
    pub access_token: &'a Token,
}

impl AuthorizedCredentials<'_> {
    pub fn sign(&self, request: HttpRequest) -> HttpRequest {
        signing::authorize(request, self.consumer, Some(self.access_token), &[])
    }
}

/// Per-session handshake state machine.
#[derive(Debug)]
pub struct OAuthHandshake {
    endpoints: OAuthEndpoints,
    state: State,
}

impl OAuthHandshake {
    pub fn new(endpoints: OAuthEndpoints) -> Self {
        Self {
            endpoints,
            state: State::Unauthenticated,
        }
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    pub fn phase(&self) -> HandshakePhase {
        match self.state {
            State::Unauthenticated => HandshakePhase::Unauthenticated,
            State::RequestTokenObtained { .. } => HandshakePhase::RequestTokenObtained,
            State::Authorized { .. } => HandshakePhase::Authorized,
        }
    }

    /// First leg: obtain a request token and return the URL the user must
    /// visit to authorize it.
    pub fn begin(
        &mut self,
        transport: &dyn Transport,
        consumer: ConsumerCredentials,
    ) -> Result<String, BrokerError> {
        match self.state {
            State::Unauthenticated => {}
            State::RequestTokenObtained { .. } => {
                return Err(Precondition::HandshakeInProgress.into());
            }
            State::Authorized { .. } => return Err(Precondition::AlreadyAuthorized.into()),
        }

        let request = signing::authorize(
            HttpRequest::get(&self.endpoints.request_token_url),
            &consumer,
            None,
            &[("oauth_callback", "oob")],
        );
        debug!("requesting OAuth request token");
        let response = send(transport, &request, "request token")?;
        let request_token = parse_token_response(&response.body).ok_or_else(|| {
            BrokerError::HandshakeTransport("malformed request token response".into())
        })?;

        let url = self
            .endpoints
            .authorize_url_for(&consumer.key, &request_token.token);
        info!("request token obtained, awaiting authorization");
        self.state = State::RequestTokenObtained {
            consumer,
            request_token,
        };
        Ok(url)
    }

    /// Second leg: exchange the request token and the user's verifier for
    /// an access token.
    pub fn complete(&mut self, transport: &dyn Transport, verifier: &str) -> Result<(), BrokerError> {
        let (consumer, request_token) = match &self.state {
            State::RequestTokenObtained {
                consumer,
                request_token,
            } => (consumer, request_token),
            State::Unauthenticated => return Err(Precondition::HandshakeNotStarted.into()),
            State::Authorized { .. } => return Err(Precondition::AlreadyAuthorized.into()),
        };

        let request = signing::authorize(
            HttpRequest::get(&self.endpoints.access_token_url),
            consumer,
            Some(request_token),
            &[("oauth_verifier", verifier.trim())],
        );
        debug!("exchanging verifier for access token");
        let response = send(transport, &request, "access token")?;
        let access_token = parse_token_response(&response.body).ok_or_else(|| {
            BrokerError::HandshakeTransport("malformed access token response".into())
        })?;

        let consumer = consumer.clone();
        info!("OAuth handshake complete");
        self.state = State::Authorized {
            consumer,
            access_token,
        };
        Ok(())
    }

    pub fn authorized(&self) -> Result<AuthorizedCredentials<'_>, BrokerError> {
        match &self.state {
            State::Authorized {
                consumer,
                access_token,
            } => Ok(AuthorizedCredentials {
                consumer,
                access_token,
            }),
            _ => Err(Precondition::NotAuthorized.into()),
        }
    }
}

fn send(
    transport: &dyn Transport,
    request: &HttpRequest,
    leg: &str,
) -> Result<HttpResponse, BrokerError> {
    let response = transport
        .send(request)
        .map_err(|e| BrokerError::HandshakeTransport(format!("{leg}: {e}")))?;
    if !response.is_success() {
        return Err(BrokerError::HandshakeTransport(format!(
            "{leg} endpoint returned {}: {}",
            response.status, response.body
        )));
    }
    Ok(response)
}

/// Parse `oauth_token=...&oauth_token_secret=...` (form-encoded).
fn parse_token_response(body: &str) -> Option<Token> {
    let mut token = None;
    let mut secret = None;
    for pair in body.trim().split('&') {
        let (k, v) = pair.split_once('=')?;
        let v = urlencoding::decode(&v.replace('+', " ")).ok()?.into_owned();
        match k {
            "oauth_token" => token = Some(v),
            "oauth_token_secret" => secret = Some(v),
            _ => {}
        }
    }
    match (token, secret) {
        (Some(t), Some(s)) if !t.is_empty() => Some(Token::new(t, s)),
        _ => None,
    }
}
