//! OAuth 1.0a (three-legged) support: request signing and the handshake
//! state machine.

pub mod handshake;
pub mod signing;

use std::fmt;

use zeroize::Zeroize;

pub use handshake::{AuthorizedCredentials, OAuthEndpoints, OAuthHandshake};

/// A token/secret pair: the temporary request token during the handshake,
/// the access token afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub token: String,
    pub secret: String,
}

impl Token {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}
