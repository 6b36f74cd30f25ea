//! HTTP Basic credentials.
//!
//! Both external services authenticate with HTTP Basic, each with its own
//! identity. The credential is encoded once at load time; fetchers only see
//! the finished `Authorization` header value.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// A pre-encoded `Authorization: Basic ...` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    header: String,
}

impl BasicAuth {
    /// Encodes `user:secret` as a Basic credential.
    #[must_use]
    pub fn encode(user: &str, secret: &str) -> Self {
        let encoded = BASE64.encode(format!("{user}:{secret}"));
        Self {
            header: format!("Basic {encoded}"),
        }
    }

    /// Encodes a bare API token the way the quality service expects it:
    /// the token is the user name and the password is empty.
    #[must_use]
    pub fn token(token: &str) -> Self {
        Self::encode(token, "")
    }

    /// The full header value, including the `Basic ` scheme prefix.
    #[must_use]
    pub fn header_value(&self) -> &str {
        &self.header
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BasicAuth(<redacted>)")
    }
}
