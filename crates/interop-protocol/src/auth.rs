//! Shared-secret authorization for RPC requests.
//!
//! When a secret is configured, every `POST` must carry
//! `Authorization: Bearer <secret>`. Anything else is rejected with 401
//! before the body is read.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

/// Authentication configuration for the transport.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    secret: Arc<SecretString>,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::new(SecretString::from(secret.into())),
        }
    }

    pub fn from_secret(secret: SecretString) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }

    /// Check the raw `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        let Some(presented) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return false;
        };
        constant_time_eq(presented.as_bytes(), self.secret.expose_secret().as_bytes())
    }

    /// Header value a client must send.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.secret.expose_secret())
    }
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
