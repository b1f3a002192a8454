//! Interop error taxonomy and its HTTP status mapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category, as reported to the client in the `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    MalformedRequest,
    ServiceNotFound,
    MethodNotFound,
    ArgumentMismatch,
    InvocationFailed,
    InternalError,
}

impl ErrorKind {
    /// HTTP status code used when this failure ends a request.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::MalformedRequest
            | Self::ServiceNotFound
            | Self::MethodNotFound
            | Self::ArgumentMismatch
            | Self::InvocationFailed => 400,
            Self::InternalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::MalformedRequest => "MalformedRequest",
            Self::ServiceNotFound => "ServiceNotFound",
            Self::MethodNotFound => "MethodNotFound",
            Self::ArgumentMismatch => "ArgumentMismatch",
            Self::InvocationFailed => "InvocationFailed",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way an invocation can fail. None of these are retried by the core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Class {0} not found")]
    ServiceNotFound(String),

    #[error("Method {method} does not exist on class {service}")]
    MethodNotFound { service: String, method: String },

    #[error("{service}.{method} expects {expected} argument(s), got {found}")]
    ArgumentCount {
        service: String,
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("Argument {position} of {service}.{method}: {reason}")]
    ArgumentMismatch {
        service: String,
        method: String,
        position: usize,
        reason: String,
    },

    #[error("{0}")]
    InvocationFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl BridgeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    pub fn service_not_found(service: &str) -> Self {
        Self::ServiceNotFound(service.to_string())
    }

    pub fn method_not_found(service: &str, method: &str) -> Self {
        Self::MethodNotFound {
            service: service.to_string(),
            method: method.to_string(),
        }
    }

    pub fn invocation_failed(message: impl Into<String>) -> Self {
        Self::InvocationFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::ServiceNotFound(_) => ErrorKind::ServiceNotFound,
            Self::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            Self::ArgumentCount { .. } | Self::ArgumentMismatch { .. } => {
                ErrorKind::ArgumentMismatch
            }
            Self::InvocationFailed(_) => ErrorKind::InvocationFailed,
            Self::InternalError(_) => ErrorKind::InternalError,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}
