//! Request and response envelopes for `POST /`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::error::{BridgeError, ErrorKind};
use crate::value::DynamicValue;

/// Request body: `{ "className", "methodName", "args" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "methodName")]
    pub method_name: String,
    /// Wire-encoded arguments. Missing or `null` means no arguments.
    #[serde(default)]
    pub args: Option<Vec<Value>>,
}

impl RpcRequest {
    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(body)
            .map_err(|e| BridgeError::malformed(format!("Invalid request body: {e}")))
    }

    /// Decode every argument through the codec.
    pub fn into_invocation(self) -> Result<Invocation, BridgeError> {
        let args = self
            .args
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, raw)| {
                codec::from_wire(raw).map_err(|e| match e {
                    BridgeError::MalformedRequest(msg) => {
                        BridgeError::malformed(format!("Argument {position}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Invocation {
            service: self.class_name,
            method: self.method_name,
            args,
        })
    }
}

/// One resolved call, consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub service: String,
    pub method: String,
    pub args: Vec<DynamicValue>,
}

impl Invocation {
    pub fn new(service: impl Into<String>, method: impl Into<String>, args: Vec<DynamicValue>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    /// `Service.Method`, for logs.
    pub fn target(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// Outcome of one invocation.
pub type InvocationResult = Result<DynamicValue, BridgeError>;

/// Success body: `{ "status": "success", "result": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcSuccess {
    pub status: &'static str,
    pub result: DynamicValue,
}

impl RpcSuccess {
    pub fn new(result: DynamicValue) -> Self {
        Self {
            status: "success",
            result,
        }
    }
}

/// Failure body: `{ "status": "error", "kind": ..., "error": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFailure {
    pub status: String,
    pub kind: ErrorKind,
    pub error: String,
}

impl From<&BridgeError> for RpcFailure {
    fn from(error: &BridgeError) -> Self {
        Self {
            status: "error".into(),
            kind: error.kind(),
            error: error.to_string(),
        }
    }
}
