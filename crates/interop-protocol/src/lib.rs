//! Interop Protocol - Wire Types
//!
//! Everything that crosses the process boundary between the presentation
//! layer and the backend service objects: the dynamic value model, the JSON
//! codec that preserves map-ness and numeric subtype, typed coercion for
//! method parameters and results, request/response envelopes, the error
//! taxonomy, and the shared-secret auth configuration.

pub mod auth;
pub mod codec;
pub mod convert;
pub mod envelope;
pub mod error;
pub mod value;

pub use auth::AuthConfig;
pub use codec::{MAP_DISCRIMINATOR, MAX_DEPTH};
pub use convert::{FromDynamic, IntoDynamic, Mismatch, Structured};
pub use envelope::{Invocation, InvocationResult, RpcFailure, RpcRequest, RpcSuccess};
pub use error::{BridgeError, ErrorKind};
pub use value::{DynamicValue, Mapping};
