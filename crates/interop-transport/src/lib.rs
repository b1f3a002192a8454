//! Interop Transport Layer
//!
//! Serves the bridge over HTTP:
//! - `POST /` carries one RPC invocation per request
//! - `GET` serves the front-end's static assets
//! - everything else is answered with 405
//!
//! The transport is decoupled from dispatch via the `RequestHandler` trait.

pub mod assets;
pub mod server;

pub use assets::AssetConfig;
pub use server::{RequestHandler, TransportConfig, TransportError, TransportServer};
