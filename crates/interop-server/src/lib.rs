//! Interop Server: resolves service names to lazily constructed instances
//! and dispatches invocations to their method tables.
//!
//! The dispatcher provides the `RequestHandler` implementation for the
//! transport layer.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use registry::ObjectRegistry;
