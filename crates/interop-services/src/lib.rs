//! Interop Service Implementations
//!
//! Each backend service implements the `Service` trait: a stable registry
//! name plus a table of callable methods. The table maps the wire method
//! name to a typed handler, so dispatch is a map lookup followed by argument
//! coercion and a typed call.

pub mod method;
pub mod program;
pub mod shared;
pub mod storage;

pub use method::{FromArgs, MethodKind, MethodTable, Reply};

/// Trait implemented by all backend services.
///
/// Instances are created lazily by the registry, at most once per process,
/// and shared by every request. Interior state must be synchronized by the
/// service itself.
pub trait Service: Send + Sync + Sized + 'static {
    /// Name clients address this service by (e.g., "Storage").
    const NAME: &'static str;

    /// Register the callable methods. Called once at startup.
    fn methods(table: MethodTable<Self>) -> MethodTable<Self>;
}
