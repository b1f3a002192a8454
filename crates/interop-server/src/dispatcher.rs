//! Dispatcher: turns one `Invocation` into one `InvocationResult`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use interop_protocol::{BridgeError, ErrorKind, Invocation, InvocationResult};
use interop_services::Reply;
use interop_transport::server::RequestHandler;
use tracing::{debug, error, warn};

use crate::registry::ObjectRegistry;

/// Routes invocations to registered services.
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ObjectRegistry>,
}

impl Dispatcher {
    pub fn new(registry: ObjectRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// Resolve, look up, coerce, call, and await a pending reply.
    ///
    /// Backend failures are reported once and never retried. A panicking
    /// backend method becomes `InternalError`.
    pub async fn invoke(&self, invocation: Invocation) -> InvocationResult {
        let target = invocation.target();
        debug!("Invoking {target} with {} argument(s)", invocation.args.len());

        let result = self.dispatch(invocation).await;
        match &result {
            Ok(_) => debug!("{target} completed"),
            Err(e) if e.kind() == ErrorKind::InternalError => error!("{target} failed: {e}"),
            Err(e) => warn!("{target} failed: {e}"),
        }
        result
    }

    async fn dispatch(&self, invocation: Invocation) -> InvocationResult {
        let Invocation {
            service,
            method,
            args,
        } = invocation;

        let slot = self.registry.slot(&service)?;
        let reply = panic::catch_unwind(AssertUnwindSafe(|| slot.invoke(&method, args)))
            .map_err(|payload| panicked(&service, &method, payload))??;

        match reply {
            Reply::Ready(value) => Ok(value),
            Reply::Pending(pending) => AssertUnwindSafe(pending)
                .catch_unwind()
                .await
                .map_err(|payload| panicked(&service, &method, payload))?,
        }
    }
}

fn panicked(service: &str, method: &str, payload: Box<dyn Any + Send>) -> BridgeError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into());
    // The payload stays in the log; clients see a generic failure.
    error!("{service}.{method} panicked: {message}");
    BridgeError::internal(format!("{service}.{method} failed"))
}

impl RequestHandler for Dispatcher {
    async fn handle_invocation(&self, invocation: Invocation) -> InvocationResult {
        self.invoke(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    use interop_protocol::{DynamicValue, Mapping};
    use interop_services::{MethodTable, Service};

    #[derive(Default)]
    struct Registry;

    impl Service for Registry {
        const NAME: &'static str = "Registry";

        fn methods(table: MethodTable<Self>) -> MethodTable<Self> {
            table
                .sync("Echo", |_, (map,): (Mapping,)| Ok::<_, Infallible>(map))
                .sync("Explode", |_, (): ()| -> Result<(), Infallible> { panic!("kaboom") })
                .asynchronous("Slow", |_, (ms, value): (u64, String)| async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, Infallible>(value)
                })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ObjectRegistry::new().register::<Registry>())
    }

    #[tokio::test]
    async fn echo_returns_mapping() {
        let map: Mapping = [("a", DynamicValue::Integer(1))].into_iter().collect();
        let result = dispatcher()
            .invoke(Invocation::new("Registry", "Echo", vec![DynamicValue::Mapping(map.clone())]))
            .await
            .unwrap();
        assert_eq!(result, DynamicValue::Mapping(map));
    }

    #[tokio::test]
    async fn unknown_targets() {
        let d = dispatcher();
        let err = d.invoke(Invocation::new("Bogus", "x", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceNotFound);

        let err = d.invoke(Invocation::new("Registry", "bogus", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    }

    #[tokio::test]
    async fn sequence_argument_is_not_a_mapping() {
        let err = dispatcher()
            .invoke(Invocation::new("Registry", "Echo", vec![DynamicValue::Sequence(vec![])]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentMismatch);
    }

    #[tokio::test]
    async fn pending_reply_is_awaited() {
        let args = vec![DynamicValue::Integer(20), DynamicValue::from("done")];
        let result = dispatcher()
            .invoke(Invocation::new("Registry", "Slow", args))
            .await
            .unwrap();
        assert_eq!(result, DynamicValue::from("done"));
    }

    #[tokio::test]
    async fn slow_call_does_not_block_others() {
        let d = dispatcher();
        let slow = tokio::spawn({
            let d = d.clone();
            async move {
                let args = vec![DynamicValue::Integer(200), DynamicValue::from("slow")];
                d.invoke(Invocation::new("Registry", "Slow", args)).await
            }
        });

        let fast = tokio::time::timeout(
            Duration::from_millis(100),
            d.invoke(Invocation::new("Registry", "Slow", vec![DynamicValue::Integer(0), DynamicValue::from("fast")])),
        )
        .await
        .expect("fast call should not wait for the slow one");
        assert_eq!(fast.unwrap(), DynamicValue::from("fast"));
        assert_eq!(slow.await.unwrap().unwrap(), DynamicValue::from("slow"));
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let d = dispatcher();
        let err = d.invoke(Invocation::new("Registry", "Explode", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert_eq!(err.to_string(), "Internal error: Registry.Explode failed");
        assert!(!err.to_string().contains("kaboom"));

        // Still serving.
        let err = d.invoke(Invocation::new("Registry", "bogus", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    }
}
