//! Method tables: wire method name → typed handler.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use interop_protocol::{BridgeError, DynamicValue, FromDynamic, IntoDynamic, InvocationResult, Mismatch};

use crate::Service;

/// What a handler hands back to the dispatcher.
///
/// `Pending` is work that completes later; the dispatcher awaits it before
/// answering, so a client never sees a placeholder.
pub enum Reply {
    Ready(DynamicValue),
    Pending(BoxFuture<'static, InvocationResult>),
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Whether a method answers immediately or through a pending future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Sync,
    Async,
}

/// A positional argument that failed coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgError {
    pub position: usize,
    pub mismatch: Mismatch,
}

/// Positional parameter lists, implemented for tuples of up to five
/// [`FromDynamic`] types.
pub trait FromArgs: Sized {
    const ARITY: usize;
    fn from_args(args: Vec<DynamicValue>) -> Result<Self, ArgError>;
}

impl FromArgs for () {
    const ARITY: usize = 0;

    fn from_args(_args: Vec<DynamicValue>) -> Result<Self, ArgError> {
        Ok(())
    }
}

fn take<T: FromDynamic>(
    args: &mut std::iter::Enumerate<std::vec::IntoIter<DynamicValue>>,
    arity: usize,
) -> Result<T, ArgError> {
    match args.next() {
        Some((position, value)) => {
            T::from_dynamic(value).map_err(|mismatch| ArgError { position, mismatch })
        }
        None => Err(ArgError {
            position: arity,
            mismatch: Mismatch::describe("an argument", "nothing"),
        }),
    }
}

macro_rules! tuple_args {
    ($arity:expr; $($ty:ident),+) => {
        impl<$($ty: FromDynamic),+> FromArgs for ($($ty,)+) {
            const ARITY: usize = $arity;

            fn from_args(args: Vec<DynamicValue>) -> Result<Self, ArgError> {
                let mut args = args.into_iter().enumerate();
                Ok(($(take::<$ty>(&mut args, $arity)?,)+))
            }
        }
    };
}

tuple_args!(1; A1);
tuple_args!(2; A1, A2);
tuple_args!(3; A1, A2, A3);
tuple_args!(4; A1, A2, A3, A4);
tuple_args!(5; A1, A2, A3, A4, A5);

type Handler<S> =
    Arc<dyn Fn(&Arc<S>, Vec<DynamicValue>) -> Result<Reply, BridgeError> + Send + Sync>;

struct MethodEntry<S> {
    arity: usize,
    kind: MethodKind,
    handler: Handler<S>,
}

/// The callable surface of one service, built once at startup.
pub struct MethodTable<S> {
    methods: HashMap<&'static str, MethodEntry<S>>,
}

impl<S: Service> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Service> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Build the table for `S`.
    pub fn build() -> Self {
        S::methods(Self::new())
    }

    /// Register a method that returns its value immediately.
    pub fn sync<A, R, E, F>(mut self, name: &'static str, f: F) -> Self
    where
        A: FromArgs,
        R: IntoDynamic,
        E: Display,
        F: Fn(&S, A) -> Result<R, E> + Send + Sync + 'static,
    {
        let handler = move |service: &Arc<S>, args: Vec<DynamicValue>| -> Result<Reply, BridgeError> {
            let args = A::from_args(args).map_err(|e| argument_error::<S>(name, e))?;
            let value = f(&**service, args)
                .map_err(|e| BridgeError::invocation_failed(e.to_string()))?;
            Ok(Reply::Ready(value.into_dynamic()?))
        };
        self.insert(name, A::ARITY, MethodKind::Sync, Arc::new(handler));
        self
    }

    /// Register a method whose work completes later.
    ///
    /// The handler receives its own `Arc` of the service so the returned
    /// future is independent of the request that started it.
    pub fn asynchronous<A, R, E, F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        A: FromArgs,
        R: IntoDynamic,
        E: Display,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let handler = move |service: &Arc<S>, args: Vec<DynamicValue>| -> Result<Reply, BridgeError> {
            let args = A::from_args(args).map_err(|e| argument_error::<S>(name, e))?;
            let pending = f(Arc::clone(service), args);
            Ok(Reply::Pending(Box::pin(async move {
                let value = pending
                    .await
                    .map_err(|e| BridgeError::invocation_failed(e.to_string()))?;
                value.into_dynamic()
            })))
        };
        self.insert(name, A::ARITY, MethodKind::Async, Arc::new(handler));
        self
    }

    fn insert(&mut self, name: &'static str, arity: usize, kind: MethodKind, handler: Handler<S>) {
        self.methods.insert(name, MethodEntry { arity, kind, handler });
    }

    /// Resolve `method`, check arity, coerce arguments, and start the call.
    pub fn call(
        &self,
        service: &Arc<S>,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> Result<Reply, BridgeError> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| BridgeError::method_not_found(S::NAME, method))?;

        if args.len() != entry.arity {
            return Err(BridgeError::ArgumentCount {
                service: S::NAME.to_string(),
                method: method.to_string(),
                expected: entry.arity,
                found: args.len(),
            });
        }

        (entry.handler)(service, args)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn arity(&self, method: &str) -> Option<usize> {
        self.methods.get(method).map(|e| e.arity)
    }

    pub fn kind(&self, method: &str) -> Option<MethodKind> {
        self.methods.get(method).map(|e| e.kind)
    }

    /// Method names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

fn argument_error<S: Service>(method: &str, e: ArgError) -> BridgeError {
    BridgeError::ArgumentMismatch {
        service: S::NAME.to_string(),
        method: method.to_string(),
        position: e.position,
        reason: e.mismatch.to_string(),
    }
}
