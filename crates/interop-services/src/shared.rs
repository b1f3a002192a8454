//! Shared variable service: in-memory values visible to every front-end
//! window for the lifetime of the process.

use std::collections::HashMap;
use std::convert::Infallible;

use interop_protocol::DynamicValue;
use parking_lot::RwLock;

use crate::{MethodTable, Service};

#[derive(Debug, Default)]
pub struct SharedVariableService {
    values: RwLock<HashMap<String, DynamicValue>>,
}

impl SharedVariableService {
    /// Stored value, or null when unset.
    pub fn get(&self, key: &str) -> DynamicValue {
        self.values.read().get(key).cloned().unwrap_or(DynamicValue::Null)
    }

    pub fn set(&self, key: String, value: DynamicValue) {
        self.values.write().insert(key, value);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Service for SharedVariableService {
    const NAME: &'static str = "SharedVariable";

    fn methods(table: MethodTable<Self>) -> MethodTable<Self> {
        table
            .sync("Get", |s, (key,): (String,)| Ok::<_, Infallible>(s.get(&key)))
            .sync("Set", |s, (key, value): (String, DynamicValue)| {
                s.set(key, value);
                Ok::<_, Infallible>(())
            })
            .sync("Remove", |s, (key,): (String,)| Ok::<_, Infallible>(s.remove(&key)))
            .sync("Clear", |s, (): ()| {
                s.clear();
                Ok::<_, Infallible>(())
            })
            .sync("Keys", |s, (): ()| Ok::<_, Infallible>(s.keys()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_protocol::Mapping;

    #[test]
    fn values_keep_their_shape() {
        let shared = SharedVariableService::default();
        let mapping: Mapping = [("a", DynamicValue::Integer(1))].into_iter().collect();
        shared.set("m".into(), DynamicValue::Mapping(mapping.clone()));
        assert_eq!(shared.get("m"), DynamicValue::Mapping(mapping));
        assert_eq!(shared.get("missing"), DynamicValue::Null);
    }

    #[test]
    fn remove_and_clear() {
        let shared = SharedVariableService::default();
        shared.set("b".into(), DynamicValue::from("x"));
        shared.set("a".into(), DynamicValue::from("y"));
        assert_eq!(shared.keys(), vec!["a", "b"]);
        assert!(shared.remove("a"));
        assert!(!shared.remove("a"));
        shared.clear();
        assert!(shared.keys().is_empty());
    }
}
