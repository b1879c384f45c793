use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use authstore_core::{
    Application, Authorization, EntityKey, KeyKind, KeyValue, Scope, StoreError, StoreResult,
    Token,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Write operations that faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Decides whether a write fails. Receives the operation, the entity kind
/// and the identifier in string form (empty for inserts).
pub type FaultHook = Arc<dyn Fn(Operation, &'static str, &str) -> bool + Send + Sync>;

/// The four tables, each ordered by identifier.
#[derive(Debug, Clone, Default)]
pub struct Tables<K: EntityKey> {
    pub(crate) applications: BTreeMap<K, Application<K>>,
    pub(crate) authorizations: BTreeMap<K, Authorization<K>>,
    pub(crate) scopes: BTreeMap<K, Scope<K>>,
    pub(crate) tokens: BTreeMap<K, Token<K>>,
    next_id: i64,
}

impl<K: EntityKey> Tables<K> {
    /// Generates the identifier of a new row.
    pub(crate) fn generate_id(&mut self) -> StoreResult<K> {
        let value = match K::KIND {
            KeyKind::Integer => {
                self.next_id += 1;
                KeyValue::Integer(self.next_id)
            }
            KeyKind::Uuid => KeyValue::Uuid(Uuid::new_v4()),
            KeyKind::Text => KeyValue::Text(Uuid::new_v4().to_string()),
        };
        K::from_value(value)
    }

    pub fn application_count(&self) -> usize {
        self.applications.len()
    }

    pub fn authorization_count(&self) -> usize {
        self.authorizations.len()
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

/// In-memory database shared by every session opened on it.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone)]
pub struct MemoryDatabase<K: EntityKey> {
    pub(crate) tables: Arc<Mutex<Tables<K>>>,
    fault: Arc<RwLock<Option<FaultHook>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl<K: EntityKey> MemoryDatabase<K> {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            fault: Arc::new(RwLock::new(None)),
            latency: Arc::new(RwLock::new(None)),
        }
    }

    /// Makes the writes accepted by `hook` fail with a storage error.
    pub fn inject_fault<H>(&self, hook: H)
    where
        H: Fn(Operation, &'static str, &str) -> bool + Send + Sync + 'static,
    {
        if let Ok(mut fault) = self.fault.write() {
            *fault = Some(Arc::new(hook));
        }
    }

    /// Removes the injected fault.
    pub fn clear_fault(&self) {
        if let Ok(mut fault) = self.fault.write() {
            *fault = None;
        }
    }

    /// Holds every successful write for `delay` before it returns.
    pub fn inject_latency(&self, delay: Duration) {
        if let Ok(mut latency) = self.latency.write() {
            *latency = Some(delay);
        }
    }

    pub fn clear_latency(&self) {
        if let Ok(mut latency) = self.latency.write() {
            *latency = None;
        }
    }

    /// Runs `f` against a consistent view of the tables.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Tables<K>) -> R) -> R {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    pub(crate) async fn write_latency(&self) {
        let delay = self.latency.read().ok().and_then(|latency| *latency);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn check_fault(
        &self,
        operation: Operation,
        entity: &'static str,
        id: &str,
    ) -> StoreResult<()> {
        let hook = self.fault.read().ok().and_then(|fault| fault.clone());
        match hook {
            Some(hook) if hook(operation, entity, id) => Err(StoreError::storage(format!(
                "injected fault on {operation:?} of {entity} '{id}'"
            ))),
            _ => Ok(()),
        }
    }
}

impl<K: EntityKey> Default for MemoryDatabase<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityKey> fmt::Debug for MemoryDatabase<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_ids_are_sequential() {
        let mut tables = Tables::<i64>::default();
        assert_eq!(tables.generate_id().unwrap(), 1);
        assert_eq!(tables.generate_id().unwrap(), 2);
    }

    #[test]
    fn test_uuid_and_text_ids_are_unique() {
        let mut tables = Tables::<Uuid>::default();
        assert_ne!(tables.generate_id().unwrap(), tables.generate_id().unwrap());

        let mut tables = Tables::<String>::default();
        let id = tables.generate_id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_fault_hook() {
        let database = MemoryDatabase::<i64>::new();
        assert!(database.check_fault(Operation::Update, "Token", "1").is_ok());

        database.inject_fault(|op, entity, id| op == Operation::Update && entity == "Token" && id == "1");
        assert!(database.check_fault(Operation::Update, "Token", "1").is_err());
        assert!(database.check_fault(Operation::Update, "Token", "2").is_ok());
        assert!(database.check_fault(Operation::Delete, "Token", "1").is_ok());

        database.clear_fault();
        assert!(database.check_fault(Operation::Update, "Token", "1").is_ok());
    }
}
