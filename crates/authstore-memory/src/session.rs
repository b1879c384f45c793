use async_trait::async_trait;
use authstore_core::{
    Entity, EntityKey, EntitySet, IsolationLevel, Query, SessionFactory, StoreError, StoreResult,
    Transactional,
};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::database::{MemoryDatabase, Operation, Tables};
use crate::entity::MemoryEntity;

/// A session over a [`MemoryDatabase`].
///
/// Outside a transaction every statement locks the tables for its own
/// duration. A transaction holds the lock until commit or rollback, which
/// serializes it against every other session, and restores a snapshot on
/// rollback.
pub struct MemorySession<K: EntityKey> {
    database: MemoryDatabase<K>,
    transaction: Option<MemoryTransaction<K>>,
}

struct MemoryTransaction<K: EntityKey> {
    tables: OwnedMutexGuard<Tables<K>>,
    snapshot: Tables<K>,
}

impl<K: EntityKey> MemorySession<K> {
    pub fn new(database: MemoryDatabase<K>) -> Self {
        Self {
            database,
            transaction: None,
        }
    }

    async fn run<R, F>(&mut self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Tables<K>) -> StoreResult<R> + Send,
    {
        match &mut self.transaction {
            Some(transaction) => f(&mut transaction.tables),
            None => {
                let mut tables = self.database.tables.lock().await;
                f(&mut tables)
            }
        }
    }
}

impl<K: EntityKey> std::fmt::Debug for MemorySession<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("in_transaction", &self.transaction.is_some())
            .finish()
    }
}

fn matching<'t, E: MemoryEntity>(
    tables: &'t Tables<E::Key>,
    query: &'t Query<E>,
) -> impl Iterator<Item = &'t E> + 't {
    E::table(tables)
        .values()
        .filter(move |row| query.filters().iter().all(|f| row.matches(f, tables)))
}

fn conflict<E: Entity>(id: &E::Key) -> StoreError {
    StoreError::conflict(E::NAME, id.format_key())
}

#[async_trait]
impl<E> EntitySet<E> for MemorySession<E::Key>
where
    E: MemoryEntity,
{
    async fn count(&mut self, query: &Query<E>) -> StoreResult<u64> {
        self.run(|tables| Ok(matching(tables, query).count() as u64))
            .await
    }

    async fn fetch(&mut self, query: &Query<E>) -> StoreResult<Vec<E>> {
        self.run(|tables| Ok(query.apply_window(matching(tables, query).cloned())))
            .await
    }

    async fn insert(&mut self, entity: &mut E) -> StoreResult<()> {
        self.database.check_fault(Operation::Insert, E::NAME, "")?;
        self.run(|tables| {
            entity.check_unique(tables, None)?;
            entity.check_references(tables)?;

            let id = match entity.id() {
                Some(id) if !id.is_default() => id.clone(),
                _ => tables.generate_id()?,
            };
            if E::table(tables).contains_key(&id) {
                return Err(StoreError::already_exists(E::NAME, format!("id '{}'", id.format_key())));
            }

            entity.assign_id(id.clone());
            E::table_mut(tables).insert(id, entity.clone());
            Ok(())
        })
        .await?;
        self.database.write_latency().await;
        Ok(())
    }

    async fn update(&mut self, entity: &E, expected_token: Option<&str>) -> StoreResult<()> {
        let id = entity
            .id()
            .cloned()
            .ok_or_else(|| StoreError::invalid_argument("entity", "the entity has no identifier"))?;
        self.database
            .check_fault(Operation::Update, E::NAME, &id.format_key())?;

        self.run(|tables| {
            let stored = E::table(tables).get(&id).ok_or_else(|| conflict::<E>(&id))?;
            if stored.concurrency_token() != expected_token {
                return Err(conflict::<E>(&id));
            }
            entity.check_unique(tables, Some(&id))?;
            entity.check_references(tables)?;

            E::table_mut(tables).insert(id, entity.clone());
            Ok(())
        })
        .await?;
        self.database.write_latency().await;
        Ok(())
    }

    async fn delete(&mut self, id: &E::Key, expected_token: Option<&str>) -> StoreResult<()> {
        self.database
            .check_fault(Operation::Delete, E::NAME, &id.format_key())?;

        self.run(|tables| {
            let stored = E::table(tables).get(id).ok_or_else(|| conflict::<E>(id))?;
            if stored.concurrency_token() != expected_token {
                return Err(conflict::<E>(id));
            }
            E::check_dependents(id, tables)?;

            E::table_mut(tables).remove(id);
            Ok(())
        })
        .await?;
        self.database.write_latency().await;
        Ok(())
    }

    async fn delete_where(&mut self, query: &Query<E>) -> StoreResult<u64> {
        let deleted = self.run(|tables| {
            let ids: Vec<E::Key> = matching(tables, query)
                .filter_map(|row| row.id().cloned())
                .collect();
            for id in &ids {
                E::check_dependents(id, tables)?;
            }

            let table = E::table_mut(tables);
            for id in &ids {
                table.remove(id);
            }
            Ok(ids.len() as u64)
        })
        .await?;
        self.database.write_latency().await;
        Ok(deleted)
    }
}

#[async_trait]
impl<K: EntityKey> Transactional for MemorySession<K> {
    async fn begin(&mut self, isolation: IsolationLevel) -> StoreResult<()> {
        if self.transaction.is_some() {
            return Err(StoreError::storage("a transaction is already open"));
        }

        let tables = self.database.tables.clone().lock_owned().await;
        let snapshot = tables.clone();
        self.transaction = Some(MemoryTransaction { tables, snapshot });
        debug!(isolation = isolation.as_sql(), "Began in-memory transaction");
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        match self.transaction.take() {
            Some(_) => Ok(()),
            None => Err(StoreError::storage("no transaction is open")),
        }
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        match self.transaction.take() {
            Some(mut transaction) => {
                *transaction.tables = transaction.snapshot;
                debug!("Rolled back in-memory transaction");
                Ok(())
            }
            None => Err(StoreError::storage("no transaction is open")),
        }
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn abandon(&mut self) {
        if let Some(mut transaction) = self.transaction.take() {
            *transaction.tables = transaction.snapshot;
            debug!("Abandoned in-memory transaction");
        }
    }
}

/// Opens [`MemorySession`]s over one database.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionFactory<K: EntityKey> {
    database: MemoryDatabase<K>,
}

impl<K: EntityKey> MemorySessionFactory<K> {
    pub fn new(database: MemoryDatabase<K>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &MemoryDatabase<K> {
        &self.database
    }
}

#[async_trait]
impl<K: EntityKey> SessionFactory for MemorySessionFactory<K> {
    type Key = K;
    type Session = MemorySession<K>;

    async fn open_session(&self) -> StoreResult<MemorySession<K>> {
        Ok(MemorySession::new(self.database.clone()))
    }
}
