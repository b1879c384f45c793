//! PostgreSQL sessions and the session factory.

use std::marker::PhantomData;

use async_trait::async_trait;
use authstore_core::{
    Entity, EntityKey, EntitySet, IsolationLevel, Query, SessionFactory, StoreError, StoreResult,
    Transactional,
};
use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, PgTransaction, Postgres};
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, map_sqlx};
use crate::mapping::{PgEntity, read_key};
use crate::pool::create_pool;
use crate::schema::ensure_schema;
use crate::statement;

const TRANSACTION: &str = "Transaction";

/// A session over a connection pool.
///
/// Outside a transaction every statement runs on a pooled connection. A
/// transaction pins one connection until commit or rollback; dropping the
/// session with an open transaction rolls it back.
pub struct PostgresSession<K: EntityKey> {
    pool: PgPool,
    transaction: Option<PgTransaction<'static>>,
    _key: PhantomData<fn() -> K>,
}

impl<K: EntityKey> PostgresSession<K> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: None,
            _key: PhantomData,
        }
    }

    async fn fetch_all(
        &mut self,
        entity: &'static str,
        mut builder: QueryBuilder<'static, Postgres>,
    ) -> StoreResult<Vec<PgRow>> {
        let query = builder.build();
        let result = match self.transaction.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        };
        result.map_err(|e| map_sqlx(entity, e))
    }

    async fn fetch_one(
        &mut self,
        entity: &'static str,
        mut builder: QueryBuilder<'static, Postgres>,
    ) -> StoreResult<PgRow> {
        let query = builder.build();
        let result = match self.transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await,
            None => query.fetch_one(&self.pool).await,
        };
        result.map_err(|e| map_sqlx(entity, e))
    }

    async fn execute(
        &mut self,
        entity: &'static str,
        mut builder: QueryBuilder<'static, Postgres>,
    ) -> StoreResult<u64> {
        let query = builder.build();
        let result = match self.transaction.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        };
        result
            .map(|done| done.rows_affected())
            .map_err(|e| map_sqlx(entity, e))
    }
}

impl<K: EntityKey> std::fmt::Debug for PostgresSession<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSession")
            .field("in_transaction", &self.transaction.is_some())
            .finish()
    }
}

fn conflict<E: Entity>(id: &E::Key) -> StoreError {
    StoreError::conflict(E::NAME, id.format_key())
}

#[async_trait]
impl<E> EntitySet<E> for PostgresSession<E::Key>
where
    E: PgEntity,
{
    async fn count(&mut self, query: &Query<E>) -> StoreResult<u64> {
        let row = self.fetch_one(E::NAME, statement::count(query)).await?;
        let count: i64 = row.try_get(0).map_err(|e| map_sqlx(E::NAME, e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch(&mut self, query: &Query<E>) -> StoreResult<Vec<E>> {
        let rows = self.fetch_all(E::NAME, statement::select(query)).await?;
        rows.iter().map(E::from_row).collect()
    }

    async fn insert(&mut self, entity: &mut E) -> StoreResult<()> {
        let row = self.fetch_one(E::NAME, statement::insert(&*entity)).await?;
        let id = read_key::<E>(&row, "id")?
            .ok_or_else(|| StoreError::storage(format!("{} insert returned no identifier", E::NAME)))?;
        entity.assign_id(id);
        Ok(())
    }

    async fn update(&mut self, entity: &E, expected_token: Option<&str>) -> StoreResult<()> {
        let id = entity
            .id()
            .cloned()
            .ok_or_else(|| StoreError::invalid_argument("entity", "the entity has no identifier"))?;

        let affected = self
            .execute(E::NAME, statement::update(entity, &id, expected_token))
            .await?;
        if affected == 0 {
            return Err(conflict::<E>(&id));
        }
        Ok(())
    }

    async fn delete(&mut self, id: &E::Key, expected_token: Option<&str>) -> StoreResult<()> {
        let affected = self
            .execute(E::NAME, statement::delete::<E>(id, expected_token))
            .await?;
        if affected == 0 {
            return Err(conflict::<E>(id));
        }
        Ok(())
    }

    async fn delete_where(&mut self, query: &Query<E>) -> StoreResult<u64> {
        self.execute(E::NAME, statement::delete_where(query)).await
    }
}

#[async_trait]
impl<K: EntityKey> Transactional for PostgresSession<K> {
    async fn begin(&mut self, isolation: IsolationLevel) -> StoreResult<()> {
        if self.transaction.is_some() {
            return Err(StoreError::storage("a transaction is already open"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx(TRANSACTION, e))?;
        let statement = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        sqlx_core::query::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx(TRANSACTION, e))?;

        self.transaction = Some(tx);
        debug!(isolation = isolation.as_sql(), "Began PostgreSQL transaction");
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::storage("no transaction is open"))?;
        tx.commit().await.map_err(|e| map_sqlx(TRANSACTION, e))?;
        debug!("Committed PostgreSQL transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::storage("no transaction is open"))?;
        tx.rollback().await.map_err(|e| map_sqlx(TRANSACTION, e))?;
        debug!("Rolled back PostgreSQL transaction");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Drops the transaction; sqlx queues the rollback on its connection
    /// before the connection returns to the pool.
    fn abandon(&mut self) {
        if self.transaction.take().is_some() {
            debug!("Abandoned PostgreSQL transaction");
        }
    }
}

/// Opens [`PostgresSession`]s on a shared pool.
pub struct PostgresSessionFactory<K: EntityKey> {
    pool: PgPool,
    _key: PhantomData<fn() -> K>,
}

impl<K: EntityKey> PostgresSessionFactory<K> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _key: PhantomData,
        }
    }

    /// Creates the pool from `config` and, if enabled, the tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database is
    /// unreachable or the schema cannot be created.
    #[instrument(skip_all)]
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let pool = create_pool(config).await?;
        if config.create_schema {
            ensure_schema(&pool, K::KIND).await?;
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl<K: EntityKey> Clone for PostgresSessionFactory<K> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<K: EntityKey> std::fmt::Debug for PostgresSessionFactory<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSessionFactory")
            .field("key_kind", &K::KIND)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<K: EntityKey> SessionFactory for PostgresSessionFactory<K> {
    type Key = K;
    type Session = PostgresSession<K>;

    async fn open_session(&self) -> StoreResult<PostgresSession<K>> {
        Ok(PostgresSession::new(self.pool.clone()))
    }
}
