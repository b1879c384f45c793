//! Session contracts and the per-scope session provider.
//!
//! A session is the unit of work the stores issue their statements
//! against. Backends implement [`EntitySet`] for each entity kind and
//! [`Transactional`] for transaction control; a [`SessionFactory`] opens new
//! sessions.
//!
//! The [`SessionProvider`] hands out one session per operation scope. The
//! session is opened lazily from the configured factory and guarded by an
//! async mutex so that two operations never use it concurrently. Every
//! interaction checks the scope's cancellation token before issuing I/O.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::key::EntityKey;
use crate::query::Query;
use crate::types::{Application, Authorization, Entity, Scope, Token};

/// Transaction isolation levels used by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL spelling of the level.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

// =============================================================================
// Backend Contracts
// =============================================================================

/// Statements a session can issue against one entity kind.
#[async_trait]
pub trait EntitySet<E: Entity>: Send {
    /// Counts the entities matching the query filters.
    async fn count(&mut self, query: &Query<E>) -> StoreResult<u64>;

    /// Loads the entities matching the query, ordered by identifier.
    async fn fetch(&mut self, query: &Query<E>) -> StoreResult<Vec<E>>;

    /// Inserts the entity and records the identifier assigned by storage.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` on a unique constraint violation.
    async fn insert(&mut self, entity: &mut E) -> StoreResult<()>;

    /// Persists the entity if the stored concurrency token still equals
    /// `expected_token`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the row is missing or its token
    /// differs.
    async fn update(&mut self, entity: &E, expected_token: Option<&str>) -> StoreResult<()>;

    /// Deletes the entity if the stored concurrency token still equals
    /// `expected_token`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the row is missing or its token
    /// differs.
    async fn delete(&mut self, id: &E::Key, expected_token: Option<&str>) -> StoreResult<()>;

    /// Deletes every entity matching the query filters.
    async fn delete_where(&mut self, query: &Query<E>) -> StoreResult<u64>;
}

/// Transaction control of a session.
#[async_trait]
pub trait Transactional: Send {
    /// Starts a transaction. Statements issued until commit or rollback run
    /// inside it.
    async fn begin(&mut self, isolation: IsolationLevel) -> StoreResult<()>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> StoreResult<()>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Discards the open transaction without waiting on the backend.
    ///
    /// Called when the operation that began the transaction is dropped
    /// before completing it. Must leave the session usable, release
    /// whatever the transaction holds and do nothing when no transaction is
    /// open.
    fn abandon(&mut self);
}

/// A unit of work spanning the four entity kinds.
///
/// Implemented for every transactional type that can persist all four
/// entity kinds with the same key type.
pub trait Session<K: EntityKey>:
    Transactional
    + EntitySet<Application<K>>
    + EntitySet<Authorization<K>>
    + EntitySet<Scope<K>>
    + EntitySet<Token<K>>
{
}

impl<K, T> Session<K> for T
where
    K: EntityKey,
    T: Transactional
        + EntitySet<Application<K>>
        + EntitySet<Authorization<K>>
        + EntitySet<Scope<K>>
        + EntitySet<Token<K>>,
{
}

/// Opens sessions for one key type.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// Key type of the entities the sessions persist.
    type Key: EntityKey;

    /// Session type opened by the factory.
    type Session: Session<Self::Key> + 'static;

    /// Opens a new session.
    async fn open_session(&self) -> StoreResult<Self::Session>;
}

// =============================================================================
// Session Provider
// =============================================================================

/// Externally provided session settings.
pub struct SessionOptions<F: SessionFactory> {
    /// Factory used to open the scope's session on first use.
    pub factory: Option<Arc<F>>,
}

impl<F: SessionFactory> SessionOptions<F> {
    /// Options without a factory.
    #[must_use]
    pub fn new() -> Self {
        Self { factory: None }
    }

    /// Sets the session factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<F>) -> Self {
        self.factory = Some(factory);
        self
    }
}

impl<F: SessionFactory> Default for SessionOptions<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: SessionFactory> Clone for SessionOptions<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

/// Supplies the session of one operation scope.
pub struct SessionProvider<F: SessionFactory> {
    factory: Option<Arc<F>>,
    session: OnceCell<Mutex<F::Session>>,
    cancellation: CancellationToken,
}

impl<F: SessionFactory> SessionProvider<F> {
    /// Creates a provider that opens its session from the configured factory.
    pub fn new(options: SessionOptions<F>) -> Self {
        Self {
            factory: options.factory,
            session: OnceCell::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Creates a provider around an already opened session.
    pub fn with_session(session: F::Session) -> Self {
        Self {
            factory: None,
            session: OnceCell::new_with(Some(Mutex::new(session))),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the scope's cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The scope's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the scope's session, opening it on first use.
    ///
    /// Repeated calls return the same session. The returned guard holds the
    /// session exclusively until dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cancelled` if the scope was cancelled and
    /// `StoreError::Configuration` if neither a session nor a factory is
    /// configured.
    pub async fn session(&self) -> StoreResult<ScopedSession<'_, F::Session>> {
        if self.cancellation.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let cell = self
            .session
            .get_or_try_init(|| async {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    StoreError::configuration(
                        "no session is available for the current scope and no session factory \
                         was configured",
                    )
                })?;
                let session = factory.open_session().await?;
                debug!("Opened store session");
                Ok::<_, StoreError>(Mutex::new(session))
            })
            .await?;

        Ok(ScopedSession {
            guard: cell.lock().await,
            cancellation: &self.cancellation,
            abandon: None,
        })
    }
}

impl<F: SessionFactory> std::fmt::Debug for SessionProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("has_factory", &self.factory.is_some())
            .field("opened", &self.session.initialized())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Exclusive access to the scope's session.
///
/// Every statement checks the cancellation token first and fails with
/// `StoreError::Cancelled` without touching the backend once it fired.
/// Commit is never interrupted.
///
/// A transaction begun through this handle ends with it: dropping the
/// handle before [`ScopedSession::complete`] rolls the transaction back.
pub struct ScopedSession<'a, S> {
    guard: MutexGuard<'a, S>,
    cancellation: &'a CancellationToken,
    abandon: Option<fn(&mut S)>,
}

impl<'a, S: Send> ScopedSession<'a, S> {
    fn check(&self) -> StoreResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    pub async fn count<E: Entity>(&mut self, query: &Query<E>) -> StoreResult<u64>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        EntitySet::<E>::count(&mut *self.guard, query).await
    }

    pub async fn fetch<E: Entity>(&mut self, query: &Query<E>) -> StoreResult<Vec<E>>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        EntitySet::<E>::fetch(&mut *self.guard, query).await
    }

    /// Loads the first entity matching the query.
    pub async fn first<E: Entity>(&mut self, query: Query<E>) -> StoreResult<Option<E>>
    where
        S: EntitySet<E>,
    {
        let query = query.limit(1);
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    pub async fn insert<E: Entity>(&mut self, entity: &mut E) -> StoreResult<()>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        EntitySet::<E>::insert(&mut *self.guard, entity).await
    }

    pub async fn update<E: Entity>(
        &mut self,
        entity: &E,
        expected_token: Option<&str>,
    ) -> StoreResult<()>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        EntitySet::<E>::update(&mut *self.guard, entity, expected_token).await
    }

    /// Deletes a persisted entity, guarded by its current concurrency token.
    pub async fn delete<E: Entity>(&mut self, entity: &E) -> StoreResult<()>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        let id = entity
            .id()
            .ok_or_else(|| StoreError::invalid_argument("entity", "the entity was never persisted"))?;
        EntitySet::<E>::delete(&mut *self.guard, id, entity.concurrency_token()).await
    }

    pub async fn delete_where<E: Entity>(&mut self, query: &Query<E>) -> StoreResult<u64>
    where
        S: EntitySet<E>,
    {
        self.check()?;
        EntitySet::<E>::delete_where(&mut *self.guard, query).await
    }

    /// Starts a transaction.
    pub async fn begin(&mut self, isolation: IsolationLevel) -> StoreResult<()>
    where
        S: Transactional,
    {
        self.check()?;
        self.guard.begin(isolation).await?;
        self.abandon = Some(<S as Transactional>::abandon);
        Ok(())
    }

    pub fn in_transaction(&self) -> bool
    where
        S: Transactional,
    {
        self.guard.in_transaction()
    }

    /// Commits on success and rolls back on failure.
    ///
    /// Rollback failures are logged; the original error is returned.
    pub async fn complete<T>(&mut self, result: StoreResult<T>) -> StoreResult<T>
    where
        S: Transactional,
    {
        let completed = match result {
            Ok(value) => self.guard.commit().await.map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = self.guard.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back store transaction");
                }
                Err(err)
            }
        };
        self.abandon = None;
        completed
    }
}

impl<S> Drop for ScopedSession<'_, S> {
    fn drop(&mut self) {
        if let Some(abandon) = self.abandon.take() {
            warn!("Store operation dropped inside a transaction; rolling back");
            abandon(&mut *self.guard);
        }
    }
}

impl<S> std::fmt::Debug for ScopedSession<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
