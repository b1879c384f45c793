//! Operations shared by the four entity stores.

use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, instrument, warn};

use crate::error::{BoxError, StoreError, StoreResult};
use crate::key::{self, EntityKey};
use crate::projection::ProjectionCache;
use crate::query::Query;
use crate::sequence::Sequence;
use crate::session::{EntitySet, ScopedSession, SessionFactory, SessionProvider};
use crate::types::{Entity, new_concurrency_token};

/// Builds a fresh entity before it is populated and created.
pub type Instantiator<E> = Arc<dyn Fn() -> Result<E, BoxError> + Send + Sync>;

/// State shared by the stores of one operation scope.
pub struct StoreContext<F: SessionFactory> {
    provider: SessionProvider<F>,
    cache: Arc<ProjectionCache>,
}

impl<F: SessionFactory> StoreContext<F> {
    pub fn new(provider: SessionProvider<F>, cache: Arc<ProjectionCache>) -> Self {
        Self { provider, cache }
    }

    pub fn provider(&self) -> &SessionProvider<F> {
        &self.provider
    }

    pub fn cache(&self) -> &ProjectionCache {
        &self.cache
    }
}

/// Generic CRUD surface over one entity kind.
pub(crate) struct Repository<F: SessionFactory, E: Entity> {
    context: Arc<StoreContext<F>>,
    instantiator: Instantiator<E>,
}

impl<F, E> Repository<F, E>
where
    F: SessionFactory,
    E: Entity<Key = F::Key>,
    F::Session: EntitySet<E>,
{
    pub(crate) fn new(context: Arc<StoreContext<F>>) -> Self {
        Self {
            context,
            instantiator: Arc::new(|| Ok(E::default())),
        }
    }

    pub(crate) fn set_instantiator(&mut self, instantiator: Instantiator<E>) {
        self.instantiator = instantiator;
    }

    pub(crate) fn cache(&self) -> &ProjectionCache {
        self.context.cache()
    }

    pub(crate) async fn session(&self) -> StoreResult<ScopedSession<'_, F::Session>> {
        self.context.provider().session().await
    }

    pub(crate) async fn count(&self, query: Query<E>) -> StoreResult<u64> {
        self.session().await?.count(&query).await
    }

    #[instrument(skip_all, fields(entity = E::NAME))]
    pub(crate) async fn create(&self, entity: &mut E) -> StoreResult<()> {
        if entity.concurrency_token().is_none() {
            entity.set_concurrency_token(Some(new_concurrency_token()));
        }
        self.session().await?.insert(entity).await
    }

    /// Re-stamps the concurrency token and persists the entity.
    ///
    /// The previous token is restored if the write fails.
    #[instrument(skip_all, fields(entity = E::NAME))]
    pub(crate) async fn update(&self, entity: &mut E) -> StoreResult<()> {
        let previous = entity.concurrency_token().map(str::to_owned);
        entity.set_concurrency_token(Some(new_concurrency_token()));

        let result = match self.session().await {
            Ok(mut session) => session.update(&*entity, previous.as_deref()).await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            entity.set_concurrency_token(previous);
            return Err(err.into_concurrency());
        }
        Ok(())
    }

    /// Deletes an entity that has no dependents.
    #[instrument(skip_all, fields(entity = E::NAME))]
    pub(crate) async fn delete(&self, entity: &E) -> StoreResult<()> {
        require_persisted(entity)?;
        self.session()
            .await?
            .delete(entity)
            .await
            .map_err(StoreError::into_concurrency)
    }

    pub(crate) async fn find_by_id(&self, id: &str) -> StoreResult<Option<E>> {
        let key = key::require_identifier::<E::Key>("id", id)?;
        self.first(Query::new().filter(E::id_filter(key))).await
    }

    pub(crate) async fn first(&self, query: Query<E>) -> StoreResult<Option<E>> {
        self.session().await?.first(query).await
    }

    pub(crate) async fn get<S, Q>(&self, query: Q, state: &S) -> StoreResult<Option<E>>
    where
        Q: FnOnce(Query<E>, &S) -> Query<E>,
    {
        self.first(query(Query::new(), state)).await
    }

    pub(crate) fn instantiate(&self) -> StoreResult<E> {
        (self.instantiator)().map_err(|source| StoreError::instantiation(E::NAME, source))
    }

    pub(crate) fn list(&self, count: Option<u64>, offset: Option<u64>) -> Sequence<'_, E> {
        let mut query = Query::new();
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        if let Some(count) = count {
            query = query.limit(count);
        }
        self.sequence(query)
    }

    pub(crate) fn list_with<'a, S, Q>(&'a self, query: Q, state: S) -> Sequence<'a, E>
    where
        S: Send + Sync + 'a,
        Q: Fn(Query<E>, &S) -> Query<E> + Send + Sync + 'a,
    {
        Sequence::new(move || {
            let query = query(Query::new(), &state);
            async move { self.session().await?.fetch(&query).await }.boxed()
        })
    }

    /// A sequence re-issuing `query` on every enumeration.
    pub(crate) fn sequence(&self, query: Query<E>) -> Sequence<'_, E> {
        Sequence::new(move || {
            let query = query.clone();
            async move { self.session().await?.fetch(&query).await }.boxed()
        })
    }

    /// A sequence re-issuing `query` and keeping the entities accepted by
    /// `keep`.
    pub(crate) fn filtered<'a, P>(&'a self, query: Query<E>, keep: P) -> Sequence<'a, E>
    where
        P: Fn(&E) -> StoreResult<bool> + Send + Sync + 'a,
    {
        let keep = Arc::new(keep);
        Sequence::new(move || {
            let query = query.clone();
            let keep = Arc::clone(&keep);
            async move {
                let items = self.session().await?.fetch(&query).await?;
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if keep(&item)? {
                        kept.push(item);
                    }
                }
                Ok(kept)
            }
            .boxed()
        })
    }

    /// Loads the matching entities, marks each one and updates them one by
    /// one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Aggregate` with the success count if any update
    /// failed.
    #[instrument(skip_all, fields(entity = E::NAME))]
    pub(crate) async fn update_each<M>(&self, query: Query<E>, mark: M) -> StoreResult<u64>
    where
        M: Fn(&mut E),
    {
        // The session guard must be released before the per-item updates.
        let items = self.session().await?.fetch(&query).await?;

        let mut succeeded = 0_u64;
        let mut errors = Vec::new();
        for mut item in items {
            mark(&mut item);
            match self.update(&mut item).await {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    warn!(entity = E::NAME, error = %err, "Failed to update entity");
                    errors.push(err);
                }
            }
        }

        debug!(entity = E::NAME, succeeded, failed = errors.len(), "Bulk update finished");
        if errors.is_empty() {
            Ok(succeeded)
        } else {
            Err(StoreError::aggregate(succeeded, errors))
        }
    }

    pub(crate) fn get_id(&self, entity: &E) -> Option<String> {
        key::convert_identifier_to_string(entity.id())
    }
}

pub(crate) fn require_persisted<E: Entity>(entity: &E) -> StoreResult<&E::Key> {
    entity
        .id()
        .filter(|id| !id.is_default())
        .ok_or_else(|| StoreError::invalid_argument("entity", "the entity has no identifier"))
}

pub(crate) fn require_text<'a>(name: &'static str, value: &'a str) -> StoreResult<&'a str> {
    if value.is_empty() {
        return Err(StoreError::empty_argument(name));
    }
    Ok(value)
}

/// Parses an optional foreign key given in boundary string form.
pub(crate) fn optional_key<K: EntityKey>(value: Option<&str>) -> StoreResult<Option<K>> {
    key::convert_identifier_from_string(value)
}
