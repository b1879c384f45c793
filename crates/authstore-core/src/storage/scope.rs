//! Scope store.

use std::sync::Arc;

use crate::error::{BoxError, StoreError, StoreResult};
use crate::projection::{self, LocalizedMap, PropertyMap, StringList};
use crate::query::Query;
use crate::sequence::Sequence;
use crate::session::SessionFactory;
use crate::storage::repository::{Repository, StoreContext, require_text};
use crate::types::{Scope, ScopeFilter};

/// Store of scopes.
pub struct ScopeStore<F: SessionFactory> {
    repo: Repository<F, Scope<F::Key>>,
}

impl<F: SessionFactory> ScopeStore<F> {
    pub fn new(context: Arc<StoreContext<F>>) -> Self {
        Self {
            repo: Repository::new(context),
        }
    }

    /// Replaces the hook used by [`Self::instantiate`].
    #[must_use]
    pub fn with_instantiator<I>(mut self, instantiator: I) -> Self
    where
        I: Fn() -> Result<Scope<F::Key>, BoxError> + Send + Sync + 'static,
    {
        self.repo.set_instantiator(Arc::new(instantiator));
        self
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.repo.count(Query::new()).await
    }

    pub async fn count_where(&self, query: Query<Scope<F::Key>>) -> StoreResult<u64> {
        self.repo.count(query).await
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Scope<F::Key>>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<Scope<F::Key>>> {
        let name = require_text("name", name)?;
        self.repo
            .first(Query::new().filter(ScopeFilter::Name(name.to_string())))
            .await
    }

    /// Finds the scopes whose name is one of `names`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if any name is empty.
    pub fn find_by_names(&self, names: &[String]) -> StoreResult<Sequence<'_, Scope<F::Key>>> {
        if names.iter().any(String::is_empty) {
            return Err(StoreError::invalid_argument(
                "names",
                "scope names cannot be null or empty",
            ));
        }
        Ok(self
            .repo
            .sequence(Query::new().filter(ScopeFilter::NameIn(names.to_vec()))))
    }

    /// Finds the scopes granting access to `resource`.
    ///
    /// Each matching scope is yielded once.
    pub fn find_by_resource(&self, resource: &str) -> StoreResult<Sequence<'_, Scope<F::Key>>> {
        let resource = require_text("resource", resource)?.to_string();
        let query = Query::new().filter(ScopeFilter::ResourcesContain(resource.clone()));
        Ok(self.repo.filtered(query, move |scope| {
            Ok(self.get_resources(scope)?.contains(&resource))
        }))
    }

    pub async fn get<S, Q>(&self, query: Q, state: &S) -> StoreResult<Option<Scope<F::Key>>>
    where
        Q: FnOnce(Query<Scope<F::Key>>, &S) -> Query<Scope<F::Key>>,
    {
        self.repo.get(query, state).await
    }

    pub fn list(&self, count: Option<u64>, offset: Option<u64>) -> Sequence<'_, Scope<F::Key>> {
        self.repo.list(count, offset)
    }

    pub fn list_with<'a, S, Q>(&'a self, query: Q, state: S) -> Sequence<'a, Scope<F::Key>>
    where
        S: Send + Sync + 'a,
        Q: Fn(Query<Scope<F::Key>>, &S) -> Query<Scope<F::Key>> + Send + Sync + 'a,
    {
        self.repo.list_with(query, state)
    }

    pub fn instantiate(&self) -> StoreResult<Scope<F::Key>> {
        self.repo.instantiate()
    }

    pub async fn create(&self, scope: &mut Scope<F::Key>) -> StoreResult<()> {
        self.repo.create(scope).await
    }

    pub async fn update(&self, scope: &mut Scope<F::Key>) -> StoreResult<()> {
        self.repo.update(scope).await
    }

    pub async fn delete(&self, scope: &Scope<F::Key>) -> StoreResult<()> {
        self.repo.delete(scope).await
    }

    pub fn get_id(&self, scope: &Scope<F::Key>) -> Option<String> {
        self.repo.get_id(scope)
    }

    pub fn get_display_names(&self, scope: &Scope<F::Key>) -> StoreResult<Arc<LocalizedMap>> {
        self.repo.cache().localized(scope.display_names.as_deref())
    }

    pub fn set_display_names(&self, scope: &mut Scope<F::Key>, names: &LocalizedMap) -> StoreResult<()> {
        scope.display_names = projection::encode(names)?;
        Ok(())
    }

    pub fn get_descriptions(&self, scope: &Scope<F::Key>) -> StoreResult<Arc<LocalizedMap>> {
        self.repo.cache().localized(scope.descriptions.as_deref())
    }

    pub fn set_descriptions(
        &self,
        scope: &mut Scope<F::Key>,
        descriptions: &LocalizedMap,
    ) -> StoreResult<()> {
        scope.descriptions = projection::encode(descriptions)?;
        Ok(())
    }

    pub fn get_resources(&self, scope: &Scope<F::Key>) -> StoreResult<Arc<StringList>> {
        self.repo.cache().strings(scope.resources.as_deref())
    }

    pub fn set_resources(&self, scope: &mut Scope<F::Key>, resources: &[String]) -> StoreResult<()> {
        scope.resources = projection::encode(&resources.to_vec())?;
        Ok(())
    }

    pub fn get_properties(&self, scope: &Scope<F::Key>) -> StoreResult<Arc<PropertyMap>> {
        self.repo.cache().properties(scope.properties.as_deref())
    }

    pub fn set_properties(&self, scope: &mut Scope<F::Key>, properties: &PropertyMap) -> StoreResult<()> {
        scope.properties = projection::encode(properties)?;
        Ok(())
    }
}
