//! Application store.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{BoxError, StoreError, StoreResult};
use crate::projection::{self, JsonWebKeySet, LocalizedMap, PropertyMap, StringList, StringMap};
use crate::query::Query;
use crate::sequence::Sequence;
use crate::session::{IsolationLevel, SessionFactory};
use crate::storage::repository::{Repository, StoreContext, require_persisted, require_text};
use crate::types::{
    Application, ApplicationFilter, Authorization, AuthorizationFilter, Token, TokenFilter,
};

/// Store of OAuth client applications.
///
/// Deleting an application removes its authorizations (with their tokens)
/// and its loose tokens in the same serializable transaction.
pub struct ApplicationStore<F: SessionFactory> {
    repo: Repository<F, Application<F::Key>>,
}

impl<F: SessionFactory> ApplicationStore<F> {
    pub fn new(context: Arc<StoreContext<F>>) -> Self {
        Self {
            repo: Repository::new(context),
        }
    }

    /// Replaces the hook used by [`Self::instantiate`].
    #[must_use]
    pub fn with_instantiator<I>(mut self, instantiator: I) -> Self
    where
        I: Fn() -> Result<Application<F::Key>, BoxError> + Send + Sync + 'static,
    {
        self.repo.set_instantiator(Arc::new(instantiator));
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn count(&self) -> StoreResult<u64> {
        self.repo.count(Query::new()).await
    }

    pub async fn count_where(&self, query: Query<Application<F::Key>>) -> StoreResult<u64> {
        self.repo.count(query).await
    }

    /// Finds an application by its identifier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if the identifier is empty or
    /// malformed.
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Application<F::Key>>> {
        self.repo.find_by_id(id).await
    }

    /// Finds an application by its client identifier.
    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> StoreResult<Option<Application<F::Key>>> {
        let client_id = require_text("client_id", client_id)?;
        self.repo
            .first(Query::new().filter(ApplicationFilter::ClientId(client_id.to_string())))
            .await
    }

    /// Finds the applications allowed to redirect to `uri`.
    ///
    /// The raw column is pre-filtered by substring; only exact members of
    /// the parsed URI list are returned.
    pub fn find_by_redirect_uri(&self, uri: &str) -> StoreResult<Sequence<'_, Application<F::Key>>> {
        let uri = require_text("uri", uri)?.to_string();
        let query = Query::new().filter(ApplicationFilter::RedirectUrisContain(uri.clone()));
        Ok(self.repo.filtered(query, move |application| {
            Ok(self.get_redirect_uris(application)?.contains(&uri))
        }))
    }

    /// Finds the applications allowed to redirect to `uri` after logout.
    pub fn find_by_post_logout_redirect_uri(
        &self,
        uri: &str,
    ) -> StoreResult<Sequence<'_, Application<F::Key>>> {
        let uri = require_text("uri", uri)?.to_string();
        let query =
            Query::new().filter(ApplicationFilter::PostLogoutRedirectUrisContain(uri.clone()));
        Ok(self.repo.filtered(query, move |application| {
            Ok(self
                .get_post_logout_redirect_uris(application)?
                .contains(&uri))
        }))
    }

    /// Returns the first application of a caller-refined query.
    pub async fn get<S, Q>(&self, query: Q, state: &S) -> StoreResult<Option<Application<F::Key>>>
    where
        Q: FnOnce(Query<Application<F::Key>>, &S) -> Query<Application<F::Key>>,
    {
        self.repo.get(query, state).await
    }

    /// Lists applications ordered by identifier.
    pub fn list(&self, count: Option<u64>, offset: Option<u64>) -> Sequence<'_, Application<F::Key>> {
        self.repo.list(count, offset)
    }

    /// Lists the applications of a caller-refined query.
    pub fn list_with<'a, S, Q>(&'a self, query: Q, state: S) -> Sequence<'a, Application<F::Key>>
    where
        S: Send + Sync + 'a,
        Q: Fn(Query<Application<F::Key>>, &S) -> Query<Application<F::Key>> + Send + Sync + 'a,
    {
        self.repo.list_with(query, state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Builds a new application through the instantiation hook.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Instantiation` if the hook fails.
    pub fn instantiate(&self) -> StoreResult<Application<F::Key>> {
        self.repo.instantiate()
    }

    /// Persists a new application. Its identifier is set on return.
    pub async fn create(&self, application: &mut Application<F::Key>) -> StoreResult<()> {
        self.repo.create(application).await
    }

    /// Persists changes to an application.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the application was changed or
    /// deleted since it was loaded.
    pub async fn update(&self, application: &mut Application<F::Key>) -> StoreResult<()> {
        self.repo.update(application).await
    }

    /// Deletes an application with its authorizations and tokens.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the application was changed or
    /// deleted since it was loaded.
    #[instrument(skip_all)]
    pub async fn delete(&self, application: &Application<F::Key>) -> StoreResult<()> {
        let id = require_persisted(application)?.clone();

        let mut session = self.repo.session().await?;
        session.begin(IsolationLevel::Serializable).await?;

        let result: StoreResult<_> = async {
            let authorizations = session
                .fetch(&Query::<Authorization<F::Key>>::new().filter(
                    AuthorizationFilter::ApplicationId(id.clone()),
                ))
                .await?;

            for authorization in &authorizations {
                if let Some(authorization_id) = authorization.id() {
                    session
                        .delete_where(&Query::<Token<F::Key>>::new().filter(
                            TokenFilter::AuthorizationId(authorization_id.clone()),
                        ))
                        .await?;
                }
                session.delete(authorization).await?;
            }

            let tokens = session
                .delete_where(
                    &Query::<Token<F::Key>>::new()
                        .filter(TokenFilter::ApplicationId(id.clone()))
                        .filter(TokenFilter::WithoutAuthorization),
                )
                .await?;

            session.delete(application).await?;
            Ok((authorizations.len(), tokens))
        }
        .await;

        let (authorizations, tokens) = session
            .complete(result)
            .await
            .map_err(StoreError::into_concurrency)?;
        debug!(authorizations, tokens, "Deleted application with dependents");
        Ok(())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn get_id(&self, application: &Application<F::Key>) -> Option<String> {
        self.repo.get_id(application)
    }

    pub fn get_display_names(
        &self,
        application: &Application<F::Key>,
    ) -> StoreResult<Arc<LocalizedMap>> {
        self.repo.cache().localized(application.display_names.as_deref())
    }

    pub fn set_display_names(
        &self,
        application: &mut Application<F::Key>,
        names: &LocalizedMap,
    ) -> StoreResult<()> {
        application.display_names = projection::encode(names)?;
        Ok(())
    }

    pub fn get_permissions(&self, application: &Application<F::Key>) -> StoreResult<Arc<StringList>> {
        self.repo.cache().strings(application.permissions.as_deref())
    }

    pub fn set_permissions(
        &self,
        application: &mut Application<F::Key>,
        permissions: &[String],
    ) -> StoreResult<()> {
        application.permissions = projection::encode(&permissions.to_vec())?;
        Ok(())
    }

    pub fn get_redirect_uris(
        &self,
        application: &Application<F::Key>,
    ) -> StoreResult<Arc<StringList>> {
        self.repo.cache().strings(application.redirect_uris.as_deref())
    }

    pub fn set_redirect_uris(
        &self,
        application: &mut Application<F::Key>,
        uris: &[String],
    ) -> StoreResult<()> {
        application.redirect_uris = projection::encode(&uris.to_vec())?;
        Ok(())
    }

    pub fn get_post_logout_redirect_uris(
        &self,
        application: &Application<F::Key>,
    ) -> StoreResult<Arc<StringList>> {
        self.repo
            .cache()
            .strings(application.post_logout_redirect_uris.as_deref())
    }

    pub fn set_post_logout_redirect_uris(
        &self,
        application: &mut Application<F::Key>,
        uris: &[String],
    ) -> StoreResult<()> {
        application.post_logout_redirect_uris = projection::encode(&uris.to_vec())?;
        Ok(())
    }

    pub fn get_requirements(
        &self,
        application: &Application<F::Key>,
    ) -> StoreResult<Arc<StringList>> {
        self.repo.cache().strings(application.requirements.as_deref())
    }

    pub fn set_requirements(
        &self,
        application: &mut Application<F::Key>,
        requirements: &[String],
    ) -> StoreResult<()> {
        application.requirements = projection::encode(&requirements.to_vec())?;
        Ok(())
    }

    pub fn get_settings(&self, application: &Application<F::Key>) -> StoreResult<Arc<StringMap>> {
        self.repo.cache().map(application.settings.as_deref())
    }

    pub fn set_settings(
        &self,
        application: &mut Application<F::Key>,
        settings: &StringMap,
    ) -> StoreResult<()> {
        application.settings = projection::encode(settings)?;
        Ok(())
    }

    pub fn get_json_web_key_set(
        &self,
        application: &Application<F::Key>,
    ) -> StoreResult<Arc<JsonWebKeySet>> {
        self.repo.cache().key_set(application.json_web_key_set.as_deref())
    }

    pub fn set_json_web_key_set(
        &self,
        application: &mut Application<F::Key>,
        key_set: &JsonWebKeySet,
    ) -> StoreResult<()> {
        application.json_web_key_set = projection::encode(key_set)?;
        Ok(())
    }

    pub fn get_properties(&self, application: &Application<F::Key>) -> StoreResult<Arc<PropertyMap>> {
        self.repo.cache().properties(application.properties.as_deref())
    }

    pub fn set_properties(
        &self,
        application: &mut Application<F::Key>,
        properties: &PropertyMap,
    ) -> StoreResult<()> {
        application.properties = projection::encode(properties)?;
        Ok(())
    }
}
