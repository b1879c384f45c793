//! Authorization store.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::{BoxError, StoreError, StoreResult};
use crate::key;
use crate::projection::{self, PropertyMap, StringList};
use crate::query::Query;
use crate::sequence::Sequence;
use crate::session::{IsolationLevel, SessionFactory};
use crate::storage::repository::{
    Repository, StoreContext, optional_key, require_persisted, require_text,
};
use crate::types::{
    Authorization, AuthorizationFilter, Token, TokenFilter, authorization_types, statuses,
};

/// Store of authorizations.
pub struct AuthorizationStore<F: SessionFactory> {
    repo: Repository<F, Authorization<F::Key>>,
}

impl<F: SessionFactory> AuthorizationStore<F> {
    pub fn new(context: Arc<StoreContext<F>>) -> Self {
        Self {
            repo: Repository::new(context),
        }
    }

    /// Replaces the hook used by [`Self::instantiate`].
    #[must_use]
    pub fn with_instantiator<I>(mut self, instantiator: I) -> Self
    where
        I: Fn() -> Result<Authorization<F::Key>, BoxError> + Send + Sync + 'static,
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

    pub async fn count_where(&self, query: Query<Authorization<F::Key>>) -> StoreResult<u64> {
        self.repo.count(query).await
    }

    /// Finds the authorizations matching every supplied criterion.
    ///
    /// When `scopes` is given, only authorizations granting all of them are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if `client` is malformed.
    pub fn find(
        &self,
        subject: Option<&str>,
        client: Option<&str>,
        status: Option<&str>,
        authorization_type: Option<&str>,
        scopes: Option<&[String]>,
    ) -> StoreResult<Sequence<'_, Authorization<F::Key>>> {
        let query = criteria(subject, optional_key(client)?, status, authorization_type);

        let Some(scopes) = scopes.filter(|scopes| !scopes.is_empty()) else {
            return Ok(self.repo.sequence(query));
        };

        let requested = scopes.to_vec();
        Ok(self.repo.filtered(query, move |authorization| {
            let granted = self.get_scopes(authorization)?;
            Ok(requested.iter().all(|scope| granted.contains(scope)))
        }))
    }

    /// Finds the authorizations of an application.
    pub fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> StoreResult<Sequence<'_, Authorization<F::Key>>> {
        let application_id = key::require_identifier::<F::Key>("application_id", application_id)?;
        Ok(self.repo.sequence(
            Query::new().filter(AuthorizationFilter::ApplicationId(application_id)),
        ))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Authorization<F::Key>>> {
        self.repo.find_by_id(id).await
    }

    /// Finds the authorizations granted by a subject.
    pub fn find_by_subject(&self, subject: &str) -> StoreResult<Sequence<'_, Authorization<F::Key>>> {
        let subject = require_text("subject", subject)?;
        Ok(self
            .repo
            .sequence(Query::new().filter(AuthorizationFilter::Subject(subject.to_string()))))
    }

    pub async fn get<S, Q>(&self, query: Q, state: &S) -> StoreResult<Option<Authorization<F::Key>>>
    where
        Q: FnOnce(Query<Authorization<F::Key>>, &S) -> Query<Authorization<F::Key>>,
    {
        self.repo.get(query, state).await
    }

    pub fn list(&self, count: Option<u64>, offset: Option<u64>) -> Sequence<'_, Authorization<F::Key>> {
        self.repo.list(count, offset)
    }

    pub fn list_with<'a, S, Q>(&'a self, query: Q, state: S) -> Sequence<'a, Authorization<F::Key>>
    where
        S: Send + Sync + 'a,
        Q: Fn(Query<Authorization<F::Key>>, &S) -> Query<Authorization<F::Key>>
            + Send
            + Sync
            + 'a,
    {
        self.repo.list_with(query, state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn instantiate(&self) -> StoreResult<Authorization<F::Key>> {
        self.repo.instantiate()
    }

    pub async fn create(&self, authorization: &mut Authorization<F::Key>) -> StoreResult<()> {
        self.repo.create(authorization).await
    }

    /// Persists changes to an authorization.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the authorization was changed or
    /// deleted since it was loaded.
    pub async fn update(&self, authorization: &mut Authorization<F::Key>) -> StoreResult<()> {
        self.repo.update(authorization).await
    }

    /// Deletes an authorization and its tokens in one serializable
    /// transaction.
    #[instrument(skip_all)]
    pub async fn delete(&self, authorization: &Authorization<F::Key>) -> StoreResult<()> {
        let id = require_persisted(authorization)?.clone();

        let mut session = self.repo.session().await?;
        session.begin(IsolationLevel::Serializable).await?;

        let result: StoreResult<_> = async {
            let tokens = session
                .delete_where(
                    &Query::<Token<F::Key>>::new().filter(TokenFilter::AuthorizationId(id)),
                )
                .await?;
            session.delete(authorization).await?;
            Ok(tokens)
        }
        .await;

        let tokens = session
            .complete(result)
            .await
            .map_err(StoreError::into_concurrency)?;
        debug!(tokens, "Deleted authorization with its tokens");
        Ok(())
    }

    /// Removes stale authorizations created before `threshold`.
    ///
    /// An authorization is stale when it is no longer valid or is ad-hoc,
    /// and at least one token references it. Its tokens are removed first.
    /// Returns the number of authorizations deleted.
    #[instrument(skip(self))]
    pub async fn prune(&self, threshold: OffsetDateTime) -> StoreResult<u64> {
        let query: Query<Authorization<F::Key>> = Query::new()
            .filter(AuthorizationFilter::CreatedBefore(threshold))
            .filter(AuthorizationFilter::Any(vec![
                AuthorizationFilter::StatusNot(statuses::VALID.to_string()),
                AuthorizationFilter::Type(authorization_types::AD_HOC.to_string()),
            ]))
            .filter(AuthorizationFilter::HasTokens);

        let mut session = self.repo.session().await?;
        session.begin(IsolationLevel::RepeatableRead).await?;

        let result: StoreResult<u64> = async {
            let stale = session.fetch(&query).await?;
            for authorization in &stale {
                if let Some(id) = authorization.id() {
                    session
                        .delete_where(
                            &Query::<Token<F::Key>>::new()
                                .filter(TokenFilter::AuthorizationId(id.clone())),
                        )
                        .await?;
                }
                session.delete(authorization).await?;
            }
            Ok(stale.len() as u64)
        }
        .await;

        let pruned = session
            .complete(result)
            .await
            .map_err(StoreError::into_concurrency)?;
        debug!(pruned, "Pruned authorizations");
        Ok(pruned)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revokes the authorizations matching every supplied criterion.
    ///
    /// Each authorization is updated individually. Returns the number
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Aggregate` carrying every per-item failure and
    /// the success count if any update failed.
    pub async fn revoke(
        &self,
        subject: Option<&str>,
        client: Option<&str>,
        status: Option<&str>,
        authorization_type: Option<&str>,
    ) -> StoreResult<u64> {
        let query = criteria(subject, optional_key(client)?, status, authorization_type);
        self.revoke_where(query).await
    }

    pub async fn revoke_by_application_id(&self, application_id: &str) -> StoreResult<u64> {
        let application_id = key::require_identifier::<F::Key>("application_id", application_id)?;
        self.revoke_where(Query::new().filter(AuthorizationFilter::ApplicationId(application_id)))
            .await
    }

    pub async fn revoke_by_subject(&self, subject: &str) -> StoreResult<u64> {
        let subject = require_text("subject", subject)?;
        self.revoke_where(Query::new().filter(AuthorizationFilter::Subject(subject.to_string())))
            .await
    }

    async fn revoke_where(&self, query: Query<Authorization<F::Key>>) -> StoreResult<u64> {
        self.repo
            .update_each(query, |authorization| {
                authorization.status = Some(statuses::REVOKED.to_string());
            })
            .await
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn get_id(&self, authorization: &Authorization<F::Key>) -> Option<String> {
        self.repo.get_id(authorization)
    }

    pub fn get_application_id(&self, authorization: &Authorization<F::Key>) -> Option<String> {
        key::convert_identifier_to_string(authorization.application_id.as_ref())
    }

    /// Sets the owning application from its boundary identifier.
    ///
    /// An absent or empty identifier detaches the authorization.
    pub fn set_application_id(
        &self,
        authorization: &mut Authorization<F::Key>,
        application_id: Option<&str>,
    ) -> StoreResult<()> {
        authorization.application_id = optional_key(application_id)?;
        Ok(())
    }

    pub fn get_scopes(&self, authorization: &Authorization<F::Key>) -> StoreResult<Arc<StringList>> {
        self.repo.cache().strings(authorization.scopes.as_deref())
    }

    pub fn set_scopes(
        &self,
        authorization: &mut Authorization<F::Key>,
        scopes: &[String],
    ) -> StoreResult<()> {
        authorization.scopes = projection::encode(&scopes.to_vec())?;
        Ok(())
    }

    pub fn get_properties(
        &self,
        authorization: &Authorization<F::Key>,
    ) -> StoreResult<Arc<PropertyMap>> {
        self.repo.cache().properties(authorization.properties.as_deref())
    }

    pub fn set_properties(
        &self,
        authorization: &mut Authorization<F::Key>,
        properties: &PropertyMap,
    ) -> StoreResult<()> {
        authorization.properties = projection::encode(properties)?;
        Ok(())
    }
}

fn criteria<K: crate::key::EntityKey>(
    subject: Option<&str>,
    client: Option<K>,
    status: Option<&str>,
    authorization_type: Option<&str>,
) -> Query<Authorization<K>> {
    Query::new()
        .filter_opt(subject, |s| AuthorizationFilter::Subject(s.to_string()))
        .filter_opt(client, AuthorizationFilter::ApplicationId)
        .filter_opt(status, |s| AuthorizationFilter::Status(s.to_string()))
        .filter_opt(authorization_type, |t| AuthorizationFilter::Type(t.to_string()))
}
