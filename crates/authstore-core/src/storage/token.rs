//! Token store.
//!
//! Besides the shared CRUD surface, the token store offers criteria-based
//! lookups, bulk revocation and pruning of stale tokens.
//!
//! # Revocation
//!
//! Revocation loads the matching tokens, marks each one `revoked` and
//! updates them individually. Failures do not stop the sweep; they are
//! collected and reported together once every token was attempted:
//!
//! ```ignore
//! match store.revoke_by_subject("alice").await {
//!     Ok(revoked) => println!("revoked {revoked} tokens"),
//!     Err(StoreError::Aggregate { succeeded, errors }) => {
//!         println!("revoked {succeeded}, {} failed", errors.len());
//!     }
//!     Err(other) => return Err(other),
//! }
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::{BoxError, StoreError, StoreResult};
use crate::key::{self, EntityKey};
use crate::projection::{self, PropertyMap};
use crate::query::Query;
use crate::sequence::Sequence;
use crate::session::{IsolationLevel, SessionFactory};
use crate::storage::repository::{Repository, StoreContext, optional_key, require_text};
use crate::types::{Token, TokenFilter, statuses};

/// Store of tokens.
pub struct TokenStore<F: SessionFactory> {
    repo: Repository<F, Token<F::Key>>,
}

impl<F: SessionFactory> TokenStore<F> {
    pub fn new(context: Arc<StoreContext<F>>) -> Self {
        Self {
            repo: Repository::new(context),
        }
    }

    /// Replaces the hook used by [`Self::instantiate`].
    #[must_use]
    pub fn with_instantiator<I>(mut self, instantiator: I) -> Self
    where
        I: Fn() -> Result<Token<F::Key>, BoxError> + Send + Sync + 'static,
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

    pub async fn count_where(&self, query: Query<Token<F::Key>>) -> StoreResult<u64> {
        self.repo.count(query).await
    }

    /// Finds the tokens matching every supplied criterion.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if `client` is malformed.
    pub fn find(
        &self,
        subject: Option<&str>,
        client: Option<&str>,
        status: Option<&str>,
        token_type: Option<&str>,
    ) -> StoreResult<Sequence<'_, Token<F::Key>>> {
        let query = criteria(subject, optional_key(client)?, status, token_type);
        Ok(self.repo.sequence(query))
    }

    pub fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> StoreResult<Sequence<'_, Token<F::Key>>> {
        let application_id = key::require_identifier::<F::Key>("application_id", application_id)?;
        Ok(self
            .repo
            .sequence(Query::new().filter(TokenFilter::ApplicationId(application_id))))
    }

    pub fn find_by_authorization_id(
        &self,
        authorization_id: &str,
    ) -> StoreResult<Sequence<'_, Token<F::Key>>> {
        let authorization_id =
            key::require_identifier::<F::Key>("authorization_id", authorization_id)?;
        Ok(self
            .repo
            .sequence(Query::new().filter(TokenFilter::AuthorizationId(authorization_id))))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Token<F::Key>>> {
        self.repo.find_by_id(id).await
    }

    /// Finds a reference token by its opaque reference identifier.
    pub async fn find_by_reference_id(
        &self,
        reference_id: &str,
    ) -> StoreResult<Option<Token<F::Key>>> {
        let reference_id = require_text("reference_id", reference_id)?;
        self.repo
            .first(Query::new().filter(TokenFilter::ReferenceId(reference_id.to_string())))
            .await
    }

    pub fn find_by_subject(&self, subject: &str) -> StoreResult<Sequence<'_, Token<F::Key>>> {
        let subject = require_text("subject", subject)?;
        Ok(self
            .repo
            .sequence(Query::new().filter(TokenFilter::Subject(subject.to_string()))))
    }

    pub async fn get<S, Q>(&self, query: Q, state: &S) -> StoreResult<Option<Token<F::Key>>>
    where
        Q: FnOnce(Query<Token<F::Key>>, &S) -> Query<Token<F::Key>>,
    {
        self.repo.get(query, state).await
    }

    pub fn list(&self, count: Option<u64>, offset: Option<u64>) -> Sequence<'_, Token<F::Key>> {
        self.repo.list(count, offset)
    }

    pub fn list_with<'a, S, Q>(&'a self, query: Q, state: S) -> Sequence<'a, Token<F::Key>>
    where
        S: Send + Sync + 'a,
        Q: Fn(Query<Token<F::Key>>, &S) -> Query<Token<F::Key>> + Send + Sync + 'a,
    {
        self.repo.list_with(query, state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn instantiate(&self) -> StoreResult<Token<F::Key>> {
        self.repo.instantiate()
    }

    pub async fn create(&self, token: &mut Token<F::Key>) -> StoreResult<()> {
        self.repo.create(token).await
    }

    /// Persists changes to a token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the token was changed or deleted
    /// since it was loaded.
    pub async fn update(&self, token: &mut Token<F::Key>) -> StoreResult<()> {
        self.repo.update(token).await
    }

    pub async fn delete(&self, token: &Token<F::Key>) -> StoreResult<()> {
        self.repo.delete(token).await
    }

    /// Removes stale tokens created before `threshold`.
    ///
    /// A token is stale when its status is neither `inactive` nor `valid`,
    /// when its authorization is no longer valid, or when it has expired.
    /// Returns the number of tokens deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the transaction conflicted with
    /// a concurrent writer.
    #[instrument(skip(self))]
    pub async fn prune(&self, threshold: OffsetDateTime) -> StoreResult<u64> {
        let now = OffsetDateTime::now_utc();
        let query: Query<Token<F::Key>> = Query::new()
            .filter(TokenFilter::CreatedBefore(threshold))
            .filter(TokenFilter::Any(vec![
                TokenFilter::StatusNotIn(vec![
                    statuses::INACTIVE.to_string(),
                    statuses::VALID.to_string(),
                ]),
                TokenFilter::AuthorizationStatusNot(statuses::VALID.to_string()),
                TokenFilter::ExpiresBefore(now),
            ]));

        let mut session = self.repo.session().await?;
        session.begin(IsolationLevel::RepeatableRead).await?;
        let result = session.delete_where(&query).await;
        let pruned = session
            .complete(result)
            .await
            .map_err(StoreError::into_concurrency)?;

        debug!(pruned, "Pruned tokens");
        Ok(pruned)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revokes the tokens matching every supplied criterion.
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
        token_type: Option<&str>,
    ) -> StoreResult<u64> {
        let query = criteria(subject, optional_key(client)?, status, token_type);
        self.revoke_where(query).await
    }

    pub async fn revoke_by_application_id(&self, application_id: &str) -> StoreResult<u64> {
        let application_id = key::require_identifier::<F::Key>("application_id", application_id)?;
        self.revoke_where(Query::new().filter(TokenFilter::ApplicationId(application_id)))
            .await
    }

    pub async fn revoke_by_authorization_id(&self, authorization_id: &str) -> StoreResult<u64> {
        let authorization_id =
            key::require_identifier::<F::Key>("authorization_id", authorization_id)?;
        self.revoke_where(Query::new().filter(TokenFilter::AuthorizationId(authorization_id)))
            .await
    }

    pub async fn revoke_by_subject(&self, subject: &str) -> StoreResult<u64> {
        let subject = require_text("subject", subject)?;
        self.revoke_where(Query::new().filter(TokenFilter::Subject(subject.to_string())))
            .await
    }

    async fn revoke_where(&self, query: Query<Token<F::Key>>) -> StoreResult<u64> {
        self.repo
            .update_each(query, |token| {
                token.status = Some(statuses::REVOKED.to_string());
            })
            .await
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn get_id(&self, token: &Token<F::Key>) -> Option<String> {
        self.repo.get_id(token)
    }

    pub fn get_application_id(&self, token: &Token<F::Key>) -> Option<String> {
        key::convert_identifier_to_string(token.application_id.as_ref())
    }

    pub fn set_application_id(
        &self,
        token: &mut Token<F::Key>,
        application_id: Option<&str>,
    ) -> StoreResult<()> {
        token.application_id = optional_key(application_id)?;
        Ok(())
    }

    pub fn get_authorization_id(&self, token: &Token<F::Key>) -> Option<String> {
        key::convert_identifier_to_string(token.authorization_id.as_ref())
    }

    pub fn set_authorization_id(
        &self,
        token: &mut Token<F::Key>,
        authorization_id: Option<&str>,
    ) -> StoreResult<()> {
        token.authorization_id = optional_key(authorization_id)?;
        Ok(())
    }

    pub fn get_properties(&self, token: &Token<F::Key>) -> StoreResult<Arc<PropertyMap>> {
        self.repo.cache().properties(token.properties.as_deref())
    }

    pub fn set_properties(&self, token: &mut Token<F::Key>, properties: &PropertyMap) -> StoreResult<()> {
        token.properties = projection::encode(properties)?;
        Ok(())
    }
}

fn criteria<K: EntityKey>(
    subject: Option<&str>,
    client: Option<K>,
    status: Option<&str>,
    token_type: Option<&str>,
) -> Query<Token<K>> {
    Query::new()
        .filter_opt(subject, |s| TokenFilter::Subject(s.to_string()))
        .filter_opt(client, TokenFilter::ApplicationId)
        .filter_opt(status, |s| TokenFilter::Status(s.to_string()))
        .filter_opt(token_type, |t| TokenFilter::Type(t.to_string()))
}
