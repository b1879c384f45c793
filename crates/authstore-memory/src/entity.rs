//! Table access and filter evaluation per entity kind.
//!
//! Filters follow SQL comparison semantics: a comparison against an unset
//! column never matches.

use std::collections::BTreeMap;

use authstore_core::{
    Application, ApplicationFilter, Authorization, AuthorizationFilter, Entity, EntityKey, Scope,
    ScopeFilter, StoreError, StoreResult, Token, TokenFilter,
};

use crate::database::Tables;

/// An entity kind the in-memory backend can store.
pub trait MemoryEntity: Entity {
    fn table(tables: &Tables<Self::Key>) -> &BTreeMap<Self::Key, Self>;

    fn table_mut(tables: &mut Tables<Self::Key>) -> &mut BTreeMap<Self::Key, Self>;

    /// Evaluates one filter against the entity.
    fn matches(&self, filter: &Self::Filter, tables: &Tables<Self::Key>) -> bool;

    /// Enforces unique columns. `current` is the row being replaced, if any.
    fn check_unique(
        &self,
        _tables: &Tables<Self::Key>,
        _current: Option<&Self::Key>,
    ) -> StoreResult<()> {
        Ok(())
    }

    /// Enforces that referenced parents exist.
    fn check_references(&self, _tables: &Tables<Self::Key>) -> StoreResult<()> {
        Ok(())
    }

    /// Enforces that no child still references the row.
    fn check_dependents(_id: &Self::Key, _tables: &Tables<Self::Key>) -> StoreResult<()> {
        Ok(())
    }
}

fn eq(column: &Option<String>, value: &str) -> bool {
    column.as_deref() == Some(value)
}

fn contains(column: &Option<String>, value: &str) -> bool {
    column.as_deref().is_some_and(|text| text.contains(value))
}

fn duplicate<'a, K, E, I>(
    rows: I,
    current: Option<&K>,
    column: impl Fn(&E) -> Option<&str>,
    value: Option<&str>,
) -> bool
where
    K: EntityKey + 'a,
    E: 'a,
    I: IntoIterator<Item = (&'a K, &'a E)>,
{
    let Some(value) = value else {
        return false;
    };
    rows.into_iter()
        .any(|(id, row)| Some(id) != current && column(row) == Some(value))
}

fn foreign_key_violation(entity: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::storage(format!("foreign key violation on {entity}: {}", message.into()))
}

// =============================================================================
// Application
// =============================================================================

impl<K: EntityKey> MemoryEntity for Application<K> {
    fn table(tables: &Tables<K>) -> &BTreeMap<K, Self> {
        &tables.applications
    }

    fn table_mut(tables: &mut Tables<K>) -> &mut BTreeMap<K, Self> {
        &mut tables.applications
    }

    fn matches(&self, filter: &ApplicationFilter<K>, _tables: &Tables<K>) -> bool {
        match filter {
            ApplicationFilter::Id(id) => self.id() == Some(id),
            ApplicationFilter::ClientId(client_id) => eq(&self.client_id, client_id),
            ApplicationFilter::RedirectUrisContain(uri) => contains(&self.redirect_uris, uri),
            ApplicationFilter::PostLogoutRedirectUrisContain(uri) => {
                contains(&self.post_logout_redirect_uris, uri)
            }
        }
    }

    fn check_unique(&self, tables: &Tables<K>, current: Option<&K>) -> StoreResult<()> {
        let client_id = self.client_id.as_deref();
        if duplicate(&tables.applications, current, |a: &Self| a.client_id.as_deref(), client_id) {
            return Err(StoreError::already_exists(
                Self::NAME,
                format!("client_id '{}'", self.client_id.as_deref().unwrap_or_default()),
            ));
        }
        Ok(())
    }

    fn check_dependents(id: &K, tables: &Tables<K>) -> StoreResult<()> {
        let referenced = tables
            .authorizations
            .values()
            .any(|a| a.application_id.as_ref() == Some(id))
            || tables
                .tokens
                .values()
                .any(|t| t.application_id.as_ref() == Some(id));
        if referenced {
            return Err(foreign_key_violation(
                Self::NAME,
                "the application is still referenced",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Authorization
// =============================================================================

impl<K: EntityKey> MemoryEntity for Authorization<K> {
    fn table(tables: &Tables<K>) -> &BTreeMap<K, Self> {
        &tables.authorizations
    }

    fn table_mut(tables: &mut Tables<K>) -> &mut BTreeMap<K, Self> {
        &mut tables.authorizations
    }

    fn matches(&self, filter: &AuthorizationFilter<K>, tables: &Tables<K>) -> bool {
        match filter {
            AuthorizationFilter::Id(id) => self.id() == Some(id),
            AuthorizationFilter::ApplicationId(id) => self.application_id.as_ref() == Some(id),
            AuthorizationFilter::Subject(subject) => eq(&self.subject, subject),
            AuthorizationFilter::Status(status) => eq(&self.status, status),
            AuthorizationFilter::StatusNot(status) => {
                self.status.as_deref().is_some_and(|s| s != status)
            }
            AuthorizationFilter::Type(kind) => eq(&self.authorization_type, kind),
            AuthorizationFilter::CreatedBefore(threshold) => {
                self.creation_date.is_some_and(|date| date < *threshold)
            }
            AuthorizationFilter::HasTokens => self.id().is_some_and(|id| {
                tables
                    .tokens
                    .values()
                    .any(|t| t.authorization_id.as_ref() == Some(id))
            }),
            AuthorizationFilter::Any(filters) => filters.iter().any(|f| self.matches(f, tables)),
        }
    }

    fn check_references(&self, tables: &Tables<K>) -> StoreResult<()> {
        if let Some(id) = &self.application_id {
            if !tables.applications.contains_key(id) {
                return Err(foreign_key_violation(Self::NAME, "unknown application"));
            }
        }
        Ok(())
    }

    fn check_dependents(id: &K, tables: &Tables<K>) -> StoreResult<()> {
        if tables
            .tokens
            .values()
            .any(|t| t.authorization_id.as_ref() == Some(id))
        {
            return Err(foreign_key_violation(
                Self::NAME,
                "the authorization is still referenced",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Scope
// =============================================================================

impl<K: EntityKey> MemoryEntity for Scope<K> {
    fn table(tables: &Tables<K>) -> &BTreeMap<K, Self> {
        &tables.scopes
    }

    fn table_mut(tables: &mut Tables<K>) -> &mut BTreeMap<K, Self> {
        &mut tables.scopes
    }

    fn matches(&self, filter: &ScopeFilter<K>, _tables: &Tables<K>) -> bool {
        match filter {
            ScopeFilter::Id(id) => self.id() == Some(id),
            ScopeFilter::Name(name) => eq(&self.name, name),
            ScopeFilter::NameIn(names) => self
                .name
                .as_ref()
                .is_some_and(|name| names.contains(name)),
            ScopeFilter::ResourcesContain(resource) => contains(&self.resources, resource),
        }
    }

    fn check_unique(&self, tables: &Tables<K>, current: Option<&K>) -> StoreResult<()> {
        let name = self.name.as_deref();
        if duplicate(&tables.scopes, current, |s: &Self| s.name.as_deref(), name) {
            return Err(StoreError::already_exists(
                Self::NAME,
                format!("name '{}'", self.name.as_deref().unwrap_or_default()),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Token
// =============================================================================

impl<K: EntityKey> MemoryEntity for Token<K> {
    fn table(tables: &Tables<K>) -> &BTreeMap<K, Self> {
        &tables.tokens
    }

    fn table_mut(tables: &mut Tables<K>) -> &mut BTreeMap<K, Self> {
        &mut tables.tokens
    }

    fn matches(&self, filter: &TokenFilter<K>, tables: &Tables<K>) -> bool {
        match filter {
            TokenFilter::Id(id) => self.id() == Some(id),
            TokenFilter::ApplicationId(id) => self.application_id.as_ref() == Some(id),
            TokenFilter::AuthorizationId(id) => self.authorization_id.as_ref() == Some(id),
            TokenFilter::WithoutAuthorization => self.authorization_id.is_none(),
            TokenFilter::Subject(subject) => eq(&self.subject, subject),
            TokenFilter::Status(status) => eq(&self.status, status),
            TokenFilter::StatusNotIn(statuses) => self
                .status
                .as_ref()
                .is_some_and(|status| !statuses.contains(status)),
            TokenFilter::Type(kind) => eq(&self.token_type, kind),
            TokenFilter::ReferenceId(reference_id) => eq(&self.reference_id, reference_id),
            TokenFilter::CreatedBefore(threshold) => {
                self.creation_date.is_some_and(|date| date < *threshold)
            }
            TokenFilter::ExpiresBefore(threshold) => {
                self.expiration_date.is_some_and(|date| date < *threshold)
            }
            TokenFilter::AuthorizationStatusNot(status) => self
                .authorization_id
                .as_ref()
                .and_then(|id| tables.authorizations.get(id))
                .and_then(|authorization| authorization.status.as_deref())
                .is_some_and(|s| s != status),
            TokenFilter::Any(filters) => filters.iter().any(|f| self.matches(f, tables)),
        }
    }

    fn check_unique(&self, tables: &Tables<K>, current: Option<&K>) -> StoreResult<()> {
        let reference_id = self.reference_id.as_deref();
        if duplicate(&tables.tokens, current, |t: &Self| t.reference_id.as_deref(), reference_id) {
            return Err(StoreError::already_exists(Self::NAME, "reference_id"));
        }
        Ok(())
    }

    fn check_references(&self, tables: &Tables<K>) -> StoreResult<()> {
        if let Some(id) = &self.application_id {
            if !tables.applications.contains_key(id) {
                return Err(foreign_key_violation(Self::NAME, "unknown application"));
            }
        }
        if let Some(id) = &self.authorization_id {
            if !tables.authorizations.contains_key(id) {
                return Err(foreign_key_violation(Self::NAME, "unknown authorization"));
            }
        }
        Ok(())
    }
}
