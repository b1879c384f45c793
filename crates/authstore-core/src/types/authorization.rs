//! Authorization entity.

use time::OffsetDateTime;

use crate::key::EntityKey;

/// A grant of scopes by a subject to an application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Authorization<K: EntityKey> {
    pub(crate) id: Option<K>,

    /// Owning application.
    pub application_id: Option<K>,

    /// Subject the authorization was granted by.
    pub subject: Option<String>,

    /// Status, one of [`super::statuses`].
    pub status: Option<String>,

    /// Type, one of [`super::authorization_types`].
    pub authorization_type: Option<String>,

    /// Granted scopes, as a JSON array.
    pub scopes: Option<String>,

    pub creation_date: Option<OffsetDateTime>,

    /// Additional properties, as a JSON object.
    pub properties: Option<String>,

    /// Optimistic concurrency token.
    pub concurrency_token: Option<String>,
}

super::impl_entity!(Authorization, AuthorizationFilter, "Authorization");

/// Filters over authorizations.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationFilter<K> {
    Id(K),
    ApplicationId(K),
    Subject(String),
    Status(String),
    StatusNot(String),
    Type(String),
    CreatedBefore(OffsetDateTime),
    /// At least one token references the authorization.
    HasTokens,
    /// Any of the nested filters matches.
    Any(Vec<AuthorizationFilter<K>>),
}
