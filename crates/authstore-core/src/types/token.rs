//! Token entity.

use time::OffsetDateTime;

use crate::key::EntityKey;

// =============================================================================
// Token
// =============================================================================

/// A token issued to an application, optionally under an authorization.
///
/// Reference tokens keep their payload server-side and are looked up
/// through `reference_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Token<K: EntityKey> {
    pub(crate) id: Option<K>,

    /// Owning application.
    pub application_id: Option<K>,

    /// Authorization the token was issued under.
    pub authorization_id: Option<K>,

    /// Subject the token was issued to.
    pub subject: Option<String>,

    /// Token type (`access_token`, `refresh_token`, ...).
    pub token_type: Option<String>,

    /// Status, one of [`super::statuses`].
    pub status: Option<String>,

    /// Opaque identifier of a reference token.
    pub reference_id: Option<String>,

    /// Serialized token payload.
    pub payload: Option<String>,

    pub creation_date: Option<OffsetDateTime>,
    pub expiration_date: Option<OffsetDateTime>,
    pub redemption_date: Option<OffsetDateTime>,

    /// Additional properties, as a JSON object.
    pub properties: Option<String>,

    /// Optimistic concurrency token.
    pub concurrency_token: Option<String>,
}

super::impl_entity!(Token, TokenFilter, "Token");

// =============================================================================
// Filters
// =============================================================================

/// Filters over tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenFilter<K> {
    Id(K),
    ApplicationId(K),
    AuthorizationId(K),
    /// Token has no authorization.
    WithoutAuthorization,
    Subject(String),
    Status(String),
    /// Status is set and not one of the listed values.
    StatusNotIn(Vec<String>),
    Type(String),
    ReferenceId(String),
    CreatedBefore(OffsetDateTime),
    ExpiresBefore(OffsetDateTime),
    /// Token belongs to an authorization whose status differs from the value.
    AuthorizationStatusNot(String),
    /// Any of the nested filters matches.
    Any(Vec<TokenFilter<K>>),
}
