//! OAuth client application entity.

use crate::key::EntityKey;

// =============================================================================
// Application
// =============================================================================

/// A registered OAuth client application.
///
/// Parent of authorizations and tokens, which reference it through their
/// `application_id` foreign key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Application<K: EntityKey> {
    pub(crate) id: Option<K>,

    /// Unique client identifier used in OAuth flows.
    pub client_id: Option<String>,

    /// Client secret, typically hashed.
    pub client_secret: Option<String>,

    /// Client type (`confidential` or `public`).
    pub client_type: Option<String>,

    /// Application type (`native` or `web`).
    pub application_type: Option<String>,

    /// Consent type (`explicit`, `external`, `implicit`, `systematic`).
    pub consent_type: Option<String>,

    /// Display name.
    pub display_name: Option<String>,

    /// Localized display names, as JSON.
    pub display_names: Option<String>,

    /// Granted permissions, as a JSON array.
    pub permissions: Option<String>,

    /// Allowed redirect URIs, as a JSON array.
    pub redirect_uris: Option<String>,

    /// Allowed post-logout redirect URIs, as a JSON array.
    pub post_logout_redirect_uris: Option<String>,

    /// Requirements enforced for this client, as a JSON array.
    pub requirements: Option<String>,

    /// Client settings, as a JSON object.
    pub settings: Option<String>,

    /// JSON Web Key Set used to authenticate the client.
    pub json_web_key_set: Option<String>,

    /// Additional properties, as a JSON object.
    pub properties: Option<String>,

    /// Optimistic concurrency token.
    pub concurrency_token: Option<String>,
}

super::impl_entity!(Application, ApplicationFilter, "Application");

/// Filters over applications.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationFilter<K> {
    Id(K),
    ClientId(String),
    /// Raw `redirect_uris` column contains the text.
    RedirectUrisContain(String),
    /// Raw `post_logout_redirect_uris` column contains the text.
    PostLogoutRedirectUrisContain(String),
}
