//! Scope entity.

use crate::key::EntityKey;

/// A named scope and the resources it grants access to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope<K: EntityKey> {
    pub(crate) id: Option<K>,

    /// Unique scope name.
    pub name: Option<String>,

    pub display_name: Option<String>,

    /// Localized display names, as JSON.
    pub display_names: Option<String>,

    pub description: Option<String>,

    /// Localized descriptions, as JSON.
    pub descriptions: Option<String>,

    /// Resources (audiences), as a JSON array.
    pub resources: Option<String>,

    /// Additional properties, as a JSON object.
    pub properties: Option<String>,

    /// Optimistic concurrency token.
    pub concurrency_token: Option<String>,
}

super::impl_entity!(Scope, ScopeFilter, "Scope");

/// Filters over scopes.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter<K> {
    Id(K),
    Name(String),
    NameIn(Vec<String>),
    /// Raw `resources` column contains the text.
    ResourcesContain(String),
}
