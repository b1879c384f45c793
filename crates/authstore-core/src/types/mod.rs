//! Entity types persisted by the stores.
//!
//! Each entity kind is a plain struct generic over its key type. Relations
//! are explicit foreign-key fields. JSON-encoded attributes are kept as raw
//! column text; their structured forms are derived through
//! [`crate::projection`].

macro_rules! impl_entity {
    ($ty:ident, $filter:ident, $name:literal) => {
        impl<K: $crate::key::EntityKey> $crate::types::Entity for $ty<K> {
            type Key = K;
            type Filter = $filter<K>;

            const NAME: &'static str = $name;

            fn id(&self) -> Option<&K> {
                self.id.as_ref()
            }

            fn assign_id(&mut self, id: K) {
                self.id = Some(id);
            }

            fn id_filter(id: K) -> $filter<K> {
                $filter::Id(id)
            }

            fn concurrency_token(&self) -> Option<&str> {
                self.concurrency_token.as_deref()
            }

            fn set_concurrency_token(&mut self, token: Option<String>) {
                self.concurrency_token = token;
            }
        }

        impl<K: $crate::key::EntityKey> $ty<K> {
            /// Identifier assigned by storage, if the entity was persisted.
            pub fn id(&self) -> Option<&K> {
                self.id.as_ref()
            }
        }
    };
}

pub(crate) use impl_entity;

pub mod application;
pub mod authorization;
pub mod scope;
pub mod token;

use std::fmt::Debug;

use crate::key::EntityKey;

pub use application::{Application, ApplicationFilter};
pub use authorization::{Authorization, AuthorizationFilter};
pub use scope::{Scope, ScopeFilter};
pub use token::{Token, TokenFilter};

/// Token and authorization statuses.
pub mod statuses {
    pub const INACTIVE: &str = "inactive";
    pub const REDEEMED: &str = "redeemed";
    pub const REJECTED: &str = "rejected";
    pub const REVOKED: &str = "revoked";
    pub const VALID: &str = "valid";
}

/// Authorization types.
pub mod authorization_types {
    pub const AD_HOC: &str = "ad-hoc";
    pub const PERMANENT: &str = "permanent";
}

/// Common behaviour of the four entity kinds.
pub trait Entity: Clone + Debug + Default + Send + Sync + 'static {
    /// Native key type.
    type Key: EntityKey;

    /// Query filter understood by the session backends.
    type Filter: Clone + Debug + Send + Sync + 'static;

    /// Human-readable entity kind, used in errors and logs.
    const NAME: &'static str;

    /// Identifier assigned by storage, if the entity was persisted.
    fn id(&self) -> Option<&Self::Key>;

    /// Records the identifier assigned by storage.
    ///
    /// Session backends call this when an entity is inserted or loaded.
    fn assign_id(&mut self, id: Self::Key);

    /// Filter matching the entity with the given identifier.
    fn id_filter(id: Self::Key) -> Self::Filter;

    /// Current concurrency token.
    fn concurrency_token(&self) -> Option<&str>;

    /// Replaces the concurrency token.
    fn set_concurrency_token(&mut self, token: Option<String>);
}

/// Generates a fresh opaque concurrency token.
pub fn new_concurrency_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
