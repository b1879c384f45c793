//! # authstore-core
//!
//! Persistence of OAuth applications, authorizations, scopes and tokens.
//!
//! This crate provides:
//! - Entity types generic over their key type (`i64`, `Uuid`, `String`)
//! - One store per entity kind with optimistic concurrency control
//! - Cascading deletes, bulk revocation and pruning
//! - A process-wide cache of parsed JSON columns
//! - Session contracts implemented by the storage backends
//!
//! ## Modules
//!
//! - [`config`] - Store configuration
//! - [`error`] - Error types
//! - [`key`] - Key types and the identifier string codec
//! - [`projection`] - Cached projections of JSON columns
//! - [`query`] - Query model shared with the backends
//! - [`sequence`] - Lazy, restartable result sequences
//! - [`session`] - Session contracts and the session provider
//! - [`storage`] - The entity stores
//! - [`types`] - Entity types

pub mod config;
pub mod error;
pub mod key;
pub mod projection;
pub mod query;
pub mod sequence;
pub mod session;
pub mod storage;
pub mod types;

pub use config::{ConfigError, ProjectionCacheConfig, StoreConfig};
pub use error::{BoxError, ErrorCategory, StoreError, StoreResult};
pub use key::{
    EntityKey, KeyKind, KeyValue, convert_identifier_from_string, convert_identifier_to_string,
};
pub use projection::{JsonWebKeySet, ProjectionCache, ProjectionCacheStats};
pub use query::Query;
pub use sequence::Sequence;
pub use session::{
    EntitySet, IsolationLevel, ScopedSession, Session, SessionFactory, SessionOptions,
    SessionProvider, Transactional,
};
pub use storage::{
    ApplicationStore, AuthorizationStore, ScopeStore, StoreContext, Stores, TokenStore,
};
pub use types::{
    Application, ApplicationFilter, Authorization, AuthorizationFilter, Entity, Scope,
    ScopeFilter, Token, TokenFilter,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use authstore_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::key::EntityKey;
    pub use crate::query::Query;
    pub use crate::session::{SessionFactory, SessionOptions, SessionProvider};
    pub use crate::storage::Stores;
    pub use crate::types::{
        Application, Authorization, Entity, Scope, Token, authorization_types, statuses,
    };
}
