//! PostgreSQL session backend for authstore.
//!
//! Each entity kind lives in its own table (`oauth_applications`,
//! `oauth_authorizations`, `oauth_scopes`, `oauth_tokens`). Multi-valued
//! fields are stored as JSON text exactly as the stores hand them over, so
//! the cached projections in `authstore-core` parse the same strings on
//! every backend.
//!
//! # Example
//!
//! ```ignore
//! use authstore_postgres::{PostgresConfig, PostgresSessionFactory, stores};
//!
//! let config = PostgresConfig::new("postgres://localhost/authstore");
//! let factory = PostgresSessionFactory::<i64>::connect(&config).await?;
//! let stores = stores(factory);
//!
//! let application = stores.applications().find_by_client_id("portal").await?;
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod pool;
pub mod schema;
pub mod session;
pub mod statement;

use std::sync::Arc;

use authstore_core::{EntityKey, SessionOptions, Stores};

pub use config::PostgresConfig;
pub use error::{PostgresError, Result, map_sqlx};
pub use mapping::PgEntity;
pub use pool::{create_pool, test_connection};
pub use schema::{ensure_schema, schema_statements};
pub use session::{PostgresSession, PostgresSessionFactory};

/// Resolves the four stores over a new scope on `factory`.
pub fn stores<K: EntityKey>(factory: PostgresSessionFactory<K>) -> Stores<PostgresSessionFactory<K>> {
    Stores::from_options(SessionOptions::new().with_factory(Arc::new(factory)))
}
