//! In-memory session backend for authstore.
//!
//! This crate provides an in-memory implementation of the session contracts
//! from `authstore-core`. It mirrors the behaviour of a relational backend
//! closely enough to exercise the stores: rows are ordered by identifier,
//! unique and foreign-key constraints are enforced, transactions roll back
//! to a snapshot, and faults can be injected into individual writes.
//!
//! # Example
//!
//! ```ignore
//! use authstore_memory::{MemoryDatabase, stores};
//!
//! let database = MemoryDatabase::<i64>::new();
//! let stores = stores(&database);
//!
//! let mut scope = stores.scopes().instantiate()?;
//! scope.name = Some("email".into());
//! stores.scopes().create(&mut scope).await?;
//! ```

pub mod database;
pub mod entity;
pub mod session;

use std::sync::Arc;

use authstore_core::{EntityKey, SessionOptions, Stores};

pub use database::{FaultHook, MemoryDatabase, Operation, Tables};
pub use entity::MemoryEntity;
pub use session::{MemorySession, MemorySessionFactory};

/// Resolves the four stores over a new scope on `database`.
pub fn stores<K: EntityKey>(database: &MemoryDatabase<K>) -> Stores<MemorySessionFactory<K>> {
    let factory = Arc::new(MemorySessionFactory::new(database.clone()));
    Stores::from_options(SessionOptions::new().with_factory(factory))
}
