//! Entity stores.
//!
//! This module provides one store per entity kind:
//!
//! - [`ApplicationStore`] - OAuth client applications
//! - [`AuthorizationStore`] - authorizations granted by subjects
//! - [`ScopeStore`] - scopes and their resources
//! - [`TokenStore`] - issued tokens
//!
//! All stores of one operation scope share a [`StoreContext`]: the scope's
//! session provider and the projection cache. [`Stores`] resolves the four
//! of them at once.
//!
//! # Implementations
//!
//! Session backends are provided in separate crates:
//!
//! - `authstore-memory` - in-memory backend
//! - `authstore-postgres` - PostgreSQL backend

pub mod application;
pub mod authorization;
pub(crate) mod repository;
pub mod scope;
pub mod token;

use std::sync::Arc;

pub use application::ApplicationStore;
pub use authorization::AuthorizationStore;
pub use repository::{Instantiator, StoreContext};
pub use scope::ScopeStore;
pub use token::TokenStore;

use crate::projection::{self, ProjectionCache};
use crate::session::{SessionFactory, SessionOptions, SessionProvider};

/// The four stores of one operation scope.
pub struct Stores<F: SessionFactory> {
    context: Arc<StoreContext<F>>,
    applications: ApplicationStore<F>,
    authorizations: AuthorizationStore<F>,
    scopes: ScopeStore<F>,
    tokens: TokenStore<F>,
}

impl<F: SessionFactory> Stores<F> {
    /// Resolves the stores over a session provider and the global
    /// projection cache.
    pub fn new(provider: SessionProvider<F>) -> Self {
        Self::with_cache(provider, projection::global())
    }

    /// Resolves the stores over a scope whose session is opened from the
    /// options' factory.
    pub fn from_options(options: SessionOptions<F>) -> Self {
        Self::new(SessionProvider::new(options))
    }

    /// Resolves the stores over a session provider and a dedicated cache.
    pub fn with_cache(provider: SessionProvider<F>, cache: Arc<ProjectionCache>) -> Self {
        let context = Arc::new(StoreContext::new(provider, cache));
        Self {
            applications: ApplicationStore::new(Arc::clone(&context)),
            authorizations: AuthorizationStore::new(Arc::clone(&context)),
            scopes: ScopeStore::new(Arc::clone(&context)),
            tokens: TokenStore::new(Arc::clone(&context)),
            context,
        }
    }

    pub fn applications(&self) -> &ApplicationStore<F> {
        &self.applications
    }

    pub fn authorizations(&self) -> &AuthorizationStore<F> {
        &self.authorizations
    }

    pub fn scopes(&self) -> &ScopeStore<F> {
        &self.scopes
    }

    pub fn tokens(&self) -> &TokenStore<F> {
        &self.tokens
    }

    /// The shared scope state.
    pub fn context(&self) -> &Arc<StoreContext<F>> {
        &self.context
    }

    /// The scope's session provider.
    pub fn provider(&self) -> &SessionProvider<F> {
        self.context.provider()
    }
}
