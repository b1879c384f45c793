//! Store error types.
//!
//! Every store operation reports failures through [`StoreError`]. The
//! variants mirror the error taxonomy callers are expected to react to:
//! argument errors are fatal to the call, concurrency conflicts are surfaced
//! for the caller to decide on a retry, and bulk operations aggregate their
//! per-item failures.

use std::fmt;

/// Boxed error used as the source of wrapping variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message attached to every concurrency failure.
pub const CONCURRENCY_MESSAGE: &str = "The entity was concurrently updated and cannot be persisted in its current state. \
     Reload the entity from the database and retry the operation.";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required parameter was missing, empty or malformed.
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Name of the offending parameter.
        name: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// An update or delete observed a stale concurrency token.
    #[error("Concurrency conflict: {message}")]
    Concurrency {
        /// Guidance for the caller.
        message: String,
        /// The underlying storage conflict.
        #[source]
        source: Box<StoreError>,
    },

    /// The storage layer rejected a write because the row changed or vanished.
    ///
    /// Stores never return this variant directly; it is wrapped in
    /// [`StoreError::Concurrency`].
    #[error("Stale state for {entity} '{id}'")]
    Conflict {
        /// Entity kind (table) the conflict occurred on.
        entity: &'static str,
        /// Identifier of the row, if known.
        id: String,
    },

    /// A unique constraint was violated.
    #[error("{entity} already exists: {message}")]
    AlreadyExists {
        /// Entity kind the duplicate was detected on.
        entity: &'static str,
        /// Description of the duplicate.
        message: String,
    },

    /// The configured instantiation hook could not build an entity.
    #[error("Unable to instantiate {entity}: {message}")]
    Instantiation {
        /// Entity kind being instantiated.
        entity: &'static str,
        /// Guidance for the caller.
        message: String,
        /// The failure reported by the hook.
        #[source]
        source: BoxError,
    },

    /// A bulk operation failed for some items.
    ///
    /// The count of items that were processed successfully is preserved.
    #[error("{} of the bulk operation items failed ({succeeded} succeeded)", errors.len())]
    Aggregate {
        /// Number of items that were processed successfully.
        succeeded: u64,
        /// Per-item failures, in the order they occurred.
        errors: Vec<StoreError>,
    },

    /// No session or session factory could be resolved.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the missing configuration.
        message: String,
    },

    /// The operation scope was cancelled before I/O was issued.
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON (de)serialization of a projected column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The backend error, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl StoreError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Creates an `InvalidArgument` error for a missing or empty value.
    #[must_use]
    pub fn empty_argument(name: &'static str) -> Self {
        Self::invalid_argument(name, "the value cannot be null or empty")
    }

    /// Wraps an underlying storage conflict in a `Concurrency` error.
    #[must_use]
    pub fn concurrency(source: StoreError) -> Self {
        Self::Concurrency {
            message: CONCURRENCY_MESSAGE.to_string(),
            source: Box::new(source),
        }
    }

    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: &'static str, message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            message: message.into(),
        }
    }

    /// Creates an `Instantiation` error wrapping the hook failure.
    #[must_use]
    pub fn instantiation(entity: &'static str, source: BoxError) -> Self {
        Self::Instantiation {
            entity,
            message: format!(
                "the configured {entity} factory failed. Make sure the factory can build \
                 a default instance, or override the instantiation hook of the store"
            ),
            source,
        }
    }

    /// Creates an `Aggregate` error.
    #[must_use]
    pub fn aggregate(succeeded: u64, errors: Vec<StoreError>) -> Self {
        Self::Aggregate { succeeded, errors }
    }

    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a `Storage` error without a source.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Storage` error wrapping a backend error.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is an argument error.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns `true` if this is a concurrency error.
    #[must_use]
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }

    /// Returns `true` if this is a raw storage conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if this is a duplicate-key error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is an instantiation error.
    #[must_use]
    pub fn is_instantiation(&self) -> bool {
        matches!(self, Self::Instantiation { .. })
    }

    /// Returns `true` if this is an aggregate error.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a storage backend error.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Converts a raw storage conflict into a `Concurrency` error.
    ///
    /// Any other error is returned unchanged.
    #[must_use]
    pub fn into_concurrency(self) -> Self {
        if self.is_conflict() {
            Self::concurrency(self)
        } else {
            self
        }
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } => ErrorCategory::Argument,
            Self::Concurrency { .. } | Self::Conflict { .. } | Self::AlreadyExists { .. } => {
                ErrorCategory::Conflict
            }
            Self::Instantiation { .. } | Self::Configuration { .. } => ErrorCategory::Setup,
            Self::Aggregate { .. } => ErrorCategory::Partial,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Serialization(_) | Self::Storage { .. } => ErrorCategory::Storage,
        }
    }
}

/// Coarse error categories for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input supplied by the caller.
    Argument,
    /// Concurrency or uniqueness conflicts.
    Conflict,
    /// Misconfiguration of the store or its entity factory.
    Setup,
    /// Bulk operation with partial failures.
    Partial,
    /// Cancelled operation scope.
    Cancelled,
    /// Backend or serialization failure.
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Argument => "argument",
            Self::Conflict => "conflict",
            Self::Setup => "setup",
            Self::Partial => "partial",
            Self::Cancelled => "cancelled",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_wraps_conflict() {
        let err = StoreError::conflict("Token", "42").into_concurrency();
        assert!(err.is_concurrency());
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let StoreError::Concurrency { message, source } = err else {
            panic!("expected a concurrency error");
        };
        assert!(message.contains("Reload the entity"));
        assert!(source.is_conflict());
    }

    #[test]
    fn test_into_concurrency_leaves_other_errors() {
        let err = StoreError::storage("connection reset").into_concurrency();
        assert!(err.is_storage());
    }

    #[test]
    fn test_aggregate_display_counts() {
        let err = StoreError::aggregate(
            3,
            vec![StoreError::storage("boom"), StoreError::Cancelled],
        );
        assert_eq!(
            err.to_string(),
            "2 of the bulk operation items failed (3 succeeded)"
        );
        assert_eq!(err.category(), ErrorCategory::Partial);
    }

    #[test]
    fn test_empty_argument_message() {
        let err = StoreError::empty_argument("subject");
        assert!(err.is_invalid_argument());
        assert_eq!(
            err.to_string(),
            "Invalid argument 'subject': the value cannot be null or empty"
        );
    }

    #[test]
    fn test_instantiation_keeps_source() {
        let source: BoxError = "abstract type".into();
        let err = StoreError::instantiation("Application", source);
        assert!(err.is_instantiation());
        assert!(err.to_string().contains("instantiation hook"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_serialization_from_json_error() {
        let json_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err = StoreError::from(json_err);
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
