//! Entity identifiers and the string codec used at the framework boundary.
//!
//! Stores are generic over the native key type. Three key kinds are
//! supported: 64-bit integers, UUIDs and free-form strings. At the
//! framework boundary identifiers always travel as opaque strings, so every
//! key type knows how to parse and format itself without locale influence.

use std::fmt::Debug;
use std::hash::Hash;

use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// The storage representation of a key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Signed 64-bit integer assigned by the storage engine.
    Integer,
    /// UUID generated on insert.
    Uuid,
    /// Free-form text, generated as a hyphenated UUID on insert.
    Text,
}

/// A type-erased key value.
///
/// Backends that cannot be generic over every key type (such as SQL
/// parameter binding) work on this representation instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Integer(i64),
    Uuid(Uuid),
    Text(String),
}

/// A native key type usable as an entity identifier.
pub trait EntityKey: Clone + Eq + Hash + Ord + Debug + Default + Send + Sync + 'static {
    /// Storage representation of this key type.
    const KIND: KeyKind;

    /// Parses the canonical string form of the key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if the text is malformed.
    fn parse_key(text: &str) -> StoreResult<Self>;

    /// Returns the canonical string form of the key.
    fn format_key(&self) -> String;

    /// Returns `true` for the default key (`0`, nil UUID, empty string).
    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Converts the key into its type-erased form.
    fn to_value(&self) -> KeyValue;

    /// Converts a type-erased value back into the native key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Storage` if the value has a different kind.
    fn from_value(value: KeyValue) -> StoreResult<Self>;
}

impl EntityKey for i64 {
    const KIND: KeyKind = KeyKind::Integer;

    fn parse_key(text: &str) -> StoreResult<Self> {
        text.parse::<i64>()
            .map_err(|e| StoreError::invalid_argument("identifier", format!("'{text}': {e}")))
    }

    fn format_key(&self) -> String {
        self.to_string()
    }

    fn to_value(&self) -> KeyValue {
        KeyValue::Integer(*self)
    }

    fn from_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Integer(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

impl EntityKey for Uuid {
    const KIND: KeyKind = KeyKind::Uuid;

    fn parse_key(text: &str) -> StoreResult<Self> {
        Uuid::parse_str(text)
            .map_err(|e| StoreError::invalid_argument("identifier", format!("'{text}': {e}")))
    }

    fn format_key(&self) -> String {
        self.hyphenated().to_string()
    }

    fn to_value(&self) -> KeyValue {
        KeyValue::Uuid(*self)
    }

    fn from_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Uuid(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

impl EntityKey for String {
    const KIND: KeyKind = KeyKind::Text;

    fn parse_key(text: &str) -> StoreResult<Self> {
        Ok(text.to_string())
    }

    fn format_key(&self) -> String {
        self.clone()
    }

    fn to_value(&self) -> KeyValue {
        KeyValue::Text(self.clone())
    }

    fn from_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Text(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

fn kind_mismatch(expected: KeyKind, actual: &KeyValue) -> StoreError {
    StoreError::storage(format!(
        "key kind mismatch: expected {expected:?}, got {actual:?}"
    ))
}

/// Converts a boundary identifier into the native key.
///
/// Absent or empty input yields `None`.
///
/// # Errors
///
/// Returns `StoreError::InvalidArgument` if the identifier is malformed.
pub fn convert_identifier_from_string<K: EntityKey>(text: Option<&str>) -> StoreResult<Option<K>> {
    match text {
        None | Some("") => Ok(None),
        Some(text) => K::parse_key(text).map(Some),
    }
}

/// Converts a native key into its boundary string form.
///
/// Absent and default keys yield `None`.
pub fn convert_identifier_to_string<K: EntityKey>(key: Option<&K>) -> Option<String> {
    key.filter(|k| !k.is_default()).map(EntityKey::format_key)
}

/// Parses a required boundary identifier.
///
/// # Errors
///
/// Returns `StoreError::InvalidArgument` if the identifier is empty or
/// malformed.
pub(crate) fn require_identifier<K: EntityKey>(name: &'static str, text: &str) -> StoreResult<K> {
    if text.is_empty() {
        return Err(StoreError::empty_argument(name));
    }
    K::parse_key(text).map_err(|e| match e {
        StoreError::InvalidArgument { message, .. } => StoreError::invalid_argument(name, message),
        other => other,
    })
}
