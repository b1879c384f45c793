//! Query model shared by the stores and the session backends.
//!
//! A [`Query`] is a conjunction of entity-specific filters plus an optional
//! window. Results are always ordered by identifier ascending.

use crate::types::Entity;

/// A filtered, windowed query over one entity kind.
pub struct Query<E: Entity> {
    filters: Vec<E::Filter>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl<E: Entity> Query<E> {
    /// Creates a query matching every entity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Adds a filter. All filters must match.
    #[must_use]
    pub fn filter(mut self, filter: E::Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a filter when the value is present.
    #[must_use]
    pub fn filter_opt<T>(self, value: Option<T>, filter: impl FnOnce(T) -> E::Filter) -> Self {
        match value {
            Some(value) => self.filter(filter(value)),
            None => self,
        }
    }

    /// Skips the first `offset` entities.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns at most `limit` entities.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[E::Filter] {
        &self.filters
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    /// Applies the window to an already filtered and ordered list.
    pub fn apply_window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = self.offset.map_or(0, |n| n as usize);
        let take = self.limit.map_or(usize::MAX, |n| n as usize);
        items.into_iter().skip(skip).take(take).collect()
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            offset: self.offset,
            limit: self.limit,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &E::NAME)
            .field("filters", &self.filters)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Token, TokenFilter};

    #[test]
    fn test_builder_collects_filters() {
        let query = Query::<Token<i64>>::new()
            .filter(TokenFilter::Subject("alice".into()))
            .filter_opt(Some("valid"), |s| TokenFilter::Status(s.to_string()))
            .filter_opt(None::<&str>, |t| TokenFilter::Type(t.to_string()))
            .offset(2)
            .limit(5);

        assert_eq!(query.filters().len(), 2);
        assert_eq!(query.get_offset(), Some(2));
        assert_eq!(query.get_limit(), Some(5));
    }

    #[test]
    fn test_apply_window() {
        let query = Query::<Token<i64>>::new().offset(1).limit(2);
        assert_eq!(query.apply_window(1..=5), vec![2, 3]);

        let all = Query::<Token<i64>>::new();
        assert_eq!(all.apply_window(1..=3), vec![1, 2, 3]);
    }
}
