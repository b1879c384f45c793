//! Lazy, restartable result sequences.
//!
//! Multi-result lookups return a [`Sequence`] instead of a materialized
//! collection. Nothing is read until the sequence is enumerated, and every
//! enumeration re-issues the underlying query.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt, TryStreamExt};

use crate::error::StoreResult;

type Fetch<'a, T> = dyn Fn() -> BoxFuture<'a, StoreResult<Vec<T>>> + Send + Sync + 'a;

/// A lazy sequence of query results.
pub struct Sequence<'a, T> {
    fetch: Arc<Fetch<'a, T>>,
}

impl<'a, T: Send + 'a> Sequence<'a, T> {
    /// Creates a sequence from a query function.
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'a, StoreResult<Vec<T>>> + Send + Sync + 'a,
    {
        Self {
            fetch: Arc::new(fetch),
        }
    }

    /// Issues the query and streams its results.
    pub fn stream(&self) -> BoxStream<'a, StoreResult<T>> {
        stream::once((self.fetch)())
            .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Issues the query and collects its results.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the underlying query.
    pub async fn to_vec(&self) -> StoreResult<Vec<T>> {
        (self.fetch)().await
    }

    /// Maps every result of the sequence.
    pub fn map<U, M>(self, f: M) -> Sequence<'a, U>
    where
        U: Send + 'a,
        M: Fn(T) -> U + Send + Sync + 'a,
    {
        let fetch = self.fetch;
        let f = Arc::new(f);
        Sequence::new(move || {
            let pending = fetch();
            let f = Arc::clone(&f);
            async move { Ok(pending.await?.into_iter().map(|item| f(item)).collect()) }.boxed()
        })
    }
}

impl<T> Clone for Sequence<'_, T> {
    fn clone(&self) -> Self {
        Self {
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<T> std::fmt::Debug for Sequence<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &AtomicUsize) -> Sequence<'_, u32> {
        Sequence::new(move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_lazy_until_enumerated() {
        let calls = AtomicUsize::new(0);
        let sequence = counting(&calls);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let items: Vec<u32> = sequence.stream().try_collect().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_each_enumeration_requeries() {
        let calls = AtomicUsize::new(0);
        let sequence = counting(&calls);

        sequence.to_vec().await.unwrap();
        sequence.to_vec().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_map() {
        let calls = AtomicUsize::new(0);
        let doubled = counting(&calls).map(|n| n * 2);
        assert_eq!(doubled.to_vec().await.unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_error_is_streamed() {
        let sequence: Sequence<'_, u32> =
            Sequence::new(|| async { Err(StoreError::Cancelled) }.boxed());
        let result: StoreResult<Vec<u32>> = sequence.stream().try_collect().await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
