use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use barfeed_core::{FeedError, Instrument, Symbol, SymbolResolver};
use moka::future::Cache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
    exchange: String,
    market: String,
    symbol: Symbol,
}

/// [`SymbolResolver`] wrapper caching successful lookups for a bounded time.
///
/// Concurrent misses for the same key share one lookup. Failures are not
/// cached.
pub struct CachedResolver {
    inner: Arc<dyn SymbolResolver>,
    cache: Cache<ResolveKey, Instrument>,
}

impl CachedResolver {
    /// Cache at most `max_entries` instruments, each for `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn SymbolResolver>, max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_entries.max(1))
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl SymbolResolver for CachedResolver {
    async fn resolve(
        &self,
        exchange: &str,
        market: &str,
        symbol: &Symbol,
    ) -> Result<Instrument, FeedError> {
        let key = ResolveKey {
            exchange: exchange.to_string(),
            market: market.to_string(),
            symbol: symbol.clone(),
        };
        self.cache
            .try_get_with(key, self.inner.resolve(exchange, market, symbol))
            .await
            .map_err(|e| (*e).clone())
    }
}
