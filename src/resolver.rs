use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::cache::{CacheEntry, FeedCache};
use crate::calendar;
use crate::error::ResolveError;
use crate::feed;
use crate::fetcher::Fetcher;

type Conversion = Shared<BoxFuture<'static, Result<CacheEntry, ResolveError>>>;
type InFlight = Arc<Mutex<HashMap<String, Conversion>>>;

/// Turns a feed url into calendar text, serving from the cache when fresh.
///
/// Concurrent misses for one url share a single fetch. The conversion runs
/// as its own task, so it finishes and fills the cache even if every caller
/// goes away. Failures are never cached.
pub struct FeedResolver {
    cache: Arc<FeedCache>,
    fetcher: Fetcher,
    in_flight: InFlight,
}

impl FeedResolver {
    pub fn new(cache: Arc<FeedCache>, fetcher: Fetcher) -> Self {
        Self {
            cache,
            fetcher,
            in_flight: Arc::default(),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub async fn resolve(&self, url: &str) -> Result<CacheEntry, ResolveError> {
        if let Some(entry) = self.cache.get(url).await {
            debug!(url, "cache hit");
            return Ok(entry);
        }

        self.join_or_start(url).await
    }

    fn join_or_start(&self, url: &str) -> Conversion {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(conversion) = in_flight.get(url) {
            debug!(url, "joining in-flight conversion");
            return conversion.clone();
        }

        debug!(url, "cache miss");
        let task = tokio::spawn(convert(
            self.cache.clone(),
            self.fetcher.clone(),
            InFlightGuard {
                in_flight: self.in_flight.clone(),
                url: url.to_string(),
            },
        ));
        let conversion = async move {
            task.await
                .unwrap_or_else(|e| Err(ResolveError::Interrupted(e.to_string())))
        }
        .boxed()
        .shared();

        in_flight.insert(url.to_string(), conversion.clone());
        conversion
    }
}

async fn convert(
    cache: Arc<FeedCache>,
    fetcher: Fetcher,
    guard: InFlightGuard,
) -> Result<CacheEntry, ResolveError> {
    let url = guard.url.as_str();

    let body = fetcher.fetch(url).await?;
    let feed = feed::parse(&body)?;
    debug!(url, items = feed.items.len(), "parsed feed");

    let ics = calendar::to_ical(&feed);
    Ok(cache.set(url, ics).await)
}

/// Unregisters a conversion once it has finished, panicked or been dropped.
struct InFlightGuard {
    in_flight: InFlight,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}
