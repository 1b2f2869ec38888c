//! Cached Request Executor
//!
//! Every REST driver call funnels through [`CachedRequestExecutor::execute`].
//! `GET` results are cached for a caller-chosen duration; other methods always
//! go to the wire and never touch the cache.
//!
//! Lookup, eviction and store are each atomic on their own, but the sequence
//! is not: two concurrent misses on the same key both call the driver and both
//! overwrite the entry. Only `GET` is cached, so the duplicated call is a read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::http::DriverHttpClient;
use super::DriverError;

/// Short-term cache duration
pub const SHORT_DURATION: Duration = Duration::from_secs(2);
/// Medium-term cache duration
pub const MEDIUM_DURATION: Duration = Duration::from_secs(5);
/// Long-term cache duration
pub const LONG_DURATION: Duration = Duration::from_secs(10);

/// Cache key suffix for body-less requests
const NO_BODY: &str = "NOBODY";

#[derive(Clone)]
struct CacheEntry<T> {
    response: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Time-bounded response cache, shared by clones
pub struct ResponseCache<T> {
    entries: Arc<DashMap<String, CacheEntry<T>>>,
}

impl<T> Clone for ResponseCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for ResponseCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Clone> ResponseCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh entry. An expired entry is evicted and reported as a miss.
    pub fn lookup(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh() {
                tracing::debug!("cache hit: {}", key);
                return Some(entry.response.clone());
            }
        } else {
            return None;
        }

        // Only drop it if nobody refreshed it in between
        self.entries.remove_if(key, |_, entry| !entry.is_fresh());
        tracing::debug!("cache entry expired: {}", key);
        None
    }

    /// Store `response` under `key`, replacing any existing entry.
    pub fn store(&self, key: String, response: T, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the cache key for a request.
///
/// The body is serialized as JSON; `serde_json` maps keep keys sorted, so
/// equal bodies produce equal keys.
pub fn cache_key<B: Serialize + ?Sized>(
    method: &Method,
    url: &str,
    body: Option<&B>,
) -> Result<String, DriverError> {
    match body {
        Some(body) => {
            let serialized = serde_json::to_string(body).map_err(|e| DriverError::Decode {
                context: format!("cache key for {}", url),
                message: e.to_string(),
            })?;
            Ok(format!("{}_{}_{}", method, url, serialized))
        }
        None => Ok(format!("{}_{}_{}", method, url, NO_BODY)),
    }
}

/// HTTP executor with a `GET` result cache
#[derive(Clone)]
pub struct CachedRequestExecutor {
    http: DriverHttpClient,
}

impl CachedRequestExecutor {
    pub fn new(http: DriverHttpClient) -> Self {
        Self { http }
    }

    /// Perform a driver call, serving `GET` requests from `cache` while fresh.
    ///
    /// Errors are never retried here.
    pub async fn execute<B, T>(
        &self,
        cache: &ResponseCache<T>,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&B>,
        cache_duration: Duration,
    ) -> Result<T, DriverError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Clone,
    {
        if !matches!(
            method,
            Method::GET | Method::POST | Method::PUT | Method::DELETE
        ) {
            return Err(DriverError::UnsupportedMethod(method.to_string()));
        }

        let key = if method == Method::GET {
            let key = cache_key(&method, url, body)?;
            if let Some(hit) = cache.lookup(&key) {
                return Ok(hit);
            }
            Some(key)
        } else {
            None
        };

        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DriverError::Decode {
                context: format!("request body for {}", url),
                message: e.to_string(),
            })?;

        let raw = self.http.send(method, url, headers, body.as_ref()).await?;
        let result: T = decode(url, raw)?;

        if let Some(key) = key {
            cache.store(key, result.clone(), cache_duration);
            tracing::debug!("cached response for {:?}", cache_duration);
        }

        Ok(result)
    }
}

fn decode<T: DeserializeOwned>(url: &str, raw: Value) -> Result<T, DriverError> {
    serde_json::from_value(raw).map_err(|e| DriverError::Decode {
        context: url.to_string(),
        message: e.to_string(),
    })
}
