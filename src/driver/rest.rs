//! REST transport
//!
//! Maps each [`Operation`] to a method and path under the driver base URL and
//! sends the `{ConnectionName, ReqInfo}` wrapper as the JSON body. `GET`
//! calls carry the wrapper too, because the driver reads the connection name
//! from the body.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::cache::{CachedRequestExecutor, ResponseCache};
use super::http::DriverHttpClient;
use super::{DriverError, DriverRequest, DriverTransport};

/// Transport A: synchronous HTTP calls
#[derive(Clone)]
pub struct RestTransport {
    base_url: String,
    executor: CachedRequestExecutor,
    cache: ResponseCache<Value>,
}

impl RestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DriverError> {
        Self::with_cache(base_url, timeout, ResponseCache::new())
    }

    /// Build a transport sharing an existing response cache
    pub fn with_cache(
        base_url: &str,
        timeout: Duration,
        cache: ResponseCache<Value>,
    ) -> Result<Self, DriverError> {
        Url::parse(base_url)
            .map_err(|e| DriverError::Config(format!("invalid driver url {}: {}", base_url, e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            executor: CachedRequestExecutor::new(DriverHttpClient::new(timeout)?),
            cache,
        })
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    /// Build the full URL for a request
    pub fn url_for(&self, request: &DriverRequest) -> Result<String, DriverError> {
        let (_, path) = request.operation.rest_route();
        let mut raw = format!("{}/{}", self.base_url, path);
        if let Some(target) = &request.target {
            raw.push('/');
            raw.push_str(&urlencoding::encode(target));
        }

        let mut url = Url::parse(&raw)
            .map_err(|e| DriverError::Config(format!("invalid request url {}: {}", raw, e)))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl DriverTransport for RestTransport {
    async fn invoke(&self, request: &DriverRequest) -> Result<Value, DriverError> {
        let (method, _) = request.operation.rest_route();
        let url = self.url_for(request)?;
        let body = request.wrapper();

        tracing::debug!(
            "rest invoke: operation={}, connection={}",
            request.operation,
            request.connection_name
        );

        self.executor
            .execute(
                &self.cache,
                method,
                &url,
                &[],
                Some(&body),
                request.operation.cache_duration(),
            )
            .await
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}
