//! RPC transport
//!
//! Every call opens an [`RpcHandle`] from the YAML config file, sends the
//! JSON payload to the verb's endpoint and drops the handle. The handle is
//! released by `Drop`, so error paths cannot leak it.
//!
//! Config file layout:
//!
//! ```yaml
//! driver:
//!   server_address: 127.0.0.1:2048
//!   timeout_secs: 90
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::http::sanitize_for_log;
use super::{DriverError, DriverRequest, DriverTransport};

fn default_timeout_secs() -> u64 {
    90
}

/// RPC client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub driver: RpcEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpoint {
    pub server_address: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RpcConfig {
    pub async fn load(path: &Path) -> Result<Self, DriverError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DriverError::Config(format!("failed to read rpc config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            DriverError::Config(format!("failed to parse rpc config {}: {}", path.display(), e))
        })
    }
}

/// Open connection to the driver's RPC endpoint
pub struct RpcHandle {
    base_url: String,
    client: Client,
    open_handles: Arc<AtomicUsize>,
}

impl RpcHandle {
    /// Load the config at `config_path` and open a handle.
    pub async fn open(config_path: &Path, open_handles: Arc<AtomicUsize>) -> Result<Self, DriverError> {
        let config = RpcConfig::load(config_path).await?;
        let address = config.driver.server_address.trim_end_matches('/');
        let base_url = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.driver.timeout_secs))
            .build()
            .map_err(|e| DriverError::Config(format!("rpc client open failed: {}", e)))?;

        open_handles.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("rpc handle opened: {}", base_url);

        Ok(Self {
            base_url,
            client,
            open_handles,
        })
    }

    /// Send a JSON payload to `verb` and return the raw JSON reply.
    ///
    /// Replies outside `[200, 400)` are [`DriverError::Status`], the same
    /// error the REST transport reports for the same answer.
    pub async fn call(&self, verb: &str, payload: &str) -> Result<String, DriverError> {
        let url = format!("{}/rpc/{}", self.base_url, verb);
        let rpc_error = |message: String| DriverError::Rpc {
            verb: verb.to_string(),
            message,
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| rpc_error(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| rpc_error(format!("failed to read reply: {}", e)))?;

        if !(status.is_success() || status.is_redirection()) {
            tracing::error!("rpc {} error: {} - {}", verb, status, sanitize_for_log(&text));
            return Err(DriverError::Status {
                url,
                status: status.as_u16(),
                body: sanitize_for_log(&text),
            });
        }

        Ok(text)
    }
}

impl Drop for RpcHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("rpc handle closed: {}", self.base_url);
    }
}

/// Transport B: RPC handle per call
#[derive(Clone)]
pub struct RpcTransport {
    config_path: PathBuf,
    open_handles: Arc<AtomicUsize>,
}

impl RpcTransport {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handles currently open; zero whenever no call is in flight
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Logical payload for the verb: the REST wrapper plus target and query
    /// fields, which the RPC binding cannot carry in a URL.
    pub fn payload(request: &DriverRequest) -> Value {
        let mut payload = request.wrapper();
        if let Value::Object(ref mut map) = payload {
            if let Some(target) = &request.target {
                map.insert("Name".to_string(), Value::String(target.clone()));
            }
            for (name, value) in &request.query {
                map.insert(capitalize(name), Value::String(value.clone()));
            }
        }
        payload
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl DriverTransport for RpcTransport {
    async fn invoke(&self, request: &DriverRequest) -> Result<Value, DriverError> {
        let verb = request.operation.verb();
        let handle = RpcHandle::open(&self.config_path, Arc::clone(&self.open_handles)).await?;

        let payload = serde_json::to_string(&Self::payload(request)).map_err(|e| DriverError::Rpc {
            verb: verb.to_string(),
            message: format!("failed to marshal payload: {}", e),
        })?;

        tracing::debug!(
            "rpc invoke: verb={}, connection={}",
            verb,
            request.connection_name
        );

        let reply = handle.call(verb, &payload).await?;
        if reply.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&reply).map_err(|e| DriverError::Decode {
            context: verb.to_string(),
            message: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "rpc"
    }
}
