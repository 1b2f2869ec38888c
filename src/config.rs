//! Configuration Management
//!
//! Settings come from `<config_dir>/mcplane/config.json`, then environment
//! variables, then CLI flags (applied by the binary).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::CallMethod;

/// Default driver REST endpoint
pub const DEFAULT_DRIVER_REST_URL: &str = "http://localhost:1024/spider";

/// Default timeout for one driver call
pub const DEFAULT_DRIVER_TIMEOUT_SECS: u64 = 60;

fn default_rest_url() -> String {
    DEFAULT_DRIVER_REST_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_DRIVER_TIMEOUT_SECS
}

fn default_rpc_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join("rpc_conf.yaml")
}

fn default_store_path() -> PathBuf {
    app_dir(dirs::data_dir()).join("store.json")
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = base {
        return dir.join("mcplane");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".mcplane");
    }
    PathBuf::from(".mcplane")
}

/// Control plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport switch: REST or RPC
    #[serde(default)]
    pub call_method: CallMethod,
    /// Driver base URL for the REST transport
    #[serde(default = "default_rest_url")]
    pub driver_rest_url: String,
    /// YAML file configuring the RPC transport
    #[serde(default = "default_rpc_config_path")]
    pub rpc_config_path: PathBuf,
    /// Per-call timeout for driver requests
    #[serde(default = "default_timeout_secs")]
    pub driver_timeout_secs: u64,
    /// Key store file used by the CLI
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_method: CallMethod::default(),
            driver_rest_url: default_rest_url(),
            rpc_config_path: default_rpc_config_path(),
            driver_timeout_secs: default_timeout_secs(),
            store_path: default_store_path(),
        }
    }
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mcplane").join("config.json"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn load_file() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(method) = lookup("DRIVER_CALL_METHOD") {
            match method.parse() {
                Ok(m) => self.call_method = m,
                Err(e) => tracing::warn!("{}; keeping {:?}", e, self.call_method),
            }
        }
        if let Some(url) = lookup("DRIVER_REST_URL") {
            self.driver_rest_url = url;
        }
        if let Some(path) = lookup("DRIVER_RPC_CONFIG") {
            self.rpc_config_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("MCPLANE_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_timeout_secs)
    }
}
