//! Driver access layer
//!
//! Talks to the remote cloud-abstraction driver that hides provider
//! differences. Two transports implement [`DriverTransport`]:
//!
//! - [`rest::RestTransport`] - synchronous REST calls under a base URL, routed
//!   through the [`cache::CachedRequestExecutor`]
//! - [`rpc::RpcTransport`] - per-call RPC handle opened from a config file
//!
//! The transport is picked once at startup from [`CallMethod`] and injected
//! into a [`DriverClient`]. Everything above the client is transport-agnostic.
//!
//! # Example
//!
//! ```ignore
//! use mcplane::driver::{DriverClient, types::KeyPairReqInfo};
//!
//! async fn example(client: &DriverClient) -> mcplane::Result<()> {
//!     let req = KeyPairReqInfo { name: "key01".into(), ..Default::default() };
//!     let info = client.create_key_pair("aws-ap-northeast-2", &req).await?;
//!     println!("{}", info.iid.system_id);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;
pub mod rest;
pub mod rpc;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Config;
use crate::error::{Error, Result};
use types::*;

/// Transport-level driver failure
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("[Error from: {url}] Message: {message}")]
    Transport { url: String, message: String },

    #[error("[Error from: {url}] Status code: {status} {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {context}: {message}")]
    Decode { context: String, message: String },

    #[error("rpc {verb} failed: {message}")]
    Rpc { verb: String, message: String },

    #[error("driver configuration error: {0}")]
    Config(String),

    #[error("unsupported rest method: {0}")]
    UnsupportedMethod(String),
}

/// Process-wide transport switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallMethod {
    #[default]
    Rest,
    Rpc,
}

impl std::str::FromStr for CallMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REST" => Ok(Self::Rest),
            "RPC" | "GRPC" => Ok(Self::Rpc),
            other => Err(format!("unknown driver call method: {}", other)),
        }
    }
}

/// Every call the control plane makes to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateVpc,
    RegisterVpc,
    GetVpc,
    CreateSecurity,
    RegisterSecurity,
    GetSecurity,
    CreateKey,
    RegisterKey,
    GetKey,
    CreateMyImage,
    RegisterMyImage,
    GetMyImage,
    RegisterVm,
    GetVmStatus,
    ControlVm,
    TerminateVm,
}

impl Operation {
    /// RPC verb, also used to tag errors
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::CreateVpc => "CreateVPC",
            Operation::RegisterVpc => "RegisterVPC",
            Operation::GetVpc => "GetVPC",
            Operation::CreateSecurity => "CreateSecurity",
            Operation::RegisterSecurity => "RegisterSecurity",
            Operation::GetSecurity => "GetSecurity",
            Operation::CreateKey => "CreateKey",
            Operation::RegisterKey => "RegisterKey",
            Operation::GetKey => "GetKey",
            Operation::CreateMyImage => "CreateMyImage",
            Operation::RegisterMyImage => "RegisterMyImage",
            Operation::GetMyImage => "GetMyImage",
            Operation::RegisterVm => "RegisterVM",
            Operation::GetVmStatus => "GetVMStatus",
            Operation::ControlVm => "ControlVM",
            Operation::TerminateVm => "TerminateVM",
        }
    }

    /// REST method and resource path (without the target name)
    pub fn rest_route(&self) -> (Method, &'static str) {
        match self {
            Operation::CreateVpc => (Method::POST, "vpc"),
            Operation::RegisterVpc => (Method::POST, "regvpc"),
            Operation::GetVpc => (Method::GET, "vpc"),
            Operation::CreateSecurity => (Method::POST, "securitygroup"),
            Operation::RegisterSecurity => (Method::POST, "regsecuritygroup"),
            Operation::GetSecurity => (Method::GET, "securitygroup"),
            Operation::CreateKey => (Method::POST, "keypair"),
            Operation::RegisterKey => (Method::POST, "regkeypair"),
            Operation::GetKey => (Method::GET, "keypair"),
            Operation::CreateMyImage => (Method::POST, "myimage"),
            Operation::RegisterMyImage => (Method::POST, "regmyimage"),
            Operation::GetMyImage => (Method::GET, "myimage"),
            Operation::RegisterVm => (Method::POST, "regvm"),
            Operation::GetVmStatus => (Method::GET, "vmstatus"),
            Operation::ControlVm => (Method::PUT, "controlvm"),
            Operation::TerminateVm => (Method::DELETE, "vm"),
        }
    }

    /// True for calls that create something remotely
    pub fn provisions(&self) -> bool {
        matches!(
            self,
            Operation::CreateVpc
                | Operation::CreateSecurity
                | Operation::CreateKey
                | Operation::CreateMyImage
        )
    }

    /// How long a successful read may be served from cache
    pub fn cache_duration(&self) -> Duration {
        match self {
            Operation::GetVmStatus => cache::SHORT_DURATION,
            _ => cache::MEDIUM_DURATION,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// One logical driver call, independent of transport
#[derive(Debug, Clone)]
pub struct DriverRequest {
    pub operation: Operation,
    pub connection_name: String,
    /// Remote resource name for calls addressed to one object
    pub target: Option<String>,
    pub query: Vec<(String, String)>,
    /// Kind-specific `ReqInfo` payload
    pub req_info: Option<Value>,
}

impl DriverRequest {
    pub fn new(operation: Operation, connection_name: &str) -> Self {
        Self {
            operation,
            connection_name: connection_name.to_string(),
            target: None,
            query: Vec::new(),
            req_info: None,
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_req_info<R: Serialize>(mut self, req_info: &R) -> Result<Self> {
        let value = serde_json::to_value(req_info).map_err(|e| Error::Driver {
            operation: self.operation.verb().to_string(),
            connection: self.connection_name.clone(),
            source: DriverError::Decode {
                context: "request payload".to_string(),
                message: e.to_string(),
            },
        })?;
        self.req_info = Some(value);
        Ok(self)
    }

    /// `{ConnectionName, ReqInfo}` wrapper sent to the driver
    pub fn wrapper(&self) -> Value {
        match &self.req_info {
            Some(info) => json!({
                "ConnectionName": self.connection_name,
                "ReqInfo": info,
            }),
            None => json!({ "ConnectionName": self.connection_name }),
        }
    }
}

/// A way of reaching the driver
#[async_trait]
pub trait DriverTransport: Send + Sync {
    /// Perform the call and return the decoded JSON response.
    async fn invoke(&self, request: &DriverRequest) -> std::result::Result<Value, DriverError>;

    /// Short transport name for logs
    fn name(&self) -> &'static str;
}

/// Typed facade over the selected transport
#[derive(Clone)]
pub struct DriverClient {
    transport: Arc<dyn DriverTransport>,
}

impl DriverClient {
    pub fn new(transport: Arc<dyn DriverTransport>) -> Self {
        Self { transport }
    }

    /// Build the transport selected by `config.call_method`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn DriverTransport> = match config.call_method {
            CallMethod::Rest => Arc::new(
                rest::RestTransport::new(&config.driver_rest_url, config.driver_timeout())
                    .map_err(|e| config_error(&e))?,
            ),
            CallMethod::Rpc => Arc::new(rpc::RpcTransport::new(&config.rpc_config_path)),
        };
        tracing::info!("driver transport: {}", transport.name());
        Ok(Self::new(transport))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Invoke and decode into `T`. Failures are tagged with operation and connection.
    pub async fn call<T: DeserializeOwned>(&self, request: DriverRequest) -> Result<T> {
        let tag = |source: DriverError| Error::Driver {
            operation: request.operation.verb().to_string(),
            connection: request.connection_name.clone(),
            source,
        };

        let raw = self.transport.invoke(&request).await.map_err(tag)?;
        serde_json::from_value(raw).map_err(|e| {
            tag(DriverError::Decode {
                context: request.operation.verb().to_string(),
                message: e.to_string(),
            })
        })
    }

    // =========================================================================
    // vNet
    // =========================================================================

    pub async fn create_vpc(&self, connection: &str, req: &VpcReqInfo) -> Result<VpcInfo> {
        self.call(DriverRequest::new(Operation::CreateVpc, connection).with_req_info(req)?)
            .await
    }

    pub async fn register_vpc(&self, connection: &str, req: &VpcReqInfo) -> Result<VpcInfo> {
        self.call(DriverRequest::new(Operation::RegisterVpc, connection).with_req_info(req)?)
            .await
    }

    pub async fn get_vpc(&self, connection: &str, name: &str) -> Result<VpcInfo> {
        self.call(DriverRequest::new(Operation::GetVpc, connection).with_target(name))
            .await
    }

    // =========================================================================
    // Security group
    // =========================================================================

    pub async fn create_security_group(
        &self,
        connection: &str,
        req: &SecurityReqInfo,
    ) -> Result<SecurityInfo> {
        self.call(DriverRequest::new(Operation::CreateSecurity, connection).with_req_info(req)?)
            .await
    }

    pub async fn register_security_group(
        &self,
        connection: &str,
        req: &SecurityReqInfo,
    ) -> Result<SecurityInfo> {
        self.call(DriverRequest::new(Operation::RegisterSecurity, connection).with_req_info(req)?)
            .await
    }

    pub async fn get_security_group(&self, connection: &str, name: &str) -> Result<SecurityInfo> {
        self.call(DriverRequest::new(Operation::GetSecurity, connection).with_target(name))
            .await
    }

    // =========================================================================
    // Key pair
    // =========================================================================

    pub async fn create_key_pair(&self, connection: &str, req: &KeyPairReqInfo) -> Result<KeyPairInfo> {
        self.call(DriverRequest::new(Operation::CreateKey, connection).with_req_info(req)?)
            .await
    }

    pub async fn register_key_pair(
        &self,
        connection: &str,
        req: &KeyPairReqInfo,
    ) -> Result<KeyPairInfo> {
        self.call(DriverRequest::new(Operation::RegisterKey, connection).with_req_info(req)?)
            .await
    }

    pub async fn get_key_pair(&self, connection: &str, name: &str) -> Result<KeyPairInfo> {
        self.call(DriverRequest::new(Operation::GetKey, connection).with_target(name))
            .await
    }

    // =========================================================================
    // Machine image
    // =========================================================================

    pub async fn create_my_image(&self, connection: &str, req: &MyImageReqInfo) -> Result<MyImageInfo> {
        self.call(DriverRequest::new(Operation::CreateMyImage, connection).with_req_info(req)?)
            .await
    }

    pub async fn register_my_image(
        &self,
        connection: &str,
        req: &MyImageReqInfo,
    ) -> Result<MyImageInfo> {
        self.call(DriverRequest::new(Operation::RegisterMyImage, connection).with_req_info(req)?)
            .await
    }

    pub async fn get_my_image(&self, connection: &str, name: &str) -> Result<MyImageInfo> {
        self.call(DriverRequest::new(Operation::GetMyImage, connection).with_target(name))
            .await
    }

    // =========================================================================
    // VM
    // =========================================================================

    pub async fn register_vm(&self, connection: &str, req: &VmRegReqInfo) -> Result<VmInfo> {
        self.call(DriverRequest::new(Operation::RegisterVm, connection).with_req_info(req)?)
            .await
    }

    pub async fn get_vm_status(&self, connection: &str, vm_name: &str) -> Result<VmStatusInfo> {
        self.call(DriverRequest::new(Operation::GetVmStatus, connection).with_target(vm_name))
            .await
    }

    /// Suspend, resume or reboot a VM
    pub async fn control_vm(&self, connection: &str, vm_name: &str, action: &str) -> Result<VmStatusInfo> {
        self.call(
            DriverRequest::new(Operation::ControlVm, connection)
                .with_target(vm_name)
                .with_query("action", action),
        )
        .await
    }

    pub async fn terminate_vm(&self, connection: &str, vm_name: &str) -> Result<VmStatusInfo> {
        self.call(DriverRequest::new(Operation::TerminateVm, connection).with_target(vm_name))
            .await
    }
}

fn config_error(e: &DriverError) -> Error {
    Error::Validation(format!("invalid driver configuration: {}", e))
}
