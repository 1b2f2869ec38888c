//! Resource provisioning
//!
//! Every resource kind goes through the same [`pipeline::Pipeline`]:
//! validate, check uniqueness, resolve dependencies, call the driver, turn the
//! reply into a [`ResourceRecord`] and persist it. A kind only describes its
//! own request validation, dependency lookup and driver translation by
//! implementing [`Provision`].
//!
//! # Kinds
//!
//! - [`vnet`] - virtual networks
//! - [`security_group`] - firewall groups bound to a vNet
//! - [`ssh_key`] - key pairs
//! - [`custom_image`] - machine images, including VM snapshots
//! - [`mcis`] - VM groups adopted from existing VMs

pub mod custom_image;
pub mod mcis;
pub mod pipeline;
pub mod security_group;
pub mod ssh_key;
pub mod vnet;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::driver::types::{Iid, KeyValue};
use crate::driver::DriverClient;
use crate::error::{Error, Result};
use crate::store::KeyValueStore;

pub use pipeline::Pipeline;

/// `systemLabel` of a record adopted by looking the remote object up by name
pub const LABEL_REGISTERED_BY_NAME: &str = "Registered from driver resource by name";

/// `systemLabel` of a record adopted by its CSP-native id
pub const LABEL_REGISTERED_BY_ID: &str = "Registered from CSP resource by id";

/// Provisionable resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    VNet,
    SecurityGroup,
    SshKey,
    CustomImage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::VNet,
        ResourceKind::SecurityGroup,
        ResourceKind::SshKey,
        ResourceKind::CustomImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VNet => "vNet",
            ResourceKind::SecurityGroup => "securityGroup",
            ResourceKind::SshKey => "sshKey",
            ResourceKind::CustomImage => "customImage",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation(format!("unknown resource kind: {}", s)))
    }
}

/// Create a new remote resource, or adopt one that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionMode {
    #[default]
    Create,
    Register,
}

impl FromStr for ProvisionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" | "" => Ok(Self::Create),
            "register" => Ok(Self::Register),
            other => Err(Error::validation(format!(
                "option should be 'create' or 'register', got '{}'",
                other
            ))),
        }
    }
}

/// Canonical record of a provisioned resource. `details` holds the
/// kind-specific fields and is flattened into the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord<D> {
    pub id: String,
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub csp_resource_id: String,
    #[serde(default)]
    pub csp_resource_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub details: D,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
    #[serde(default)]
    pub associated_object_list: Vec<String>,
    #[serde(default)]
    pub is_auto_generated: bool,
    #[serde(default)]
    pub system_label: String,
}

/// Driver reply reduced to what the pipeline needs
#[derive(Debug, Clone)]
pub struct DriverOutcome<D> {
    pub iid: Iid,
    pub key_value_list: Vec<KeyValue>,
    pub details: D,
}

/// A kind-specific provisioning request
#[async_trait]
pub trait Provision: Send + Sync {
    type Details: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;

    const KIND: ResourceKind;

    /// Caller-supplied id, unique within `(namespace, kind)`
    fn id(&self) -> &str;

    fn connection_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// CSP-native id for registration. Empty means adopt by name.
    fn csp_resource_id(&self) -> &str {
        ""
    }

    /// Structural checks. Must not touch the store or driver.
    fn validate(&self, mode: ProvisionMode) -> Result<()>;

    /// Look up records this request depends on.
    fn resolve(&mut self, _ns: &str, _mode: ProvisionMode, _store: &dyn KeyValueStore) -> Result<()> {
        Ok(())
    }

    /// Translate, call the driver and translate the reply.
    async fn invoke(
        &self,
        ns: &str,
        mode: ProvisionMode,
        driver: &DriverClient,
    ) -> Result<DriverOutcome<Self::Details>>;
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap_or_else(|e| panic!("invalid name pattern: {}", e))
    })
}

/// Identifiers are lowercase alphanumerics and dashes, starting with a
/// letter and not ending with a dash.
pub fn check_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    if !name_pattern().is_match(value) {
        return Err(Error::validation(format!(
            "{} '{}' does not follow the naming convention \
             (lowercase letters, digits and '-', starting with a letter)",
            field, value
        )));
    }
    Ok(())
}

pub fn check_namespace(ns: &str) -> Result<()> {
    check_name("namespace", ns)
}

/// Non-empty check for free-form required fields
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Remote name used for resources the driver creates: `{ns}-{name}`
pub fn remote_name(ns: &str, name: &str) -> String {
    format!("{}-{}", ns, name)
}
