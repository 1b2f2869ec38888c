//! Security group provisioning
//!
//! A security group lives inside a vNet. In register mode the vNet may be
//! left unset, in which case the first vNet on the same connection is used.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pipeline::load_dependency;
use super::vnet::VNetDetails;
use super::{check_name, remote_name, require, DriverOutcome, Provision, ProvisionMode, ResourceKind, ResourceRecord};
use crate::driver::types::{SecurityReqInfo, SecurityRuleInfo};
use crate::driver::DriverClient;
use crate::error::{Error, Result};
use crate::store::{self, keys, KeyValueStore};

/// Placeholder some callers send for "no vNet given"
const VNET_NOT_DEFINED: &str = "not defined";

/// One firewall rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub from_port: String,
    pub to_port: String,
    pub ip_protocol: String,
    pub direction: String,
    #[serde(default)]
    pub cidr: String,
}

impl From<&FirewallRule> for SecurityRuleInfo {
    fn from(rule: &FirewallRule) -> Self {
        SecurityRuleInfo {
            from_port: rule.from_port.clone(),
            to_port: rule.to_port.clone(),
            ip_protocol: rule.ip_protocol.clone(),
            direction: rule.direction.clone(),
            cidr: rule.cidr.clone(),
        }
    }
}

impl From<SecurityRuleInfo> for FirewallRule {
    fn from(rule: SecurityRuleInfo) -> Self {
        FirewallRule {
            from_port: rule.from_port,
            to_port: rule.to_port,
            ip_protocol: rule.ip_protocol,
            direction: rule.direction,
            cidr: rule.cidr,
        }
    }
}

/// Request to create or register a security group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupReq {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub v_net_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub firewall_rules: Option<Vec<FirewallRule>>,
    /// CSP-native id, used in register mode
    #[serde(default)]
    pub csp_security_group_id: String,

    /// Driver-side name of the resolved vNet
    #[serde(skip)]
    pub vpc_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupDetails {
    pub v_net_id: String,
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRule>,
}

impl SecurityGroupReq {
    fn v_net_unset(&self) -> bool {
        self.v_net_id.is_empty() || self.v_net_id == VNET_NOT_DEFINED
    }

    fn to_driver(&self, ns: &str) -> SecurityReqInfo {
        SecurityReqInfo {
            name: remote_name(ns, &self.name),
            vpc_name: self.vpc_name.clone(),
            security_rules: self
                .firewall_rules
                .iter()
                .flatten()
                .map(SecurityRuleInfo::from)
                .collect(),
            csp_id: self.csp_security_group_id.clone(),
        }
    }
}

#[async_trait]
impl Provision for SecurityGroupReq {
    type Details = SecurityGroupDetails;

    const KIND: ResourceKind = ResourceKind::SecurityGroup;

    fn id(&self) -> &str {
        &self.name
    }

    fn connection_name(&self) -> &str {
        &self.connection_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn csp_resource_id(&self) -> &str {
        &self.csp_security_group_id
    }

    fn validate(&self, mode: ProvisionMode) -> Result<()> {
        check_name("name", &self.name)?;
        require("connectionName", &self.connection_name)?;

        if mode == ProvisionMode::Create {
            if self.v_net_unset() {
                return Err(Error::validation("vNetId is required"));
            }
            let Some(rules) = &self.firewall_rules else {
                return Err(Error::validation("firewallRules is required"));
            };
            for rule in rules {
                require("firewall rule fromPort", &rule.from_port)?;
                require("firewall rule toPort", &rule.to_port)?;
                require("firewall rule ipProtocol", &rule.ip_protocol)?;
                require("firewall rule direction", &rule.direction)?;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, ns: &str, mode: ProvisionMode, store: &dyn KeyValueStore) -> Result<()> {
        if mode == ProvisionMode::Register && self.v_net_unset() {
            let vnets: Vec<ResourceRecord<VNetDetails>> =
                store::list_json(store, &keys::resource_prefix(ns, ResourceKind::VNet))?;
            let Some(first) = vnets.into_iter().find(|v| v.connection_name == self.connection_name) else {
                return Err(Error::DependencyNotFound {
                    namespace: ns.to_string(),
                    kind: ResourceKind::VNet.to_string(),
                    id: format!("<any on connection {}>", self.connection_name),
                });
            };
            tracing::debug!("security group {} adopts vNet {}", self.name, first.id);
            self.v_net_id = first.id;
        }

        let vnet: ResourceRecord<VNetDetails> = load_dependency(store, ns, ResourceKind::VNet, &self.v_net_id)?;
        if vnet.connection_name != self.connection_name {
            return Err(Error::validation(format!(
                "vNet '{}' is on connection '{}', not '{}'",
                vnet.id, vnet.connection_name, self.connection_name
            )));
        }
        self.vpc_name = vnet.csp_resource_name;
        Ok(())
    }

    async fn invoke(
        &self,
        ns: &str,
        mode: ProvisionMode,
        driver: &DriverClient,
    ) -> Result<DriverOutcome<SecurityGroupDetails>> {
        let conn = &self.connection_name;
        let info = match mode {
            ProvisionMode::Create => driver.create_security_group(conn, &self.to_driver(ns)).await?,
            ProvisionMode::Register if self.csp_security_group_id.is_empty() => {
                driver.get_security_group(conn, &self.name).await?
            }
            ProvisionMode::Register => {
                driver
                    .register_security_group(conn, &self.to_driver(ns))
                    .await?
            }
        };

        Ok(DriverOutcome {
            iid: info.iid,
            key_value_list: info.key_value_list,
            details: SecurityGroupDetails {
                v_net_id: self.v_net_id.clone(),
                firewall_rules: info.security_rules.into_iter().map(FirewallRule::from).collect(),
            },
        })
    }
}
