//! SSH key pair provisioning

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_name, remote_name, require, DriverOutcome, Provision, ProvisionMode, ResourceKind};
use crate::driver::types::{KeyPairInfo, KeyPairReqInfo};
use crate::driver::DriverClient;
use crate::error::Result;

/// Request to create or register an SSH key pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyReq {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub description: String,
    /// CSP-native id, used in register mode
    #[serde(default)]
    pub csp_ssh_key_id: String,

    // Caller-known key material, kept when the driver does not report it
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub verified_username: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyDetails {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub verified_username: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

fn prefer(reported: String, fallback: &str) -> String {
    if reported.is_empty() {
        fallback.to_string()
    } else {
        reported
    }
}

impl SshKeyReq {
    fn details_from(&self, info: KeyPairInfo) -> SshKeyDetails {
        SshKeyDetails {
            fingerprint: prefer(info.fingerprint, &self.fingerprint),
            username: prefer(info.vm_user_id, &self.username),
            verified_username: self.verified_username.clone(),
            public_key: prefer(info.public_key, &self.public_key),
            private_key: prefer(info.private_key, &self.private_key),
        }
    }
}

#[async_trait]
impl Provision for SshKeyReq {
    type Details = SshKeyDetails;

    const KIND: ResourceKind = ResourceKind::SshKey;

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
        &self.csp_ssh_key_id
    }

    fn validate(&self, _mode: ProvisionMode) -> Result<()> {
        check_name("name", &self.name)?;
        require("connectionName", &self.connection_name)
    }

    async fn invoke(
        &self,
        ns: &str,
        mode: ProvisionMode,
        driver: &DriverClient,
    ) -> Result<DriverOutcome<SshKeyDetails>> {
        let conn = &self.connection_name;
        let info = match mode {
            ProvisionMode::Create => {
                let req = KeyPairReqInfo {
                    name: remote_name(ns, &self.name),
                    csp_id: String::new(),
                };
                driver.create_key_pair(conn, &req).await?
            }
            ProvisionMode::Register if self.csp_ssh_key_id.is_empty() => {
                driver.get_key_pair(conn, &self.name).await?
            }
            ProvisionMode::Register => {
                let req = KeyPairReqInfo {
                    name: self.name.clone(),
                    csp_id: self.csp_ssh_key_id.clone(),
                };
                driver.register_key_pair(conn, &req).await?
            }
        };

        let iid = info.iid.clone();
        let key_value_list = info.key_value_list.clone();
        Ok(DriverOutcome {
            iid,
            key_value_list,
            details: self.details_from(info),
        })
    }
}
