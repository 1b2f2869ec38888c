//! Custom machine images
//!
//! Images are either registered from an existing provider image or created
//! as a snapshot of an MCIS member VM.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::mcis::VmRecord;
use super::{check_name, remote_name, require, DriverOutcome, Pipeline, Provision, ProvisionMode, ResourceKind, ResourceRecord};
use crate::driver::types::MyImageReqInfo;
use crate::driver::DriverClient;
use crate::error::{Error, Result};
use crate::store::{self, keys, KeyValueStore};

/// VM a snapshot is taken from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSource {
    pub mcis_id: String,
    pub vm_id: String,
}

/// Request to create or register a custom image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomImageReq {
    pub name: String,
    #[serde(default)]
    pub connection_name: String,
    #[serde(default)]
    pub description: String,
    /// CSP-native id, used in register mode
    #[serde(default)]
    pub csp_custom_image_id: String,
    /// Required in create mode
    #[serde(default)]
    pub source: Option<SnapshotSource>,

    /// Driver-side name of the source VM
    #[serde(skip)]
    source_vm_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomImageDetails {
    #[serde(default)]
    pub source_vm_id: String,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub guest_os: String,
}

#[async_trait]
impl Provision for CustomImageReq {
    type Details = CustomImageDetails;

    const KIND: ResourceKind = ResourceKind::CustomImage;

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
        &self.csp_custom_image_id
    }

    fn validate(&self, mode: ProvisionMode) -> Result<()> {
        check_name("name", &self.name)?;
        match mode {
            ProvisionMode::Create => {
                let Some(source) = &self.source else {
                    return Err(Error::validation("source VM is required to create a custom image"));
                };
                check_name("mcisId", &source.mcis_id)?;
                check_name("vmId", &source.vm_id)
            }
            ProvisionMode::Register => require("connectionName", &self.connection_name),
        }
    }

    fn resolve(&mut self, ns: &str, mode: ProvisionMode, store: &dyn KeyValueStore) -> Result<()> {
        if mode != ProvisionMode::Create {
            return Ok(());
        }
        let Some(source) = &self.source else {
            return Ok(());
        };

        let vm: VmRecord = store::get_json(store, &keys::vm_key(ns, &source.mcis_id, &source.vm_id))?
            .ok_or_else(|| Error::DependencyNotFound {
                namespace: ns.to_string(),
                kind: "vm".to_string(),
                id: format!("{}/{}", source.mcis_id, source.vm_id),
            })?;

        self.connection_name = vm.connection_name;
        self.source_vm_name = vm.csp_vm_name;
        Ok(())
    }

    async fn invoke(
        &self,
        ns: &str,
        mode: ProvisionMode,
        driver: &DriverClient,
    ) -> Result<DriverOutcome<CustomImageDetails>> {
        let conn = &self.connection_name;
        let info = match mode {
            ProvisionMode::Create => {
                let req = MyImageReqInfo {
                    name: remote_name(ns, &self.name),
                    source_vm: self.source_vm_name.clone(),
                    csp_id: String::new(),
                };
                driver.create_my_image(conn, &req).await?
            }
            ProvisionMode::Register if self.csp_custom_image_id.is_empty() => {
                driver.get_my_image(conn, &self.name).await?
            }
            ProvisionMode::Register => {
                let req = MyImageReqInfo {
                    name: self.name.clone(),
                    source_vm: String::new(),
                    csp_id: self.csp_custom_image_id.clone(),
                };
                driver.register_my_image(conn, &req).await?
            }
        };

        let source_vm_id = match &self.source {
            Some(source) => source.vm_id.clone(),
            None => info.source_vm.name_id.clone(),
        };

        Ok(DriverOutcome {
            iid: info.iid,
            key_value_list: info.key_value_list,
            details: CustomImageDetails {
                source_vm_id,
                creation_date: info.created_time,
                status: info.status,
                guest_os: String::new(),
            },
        })
    }
}

impl Pipeline {
    /// Snapshot a member VM into a new custom image.
    ///
    /// An empty `name` gets a generated one.
    pub async fn snapshot_vm(
        &self,
        ns: &str,
        mcis_id: &str,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ResourceRecord<CustomImageDetails>> {
        let name = if name.is_empty() {
            format!("snapshot-{}", uuid::Uuid::new_v4())
        } else {
            name.to_string()
        };

        let req = CustomImageReq {
            name,
            description: description.to_string(),
            source: Some(SnapshotSource {
                mcis_id: mcis_id.to_string(),
                vm_id: vm_id.to_string(),
            }),
            ..Default::default()
        };
        self.provision(ns, req, ProvisionMode::Create).await
    }
}
