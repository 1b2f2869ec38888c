//! MCIS registration
//!
//! An MCIS is a group of VMs controlled as one unit. Registration adopts
//! VMs that already run at their providers: each member is registered with
//! the driver by CSP id and its status is read back. Records are written only
//! after every member succeeded.

use serde::{Deserialize, Serialize};

use super::pipeline::load_dependency;
use super::{check_name, check_namespace, remote_name, require, Pipeline, ResourceKind};
use crate::control::VmStatus;
use crate::driver::types::{KeyValue, VmRegReqInfo};
use crate::error::{Error, Result};
use crate::store::{self, keys};

/// `systemLabel` of an MCIS adopted from existing VMs
pub const LABEL_REGISTERED_VMS: &str = "Registered from existing VMs";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McisRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_label: String,
}

/// Stored member of an MCIS
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRecord {
    pub id: String,
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub csp_vm_id: String,
    /// Name the driver knows the VM by; control calls address this
    #[serde(default)]
    pub csp_vm_name: String,
    #[serde(default)]
    pub status: VmStatus,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub vm_user_id: String,
    #[serde(default)]
    pub ssh_key_id: String,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRegisterReq {
    pub name: String,
    pub connection_name: String,
    pub csp_vm_id: String,
    #[serde(default)]
    pub ssh_key_id: String,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Request to adopt existing VMs as an MCIS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McisRegisterReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vms: Vec<VmRegisterReq>,
}

/// An MCIS with its members
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McisInfo {
    #[serde(flatten)]
    pub mcis: McisRecord,
    pub vms: Vec<VmRecord>,
}

impl McisRegisterReq {
    fn validate(&self) -> Result<()> {
        check_name("mcis name", &self.name)?;
        if self.vms.is_empty() {
            return Err(Error::validation("vms needs at least one VM"));
        }

        let mut seen = std::collections::HashSet::new();
        for vm in &self.vms {
            check_name("vm name", &vm.name)?;
            require("vm connectionName", &vm.connection_name)?;
            require("vm cspVmId", &vm.csp_vm_id)?;
            if !seen.insert(vm.name.as_str()) {
                return Err(Error::validation(format!("vm name '{}' is used twice", vm.name)));
            }
        }
        Ok(())
    }
}

impl Pipeline {
    /// Adopt a group of existing VMs as a new MCIS.
    pub async fn register_mcis(&self, ns: &str, req: McisRegisterReq) -> Result<McisInfo> {
        check_namespace(ns)?;
        req.validate()?;

        let mcis_key = keys::mcis_key(ns, &req.name);
        let _guard = self.locks().acquire(&mcis_key).await;

        if self.store().get(&mcis_key)?.is_some() {
            return Err(Error::Conflict {
                namespace: ns.to_string(),
                kind: "mcis".to_string(),
                id: req.name.clone(),
            });
        }

        // Every referenced key and security group must exist before the driver is touched
        for vm in &req.vms {
            if !vm.ssh_key_id.is_empty() {
                load_dependency::<serde_json::Value>(self.store(), ns, ResourceKind::SshKey, &vm.ssh_key_id)?;
            }
            for sg in &vm.security_group_ids {
                load_dependency::<serde_json::Value>(self.store(), ns, ResourceKind::SecurityGroup, sg)?;
            }
        }

        let mut vms = Vec::with_capacity(req.vms.len());
        for vm in &req.vms {
            let reg = VmRegReqInfo {
                name: remote_name(ns, &format!("{}-{}", req.name, vm.name)),
                csp_id: vm.csp_vm_id.clone(),
            };
            let info = self.driver().register_vm(&vm.connection_name, &reg).await.map_err(|e| {
                if !vms.is_empty() {
                    tracing::warn!(
                        "mcis {}/{} registration aborted after {} VM(s) were adopted remotely",
                        ns,
                        req.name,
                        vms.len()
                    );
                }
                e
            })?;
            let status = self
                .driver()
                .get_vm_status(&vm.connection_name, &info.iid.name_id)
                .await?;

            vms.push(VmRecord {
                id: vm.name.clone(),
                name: vm.name.clone(),
                connection_name: vm.connection_name.clone(),
                csp_vm_id: info.iid.system_id,
                csp_vm_name: info.iid.name_id,
                status: VmStatus::from_driver(&status.status),
                public_ip: info.public_ip,
                private_ip: info.private_ip,
                vm_user_id: info.vm_user_id,
                ssh_key_id: vm.ssh_key_id.clone(),
                security_group_ids: vm.security_group_ids.clone(),
                key_value_list: info.key_value_list,
                description: vm.description.clone(),
                system_label: String::new(),
            });
        }

        let mcis = McisRecord {
            id: req.name.clone(),
            name: req.name.clone(),
            description: req.description.clone(),
            system_label: LABEL_REGISTERED_VMS.to_string(),
        };
        self.persist(&mcis_key, &mcis)?;
        for vm in &vms {
            self.persist(&keys::vm_key(ns, &mcis.id, &vm.id), vm)?;
        }

        for vm in &vms {
            let object = keys::vm_object_ref(ns, &mcis.id, &vm.id);
            if !vm.ssh_key_id.is_empty() {
                self.add_associated_object(ns, ResourceKind::SshKey, &vm.ssh_key_id, &object)
                    .await?;
            }
            for sg in &vm.security_group_ids {
                self.add_associated_object(ns, ResourceKind::SecurityGroup, sg, &object)
                    .await?;
            }
        }

        tracing::info!("mcis {}/{} registered with {} VM(s)", ns, mcis.id, vms.len());
        Ok(McisInfo { mcis, vms })
    }

    pub fn get_mcis(&self, ns: &str, mcis_id: &str) -> Result<McisInfo> {
        check_namespace(ns)?;
        let mcis: McisRecord = store::get_json(self.store(), &keys::mcis_key(ns, mcis_id))?
            .ok_or_else(|| Error::NotFound(format!("mcis '{}' in namespace '{}'", mcis_id, ns)))?;
        let vms = store::list_json(self.store(), &keys::vm_prefix(ns, mcis_id))?;
        Ok(McisInfo { mcis, vms })
    }

    pub fn get_vm(&self, ns: &str, mcis_id: &str, vm_id: &str) -> Result<VmRecord> {
        check_namespace(ns)?;
        store::get_json(self.store(), &keys::vm_key(ns, mcis_id, vm_id))?.ok_or_else(|| {
            Error::NotFound(format!("vm '{}' of mcis '{}' in namespace '{}'", vm_id, mcis_id, ns))
        })
    }
}
