//! vNet (virtual network) provisioning

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_name, remote_name, require, DriverOutcome, Provision, ProvisionMode, ResourceKind};
use crate::driver::types::{KeyValue, SubnetReqInfo, VpcInfo, VpcReqInfo};
use crate::driver::DriverClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetReq {
    pub name: String,
    pub ipv4_cidr: String,
}

/// Request to create or register a vNet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VNetReq {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub subnet_info_list: Vec<SubnetReq>,
    #[serde(default)]
    pub description: String,
    /// CSP-native id, used in register mode
    #[serde(default)]
    pub csp_v_net_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetRecord {
    pub id: String,
    pub name: String,
    pub ipv4_cidr: String,
    #[serde(default)]
    pub csp_subnet_id: String,
    #[serde(default)]
    pub csp_subnet_name: String,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VNetDetails {
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub subnet_info_list: Vec<SubnetRecord>,
}

impl VNetReq {
    fn to_driver(&self, ns: &str) -> VpcReqInfo {
        VpcReqInfo {
            name: remote_name(ns, &self.name),
            ipv4_cidr: self.cidr_block.clone(),
            subnet_info_list: self
                .subnet_info_list
                .iter()
                .map(|s| SubnetReqInfo {
                    name: remote_name(ns, &s.name),
                    ipv4_cidr: s.ipv4_cidr.clone(),
                })
                .collect(),
            csp_id: String::new(),
        }
    }

    fn details_from(&self, ns: &str, info: &VpcInfo) -> VNetDetails {
        let subnets = info
            .subnet_info_list
            .iter()
            .map(|s| {
                // Strip our "{ns}-" prefix to recover the local subnet id
                let local = s
                    .iid
                    .name_id
                    .strip_prefix(&format!("{}-", ns))
                    .unwrap_or(&s.iid.name_id)
                    .to_string();
                SubnetRecord {
                    id: local.clone(),
                    name: local,
                    ipv4_cidr: s.ipv4_cidr.clone(),
                    csp_subnet_id: s.iid.system_id.clone(),
                    csp_subnet_name: s.iid.name_id.clone(),
                    key_value_list: s.key_value_list.clone(),
                }
            })
            .collect();

        VNetDetails {
            cidr_block: if info.ipv4_cidr.is_empty() {
                self.cidr_block.clone()
            } else {
                info.ipv4_cidr.clone()
            },
            subnet_info_list: subnets,
        }
    }
}

#[async_trait]
impl Provision for VNetReq {
    type Details = VNetDetails;

    const KIND: ResourceKind = ResourceKind::VNet;

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
        &self.csp_v_net_id
    }

    fn validate(&self, mode: ProvisionMode) -> Result<()> {
        check_name("name", &self.name)?;
        require("connectionName", &self.connection_name)?;

        if mode == ProvisionMode::Create {
            require("cidrBlock", &self.cidr_block)?;
            if self.subnet_info_list.is_empty() {
                return Err(Error::validation("subnetInfoList needs at least one subnet"));
            }
            for subnet in &self.subnet_info_list {
                check_name("subnet name", &subnet.name)?;
                require("subnet ipv4Cidr", &subnet.ipv4_cidr)?;
            }
        }
        Ok(())
    }

    async fn invoke(
        &self,
        ns: &str,
        mode: ProvisionMode,
        driver: &DriverClient,
    ) -> Result<DriverOutcome<VNetDetails>> {
        let conn = &self.connection_name;
        let info = match mode {
            ProvisionMode::Create => driver.create_vpc(conn, &self.to_driver(ns)).await?,
            ProvisionMode::Register if self.csp_v_net_id.is_empty() => {
                driver.get_vpc(conn, &self.name).await?
            }
            ProvisionMode::Register => {
                let req = VpcReqInfo {
                    name: self.name.clone(),
                    csp_id: self.csp_v_net_id.clone(),
                    ..Default::default()
                };
                driver.register_vpc(conn, &req).await?
            }
        };

        Ok(DriverOutcome {
            details: self.details_from(ns, &info),
            iid: info.iid,
            key_value_list: info.key_value_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::types::{Iid, SubnetInfo};

    fn request() -> VNetReq {
        VNetReq {
            name: "vnet01".into(),
            connection_name: "aws-ap-northeast-2".into(),
            cidr_block: "192.168.0.0/16".into(),
            subnet_info_list: vec![SubnetReq {
                name: "subnet01".into(),
                ipv4_cidr: "192.168.1.0/24".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_requires_subnets() {
        let mut req = request();
        req.subnet_info_list.clear();
        assert!(req.validate(ProvisionMode::Create).is_err());
        // register mode adopts whatever exists remotely
        assert!(req.validate(ProvisionMode::Register).is_ok());
    }

    #[test]
    fn test_driver_names_are_namespaced() {
        let info = request().to_driver("ns01");
        assert_eq!(info.name, "ns01-vnet01");
        assert_eq!(info.subnet_info_list[0].name, "ns01-subnet01");
    }

    #[test]
    fn test_details_recover_local_subnet_names() {
        let info = VpcInfo {
            iid: Iid {
                name_id: "ns01-vnet01".into(),
                system_id: "vpc-1".into(),
            },
            ipv4_cidr: String::new(),
            subnet_info_list: vec![SubnetInfo {
                iid: Iid {
                    name_id: "ns01-subnet01".into(),
                    system_id: "subnet-1".into(),
                },
                ipv4_cidr: "192.168.1.0/24".into(),
                key_value_list: vec![],
            }],
            key_value_list: vec![],
        };
        let details = request().details_from("ns01", &info);
        assert_eq!(details.cidr_block, "192.168.0.0/16");
        assert_eq!(details.subnet_info_list[0].id, "subnet01");
        assert_eq!(details.subnet_info_list[0].csp_subnet_id, "subnet-1");
    }
}
