//! Wire types exchanged with the cloud-abstraction driver.
//!
//! Field names follow the driver's PascalCase JSON. Response structs are
//! lenient: every field defaults so CSP-specific omissions still decode.

use serde::{Deserialize, Serialize};

/// Identifier pair assigned by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iid {
    #[serde(rename = "NameId", default)]
    pub name_id: String,
    #[serde(rename = "SystemId", default)]
    pub system_id: String,
}

/// Opaque key/value pair returned by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(alias = "Key", default)]
    pub key: String,
    #[serde(alias = "Value", default)]
    pub value: String,
}

// =============================================================================
// vNet
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpcReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList")]
    pub subnet_info_list: Vec<SubnetReqInfo>,
    #[serde(rename = "CSPId", skip_serializing_if = "String::is_empty")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpcInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList", default)]
    pub subnet_info_list: Vec<SubnetInfo>,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

// =============================================================================
// Security group
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRuleInfo {
    #[serde(rename = "FromPort", default)]
    pub from_port: String,
    #[serde(rename = "ToPort", default)]
    pub to_port: String,
    #[serde(rename = "IPProtocol", default)]
    pub ip_protocol: String,
    #[serde(rename = "Direction", default)]
    pub direction: String,
    #[serde(rename = "CIDR", default)]
    pub cidr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SecurityRules")]
    pub security_rules: Vec<SecurityRuleInfo>,
    #[serde(rename = "CSPId", skip_serializing_if = "String::is_empty")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "VpcIID", default)]
    pub vpc_iid: Iid,
    #[serde(rename = "SecurityRules", default)]
    pub security_rules: Vec<SecurityRuleInfo>,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

// =============================================================================
// Key pair
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPairReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CSPId", skip_serializing_if = "String::is_empty")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPairInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "Fingerprint", default)]
    pub fingerprint: String,
    #[serde(rename = "PublicKey", default)]
    pub public_key: String,
    #[serde(rename = "PrivateKey", default)]
    pub private_key: String,
    #[serde(rename = "VMUserID", default)]
    pub vm_user_id: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

// =============================================================================
// Machine image (snapshot)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyImageReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "SourceVM", skip_serializing_if = "String::is_empty")]
    pub source_vm: String,
    #[serde(rename = "CSPId", skip_serializing_if = "String::is_empty")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyImageInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "SourceVM", default)]
    pub source_vm: Iid,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

// =============================================================================
// VM
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmRegReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CSPId")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmInfo {
    #[serde(rename = "IId", default)]
    pub iid: Iid,
    #[serde(rename = "PublicIP", default)]
    pub public_ip: String,
    #[serde(rename = "PrivateIP", default)]
    pub private_ip: String,
    #[serde(rename = "VMUserId", default)]
    pub vm_user_id: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<KeyValue>,
}

/// Status reported by status and control calls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmStatusInfo {
    #[serde(rename = "Status", default)]
    pub status: String,
}
