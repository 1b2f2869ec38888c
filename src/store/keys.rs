//! Deterministic store keys.
//!
//! Layout:
//! - `/ns/{ns}/resources/{kind}/{id}` for provisioned resources
//! - `/ns/{ns}/mcis/{mcis}` for aggregates
//! - `/ns/{ns}/mcis/{mcis}/vm/{vm}` for aggregate members

use crate::resource::ResourceKind;

pub fn resource_key(ns: &str, kind: ResourceKind, id: &str) -> String {
    format!("/ns/{}/resources/{}/{}", ns, kind.as_str(), id)
}

/// Prefix covering every resource of one kind in a namespace
pub fn resource_prefix(ns: &str, kind: ResourceKind) -> String {
    format!("/ns/{}/resources/{}/", ns, kind.as_str())
}

pub fn mcis_key(ns: &str, mcis_id: &str) -> String {
    format!("/ns/{}/mcis/{}", ns, mcis_id)
}

pub fn vm_key(ns: &str, mcis_id: &str, vm_id: &str) -> String {
    format!("/ns/{}/mcis/{}/vm/{}", ns, mcis_id, vm_id)
}

/// Prefix covering every member VM of an aggregate
pub fn vm_prefix(ns: &str, mcis_id: &str) -> String {
    format!("/ns/{}/mcis/{}/vm/", ns, mcis_id)
}

/// Object reference stored in `associatedObjectList` entries.
pub fn vm_object_ref(ns: &str, mcis_id: &str, vm_id: &str) -> String {
    vm_key(ns, mcis_id, vm_id)
}
