//! Lifecycle control dispatcher
//!
//! A single-VM action issues exactly one driver call. An aggregate action
//! fans out to every member concurrently; a failing member is reported and
//! the others still run. Nothing is rolled back.
//!
//! Without `force`, every targeted member's recorded status must allow the
//! action. One violation rejects the whole request before any driver call.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::{ControlAction, VmStatus};
use crate::driver::DriverError;
use crate::error::{Error, Result};
use crate::resource::mcis::VmRecord;
use crate::resource::{check_namespace, Pipeline};
use crate::store::keys;

/// Result of one member's action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOutcome {
    pub vm_id: String,
    pub succeeded: bool,
    /// Status after the action, as reported by the driver
    #[serde(default)]
    pub status: Option<VmStatus>,
    /// Member record was dropped by refine
    #[serde(default)]
    pub removed: bool,
    pub message: String,
}

/// Combined result of a control request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    pub namespace: String,
    pub mcis_id: String,
    #[serde(default)]
    pub vm_id: Option<String>,
    pub action: ControlAction,
    pub force: bool,
    pub message: String,
    pub members: Vec<MemberOutcome>,
}

impl ControlOutcome {
    pub fn failed(&self) -> impl Iterator<Item = &MemberOutcome> {
        self.members.iter().filter(|m| !m.succeeded)
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Pipeline,
}

impl Dispatcher {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Run `action` on one VM (`vm_id = Some`) or on every member of the MCIS.
    pub async fn dispatch(
        &self,
        ns: &str,
        mcis_id: &str,
        vm_id: Option<&str>,
        action: &str,
        force: bool,
    ) -> Result<ControlOutcome> {
        check_namespace(ns)?;
        let action: ControlAction = action.parse()?;

        match vm_id {
            Some(vm_id) => {
                if !action.applies_to_vm() {
                    return Err(Error::UnsupportedAction {
                        action: action.to_string(),
                        target: format!("a single VM ({}/{})", mcis_id, vm_id),
                    });
                }
                self.dispatch_vm(ns, mcis_id, vm_id, action, force).await
            }
            None if action == ControlAction::Refine => self.refine(ns, mcis_id, force).await,
            None => self.dispatch_mcis(ns, mcis_id, action, force).await,
        }
    }

    async fn dispatch_vm(
        &self,
        ns: &str,
        mcis_id: &str,
        vm_id: &str,
        action: ControlAction,
        force: bool,
    ) -> Result<ControlOutcome> {
        let vm = self.pipeline.get_vm(ns, mcis_id, vm_id)?;

        if !force {
            vm_precondition(action, &vm).map_err(|reason| Error::Precondition {
                action: action.to_string(),
                reason,
            })?;
        }

        let status = self.run_action(action, &vm).await?;
        // The action already ran remotely; a failed write is reported, not returned.
        if let Err(e) = self.record_status(ns, mcis_id, vm_id, status).await {
            tracing::warn!("could not record status of {}/{}/{}: {}", ns, mcis_id, vm_id, e);
        }

        tracing::info!("{} {}/{}/{} -> {}", action, ns, mcis_id, vm_id, status);
        Ok(ControlOutcome {
            namespace: ns.to_string(),
            mcis_id: mcis_id.to_string(),
            vm_id: Some(vm_id.to_string()),
            action,
            force,
            message: format!("{} VM {} in mcis {}: {}", action, vm_id, mcis_id, status),
            members: vec![MemberOutcome {
                vm_id: vm_id.to_string(),
                succeeded: true,
                status: Some(status),
                removed: false,
                message: "done".to_string(),
            }],
        })
    }

    async fn dispatch_mcis(
        &self,
        ns: &str,
        mcis_id: &str,
        action: ControlAction,
        force: bool,
    ) -> Result<ControlOutcome> {
        let info = self.pipeline.get_mcis(ns, mcis_id)?;

        if !force {
            let violations: Vec<String> = info
                .vms
                .iter()
                .filter_map(|vm| vm_precondition(action, vm).err().map(|r| format!("{}: {}", vm.id, r)))
                .collect();
            if !violations.is_empty() {
                return Err(Error::Precondition {
                    action: action.to_string(),
                    reason: violations.join("; "),
                });
            }
        }

        let tasks = info.vms.iter().map(|vm| async move {
            match self.run_action(action, vm).await {
                Ok(status) => {
                    if let Err(e) = self.record_status(ns, mcis_id, &vm.id, status).await {
                        tracing::warn!("could not record status of {}/{}/{}: {}", ns, mcis_id, vm.id, e);
                    }
                    MemberOutcome {
                        vm_id: vm.id.clone(),
                        succeeded: true,
                        status: Some(status),
                        removed: false,
                        message: "done".to_string(),
                    }
                }
                Err(e) => {
                    tracing::warn!("{} {}/{}/{} failed: {}", action, ns, mcis_id, vm.id, e);
                    MemberOutcome {
                        vm_id: vm.id.clone(),
                        succeeded: false,
                        status: None,
                        removed: false,
                        message: e.to_string(),
                    }
                }
            }
        });
        let members = join_all(tasks).await;

        Ok(summarize(ns, mcis_id, action, force, members))
    }

    /// Drop members the driver can no longer resolve.
    ///
    /// A member goes when its status lookup answers 404 or reports a status
    /// that is not a real VM (`NotExist`, `Failed`, `Undefined`). Any other
    /// lookup failure keeps the member and reports it as failed.
    async fn refine(&self, ns: &str, mcis_id: &str, force: bool) -> Result<ControlOutcome> {
        let info = self.pipeline.get_mcis(ns, mcis_id)?;

        let tasks = info.vms.iter().map(|vm| async move {
            let lookup = self
                .pipeline
                .driver()
                .get_vm_status(&vm.connection_name, &vm.csp_vm_name)
                .await;

            let status = match lookup {
                Ok(reply) => VmStatus::from_driver(&reply.status),
                Err(e) if is_not_found(&e) => VmStatus::Undefined,
                Err(e) => {
                    return MemberOutcome {
                        vm_id: vm.id.clone(),
                        succeeded: false,
                        status: None,
                        removed: false,
                        message: e.to_string(),
                    }
                }
            };

            if status.is_unresolvable() {
                return match self.remove_member(ns, mcis_id, &vm.id).await {
                    Ok(()) => MemberOutcome {
                        vm_id: vm.id.clone(),
                        succeeded: true,
                        status: Some(status),
                        removed: true,
                        message: "removed from mcis".to_string(),
                    },
                    Err(e) => MemberOutcome {
                        vm_id: vm.id.clone(),
                        succeeded: false,
                        status: Some(status),
                        removed: false,
                        message: e.to_string(),
                    },
                };
            }

            if let Err(e) = self.record_status(ns, mcis_id, &vm.id, status).await {
                tracing::warn!("could not record status of {}/{}/{}: {}", ns, mcis_id, vm.id, e);
            }
            MemberOutcome {
                vm_id: vm.id.clone(),
                succeeded: true,
                status: Some(status),
                removed: false,
                message: "kept".to_string(),
            }
        });
        let members = join_all(tasks).await;

        Ok(summarize(ns, mcis_id, ControlAction::Refine, force, members))
    }

    /// The one driver call for `action` on `vm`; returns the reported status.
    async fn run_action(&self, action: ControlAction, vm: &VmRecord) -> Result<VmStatus> {
        let driver = self.pipeline.driver();
        let reply = match action {
            ControlAction::Suspend | ControlAction::Resume | ControlAction::Reboot => {
                driver
                    .control_vm(&vm.connection_name, &vm.csp_vm_name, action.as_str())
                    .await?
            }
            ControlAction::Terminate => driver.terminate_vm(&vm.connection_name, &vm.csp_vm_name).await?,
            ControlAction::Refine => {
                return Err(Error::UnsupportedAction {
                    action: action.to_string(),
                    target: format!("VM {}", vm.id),
                })
            }
        };
        Ok(VmStatus::from_driver(&reply.status))
    }

    async fn record_status(&self, ns: &str, mcis_id: &str, vm_id: &str, status: VmStatus) -> Result<()> {
        let key = keys::vm_key(ns, mcis_id, vm_id);
        let _guard = self.pipeline.locks().acquire(&key).await;

        let mut vm = self.pipeline.get_vm(ns, mcis_id, vm_id)?;
        vm.status = status;
        self.pipeline.persist(&key, &vm)
    }

    async fn remove_member(&self, ns: &str, mcis_id: &str, vm_id: &str) -> Result<()> {
        let key = keys::vm_key(ns, mcis_id, vm_id);
        let _guard = self.pipeline.locks().acquire(&key).await;

        self.pipeline.store().delete(&key)?;
        tracing::info!("refine removed {}/{}/{}", ns, mcis_id, vm_id);
        Ok(())
    }
}

fn vm_precondition(action: ControlAction, vm: &VmRecord) -> std::result::Result<(), String> {
    action.check_precondition(vm.status)
}

fn is_not_found(e: &Error) -> bool {
    matches!(
        e,
        Error::Driver {
            source: DriverError::Status { status: 404, .. },
            ..
        }
    )
}

fn summarize(
    ns: &str,
    mcis_id: &str,
    action: ControlAction,
    force: bool,
    members: Vec<MemberOutcome>,
) -> ControlOutcome {
    let failed = members.iter().filter(|m| !m.succeeded).count();
    let succeeded = members.len() - failed;

    let mut message = format!(
        "{} mcis {}: {} succeeded, {} failed",
        action, mcis_id, succeeded, failed
    );
    if action == ControlAction::Refine {
        let removed = members.iter().filter(|m| m.removed).count();
        message.push_str(&format!(", {} removed", removed));
    }
    tracing::info!("{}/{}", ns, message);

    ControlOutcome {
        namespace: ns.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: None,
        action,
        force,
        message,
        members,
    }
}
