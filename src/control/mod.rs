//! Lifecycle control
//!
//! Maps a control action on a VM or a whole MCIS to driver calls. See
//! [`dispatcher::Dispatcher`] for the fan-out and refine logic.

pub mod dispatcher;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use dispatcher::{ControlOutcome, Dispatcher, MemberOutcome};

/// Lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Suspend,
    Resume,
    Reboot,
    Terminate,
    /// Aggregate-only: drop members the driver no longer knows
    Refine,
}

impl ControlAction {
    pub const ALL: [ControlAction; 5] = [
        ControlAction::Suspend,
        ControlAction::Resume,
        ControlAction::Reboot,
        ControlAction::Terminate,
        ControlAction::Refine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Suspend => "suspend",
            ControlAction::Resume => "resume",
            ControlAction::Reboot => "reboot",
            ControlAction::Terminate => "terminate",
            ControlAction::Refine => "refine",
        }
    }

    /// Whether this action may target a single VM
    pub fn applies_to_vm(&self) -> bool {
        !matches!(self, ControlAction::Refine)
    }

    /// Recorded statuses from which the action may run without `force`
    pub fn allowed_from(&self) -> &'static [VmStatus] {
        match self {
            ControlAction::Suspend | ControlAction::Reboot => &[VmStatus::Running],
            ControlAction::Resume => &[VmStatus::Suspended],
            ControlAction::Terminate => &[VmStatus::Running, VmStatus::Suspended],
            ControlAction::Refine => &[],
        }
    }

    /// Check the recorded status. `Err` carries a human-readable reason.
    pub fn check_precondition(&self, status: VmStatus) -> std::result::Result<(), String> {
        if self.allowed_from().contains(&status) {
            return Ok(());
        }
        Err(format!("cannot {} a VM in status {}", self.as_str(), status))
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ControlAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::UnsupportedAction {
                action: s.to_string(),
                target: "lifecycle control".to_string(),
            })
    }
}

/// Recorded VM status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmStatus {
    Creating,
    Running,
    Suspending,
    Suspended,
    Resuming,
    Rebooting,
    Terminating,
    Terminated,
    Failed,
    #[default]
    Undefined,
}

impl VmStatus {
    /// Map a driver-reported status string.
    ///
    /// `NotExist` and anything unrecognised become `Undefined`.
    pub fn from_driver(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "creating" => VmStatus::Creating,
            "running" => VmStatus::Running,
            "suspending" => VmStatus::Suspending,
            "suspended" => VmStatus::Suspended,
            "resuming" => VmStatus::Resuming,
            "rebooting" => VmStatus::Rebooting,
            "terminating" => VmStatus::Terminating,
            "terminated" => VmStatus::Terminated,
            "failed" => VmStatus::Failed,
            _ => VmStatus::Undefined,
        }
    }

    /// In the middle of a transition
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            VmStatus::Creating
                | VmStatus::Suspending
                | VmStatus::Resuming
                | VmStatus::Rebooting
                | VmStatus::Terminating
        )
    }

    /// The driver cannot resolve a VM in this status
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, VmStatus::Failed | VmStatus::Undefined)
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
