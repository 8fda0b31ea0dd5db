//! Per-run provisioning state and the stage machine it records.

use serde::{Deserialize, Serialize};

use crate::sizing::DiskLayout;
use crate::types::{ConfigId, DiskId, InstanceId, InstanceStatus, JobId, ScriptId};

/// Milestones of a provisioning run, in order.
///
/// Each stage records that every step before it has completed and, where a
/// convergence wait is involved, that the wait has been observed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum Stage {
    /// Nothing has been created yet.
    #[default]
    Pending,
    /// The instance exists and its identifier is known.
    Created,
    /// A private address has been requested.
    NetworkAttached,
    /// The instance has been observed in the given status.
    Converged(InstanceStatus),
    /// Addresses, label, startup script, and disk sizing are resolved.
    NamedAndSized,
    /// Root and swap disks exist.
    DisksCreated,
    /// The boot configuration exists and a boot has been requested.
    Booted,
    /// The final label has been written; the run is finished.
    Complete,
}

/// Mutable state owned by a single provisioning run.
///
/// Every field moves from unset to set at most once. The value is
/// serialisable so a caller can persist it after a failure and hand it back
/// to [`Provisioner::resume`](super::Provisioner::resume).
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProvisioningState {
    pub(super) stage: Stage,
    pub(super) instance_id: Option<InstanceId>,
    pub(super) public_ip: Option<String>,
    pub(super) private_ip: Option<String>,
    pub(super) display_name: Option<String>,
    pub(super) script_id: Option<ScriptId>,
    pub(super) disk_layout: Option<DiskLayout>,
    pub(super) root_disk_id: Option<DiskId>,
    pub(super) swap_disk_id: Option<DiskId>,
    pub(super) boot_config_id: Option<ConfigId>,
    pub(super) boot_job_id: Option<JobId>,
    pub(super) last_status: Option<InstanceStatus>,
}

impl ProvisioningState {
    /// Creates state for a run that has not started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last stage reached.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the instance identifier once the instance exists.
    #[must_use]
    pub const fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
    }

    /// Returns the public address once resolved.
    #[must_use]
    pub fn public_ip(&self) -> Option<&str> {
        self.public_ip.as_deref()
    }

    /// Returns the private address once resolved.
    #[must_use]
    pub fn private_ip(&self) -> Option<&str> {
        self.private_ip.as_deref()
    }

    /// Returns the derived instance name once computed.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the startup script identifier once resolved.
    #[must_use]
    pub const fn script_id(&self) -> Option<ScriptId> {
        self.script_id
    }

    /// Returns the disk layout once computed.
    #[must_use]
    pub const fn disk_layout(&self) -> Option<DiskLayout> {
        self.disk_layout
    }

    /// Returns the root disk identifier once created.
    #[must_use]
    pub const fn root_disk_id(&self) -> Option<DiskId> {
        self.root_disk_id
    }

    /// Returns the swap disk identifier once created.
    #[must_use]
    pub const fn swap_disk_id(&self) -> Option<DiskId> {
        self.swap_disk_id
    }

    /// Returns the boot configuration identifier once created.
    #[must_use]
    pub const fn boot_config_id(&self) -> Option<ConfigId> {
        self.boot_config_id
    }

    /// Returns the boot job identifier once the boot was requested.
    #[must_use]
    pub const fn boot_job_id(&self) -> Option<JobId> {
        self.boot_job_id
    }

    /// Returns the most recent status seen by a convergence wait.
    #[must_use]
    pub const fn last_status(&self) -> Option<InstanceStatus> {
        self.last_status
    }

    /// Converts a completed run into its result, or `None` when any field is
    /// still unset.
    pub(super) fn completed(&self) -> Option<ProvisionedInstance> {
        if self.stage != Stage::Complete {
            return None;
        }
        Some(ProvisionedInstance {
            instance_id: self.instance_id?,
            display_name: self.display_name.clone()?,
            public_ip: self.public_ip.clone()?,
            private_ip: self.private_ip.clone()?,
            root_disk_id: self.root_disk_id?,
            swap_disk_id: self.swap_disk_id?,
            boot_config_id: self.boot_config_id?,
            boot_job_id: self.boot_job_id?,
            status: self.last_status?,
        })
    }
}

/// Fully populated outcome of a successful run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProvisionedInstance {
    /// Provider instance identifier.
    pub instance_id: InstanceId,
    /// Label applied to the instance.
    pub display_name: String,
    /// Public IPv4 address.
    pub public_ip: String,
    /// Private address.
    pub private_ip: String,
    /// Root disk identifier.
    pub root_disk_id: DiskId,
    /// Swap disk identifier.
    pub swap_disk_id: DiskId,
    /// Boot configuration identifier.
    pub boot_config_id: ConfigId,
    /// Job identifier of the boot request.
    pub boot_job_id: JobId,
    /// Status observed when the run finished.
    pub status: InstanceStatus,
}
