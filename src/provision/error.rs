//! Error types for the provisioning workflow.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::catalog::CatalogError;
use crate::spec::SpecError;
use crate::types::{InstanceId, InstanceStatus};

use super::state::Stage;

/// Workflow steps, used to annotate failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Step {
    /// Create the instance.
    CreateInstance,
    /// Request a private address.
    AttachPrivateAddress,
    /// Wait for the instance to report `Brand New`.
    AwaitBrandNew,
    /// List and classify the instance's addresses.
    ResolveAddresses,
    /// Apply the derived label.
    LabelInstance,
    /// Upsert the startup script.
    ResolveStartupScript,
    /// Compute disk sizes from the machine type.
    ResolveSizing,
    /// Create the root disk from the startup script.
    CreateRootDisk,
    /// Create the swap disk.
    CreateSwapDisk,
    /// Create the boot configuration.
    CreateBootConfig,
    /// Boot the instance.
    Boot,
    /// Wait for the instance to report `Running`.
    AwaitRunning,
    /// Re-apply the derived label.
    ConfirmLabel,
}

impl Step {
    /// Returns a short human readable name for the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInstance => "create instance",
            Self::AttachPrivateAddress => "attach private address",
            Self::AwaitBrandNew => "await brand new",
            Self::ResolveAddresses => "resolve addresses",
            Self::LabelInstance => "label instance",
            Self::ResolveStartupScript => "resolve startup script",
            Self::ResolveSizing => "resolve sizing",
            Self::CreateRootDisk => "create root disk",
            Self::CreateSwapDisk => "create swap disk",
            Self::CreateBootConfig => "create boot configuration",
            Self::Boot => "boot instance",
            Self::AwaitRunning => "await running",
            Self::ConfirmLabel => "confirm label",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by [`Provisioner`](super::Provisioner).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the instance spec is invalid.
    #[error("invalid instance spec: {0}")]
    InvalidSpec(#[from] SpecError),
    /// Raised when the SKU cannot be resolved.
    #[error("machine type lookup failed: {0}")]
    Catalog(#[from] CatalogError),
    /// Raised when the machine type's disk cannot hold the swap partition.
    #[error("machine type '{sku}' allocates {disk_gb} GB, leaving no room for a root disk")]
    InsufficientDisk {
        /// SKU that was resolved.
        sku: String,
        /// Disk allocation reported by the catalog.
        disk_gb: u64,
    },
    /// Raised when a create, update, or list call fails.
    #[error("{step} failed: {source}")]
    Remote {
        /// Step that issued the call.
        step: Step,
        /// Error returned by the resource API.
        #[source]
        source: ApiError,
    },
    /// Raised when a status wait passes its deadline.
    #[error(
        "{step}: instance {instance_id} did not reach {target} within {waited:?} \
         (last observed: {last})",
        last = describe_observed(.last_observed.as_ref())
    )]
    ConvergenceTimeout {
        /// Step that was waiting.
        step: Step,
        /// Instance being observed.
        instance_id: InstanceId,
        /// Status the wait expected.
        target: InstanceStatus,
        /// Most recent status seen, if the instance was ever listed.
        last_observed: Option<InstanceStatus>,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Raised when the caller cancels a status wait.
    #[error("{step}: wait for instance {instance_id} cancelled")]
    Cancelled {
        /// Step that was waiting.
        step: Step,
        /// Instance being observed.
        instance_id: InstanceId,
    },
    /// Raised when observed provider data violates an expected shape.
    #[error("{step}: inconsistent data for instance {instance_id}: {detail}")]
    Inconsistent {
        /// Step that observed the data.
        step: Step,
        /// Instance the data belongs to.
        instance_id: InstanceId,
        /// Description of what was observed.
        detail: String,
    },
    /// Raised when resumed state lacks a value its stage implies.
    #[error("state at stage {stage:?} is missing {missing}")]
    IncompleteState {
        /// Stage recorded in the state.
        stage: Stage,
        /// Field that should have been set.
        missing: &'static str,
    },
    /// Raised when resumed state records a value its stage has not produced
    /// yet, which would repeat a remote create.
    #[error("state at stage {stage:?} already records {field}")]
    ConflictingState {
        /// Stage recorded in the state.
        stage: Stage,
        /// Field that should still be unset.
        field: &'static str,
    },
}

impl ProvisionError {
    /// Returns the step that failed, when the failure happened inside the
    /// workflow rather than before it.
    #[must_use]
    pub const fn step(&self) -> Option<Step> {
        match self {
            Self::Remote { step, .. }
            | Self::ConvergenceTimeout { step, .. }
            | Self::Cancelled { step, .. }
            | Self::Inconsistent { step, .. } => Some(*step),
            Self::InvalidSpec(_)
            | Self::Catalog(_)
            | Self::InsufficientDisk { .. }
            | Self::IncompleteState { .. }
            | Self::ConflictingState { .. } => None,
        }
    }

    pub(super) fn remote(step: Step) -> impl Fn(ApiError) -> Self {
        move |source| Self::Remote { step, source }
    }
}

fn describe_observed(status: Option<&InstanceStatus>) -> String {
    status.map_or_else(|| String::from("nothing"), ToString::to_string)
}
