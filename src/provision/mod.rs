//! Provisioning orchestrator.
//!
//! A run takes one [`InstanceSpec`] from "does not exist" to "running with
//! addresses assigned". The workflow is an ordered sequence of remote calls
//! interleaved with two status waits:
//!
//! 1. create the instance and request a private address;
//! 2. wait for `Brand New`;
//! 3. resolve addresses, derive and apply the instance label, upsert the
//!    startup script, and size the disks;
//! 4. create the root disk from the startup script, then the swap disk;
//! 5. create the boot configuration and boot;
//! 6. wait for `Running` and re-apply the label.
//!
//! Progress is recorded in a [`ProvisioningState`] as a [`Stage`]. A call is
//! never issued before the call it depends on has returned, and nothing is
//! rolled back on failure: the error names the failing [`Step`] and the
//! state shows what exists.

mod create;
mod disks;
mod error;
mod network;
mod script;
mod state;
#[cfg(test)]
mod tests;
mod wait;

use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::api::ResourceApi;
use crate::catalog::Catalog;
use crate::config::ProvisionerSettings;
use crate::poll::Cancellation;
use crate::sizing::DiskLayout;
use crate::spec::InstanceSpec;
use crate::types::InstanceStatus;

pub use error::{ProvisionError, Step};
pub use state::{ProvisionedInstance, ProvisioningState, Stage};

/// Drives instances through the provisioning workflow.
///
/// The orchestrator holds no per-run state, so one value can serve several
/// concurrent runs.
#[derive(Clone, Debug)]
pub struct Provisioner<A, C> {
    api: A,
    catalog: C,
    settings: ProvisionerSettings,
    cancel: Cancellation,
}

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(api: A, catalog: C, settings: ProvisionerSettings) -> Self {
        Self {
            api,
            catalog,
            settings,
            cancel: Cancellation::never(),
        }
    }

    /// Attaches a cancellation signal observed by both status waits.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the resource API client.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn settings(&self) -> &ProvisionerSettings {
        &self.settings
    }

    /// Provisions a new instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the spec cannot be resolved, a remote
    /// call fails, a status wait times out or is cancelled, or the provider
    /// reports data of an unexpected shape. Resources created before the
    /// failure are left in place.
    pub async fn provision(
        &self,
        spec: &InstanceSpec,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        let mut state = ProvisioningState::new();
        self.resume(spec, &mut state).await
    }

    /// Continues a run from the stage recorded in `state`.
    ///
    /// On failure `state` keeps everything completed so far, so the caller can
    /// persist it and resume later or use it to clean up.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Provisioner::provision`], plus
    /// [`ProvisionError::IncompleteState`] when `state` lacks a value its stage
    /// implies.
    pub async fn resume(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        let span = info_span!(
            "provision",
            run_id = %Uuid::new_v4().simple(),
            cluster = %spec.cluster_name,
            sku = %spec.sku,
        );
        self.drive(spec, state).instrument(span).await
    }

    async fn drive(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        let layout = self.resolve_layout(spec)?;
        debug!(stage = ?state.stage, "starting run");

        loop {
            let next = match state.stage {
                Stage::Pending => self.create_instance(spec, state).await?,
                Stage::Created => self.attach_private_address(state).await?,
                Stage::NetworkAttached => {
                    self.await_status(Step::AwaitBrandNew, InstanceStatus::BrandNew, state)
                        .await?
                }
                Stage::Converged(InstanceStatus::BrandNew) => {
                    self.name_and_size(spec, layout, state).await?
                }
                Stage::NamedAndSized => self.create_disks(spec, state).await?,
                Stage::DisksCreated => self.boot(spec, state).await?,
                Stage::Booted => {
                    self.await_status(Step::AwaitRunning, InstanceStatus::Running, state)
                        .await?
                }
                Stage::Converged(InstanceStatus::Running) => self.confirm_label(state).await?,
                Stage::Converged(_) => {
                    return Err(ProvisionError::IncompleteState {
                        stage: state.stage,
                        missing: "a known convergence target",
                    });
                }
                Stage::Complete => break,
            };
            debug!(from = ?state.stage, to = ?next, "stage advanced");
            state.stage = next;
        }

        let result = state
            .completed()
            .ok_or(ProvisionError::IncompleteState {
                stage: Stage::Complete,
                missing: "result fields",
            })?;
        info!(
            instance_id = %result.instance_id,
            name = %result.display_name,
            public_ip = %result.public_ip,
            "instance provisioned"
        );
        Ok(result)
    }

    fn resolve_layout(&self, spec: &InstanceSpec) -> Result<DiskLayout, ProvisionError> {
        let machine = self
            .catalog
            .machine_type(&self.settings.catalog_provider, &spec.sku)?;
        let layout = DiskLayout::for_machine(&machine);
        if layout.root_mb == 0 {
            return Err(ProvisionError::InsufficientDisk {
                sku: spec.sku.clone(),
                disk_gb: machine.disk_gb,
            });
        }
        Ok(layout)
    }
}

fn required<T>(value: Option<T>, stage: Stage, missing: &'static str) -> Result<T, ProvisionError> {
    value.ok_or(ProvisionError::IncompleteState { stage, missing })
}
