//! Disk creation, boot configuration, and boot.

use serde_json::json;
use tracing::info;

use crate::api::{DeviceLayout, DiskKind, ResourceApi, ScriptDiskRequest};
use crate::catalog::Catalog;
use crate::spec::InstanceSpec;
use crate::types::{ConfigId, ScriptId};

use super::{ProvisionError, Provisioner, ProvisioningState, Stage, Step, required};

/// Label of the swap disk.
pub(super) const SWAP_DISK_LABEL: &str = "swap-disk";

/// Device number of the root disk in the boot configuration.
pub(super) const ROOT_DEVICE_NUM: u8 = 1;

/// Builds the JSON parameters handed to the startup script.
pub(super) fn script_parameters(cluster: &str, instance: &str, script_id: ScriptId) -> String {
    json!({
        "cluster": cluster,
        "instance": instance,
        "stack_script_id": script_id.to_string(),
    })
    .to_string()
}

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    /// Creates the root disk, then the swap disk. Disks already recorded in
    /// `state` are not created again.
    pub(super) async fn create_disks(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        let layout = required(state.disk_layout, state.stage, "disk_layout")?;
        let name = required(state.display_name.clone(), state.stage, "display_name")?;
        let label = spec.display_name.clone().unwrap_or_else(|| name.clone());

        if state.root_disk_id.is_none() {
            let script_id = required(state.script_id, state.stage, "script_id")?;
            let request = ScriptDiskRequest {
                script_id,
                instance_id,
                label,
                parameters: script_parameters(&spec.cluster_name, &name, script_id),
                image_id: spec.image_id,
                size_mb: layout.root_mb,
                root_password: spec.root_password.clone(),
            };
            let disk_id = self
                .api
                .create_disk_from_script(&request)
                .await
                .map_err(ProvisionError::remote(Step::CreateRootDisk))?;
            info!(%instance_id, %disk_id, size_mb = layout.root_mb, "root disk created");
            state.root_disk_id = Some(disk_id);
        }

        if state.swap_disk_id.is_none() {
            let disk_id = self
                .api
                .create_disk(instance_id, DiskKind::Swap, SWAP_DISK_LABEL, layout.swap_mb)
                .await
                .map_err(ProvisionError::remote(Step::CreateSwapDisk))?;
            info!(%instance_id, %disk_id, size_mb = layout.swap_mb, "swap disk created");
            state.swap_disk_id = Some(disk_id);
        }

        Ok(Stage::DisksCreated)
    }

    /// Creates the boot configuration unless one is recorded, then boots.
    pub(super) async fn boot(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        let config_id = match state.boot_config_id {
            Some(existing) => existing,
            None => self.create_boot_config(spec, state).await?,
        };

        let job_id = self
            .api
            .boot(instance_id, config_id)
            .await
            .map_err(ProvisionError::remote(Step::Boot))?;
        info!(%instance_id, %job_id, "boot requested");
        state.boot_job_id = Some(job_id);
        Ok(Stage::Booted)
    }

    async fn create_boot_config(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<ConfigId, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        let root = required(state.root_disk_id, state.stage, "root_disk_id")?;
        let swap = required(state.swap_disk_id, state.stage, "swap_disk_id")?;
        let name = required(state.display_name.as_deref(), state.stage, "display_name")?;
        let label = spec.display_name.as_deref().unwrap_or(name);
        let layout = DeviceLayout {
            root_device_num: ROOT_DEVICE_NUM,
            disks: vec![root, swap],
        };

        let config_id = self
            .api
            .create_boot_config(instance_id, spec.kernel_id, label, &layout)
            .await
            .map_err(ProvisionError::remote(Step::CreateBootConfig))?;
        info!(%instance_id, %config_id, disks = %layout.disk_list(), "boot configuration created");
        state.boot_config_id = Some(config_id);
        Ok(config_id)
    }
}
