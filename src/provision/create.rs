//! Instance creation and private networking.

use tracing::info;

use crate::api::ResourceApi;
use crate::catalog::Catalog;
use crate::spec::InstanceSpec;

use super::{ProvisionError, Provisioner, ProvisioningState, Stage, Step, required};

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    pub(super) async fn create_instance(
        &self,
        spec: &InstanceSpec,
        state: &mut ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        if state.instance_id.is_some() {
            return Err(ProvisionError::ConflictingState {
                stage: state.stage,
                field: "instance_id",
            });
        }
        let instance_id = self
            .api
            .create_instance(spec.zone, spec.plan)
            .await
            .map_err(ProvisionError::remote(Step::CreateInstance))?;
        info!(%instance_id, zone = %spec.zone, plan = %spec.plan, "instance created");
        state.instance_id = Some(instance_id);
        Ok(Stage::Created)
    }

    pub(super) async fn attach_private_address(
        &self,
        state: &ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        self.api
            .attach_private_address(instance_id)
            .await
            .map_err(ProvisionError::remote(Step::AttachPrivateAddress))?;
        info!(%instance_id, "private address requested");
        Ok(Stage::NetworkAttached)
    }
}
