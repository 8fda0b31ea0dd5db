//! Address resolution and instance labelling.

use tracing::info;

use crate::api::{AddressRecord, ResourceApi};
use crate::catalog::Catalog;
use crate::naming::derive_display_name;
use crate::sizing::DiskLayout;
use crate::spec::InstanceSpec;
use crate::types::InstanceId;

use super::{ProvisionError, Provisioner, ProvisioningState, Stage, Step, required};

/// Public and private address of an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct AddressPair {
    pub(super) public: String,
    pub(super) private: String,
}

/// Splits `records` into exactly one public and one private address.
pub(super) fn classify_addresses(
    instance_id: InstanceId,
    records: &[AddressRecord],
) -> Result<AddressPair, ProvisionError> {
    let (public, private): (Vec<&AddressRecord>, Vec<&AddressRecord>) =
        records.iter().partition(|record| record.is_public);

    match (public.as_slice(), private.as_slice()) {
        ([public_record], [private_record]) => Ok(AddressPair {
            public: public_record.address.clone(),
            private: private_record.address.clone(),
        }),
        _ => Err(ProvisionError::Inconsistent {
            step: Step::ResolveAddresses,
            instance_id,
            detail: format!(
                "expected one public and one private address, found public {:?} and private {:?}",
                addresses(&public),
                addresses(&private),
            ),
        }),
    }
}

fn addresses<'a>(records: &[&'a AddressRecord]) -> Vec<&'a str> {
    records.iter().map(|record| record.address.as_str()).collect()
}

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    /// Resolves addresses, labels the instance, upserts the startup script,
    /// and records the disk layout.
    pub(super) async fn name_and_size(
        &self,
        spec: &InstanceSpec,
        layout: DiskLayout,
        state: &mut ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;

        let records = self
            .api
            .list_addresses(instance_id)
            .await
            .map_err(ProvisionError::remote(Step::ResolveAddresses))?;
        let pair = classify_addresses(instance_id, &records)?;
        info!(%instance_id, public_ip = %pair.public, private_ip = %pair.private, "addresses resolved");

        let name = derive_display_name(&spec.cluster_name, &pair.public).map_err(|err| {
            ProvisionError::Inconsistent {
                step: Step::LabelInstance,
                instance_id,
                detail: err.to_string(),
            }
        })?;
        state.public_ip = Some(pair.public);
        state.private_ip = Some(pair.private);

        self.api
            .update_instance_label(instance_id, &name)
            .await
            .map_err(ProvisionError::remote(Step::LabelInstance))?;
        info!(%instance_id, %name, "instance labelled");
        state.display_name = Some(name);

        let script_id = self.upsert_startup_script(spec).await?;
        state.script_id = Some(script_id);

        info!(root_mb = layout.root_mb, swap_mb = layout.swap_mb, "disk layout resolved");
        state.disk_layout = Some(layout);
        Ok(Stage::NamedAndSized)
    }

    /// Re-applies the derived label once the instance is running.
    pub(super) async fn confirm_label(
        &self,
        state: &ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        let name = required(state.display_name.as_deref(), state.stage, "display_name")?;
        self.api
            .update_instance_label(instance_id, name)
            .await
            .map_err(ProvisionError::remote(Step::ConfirmLabel))?;
        info!(%instance_id, %name, "label confirmed");
        Ok(Stage::Complete)
    }
}
