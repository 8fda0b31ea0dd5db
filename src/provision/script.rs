//! Startup script upsert.

use tracing::info;

use crate::api::{ResourceApi, ScriptMetadata};
use crate::catalog::Catalog;
use crate::spec::InstanceSpec;
use crate::startup_script::script_description;
use crate::types::ScriptId;

use super::{ProvisionError, Provisioner, Step};

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    /// Updates the script labelled with the configured label, or creates it
    /// when no such script exists.
    pub(super) async fn upsert_startup_script(
        &self,
        spec: &InstanceSpec,
    ) -> Result<ScriptId, ProvisionError> {
        let label = self.settings.startup_script_label.as_str();
        let body = self.settings.startup_script.render(&spec.cluster_name);
        let remote = ProvisionError::remote(Step::ResolveStartupScript);

        let scripts = self.api.list_startup_scripts().await.map_err(&remote)?;
        if let Some(existing) = scripts.iter().find(|script| script.label == label) {
            let script_id = self
                .api
                .update_startup_script(existing.id, &body)
                .await
                .map_err(&remote)?;
            info!(%script_id, label, "startup script updated");
            return Ok(script_id);
        }

        let metadata = ScriptMetadata {
            description: script_description(&spec.cluster_name),
        };
        let script_id = self
            .api
            .create_startup_script(label, spec.image_id, &body, &metadata)
            .await
            .map_err(&remote)?;
        info!(%script_id, label, "startup script created");
        Ok(script_id)
    }
}
