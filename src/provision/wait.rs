//! Instance status convergence waits.

use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::api::ResourceApi;
use crate::catalog::Catalog;
use crate::poll::{Observation, PollError};
use crate::types::{InstanceId, InstanceStatus};

use super::{ProvisionError, Provisioner, ProvisioningState, Stage, Step, required};

impl<A, C> Provisioner<A, C>
where
    A: ResourceApi,
    C: Catalog,
{
    /// Polls the instance until it reports `target`.
    ///
    /// List failures and empty listings count as "not yet": a freshly created
    /// instance can briefly be missing from the provider's read path.
    pub(super) async fn await_status(
        &self,
        step: Step,
        target: InstanceStatus,
        state: &mut ProvisioningState,
    ) -> Result<Stage, ProvisionError> {
        let instance_id = required(state.instance_id, state.stage, "instance_id")?;
        let last_seen = Mutex::new(state.last_status);
        let api = &self.api;
        let seen = &last_seen;

        let outcome = self
            .settings
            .poller
            .wait(&self.cancel, |attempt| async move {
                let Some(status) = observe_status(api, instance_id, attempt).await else {
                    return Ok::<_, Infallible>(Observation::Pending);
                };
                *seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
                if status == target {
                    Ok(Observation::Converged)
                } else {
                    Ok(Observation::Pending)
                }
            })
            .await;

        state.last_status = last_seen
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        match outcome {
            Ok(attempts) => {
                info!(%instance_id, status = %target, attempts, "instance converged");
                Ok(Stage::Converged(target))
            }
            Err(PollError::TimedOut { waited, .. }) => Err(ProvisionError::ConvergenceTimeout {
                step,
                instance_id,
                target,
                last_observed: state.last_status,
                waited,
            }),
            Err(PollError::Cancelled { .. }) => {
                Err(ProvisionError::Cancelled { step, instance_id })
            }
            Err(PollError::Failed(never)) => match never {},
        }
    }
}

async fn observe_status<A: ResourceApi>(
    api: &A,
    instance_id: InstanceId,
    attempt: u32,
) -> Option<InstanceStatus> {
    match api.list_instances(instance_id).await {
        Ok(instances) => {
            let found = instances
                .into_iter()
                .find(|instance| instance.id == instance_id);
            match &found {
                Some(instance) => {
                    debug!(attempt, %instance_id, status = %instance.status, "observed instance");
                }
                None => debug!(attempt, %instance_id, "instance not listed yet"),
            }
            found.map(|instance| instance.status)
        }
        Err(err) => {
            debug!(attempt, %instance_id, error = %err, "instance status unavailable");
            None
        }
    }
}
