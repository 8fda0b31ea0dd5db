//! Core library for the Pelican instance provisioner.
//!
//! The crate drives a single compute instance from "does not exist" to
//! "running with addresses assigned" against an eventually consistent
//! provider API. Remote calls go through the [`ResourceApi`] capability,
//! machine types come from a [`Catalog`], and the two status waits run on a
//! cancellable [`Poller`].

pub mod api;
pub mod catalog;
pub mod config;
pub mod naming;
pub mod poll;
pub mod provision;
pub mod sizing;
pub mod spec;
pub mod startup_script;
pub mod test_support;
pub mod types;

pub use api::{
    AddressRecord, ApiError, ApiFuture, DeviceLayout, DiskKind, InstanceRecord, ResourceApi,
    ScriptDiskRequest, ScriptMetadata, StartupScriptRecord,
};
pub use catalog::{Catalog, CatalogError, MachineType, StaticCatalog};
pub use config::{ConfigError, ProvisionerConfig, ProvisionerSettings};
pub use naming::{NamingError, derive_display_name};
pub use poll::{CancelHandle, Cancellation, Observation, PollError, Poller, cancellation};
pub use provision::{
    ProvisionError, ProvisionedInstance, Provisioner, ProvisioningState, Stage, Step,
};
pub use sizing::{DiskLayout, SWAP_DISK_MB};
pub use spec::{InstanceSpec, InstanceSpecBuilder, SpecError};
pub use startup_script::{ScriptTemplate, StartupScriptError};
pub use types::{
    ConfigId, DiskId, ImageId, InstanceId, InstanceStatus, JobId, KernelId, PlanId, ScriptId,
    ZoneId,
};
