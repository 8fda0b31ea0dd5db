//! Capability interface over the provider's resource management API.
//!
//! Every call maps onto a single remote request. Creates and updates return as
//! soon as the provider has accepted the request; the effect becomes visible
//! later through the list calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    ConfigId, DiskId, ImageId, InstanceId, InstanceStatus, JobId, KernelId, PlanId, ScriptId,
    ZoneId,
};

/// Future returned by resource API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Errors raised by resource API clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the provider rejects a request.
    #[error("provider rejected {operation}: {message}")]
    Rejected {
        /// Operation that was rejected.
        operation: String,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the request never reached the provider or its response
    /// could not be read.
    #[error("transport failure during {operation}: {message}")]
    Transport {
        /// Operation being attempted.
        operation: String,
        /// Underlying error message.
        message: String,
    },
}

/// Instance as reported by the list call.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct InstanceRecord {
    /// Provider instance identifier.
    pub id: InstanceId,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Current label.
    pub label: String,
}

/// Address bound to an instance.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct AddressRecord {
    /// Textual IP address.
    pub address: String,
    /// Whether the provider flags the address as public.
    pub is_public: bool,
}

/// Startup script stored by the provider.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct StartupScriptRecord {
    /// Script identifier.
    pub id: ScriptId,
    /// Account-unique label.
    pub label: String,
}

/// Metadata supplied when a startup script is first registered.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ScriptMetadata {
    /// Free-form description shown in the provider console.
    pub description: String,
}

/// Disk type accepted by [`ResourceApi::create_disk`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskKind {
    /// Swap partition.
    Swap,
    /// Unformatted disk.
    Raw,
    /// ext4 filesystem.
    Ext4,
}

impl DiskKind {
    /// Returns the provider's name for the disk type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Swap => "swap",
            Self::Raw => "raw",
            Self::Ext4 => "ext4",
        }
    }
}

/// Parameters for creating a root disk seeded from a startup script.
#[derive(Clone, Eq, PartialEq)]
pub struct ScriptDiskRequest {
    /// Startup script to run on first boot.
    pub script_id: ScriptId,
    /// Instance owning the disk.
    pub instance_id: InstanceId,
    /// Disk label.
    pub label: String,
    /// JSON-encoded script parameters.
    pub parameters: String,
    /// Operating system image to install.
    pub image_id: ImageId,
    /// Disk size in MB.
    pub size_mb: u64,
    /// Root password for the installed image.
    pub root_password: String,
}

impl fmt::Debug for ScriptDiskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDiskRequest")
            .field("script_id", &self.script_id)
            .field("instance_id", &self.instance_id)
            .field("label", &self.label)
            .field("parameters", &self.parameters)
            .field("image_id", &self.image_id)
            .field("size_mb", &self.size_mb)
            .field("root_password", &"<redacted>")
            .finish()
    }
}

/// Ordered device list for a boot configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceLayout {
    /// 1-based device number holding the root filesystem.
    pub root_device_num: u8,
    /// Disks in device order.
    pub disks: Vec<DiskId>,
}

impl DeviceLayout {
    /// Renders the disk list as the provider's comma separated form.
    #[must_use]
    pub fn disk_list(&self) -> String {
        self.disks
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Remote operations the provisioning workflow depends on.
///
/// Implementations must be safe to share between independent provisioning
/// runs.
pub trait ResourceApi: Send + Sync {
    /// Creates an instance in `zone` with the given plan.
    fn create_instance(&self, zone: ZoneId, plan: PlanId) -> ApiFuture<'_, InstanceId>;

    /// Lists instances matching `id`. An empty list means the instance is not
    /// visible yet.
    fn list_instances(&self, id: InstanceId) -> ApiFuture<'_, Vec<InstanceRecord>>;

    /// Requests a private address for the instance.
    fn attach_private_address(&self, id: InstanceId) -> ApiFuture<'_, ()>;

    /// Lists the addresses bound to the instance.
    fn list_addresses(&self, id: InstanceId) -> ApiFuture<'_, Vec<AddressRecord>>;

    /// Replaces the instance label.
    fn update_instance_label<'a>(&'a self, id: InstanceId, label: &'a str) -> ApiFuture<'a, ()>;

    /// Lists the account's startup scripts.
    fn list_startup_scripts(&self) -> ApiFuture<'_, Vec<StartupScriptRecord>>;

    /// Registers a new startup script.
    fn create_startup_script<'a>(
        &'a self,
        label: &'a str,
        image_id: ImageId,
        body: &'a str,
        metadata: &'a ScriptMetadata,
    ) -> ApiFuture<'a, ScriptId>;

    /// Replaces the body of an existing startup script.
    fn update_startup_script<'a>(&'a self, id: ScriptId, body: &'a str)
    -> ApiFuture<'a, ScriptId>;

    /// Creates a disk whose image is installed and bootstrapped by a startup
    /// script.
    fn create_disk_from_script<'a>(
        &'a self,
        request: &'a ScriptDiskRequest,
    ) -> ApiFuture<'a, DiskId>;

    /// Creates a plain disk.
    fn create_disk<'a>(
        &'a self,
        instance_id: InstanceId,
        kind: DiskKind,
        label: &'a str,
        size_mb: u64,
    ) -> ApiFuture<'a, DiskId>;

    /// Creates a boot configuration binding a kernel and device list.
    fn create_boot_config<'a>(
        &'a self,
        instance_id: InstanceId,
        kernel_id: KernelId,
        label: &'a str,
        layout: &'a DeviceLayout,
    ) -> ApiFuture<'a, ConfigId>;

    /// Boots the instance with the given configuration.
    fn boot(&self, instance_id: InstanceId, config_id: ConfigId) -> ApiFuture<'_, JobId>;
}
