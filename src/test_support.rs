//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::{
    AddressRecord, ApiError, ApiFuture, DeviceLayout, DiskKind, InstanceRecord, ResourceApi,
    ScriptDiskRequest, ScriptMetadata, StartupScriptRecord,
};
use crate::catalog::{MachineType, StaticCatalog};
use crate::types::{
    ConfigId, DiskId, ImageId, InstanceId, InstanceStatus, JobId, KernelId, PlanId, ScriptId,
    ZoneId,
};

/// Provider name used by [`catalog_with_disk`].
pub const TEST_PROVIDER: &str = "linode";

/// Builds a catalog with a single machine type `sku` allocating `disk_gb`.
#[must_use]
pub fn catalog_with_disk(sku: &str, disk_gb: u64) -> StaticCatalog {
    StaticCatalog::new().with_machine_type(
        TEST_PROVIDER,
        MachineType {
            sku: sku.to_owned(),
            cpus: 1,
            memory_mb: 2048,
            disk_gb,
        },
    )
}

/// Operations exposed by [`ResourceApi`], used to script failures and to
/// inspect the call journal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    /// [`ResourceApi::create_instance`].
    CreateInstance,
    /// [`ResourceApi::list_instances`].
    ListInstances,
    /// [`ResourceApi::attach_private_address`].
    AttachPrivateAddress,
    /// [`ResourceApi::list_addresses`].
    ListAddresses,
    /// [`ResourceApi::update_instance_label`].
    UpdateInstanceLabel,
    /// [`ResourceApi::list_startup_scripts`].
    ListStartupScripts,
    /// [`ResourceApi::create_startup_script`].
    CreateStartupScript,
    /// [`ResourceApi::update_startup_script`].
    UpdateStartupScript,
    /// [`ResourceApi::create_disk_from_script`].
    CreateDiskFromScript,
    /// [`ResourceApi::create_disk`].
    CreateDisk,
    /// [`ResourceApi::create_boot_config`].
    CreateBootConfig,
    /// [`ResourceApi::boot`].
    Boot,
}

/// Single journal entry recorded by [`FakeResourceApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    /// Operation invoked.
    pub operation: Operation,
    /// Instance the call targeted, when it is instance-scoped.
    pub instance_id: Option<InstanceId>,
}

/// Disk recorded by [`FakeResourceApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeDisk {
    /// Disk identifier.
    pub id: DiskId,
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Disk type name (`swap`, `raw`, `ext4`, or `script` for script disks).
    pub kind: String,
    /// Disk label.
    pub label: String,
    /// Size in MB.
    pub size_mb: u64,
    /// Startup script the disk was seeded from.
    pub script_id: Option<ScriptId>,
    /// JSON script parameters.
    pub parameters: Option<String>,
    /// Image installed on the disk.
    pub image_id: Option<ImageId>,
}

/// Boot configuration recorded by [`FakeResourceApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeBootConfig {
    /// Configuration identifier.
    pub id: ConfigId,
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Kernel selected.
    pub kernel_id: KernelId,
    /// Configuration label.
    pub label: String,
    /// Root device number.
    pub root_device_num: u8,
    /// Disks in device order.
    pub disks: Vec<DiskId>,
}

/// Startup script recorded by [`FakeResourceApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeScript {
    /// Script identifier.
    pub id: ScriptId,
    /// Account-unique label.
    pub label: String,
    /// Current body.
    pub body: String,
    /// Description supplied at creation.
    pub description: String,
    /// Image the script was created against; `None` when seeded.
    pub image_id: Option<ImageId>,
    /// Number of times the body was replaced.
    pub revisions: u32,
}

#[derive(Clone, Debug)]
struct FakeInstance {
    zone: ZoneId,
    plan: PlanId,
    label: String,
    labels: Vec<String>,
    addresses: Vec<AddressRecord>,
    polls_before_boot: u32,
    polls_after_boot: u32,
    booted: bool,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    instances: BTreeMap<InstanceId, FakeInstance>,
    scripts: Vec<FakeScript>,
    disks: Vec<FakeDisk>,
    boot_configs: Vec<FakeBootConfig>,
    journal: Vec<Call>,
    failures: BTreeSet<Operation>,
    brand_new_on_poll: u32,
    running_on_poll: u32,
    unlisted_polls: u32,
    list_errors: u32,
    address_override: Option<Vec<AddressRecord>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_id: 100,
            instances: BTreeMap::new(),
            scripts: Vec::new(),
            disks: Vec::new(),
            boot_configs: Vec::new(),
            journal: Vec::new(),
            failures: BTreeSet::new(),
            brand_new_on_poll: 1,
            running_on_poll: 1,
            unlisted_polls: 0,
            list_errors: 0,
            address_override: None,
        }
    }
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(
        &mut self,
        operation: Operation,
        instance_id: Option<InstanceId>,
    ) -> Result<(), ApiError> {
        self.journal.push(Call {
            operation,
            instance_id,
        });
        if self.failures.contains(&operation) {
            return Err(ApiError::Rejected {
                operation: format!("{operation:?}"),
                message: String::from("scripted failure"),
            });
        }
        Ok(())
    }

    fn instance_mut(
        &mut self,
        operation: Operation,
        id: InstanceId,
    ) -> Result<&mut FakeInstance, ApiError> {
        self.instances
            .get_mut(&id)
            .ok_or_else(|| ApiError::Rejected {
                operation: format!("{operation:?}"),
                message: format!("instance {id} not found"),
            })
    }
}

/// In-memory [`ResourceApi`] that simulates the provider's asynchronous
/// behaviour.
///
/// A new instance reports `Being Created` until its status has been polled
/// `brand_new_on_poll` times, then `Brand New`. After a boot it reports
/// `Brand New` until polled `running_on_poll` times, then `Running`. Clones
/// share state so tests can inspect what a provisioner did.
#[derive(Clone, Debug, Default)]
pub struct FakeResourceApi {
    state: Arc<Mutex<State>>,
}

impl FakeResourceApi {
    /// Creates a fake reporting `Brand New` and `Running` on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the poll on which a new instance first reports `Brand New`.
    #[must_use]
    pub fn brand_new_on_poll(self, poll: u32) -> Self {
        self.lock().brand_new_on_poll = poll;
        self
    }

    /// Sets the poll after boot on which the instance first reports `Running`.
    /// `u32::MAX` keeps the instance from ever running.
    #[must_use]
    pub fn running_on_poll(self, poll: u32) -> Self {
        self.lock().running_on_poll = poll;
        self
    }

    /// Makes the next `count` instance listings return no instances.
    #[must_use]
    pub fn unlisted_polls(self, count: u32) -> Self {
        self.lock().unlisted_polls = count;
        self
    }

    /// Makes the next `count` instance listings fail.
    #[must_use]
    pub fn failing_lists(self, count: u32) -> Self {
        self.lock().list_errors = count;
        self
    }

    /// Replaces the addresses reported for every instance.
    #[must_use]
    pub fn with_addresses(self, addresses: Vec<AddressRecord>) -> Self {
        self.lock().address_override = Some(addresses);
        self
    }

    /// Seeds an existing startup script.
    #[must_use]
    pub fn with_script(self, label: &str, body: &str) -> Self {
        {
            let mut state = self.lock();
            let id = ScriptId::new(state.allocate());
            state.scripts.push(FakeScript {
                id,
                label: label.to_owned(),
                body: body.to_owned(),
                description: String::new(),
                image_id: None,
                revisions: 0,
            });
        }
        self
    }

    /// Makes every future call to `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.lock().failures.insert(operation);
    }

    /// Clears a failure scripted with [`FakeResourceApi::fail_on`].
    pub fn clear_failure(&self, operation: Operation) {
        self.lock().failures.remove(&operation);
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    /// Returns the operations called so far, in order, without list polls.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.lock()
            .journal
            .iter()
            .map(|call| call.operation)
            .filter(|operation| *operation != Operation::ListInstances)
            .collect()
    }

    /// Returns how many times `operation` was called.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Returns the stored startup scripts.
    #[must_use]
    pub fn scripts(&self) -> Vec<FakeScript> {
        self.lock().scripts.clone()
    }

    /// Returns the created disks.
    #[must_use]
    pub fn disks(&self) -> Vec<FakeDisk> {
        self.lock().disks.clone()
    }

    /// Returns the created boot configurations.
    #[must_use]
    pub fn boot_configs(&self) -> Vec<FakeBootConfig> {
        self.lock().boot_configs.clone()
    }

    /// Returns every label applied to `instance_id`, in order.
    #[must_use]
    pub fn labels(&self, instance_id: InstanceId) -> Vec<String> {
        self.lock()
            .instances
            .get(&instance_id)
            .map(|instance| instance.labels.clone())
            .unwrap_or_default()
    }

    /// Returns the zone and plan an instance was created with.
    #[must_use]
    pub fn placement(&self, instance_id: InstanceId) -> Option<(ZoneId, PlanId)> {
        self.lock()
            .instances
            .get(&instance_id)
            .map(|instance| (instance.zone, instance.plan))
    }

    fn create_instance_now(&self, zone: ZoneId, plan: PlanId) -> Result<InstanceId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::CreateInstance, None)?;
        let id = InstanceId::new(state.allocate());
        let octet = id.get() & 0x7f;
        state.instances.insert(
            id,
            FakeInstance {
                zone,
                plan,
                label: format!("linode{id}"),
                labels: Vec::new(),
                addresses: vec![AddressRecord {
                    address: format!("203.0.113.{octet}"),
                    is_public: true,
                }],
                polls_before_boot: 0,
                polls_after_boot: 0,
                booted: false,
            },
        );
        Ok(id)
    }

    fn list_instances_now(&self, id: InstanceId) -> Result<Vec<InstanceRecord>, ApiError> {
        let mut state = self.lock();
        state.record(Operation::ListInstances, Some(id))?;
        if state.list_errors > 0 {
            state.list_errors -= 1;
            return Err(ApiError::Transport {
                operation: String::from("ListInstances"),
                message: String::from("connection reset"),
            });
        }
        if state.unlisted_polls > 0 {
            state.unlisted_polls -= 1;
            return Ok(Vec::new());
        }
        let brand_new_on = state.brand_new_on_poll;
        let running_on = state.running_on_poll;
        let Some(instance) = state.instances.get_mut(&id) else {
            return Ok(Vec::new());
        };
        let status = if instance.booted {
            instance.polls_after_boot = instance.polls_after_boot.saturating_add(1);
            if instance.polls_after_boot >= running_on {
                InstanceStatus::Running
            } else {
                InstanceStatus::BrandNew
            }
        } else {
            instance.polls_before_boot = instance.polls_before_boot.saturating_add(1);
            if instance.polls_before_boot >= brand_new_on {
                InstanceStatus::BrandNew
            } else {
                InstanceStatus::BeingCreated
            }
        };
        Ok(vec![InstanceRecord {
            id,
            status,
            label: instance.label.clone(),
        }])
    }

    fn attach_private_address_now(&self, id: InstanceId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record(Operation::AttachPrivateAddress, Some(id))?;
        let instance = state.instance_mut(Operation::AttachPrivateAddress, id)?;
        let octet = id.get() & 0x7f;
        instance.addresses.push(AddressRecord {
            address: format!("192.168.130.{octet}"),
            is_public: false,
        });
        Ok(())
    }

    fn list_addresses_now(&self, id: InstanceId) -> Result<Vec<AddressRecord>, ApiError> {
        let mut state = self.lock();
        state.record(Operation::ListAddresses, Some(id))?;
        if let Some(addresses) = state.address_override.clone() {
            return Ok(addresses);
        }
        let instance = state.instance_mut(Operation::ListAddresses, id)?;
        Ok(instance.addresses.clone())
    }

    fn update_instance_label_now(&self, id: InstanceId, label: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record(Operation::UpdateInstanceLabel, Some(id))?;
        let instance = state.instance_mut(Operation::UpdateInstanceLabel, id)?;
        label.clone_into(&mut instance.label);
        instance.labels.push(label.to_owned());
        Ok(())
    }

    fn list_startup_scripts_now(&self) -> Result<Vec<StartupScriptRecord>, ApiError> {
        let mut state = self.lock();
        state.record(Operation::ListStartupScripts, None)?;
        Ok(state
            .scripts
            .iter()
            .map(|script| StartupScriptRecord {
                id: script.id,
                label: script.label.clone(),
            })
            .collect())
    }

    fn create_startup_script_now(
        &self,
        label: &str,
        image_id: ImageId,
        body: &str,
        metadata: &ScriptMetadata,
    ) -> Result<ScriptId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::CreateStartupScript, None)?;
        if state.scripts.iter().any(|script| script.label == label) {
            return Err(ApiError::Rejected {
                operation: String::from("CreateStartupScript"),
                message: format!("label {label} already in use"),
            });
        }
        let id = ScriptId::new(state.allocate());
        state.scripts.push(FakeScript {
            id,
            label: label.to_owned(),
            body: body.to_owned(),
            description: metadata.description.clone(),
            image_id: Some(image_id),
            revisions: 0,
        });
        Ok(id)
    }

    fn update_startup_script_now(&self, id: ScriptId, body: &str) -> Result<ScriptId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::UpdateStartupScript, None)?;
        let script = state
            .scripts
            .iter_mut()
            .find(|script| script.id == id)
            .ok_or_else(|| ApiError::Rejected {
                operation: String::from("UpdateStartupScript"),
                message: format!("script {id} not found"),
            })?;
        body.clone_into(&mut script.body);
        script.revisions = script.revisions.saturating_add(1);
        Ok(id)
    }

    fn create_disk_from_script_now(&self, request: &ScriptDiskRequest) -> Result<DiskId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::CreateDiskFromScript, Some(request.instance_id))?;
        state.instance_mut(Operation::CreateDiskFromScript, request.instance_id)?;
        let id = DiskId::new(state.allocate());
        state.disks.push(FakeDisk {
            id,
            instance_id: request.instance_id,
            kind: String::from("script"),
            label: request.label.clone(),
            size_mb: request.size_mb,
            script_id: Some(request.script_id),
            parameters: Some(request.parameters.clone()),
            image_id: Some(request.image_id),
        });
        Ok(id)
    }

    fn create_disk_now(
        &self,
        instance_id: InstanceId,
        kind: DiskKind,
        label: &str,
        size_mb: u64,
    ) -> Result<DiskId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::CreateDisk, Some(instance_id))?;
        state.instance_mut(Operation::CreateDisk, instance_id)?;
        let id = DiskId::new(state.allocate());
        state.disks.push(FakeDisk {
            id,
            instance_id,
            kind: kind.as_str().to_owned(),
            label: label.to_owned(),
            size_mb,
            script_id: None,
            parameters: None,
            image_id: None,
        });
        Ok(id)
    }

    fn create_boot_config_now(
        &self,
        instance_id: InstanceId,
        kernel_id: KernelId,
        label: &str,
        layout: &DeviceLayout,
    ) -> Result<ConfigId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::CreateBootConfig, Some(instance_id))?;
        state.instance_mut(Operation::CreateBootConfig, instance_id)?;
        let id = ConfigId::new(state.allocate());
        state.boot_configs.push(FakeBootConfig {
            id,
            instance_id,
            kernel_id,
            label: label.to_owned(),
            root_device_num: layout.root_device_num,
            disks: layout.disks.clone(),
        });
        Ok(id)
    }

    fn boot_now(&self, instance_id: InstanceId, config_id: ConfigId) -> Result<JobId, ApiError> {
        let mut state = self.lock();
        state.record(Operation::Boot, Some(instance_id))?;
        if !state
            .boot_configs
            .iter()
            .any(|config| config.id == config_id && config.instance_id == instance_id)
        {
            return Err(ApiError::Rejected {
                operation: String::from("Boot"),
                message: format!("config {config_id} does not belong to instance {instance_id}"),
            });
        }
        let job = JobId::new(state.allocate());
        let instance = state.instance_mut(Operation::Boot, instance_id)?;
        instance.booted = true;
        Ok(job)
    }
}

impl ResourceApi for FakeResourceApi {
    fn create_instance(&self, zone: ZoneId, plan: PlanId) -> ApiFuture<'_, InstanceId> {
        let result = self.create_instance_now(zone, plan);
        Box::pin(async move { result })
    }

    fn list_instances(&self, id: InstanceId) -> ApiFuture<'_, Vec<InstanceRecord>> {
        let result = self.list_instances_now(id);
        Box::pin(async move { result })
    }

    fn attach_private_address(&self, id: InstanceId) -> ApiFuture<'_, ()> {
        let result = self.attach_private_address_now(id);
        Box::pin(async move { result })
    }

    fn list_addresses(&self, id: InstanceId) -> ApiFuture<'_, Vec<AddressRecord>> {
        let result = self.list_addresses_now(id);
        Box::pin(async move { result })
    }

    fn update_instance_label<'a>(&'a self, id: InstanceId, label: &'a str) -> ApiFuture<'a, ()> {
        let result = self.update_instance_label_now(id, label);
        Box::pin(async move { result })
    }

    fn list_startup_scripts(&self) -> ApiFuture<'_, Vec<StartupScriptRecord>> {
        let result = self.list_startup_scripts_now();
        Box::pin(async move { result })
    }

    fn create_startup_script<'a>(
        &'a self,
        label: &'a str,
        image_id: ImageId,
        body: &'a str,
        metadata: &'a ScriptMetadata,
    ) -> ApiFuture<'a, ScriptId> {
        let result = self.create_startup_script_now(label, image_id, body, metadata);
        Box::pin(async move { result })
    }

    fn update_startup_script<'a>(
        &'a self,
        id: ScriptId,
        body: &'a str,
    ) -> ApiFuture<'a, ScriptId> {
        let result = self.update_startup_script_now(id, body);
        Box::pin(async move { result })
    }

    fn create_disk_from_script<'a>(
        &'a self,
        request: &'a ScriptDiskRequest,
    ) -> ApiFuture<'a, DiskId> {
        let result = self.create_disk_from_script_now(request);
        Box::pin(async move { result })
    }

    fn create_disk<'a>(
        &'a self,
        instance_id: InstanceId,
        kind: DiskKind,
        label: &'a str,
        size_mb: u64,
    ) -> ApiFuture<'a, DiskId> {
        let result = self.create_disk_now(instance_id, kind, label, size_mb);
        Box::pin(async move { result })
    }

    fn create_boot_config<'a>(
        &'a self,
        instance_id: InstanceId,
        kernel_id: KernelId,
        label: &'a str,
        layout: &'a DeviceLayout,
    ) -> ApiFuture<'a, ConfigId> {
        let result = self.create_boot_config_now(instance_id, kernel_id, label, layout);
        Box::pin(async move { result })
    }

    fn boot(&self, instance_id: InstanceId, config_id: ConfigId) -> ApiFuture<'_, JobId> {
        let result = self.boot_now(instance_id, config_id);
        Box::pin(async move { result })
    }
}
