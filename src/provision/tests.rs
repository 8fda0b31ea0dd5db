//! Unit tests for the provisioning orchestrator.

use std::time::Duration;

use tokio::time::sleep;

use super::*;
use crate::api::AddressRecord;
use crate::catalog::StaticCatalog;
use crate::naming::derive_display_name;
use crate::poll::{Poller, cancellation};
use crate::startup_script::ScriptTemplate;
use crate::test_support::{FakeResourceApi, Operation, catalog_with_disk};
use crate::types::{ImageId, InstanceId, KernelId, PlanId, ZoneId};

fn spec() -> InstanceSpec {
    InstanceSpec::builder()
        .cluster_name("c1")
        .zone("3")
        .sku("1")
        .kernel_id("138")
        .image_id("146")
        .root_password("hunter2")
        .build()
        .unwrap_or_else(|err| panic!("spec should build: {err}"))
}

fn settings() -> ProvisionerSettings {
    ProvisionerSettings::default()
        .with_poller(Poller::new(Duration::from_secs(1), Duration::from_secs(30)))
}

fn provisioner(api: &FakeResourceApi) -> Provisioner<FakeResourceApi, StaticCatalog> {
    Provisioner::new(api.clone(), catalog_with_disk("1", 20), settings())
}

fn remote_step(err: &ProvisionError) -> Option<Step> {
    match err {
        ProvisionError::Remote { step, .. } => Some(*step),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_issues_calls_in_order() {
    let api = FakeResourceApi::new().brand_new_on_poll(2).running_on_poll(3);
    let result = provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    assert_eq!(
        api.operations(),
        vec![
            Operation::CreateInstance,
            Operation::AttachPrivateAddress,
            Operation::ListAddresses,
            Operation::UpdateInstanceLabel,
            Operation::ListStartupScripts,
            Operation::CreateStartupScript,
            Operation::CreateDiskFromScript,
            Operation::CreateDisk,
            Operation::CreateBootConfig,
            Operation::Boot,
            Operation::UpdateInstanceLabel,
        ]
    );
    assert_eq!(result.status, InstanceStatus::Running);
    assert_eq!(api.count(Operation::ListInstances), 5);
}

#[tokio::test(start_paused = true)]
async fn every_instance_scoped_call_targets_the_created_instance() {
    let api = FakeResourceApi::new();
    let result = provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let targeted: Vec<_> = api
        .journal()
        .into_iter()
        .filter_map(|call| call.instance_id)
        .collect();
    assert!(!targeted.is_empty());
    assert!(targeted.iter().all(|id| *id == result.instance_id));
    assert_eq!(
        api.placement(result.instance_id),
        Some((ZoneId::new(3), PlanId::new(1)))
    );
}

#[tokio::test(start_paused = true)]
async fn disks_and_boot_configuration_follow_the_machine_type() {
    let api = FakeResourceApi::new();
    let result = provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let disks = api.disks();
    let [root, swap] = disks.as_slice() else {
        panic!("expected two disks, found {disks:?}");
    };
    assert_eq!(root.id, result.root_disk_id);
    assert_eq!(root.size_mb, 19_968);
    assert_eq!(root.label, result.display_name);
    assert_eq!(root.image_id, Some(ImageId::new(146)));
    assert_eq!(swap.id, result.swap_disk_id);
    assert_eq!(swap.kind, "swap");
    assert_eq!(swap.label, "swap-disk");
    assert_eq!(swap.size_mb, 512);

    let configs = api.boot_configs();
    let [config] = configs.as_slice() else {
        panic!("expected one boot configuration, found {configs:?}");
    };
    assert_eq!(config.id, result.boot_config_id);
    assert_eq!(config.root_device_num, 1);
    assert_eq!(config.disks, vec![root.id, swap.id]);
    assert_eq!(config.kernel_id, KernelId::new(138));
}

#[tokio::test(start_paused = true)]
async fn label_is_derived_from_public_address_and_written_twice() {
    let api = FakeResourceApi::new();
    let result = provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let expected = derive_display_name("c1", &result.public_ip)
        .unwrap_or_else(|err| panic!("name should derive: {err}"));
    assert_eq!(result.display_name, expected);
    assert_eq!(
        api.labels(result.instance_id),
        vec![expected.clone(), expected]
    );
    assert!(result.private_ip.starts_with("192.168."));
}

#[tokio::test(start_paused = true)]
async fn root_disk_carries_script_parameters() {
    let api = FakeResourceApi::new();
    let result = provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let scripts = api.scripts();
    let [script] = scripts.as_slice() else {
        panic!("expected one script, found {scripts:?}");
    };
    assert_eq!(script.label, "linode-demo");
    assert_eq!(script.body, ScriptTemplate::builtin().render("c1"));
    assert_eq!(script.description, "Startup script for cluster c1");
    assert_eq!(script.image_id, Some(ImageId::new(146)));

    let disks = api.disks();
    let root = disks
        .first()
        .unwrap_or_else(|| panic!("root disk should exist"));
    assert_eq!(root.script_id, Some(script.id));
    let parameters: serde_json::Value = serde_json::from_str(
        root.parameters
            .as_deref()
            .unwrap_or_else(|| panic!("root disk should carry parameters")),
    )
    .unwrap_or_else(|err| panic!("parameters should be JSON: {err}"));
    assert_eq!(
        parameters,
        serde_json::json!({
            "cluster": "c1",
            "instance": result.display_name,
            "stack_script_id": script.id.to_string(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn configured_display_name_labels_disk_and_boot_configuration() {
    let api = FakeResourceApi::new();
    let custom = InstanceSpec {
        display_name: Some(String::from("web")),
        ..spec()
    };
    let result = provisioner(&api)
        .provision(&custom)
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let disks = api.disks();
    assert_eq!(disks.first().map(|disk| disk.label.as_str()), Some("web"));
    let configs = api.boot_configs();
    assert_eq!(configs.first().map(|config| config.label.as_str()), Some("web"));
    assert_ne!(result.display_name, "web");
}

#[tokio::test(start_paused = true)]
async fn existing_script_is_updated_in_place() {
    let api = FakeResourceApi::new().with_script("linode-demo", "#!/bin/sh\nexit 0\n");
    provisioner(&api)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    assert_eq!(api.count(Operation::CreateStartupScript), 0);
    assert_eq!(api.count(Operation::UpdateStartupScript), 1);
    let scripts = api.scripts();
    let [script] = scripts.as_slice() else {
        panic!("expected one script, found {scripts:?}");
    };
    assert_eq!(script.body, ScriptTemplate::builtin().render("c1"));
    assert_eq!(script.revisions, 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_keep_a_single_script() {
    let api = FakeResourceApi::new();
    let orchestrator = provisioner(&api);
    for _ in 0..2 {
        orchestrator
            .provision(&spec())
            .await
            .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));
    }
    assert_eq!(api.scripts().len(), 1);
    assert_eq!(api.count(Operation::CreateStartupScript), 1);
    assert_eq!(api.count(Operation::UpdateStartupScript), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_script_body_replaces_default() {
    let api = FakeResourceApi::new();
    let custom = ProvisionerSettings {
        startup_script: ScriptTemplate::parse("#!/bin/bash\necho @CLUSTER_NAME@\n")
            .unwrap_or_else(|err| panic!("template should parse: {err}")),
        startup_script_label: String::from("bootstrap"),
        ..settings()
    };
    Provisioner::new(api.clone(), catalog_with_disk("1", 20), custom)
        .provision(&spec())
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    let scripts = api.scripts();
    let [script] = scripts.as_slice() else {
        panic!("expected one script, found {scripts:?}");
    };
    assert_eq!(script.label, "bootstrap");
    assert_eq!(script.body, "#!/bin/bash\necho c1\n");
}

#[tokio::test(start_paused = true)]
async fn create_failure_stops_before_any_other_call() {
    let api = FakeResourceApi::new();
    api.fail_on(Operation::CreateInstance);
    let mut state = ProvisioningState::new();
    let err = provisioner(&api)
        .resume(&spec(), &mut state)
        .await
        .expect_err("create should fail");

    assert_eq!(remote_step(&err), Some(Step::CreateInstance));
    assert_eq!(api.operations(), vec![Operation::CreateInstance]);
    assert_eq!(state.stage(), Stage::Pending);
    assert_eq!(state.instance_id(), None);
}

#[tokio::test(start_paused = true)]
async fn boot_failure_skips_running_wait_and_relabel() {
    let api = FakeResourceApi::new();
    api.fail_on(Operation::Boot);
    let mut state = ProvisioningState::new();
    let err = provisioner(&api)
        .resume(&spec(), &mut state)
        .await
        .expect_err("boot should fail");

    assert_eq!(remote_step(&err), Some(Step::Boot));
    assert_eq!(err.step(), Some(Step::Boot));
    assert_eq!(api.operations().last(), Some(&Operation::Boot));
    assert_eq!(api.count(Operation::UpdateInstanceLabel), 1);
    assert_eq!(state.stage(), Stage::DisksCreated);
    assert!(state.boot_config_id().is_some());
    assert!(state.boot_job_id().is_none());
}

#[tokio::test(start_paused = true)]
async fn brand_new_timeout_reports_last_observed_status() {
    let api = FakeResourceApi::new().brand_new_on_poll(u32::MAX);
    let orchestrator = Provisioner::new(
        api.clone(),
        catalog_with_disk("1", 20),
        ProvisionerSettings::default()
            .with_poller(Poller::new(Duration::from_secs(1), Duration::from_secs(10))),
    );
    let err = orchestrator
        .provision(&spec())
        .await
        .expect_err("wait should time out");

    let ProvisionError::ConvergenceTimeout {
        step,
        target,
        last_observed,
        waited,
        ..
    } = err
    else {
        panic!("expected a convergence timeout, got {err:?}");
    };
    assert_eq!(step, Step::AwaitBrandNew);
    assert_eq!(target, InstanceStatus::BrandNew);
    assert_eq!(last_observed, Some(InstanceStatus::BeingCreated));
    assert!(waited >= Duration::from_secs(10));
    assert_eq!(api.count(Operation::ListAddresses), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_observation_failures_are_tolerated() {
    let api = FakeResourceApi::new().failing_lists(2).unlisted_polls(1);
    let result = provisioner(&api).provision(&spec()).await;

    assert!(result.is_ok(), "unexpected failure: {result:?}");
    assert!(api.count(Operation::ListInstances) >= 5);
}

#[tokio::test(start_paused = true)]
async fn missing_public_address_is_inconsistent() {
    let api = FakeResourceApi::new().with_addresses(vec![AddressRecord {
        address: String::from("192.168.130.4"),
        is_public: false,
    }]);
    let err = provisioner(&api)
        .provision(&spec())
        .await
        .expect_err("addresses should be rejected");

    assert!(
        matches!(
            err,
            ProvisionError::Inconsistent {
                step: Step::ResolveAddresses,
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(api.count(Operation::UpdateInstanceLabel), 0);
}

#[tokio::test(start_paused = true)]
async fn non_ipv4_public_address_fails_labelling() {
    let api = FakeResourceApi::new().with_addresses(vec![
        AddressRecord {
            address: String::from("2001:db8::1"),
            is_public: true,
        },
        AddressRecord {
            address: String::from("192.168.130.4"),
            is_public: false,
        },
    ]);
    let err = provisioner(&api)
        .provision(&spec())
        .await
        .expect_err("address should be rejected");

    assert!(
        matches!(
            err,
            ProvisionError::Inconsistent {
                step: Step::LabelInstance,
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(api.count(Operation::UpdateInstanceLabel), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_sku_fails_before_remote_calls() {
    let api = FakeResourceApi::new();
    let unknown = InstanceSpec {
        sku: String::from("999"),
        ..spec()
    };
    let err = provisioner(&api)
        .provision(&unknown)
        .await
        .expect_err("sku should be unknown");

    assert!(
        matches!(err, ProvisionError::Catalog(_)),
        "unexpected error: {err:?}"
    );
    assert!(api.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn undersized_machine_type_is_rejected() {
    let api = FakeResourceApi::new();
    let err = Provisioner::new(api.clone(), catalog_with_disk("1", 0), settings())
        .provision(&spec())
        .await
        .expect_err("disk should be too small");

    assert_eq!(
        err,
        ProvisionError::InsufficientDisk {
            sku: String::from("1"),
            disk_gb: 0,
        }
    );
    assert!(api.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_running_wait() {
    let api = FakeResourceApi::new().running_on_poll(u32::MAX);
    let (handle, cancel) = cancellation();
    let orchestrator = provisioner(&api).with_cancellation(cancel);
    let mut state = ProvisioningState::new();
    let run_spec = spec();

    let (outcome, ()) = tokio::join!(orchestrator.resume(&run_spec, &mut state), async {
        sleep(Duration::from_secs(5)).await;
        handle.cancel();
    });

    let err = outcome.expect_err("run should be cancelled");
    assert!(
        matches!(
            err,
            ProvisionError::Cancelled {
                step: Step::AwaitRunning,
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(state.stage(), Stage::Booted);
    assert_eq!(state.last_status(), Some(InstanceStatus::BrandNew));
    assert_eq!(api.count(Operation::UpdateInstanceLabel), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_after_swap_failure_reuses_existing_resources() {
    let api = FakeResourceApi::new();
    api.fail_on(Operation::CreateDisk);
    let orchestrator = provisioner(&api);
    let mut state = ProvisioningState::new();

    let err = orchestrator
        .resume(&spec(), &mut state)
        .await
        .expect_err("swap disk should fail");
    assert_eq!(remote_step(&err), Some(Step::CreateSwapDisk));
    assert_eq!(state.stage(), Stage::NamedAndSized);
    let root = state
        .root_disk_id()
        .unwrap_or_else(|| panic!("root disk should be recorded"));
    assert!(state.swap_disk_id().is_none());

    api.clear_failure(Operation::CreateDisk);
    let result = orchestrator
        .resume(&spec(), &mut state)
        .await
        .unwrap_or_else(|resume_err| panic!("resume should succeed: {resume_err}"));

    assert_eq!(result.root_disk_id, root);
    assert_eq!(api.count(Operation::CreateInstance), 1);
    assert_eq!(api.count(Operation::CreateDiskFromScript), 1);
    assert_eq!(api.count(Operation::CreateDisk), 2);
    assert_eq!(state.stage(), Stage::Complete);
}

#[tokio::test(start_paused = true)]
async fn persisted_state_round_trips_through_json() {
    let api = FakeResourceApi::new();
    api.fail_on(Operation::CreateBootConfig);
    let orchestrator = provisioner(&api);
    let mut state = ProvisioningState::new();
    orchestrator
        .resume(&spec(), &mut state)
        .await
        .expect_err("boot configuration should fail");

    let saved = serde_json::to_string(&state)
        .unwrap_or_else(|err| panic!("state should serialise: {err}"));
    let mut restored: ProvisioningState = serde_json::from_str(&saved)
        .unwrap_or_else(|err| panic!("state should deserialise: {err}"));
    assert_eq!(restored, state);

    api.clear_failure(Operation::CreateBootConfig);
    orchestrator
        .resume(&spec(), &mut restored)
        .await
        .unwrap_or_else(|resume_err| panic!("resume should succeed: {resume_err}"));
    assert_eq!(api.count(Operation::CreateDisk), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_rejects_state_missing_its_instance() {
    let api = FakeResourceApi::new();
    let mut state = ProvisioningState {
        stage: Stage::Created,
        ..ProvisioningState::new()
    };
    let err = provisioner(&api)
        .resume(&spec(), &mut state)
        .await
        .expect_err("state should be incomplete");

    assert_eq!(
        err,
        ProvisionError::IncompleteState {
            stage: Stage::Created,
            missing: "instance_id",
        }
    );
    assert!(api.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn resume_refuses_to_create_a_second_instance() {
    let api = FakeResourceApi::new();
    let mut state = ProvisioningState {
        instance_id: Some(InstanceId::new(5)),
        ..ProvisioningState::new()
    };
    let err = provisioner(&api)
        .resume(&spec(), &mut state)
        .await
        .expect_err("pending state with an instance should be rejected");

    assert_eq!(
        err,
        ProvisionError::ConflictingState {
            stage: Stage::Pending,
            field: "instance_id",
        }
    );
    assert_eq!(state.instance_id, Some(InstanceId::new(5)));
    assert!(api.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_do_not_interfere() {
    let api = FakeResourceApi::new().running_on_poll(2);
    let orchestrator = provisioner(&api);
    let first_spec = spec();
    let second_spec = InstanceSpec {
        cluster_name: String::from("c2"),
        ..spec()
    };

    let (first_outcome, second_outcome) = tokio::join!(
        orchestrator.provision(&first_spec),
        orchestrator.provision(&second_spec),
    );
    let first = first_outcome.unwrap_or_else(|err| panic!("first run should succeed: {err}"));
    let second = second_outcome.unwrap_or_else(|err| panic!("second run should succeed: {err}"));

    assert_ne!(first.instance_id, second.instance_id);
    assert!(first.display_name.starts_with("c1-"));
    assert!(second.display_name.starts_with("c2-"));
    assert_ne!(first.root_disk_id, second.root_disk_id);
    assert_eq!(api.count(Operation::CreateInstance), 2);
    assert_eq!(api.scripts().len(), 1);
}
