//! End-to-end tests of the provisioning pipeline against mocked collaborators

#[cfg(test)]
mod tests {
    use crate::config::Action;
    use crate::error::ControllerError;
    use crate::hypervisor::network::NetworkOutcome;
    use crate::hypervisor::profile::{PROFILE_NAME, ProfileOutcome};
    use crate::hypervisor::storage::StorageOutcome;
    use crate::registrar::RegistrationOutcome;
    use crate::report::WarningKind;
    use crate::pipeline::{Collaborators, Pipeline};
    use crate::signal::{COMPLETION_LABEL, COMPLETION_VALUE};
    use crate::test_utils::{FakeInterfaces, MockNodeStore, TestHost, node_record, vm_host};
    use lxd_client::{ConfigChange, LxdClientTrait};
    use std::time::Duration;

    fn nic_device(host: &TestHost) -> (String, String) {
        let profile = host.lxd.profile(PROFILE_NAME).unwrap();
        let nic = &profile.devices["eth0"];
        (nic["nictype"].clone(), nic["parent"].clone())
    }

    #[tokio::test]
    async fn test_fresh_host_is_fully_provisioned() {
        let host = TestHost::fresh();

        let report = host.pipeline().run().await.unwrap();
        assert!(!report.short_circuited);
        assert_eq!(report.identity.as_ref().unwrap().system_id, "abc123");

        let init = report.initialization.unwrap();
        assert_eq!(init.storage, StorageOutcome::Created);
        assert!(matches!(init.network, NetworkOutcome::Skipped(_)));
        assert_eq!(init.profile, ProfileOutcome::Created);

        // 80% of the 100 GiB machine
        let pool = host.lxd.storage_pool("default").unwrap();
        assert_eq!(pool.size(), Some("80GiB"));

        // No br0 on the host: macvlan on the uplink
        assert_eq!(nic_device(&host), ("macvlan".to_string(), "eth0".to_string()));
        assert_eq!(host.lxd.profile(PROFILE_NAME).unwrap().devices["root"]["pool"], "default");
        assert!(host.lxd.has_project("maas"));

        let info = host.lxd.server_info().await.unwrap();
        assert!(info.trust_password_set());
        assert_eq!(info.https_address(), Some("10.0.0.5:8443"));
        assert!(host.applier.applied().contains(&ConfigChange::RestartDaemon));

        let hosts = host.maas.vm_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "node-01");
        assert_eq!(hosts[0].zone_name(), Some("z1"));
        assert_eq!(hosts[0].pool_name(), Some("p1"));
        assert!(matches!(report.registration, Some(RegistrationOutcome::Created { .. })));

        assert!(report.validated);
        assert!(report.signal_published);
        assert!(host.nodes.record().is_provisioned());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_host_bridge_selects_bridged_nic() {
        let mut host = TestHost::fresh();
        host.interfaces = FakeInterfaces::default()
            .with_interface("eth0", false)
            .with_interface("br0", true);

        let report = host.pipeline().run().await.unwrap();
        assert_eq!(report.initialization.unwrap().network, NetworkOutcome::Created);
        assert_eq!(nic_device(&host), ("bridged".to_string(), "br0".to_string()));

        let network = host.lxd.network("lxdbr0").unwrap();
        assert_eq!(network.config.get("ipv4.nat").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn test_rerun_without_label_creates_nothing_new() {
        let host = TestHost::fresh();
        host.pipeline().run().await.unwrap();
        host.nodes.remove_label(COMPLETION_LABEL);

        let report = host.pipeline().run().await.unwrap();
        let init = report.initialization.unwrap();
        assert_eq!(init.storage, StorageOutcome::Unchanged);
        assert_eq!(init.profile, ProfileOutcome::Exists);
        assert!(matches!(
            report.registration,
            Some(RegistrationOutcome::AlreadyRegistered { ref name, .. }) if name == "node-01"
        ));

        assert_eq!(host.lxd.call_count("create_storage_pool"), 1);
        assert_eq!(host.lxd.call_count("update_storage_pool"), 0);
        assert_eq!(host.lxd.call_count("create_profile"), 1);
        assert_eq!(host.lxd.call_count("create_project"), 1);
        assert_eq!(host.maas.call_count("create_vm_host"), 1);
        assert_eq!(host.maas.vm_hosts().len(), 1);
        assert!(host.nodes.record().is_provisioned());
    }

    #[tokio::test]
    async fn test_labelled_node_short_circuits() {
        let host = TestHost::fresh();
        host.pipeline().run().await.unwrap();
        let lxd_calls = host.lxd.total_calls();
        let maas_calls = host.maas.total_calls();

        let report = host.pipeline().run().await.unwrap();
        assert!(report.short_circuited);
        assert!(report.identity.is_some());
        assert!(report.initialization.is_none());
        assert!(report.registration.is_none());
        assert_eq!(host.lxd.total_calls(), lxd_calls);
        assert_eq!(host.maas.total_calls(), maas_calls);
    }

    #[tokio::test]
    async fn test_labelled_node_without_provider_id_still_short_circuits() {
        let host = TestHost::fresh();
        let mut record = node_record("node-01", "", "10.0.0.5");
        record
            .labels
            .insert(COMPLETION_LABEL.to_string(), COMPLETION_VALUE.to_string());
        let nodes = MockNodeStore::new(record);
        let pipeline = Pipeline::new(
            &host.config,
            Collaborators {
                nodes: &nodes,
                maas: &host.maas,
                connector: &host.connector,
                interfaces: &host.interfaces,
            },
        );

        let report = pipeline.run().await.unwrap();
        assert!(report.short_circuited);
        assert!(report.identity.is_none());
        assert_eq!(report.warning_count(WarningKind::FactResolution), 1);
        assert_eq!(host.lxd.total_calls(), 0);
        assert_eq!(host.maas.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_name_conflict_is_fatal_and_leaves_node_unlabelled() {
        let host = TestHost::fresh();
        host.maas.add_vm_host(vm_host(1, "node-01", "other"));

        let result = host.pipeline().run().await;
        assert!(matches!(result, Err(ControllerError::RegistrationConflict(_))));
        assert!(!host.nodes.record().is_provisioned());
        assert_eq!(host.maas.vm_hosts().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_readiness_blocks_the_label() {
        let mut host = TestHost::fresh();
        // Registration alone never creates the storage pool
        host.config.action = Action::Register;

        let result = host.pipeline().run().await;
        assert!(matches!(result, Err(ControllerError::ValidationFailure(_))));
        assert_eq!(host.lxd.call_count("create_storage_pool"), 0);
        assert_eq!(host.maas.vm_hosts().len(), 1);
        assert!(!host.nodes.record().is_provisioned());
    }

    #[tokio::test]
    async fn test_init_only_does_not_register() {
        let mut host = TestHost::fresh();
        host.config.action = Action::Init;

        let report = host.pipeline().run().await.unwrap();
        assert!(report.initialization.is_some());
        assert!(report.registration.is_none());
        assert!(!report.signal_published);
        assert_eq!(host.maas.call_count("list_vm_hosts"), 0);
        assert!(!host.nodes.record().is_provisioned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_maas_uses_defaults_and_still_fails_registration() {
        let host = TestHost::fresh();
        host.maas.set_unreachable(true);

        let result = host.pipeline().run().await;
        assert!(matches!(result, Err(ControllerError::Maas(_))));

        // Initialization ran with the fallback size before registration gave up
        let pool = host.lxd.storage_pool("default").unwrap();
        assert_eq!(pool.size(), Some("50GiB"));
        assert!(!host.nodes.record().is_provisioned());
    }

    #[tokio::test]
    async fn test_label_failure_is_only_a_warning() {
        let host = TestHost::fresh();
        host.nodes.set_fail_patch(true);

        let report = host.pipeline().run().await.unwrap();
        assert!(report.validated);
        assert!(!report.signal_published);
        assert_eq!(report.warning_count(WarningKind::SignalPublish), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_waits_for_the_stagger() {
        let mut host = TestHost::fresh();
        host.config.register_stagger = Duration::from_secs(10);
        let started = tokio::time::Instant::now();

        host.pipeline().run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
    }
}
