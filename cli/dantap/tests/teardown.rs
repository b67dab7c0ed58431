//! Integration tests for the DEL workflow and verb dispatch.

mod common;

use common::{FakeIpam, FakeLinkLayer, CONF};
use dan_descriptor::{AllocationResult, Descriptor, DescriptorStore, DeviceType};
use dan_tap::config::derive_tap_name;
use dan_tap::{Command, Invocation, IpamError, Plugin, PluginError};
use tempfile::{tempdir, TempDir};

const SANDBOX: &str = "5f2c1de8b0a14c7e";

fn plugin(link: FakeLinkLayer, ipam: FakeIpam) -> (Plugin<FakeLinkLayer, FakeIpam>, TempDir) {
    let dir = tempdir().unwrap();
    let store = DescriptorStore::new(dir.path());
    (Plugin::new(link, ipam, store), dir)
}

#[test]
fn test_del_removes_everything() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    plugin.cmd_add(SANDBOX, CONF.as_bytes()).unwrap();

    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert!(plugin.link().taps().is_empty());
    assert!(plugin.link().exists("br0"));
    assert_eq!(plugin.ipam().leases(), 0);
    assert!(plugin.store().load(SANDBOX).unwrap_err().is_not_found());
}

#[test]
fn test_del_twice_succeeds() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    plugin.cmd_add(SANDBOX, CONF.as_bytes()).unwrap();

    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();
    let links_after_first = plugin.link().taps();
    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert_eq!(plugin.link().taps(), links_after_first);
    assert!(plugin.link().exists("br0"));
}

#[test]
fn test_del_with_nothing_to_remove() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());

    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert_eq!(
        plugin.link().calls(),
        vec![format!("delete {}", derive_tap_name(SANDBOX))]
    );
}

#[test]
fn test_del_release_failure_is_fatal_but_cleanup_runs() {
    let ipam = FakeIpam::static_v4().failing_del();
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), ipam);
    plugin.cmd_add(SANDBOX, CONF.as_bytes()).unwrap();

    let err = plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap_err();

    assert!(matches!(err, PluginError::Allocation(IpamError::Exit { .. })));
    assert!(plugin.link().taps().is_empty());
    assert!(plugin.store().load(SANDBOX).unwrap_err().is_not_found());
}

#[test]
fn test_del_link_failure_is_not_fatal() {
    let tap_name = derive_tap_name(SANDBOX);
    let link = FakeLinkLayer::new().fail("delete", &tap_name);
    let (plugin, _dir) = plugin(link, FakeIpam::static_v4());
    plugin.cmd_add(SANDBOX, CONF.as_bytes()).unwrap();

    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert_eq!(plugin.ipam().leases(), 0);
    assert!(plugin.store().load(SANDBOX).unwrap_err().is_not_found());
}

#[test]
fn test_del_with_stale_config_still_tears_down() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    plugin.cmd_add(SANDBOX, CONF.as_bytes()).unwrap();

    let stale = {
        let mut conf: serde_json::Value = serde_json::from_str(CONF).unwrap();
        conf["cniVersion"] = "1.1.0".into();
        conf["bridgeIP"] = "10.0.0.1".into();
        serde_json::to_vec(&conf).unwrap()
    };
    plugin.cmd_del(SANDBOX, &stale).unwrap();

    assert!(plugin.link().taps().is_empty());
    assert_eq!(plugin.ipam().leases(), 0);
    assert!(plugin.store().load(SANDBOX).unwrap_err().is_not_found());
}

#[test]
fn test_del_without_ipam_is_rejected() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    let conf = {
        let mut conf: serde_json::Value = serde_json::from_str(CONF).unwrap();
        conf.as_object_mut().unwrap().remove("ipam");
        serde_json::to_vec(&conf).unwrap()
    };

    let err = plugin.cmd_del(SANDBOX, &conf).unwrap_err();

    assert!(matches!(err, PluginError::Configuration(_)));
    assert!(plugin.link().calls().is_empty());
}

#[test]
fn test_del_uses_stored_device_name() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    let with_override = {
        let mut conf: serde_json::Value = serde_json::from_str(CONF).unwrap();
        conf["tapName"] = "dan0".into();
        serde_json::to_vec(&conf).unwrap()
    };
    plugin.cmd_add(SANDBOX, &with_override).unwrap();

    // Teardown config no longer names the device
    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert!(!plugin.link().exists("dan0"));
}

#[test]
fn test_del_tolerates_unreadable_descriptor() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{}.json", SANDBOX)), b"{broken").unwrap();
    let plugin = Plugin::new(
        FakeLinkLayer::new(),
        FakeIpam::static_v4(),
        DescriptorStore::new(dir.path()),
    );

    plugin.cmd_del(SANDBOX, CONF.as_bytes()).unwrap();

    assert!(!dir.path().join(format!("{}.json", SANDBOX)).exists());
}

#[test]
fn test_run_add_prints_result() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());

    let output = plugin
        .run(&Invocation::new(Command::Add, SANDBOX), CONF.as_bytes())
        .unwrap()
        .expect("ADD prints a result");

    let result: AllocationResult = serde_json::from_str(&output).unwrap();
    assert_eq!(result.interfaces[0].name, derive_tap_name(SANDBOX));

    // The stored descriptor matches what a configurator rebuilds from the result
    let stored = plugin.store().load(SANDBOX).unwrap();
    assert_eq!(
        stored[0],
        Descriptor::build(derive_tap_name(SANDBOX), DeviceType::Tap, &result)
    );
}

#[test]
fn test_run_check_touches_nothing() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());

    let output = plugin
        .run(&Invocation::new(Command::Check, SANDBOX), CONF.as_bytes())
        .unwrap();

    assert!(output.is_none());
    assert!(plugin.link().calls().is_empty());
    assert!(plugin.ipam().calls().is_empty());
}

#[test]
fn test_run_check_rejects_bad_config() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());

    let err = plugin
        .run(
            &Invocation::new(Command::Check, SANDBOX),
            br#"{"cniVersion": "1.0.0", "bridge": "br0", "bridgeIP": "nope", "ipam": {"type": "static"}}"#,
        )
        .unwrap_err();

    assert!(matches!(err, PluginError::Configuration(_)));
}

#[test]
fn test_run_requires_sandbox_id() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    let mut invocation = Invocation::new(Command::Add, SANDBOX);
    invocation.container_id = None;

    let err = plugin.run(&invocation, CONF.as_bytes()).unwrap_err();

    assert_eq!(err.code(), 4);
    assert!(plugin.link().calls().is_empty());
}

#[test]
fn test_run_version() {
    let (plugin, _dir) = plugin(FakeLinkLayer::new(), FakeIpam::static_v4());
    let mut invocation = Invocation::new(Command::Version, SANDBOX);
    invocation.container_id = None;

    let output = plugin.run(&invocation, b"").unwrap().unwrap();

    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["cniVersion"], "1.0.0");
}
