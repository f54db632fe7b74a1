//! End-to-end engine tests over the in-memory runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{event_index, log_event, new_event_log, EventLog, MockRuntime};
use wirelab_core::error::LabError;
use wirelab_core::topology::TopologySection;
use wirelab_core::{LinkDescriptor, MgmtNet, NodeConfig, NodeState, Result, Topology};
use wirelab_engine::{DeployOptions, Engine, ExternalWaiter};
use wirelab_links::Wire;
use wirelab_netlink::macvlan::MacvlanMode;

fn linux_node() -> NodeConfig {
    NodeConfig {
        image: Some("alpine:3".to_string()),
        ..Default::default()
    }
}

fn topology(
    name: &str,
    nodes: Vec<(&str, NodeConfig)>,
    links: Vec<LinkDescriptor>,
) -> Topology {
    Topology {
        name: name.to_string(),
        mgmt: MgmtNet::default(),
        topology: TopologySection {
            nodes: nodes
                .into_iter()
                .map(|(n, c)| (n.to_string(), c))
                .collect(),
            links,
            ..Default::default()
        },
    }
}

fn options(dir: &tempfile::TempDir) -> DeployOptions {
    DeployOptions {
        lab_dir_base: Some(dir.path().to_path_buf()),
        hosts_file: dir.path().join("hosts"),
        timeout: Duration::from_secs(30),
        ..Default::default()
    }
}

/// Wire fake that records veth creations into the shared event log.
struct RecordingWire {
    events: EventLog,
}

#[async_trait]
impl Wire for RecordingWire {
    async fn create_veth(&self, _a: &str, _b: &str, _mtu: u32) -> Result<()> {
        log_event(&self.events, "veth-created");
        Ok(())
    }

    async fn move_to_netns(&self, _name: &str, _ns_path: &str) -> Result<()> {
        Ok(())
    }

    async fn finish_endpoint(
        &self,
        _ns_path: Option<&str>,
        _current: &str,
        _desired: &str,
        mac: Option<[u8; 6]>,
        _mtu: Option<u32>,
        _master: Option<&str>,
    ) -> Result<Option<[u8; 6]>> {
        Ok(mac)
    }

    async fn create_macvlan(
        &self,
        _name: &str,
        _parent: &str,
        _mode: MacvlanMode,
        _mtu: Option<u32>,
    ) -> Result<()> {
        log_event(&self.events, "macvlan-created");
        Ok(())
    }

    async fn remove_if_exists(&self, _ns_path: Option<&str>, _name: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn wait_for_chain_orders_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let events = new_event_log();
    let runtime = MockRuntime::new(events);

    let mut b = linux_node();
    b.wait_for = vec!["a".to_string()];
    let mut c = linux_node();
    c.wait_for = vec!["b".to_string()];

    let topo = topology("chain", vec![("a", linux_node()), ("b", b), ("c", c)], vec![]);
    let engine = Engine::new(topo, runtime.clone(), options(&dir)).unwrap();

    let report = engine.deploy().await.unwrap();
    assert!(!report.has_failures());

    let a = report.node("a").unwrap();
    let b = report.node("b").unwrap();
    let c = report.node("c").unwrap();
    assert_eq!(a.state, NodeState::Configured);

    // every edge holds at runtime: the dependee reaches `created`
    // before the depender starts its deploy work
    assert!(a.created_ms.unwrap() <= b.deploy_started_ms.unwrap());
    assert!(b.created_ms.unwrap() <= c.deploy_started_ms.unwrap());
    assert!(b.deploy_started_ms.unwrap() <= b.created_ms.unwrap());
}

#[tokio::test]
async fn cycle_fails_before_any_container() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut x = linux_node();
    x.wait_for = vec!["y".to_string()];
    let mut y = linux_node();
    y.wait_for = vec!["x".to_string()];

    let topo = topology("cycle", vec![("x", x), ("y", y)], vec![]);
    let engine = Engine::new(topo, runtime.clone(), options(&dir)).unwrap();

    let err = engine.deploy().await.unwrap_err();
    assert!(matches!(err, LabError::Cyclic(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(runtime.created_count(), 0);
}

#[tokio::test]
async fn static_ip_nodes_precede_dynamic_ones() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut stat = linux_node();
    stat.mgmt_ipv4 = Some("172.20.20.2/24".to_string());

    let topo = topology(
        "addr",
        vec![("s", stat), ("d1", linux_node()), ("d2", linux_node())],
        vec![],
    );
    let engine = Engine::new(topo, runtime, options(&dir)).unwrap();
    let report = engine.deploy().await.unwrap();

    let s = report.node("s").unwrap();
    assert_eq!(s.ipv4.as_deref(), Some("172.20.20.2"));

    for dynamic in ["d1", "d2"] {
        let d = report.node(dynamic).unwrap();
        assert_ne!(d.ipv4, s.ipv4);
        assert!(s.created_ms.unwrap() <= d.deploy_started_ms.unwrap());
    }
}

#[tokio::test]
async fn links_wire_only_after_both_endpoints_created() {
    let dir = tempfile::tempdir().unwrap();
    let events = new_event_log();
    let runtime = MockRuntime::new(events.clone());

    let mut b = linux_node();
    b.wait_for = vec!["a".to_string()];

    let topo = topology(
        "wired",
        vec![("a", linux_node()), ("b", b)],
        vec![LinkDescriptor::new("a:eth1", "b:eth1")],
    );
    let wire = Arc::new(RecordingWire {
        events: events.clone(),
    });
    let engine = Engine::with_wire(topo, runtime, options(&dir), wire).unwrap();
    let report = engine.deploy().await.unwrap();
    assert!(!report.has_failures());

    let veth = event_index(&events, "veth-created").expect("wire deployed");
    let start_a = event_index(&events, "start:clab-wired-a").unwrap();
    let start_b = event_index(&events, "start:clab-wired-b").unwrap();
    assert!(veth > start_a);
    assert!(veth > start_b);
}

#[tokio::test]
async fn duplicate_endpoints_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let topo = topology(
        "dup",
        vec![("a", linux_node()), ("b", linux_node()), ("c", linux_node())],
        vec![
            LinkDescriptor::new("a:eth1", "b:eth1"),
            LinkDescriptor::new("a:eth1", "c:eth1"),
        ],
    );
    let engine = Engine::new(topo, runtime, options(&dir)).unwrap();
    let err = engine.deploy().await.unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("duplicate endpoint"));
}

#[tokio::test]
async fn destroy_twice_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let topo = topology("gone", vec![("a", linux_node()), ("b", linux_node())], vec![]);
    let engine = Engine::new(topo, runtime.clone(), options(&dir)).unwrap();

    engine.deploy().await.unwrap();
    assert_eq!(runtime.created_count(), 2);

    engine.destroy().await.unwrap();
    assert_eq!(runtime.removed_count(), 2);

    // second destroy finds nothing to remove
    engine.destroy().await.unwrap();
    assert_eq!(runtime.removed_count(), 2);
}

#[tokio::test]
async fn missing_external_dependency_leaves_node_unscheduled() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut dependent = linux_node();
    dependent.network_mode = wirelab_core::NetworkMode::Container("outsider".to_string());

    let topo = topology(
        "ext",
        vec![("n", linux_node()), ("dep", dependent)],
        vec![],
    );
    let mut opts = options(&dir);
    opts.external = ExternalWaiter {
        budget: Duration::from_millis(200),
        frequency: Duration::from_millis(40),
    };

    let engine = Engine::new(topo, runtime.clone(), opts).unwrap();
    let report = engine.deploy().await.unwrap();

    // the lab completes with a warning: the dependent never scheduled,
    // the other node deployed
    assert_eq!(report.node("n").unwrap().state, NodeState::Configured);
    assert_eq!(report.node("dep").unwrap().state, NodeState::Failed);
    assert_eq!(report.failed, vec!["dep".to_string()]);
    assert_eq!(runtime.created_count(), 1);
}

#[tokio::test]
async fn managed_namespace_reference_is_ordered_and_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut sharer = linux_node();
    sharer.network_mode = wirelab_core::NetworkMode::Container("base".to_string());

    let topo = topology("shared", vec![("base", linux_node()), ("s", sharer)], vec![]);
    let engine = Engine::new(topo, runtime, options(&dir)).unwrap();
    let report = engine.deploy().await.unwrap();

    let base = report.node("base").unwrap();
    let sharer = report.node("s").unwrap();
    assert!(base.created_ms.unwrap() <= sharer.deploy_started_ms.unwrap());
}

#[tokio::test]
async fn health_gated_dependency_waits_for_healthy_producer() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());
    runtime
        .health
        .lock()
        .unwrap()
        .insert("clab-health-db".to_string(), true);

    let mut app = linux_node();
    app.wait_for = vec!["db:healthy".to_string()];

    let topo = topology("health", vec![("db", linux_node()), ("app", app)], vec![]);
    let engine = Engine::new(topo, runtime, options(&dir)).unwrap();
    let report = engine.deploy().await.unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.node("db").unwrap().state, NodeState::Healthy);
    assert_eq!(report.node("app").unwrap().state, NodeState::Configured);
}

#[tokio::test]
async fn skip_post_deploy_does_not_block_on_health() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());
    // no health answer configured: a health wait would never finish

    let mut app = linux_node();
    app.wait_for = vec!["db:healthy".to_string()];

    let topo = topology("skiphealth", vec![("db", linux_node()), ("app", app)], vec![]);
    let mut opts = options(&dir);
    opts.skip_post_deploy = true;

    let engine = Engine::new(topo, runtime, opts).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(10), engine.deploy())
        .await
        .expect("deploy must not block on the health barrier")
        .unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.node("db").unwrap().state, NodeState::Created);
}

#[tokio::test]
async fn cancellation_destroys_partial_lab() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut slow = linux_node();
    slow.startup_delay = Some(30);

    let topo = topology("abort", vec![("fast", linux_node()), ("slow", slow)], vec![]);
    let engine = Arc::new(Engine::new(topo, runtime.clone(), options(&dir)).unwrap());

    let cancel = engine.cancel_token();
    let deploy = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.deploy().await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(10), deploy)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(LabError::Cancelled)));

    // whatever was created got torn down again
    assert_eq!(runtime.created_count(), runtime.removed_count());
}

#[tokio::test]
async fn unknown_kind_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new(new_event_log());

    let mut weird = linux_node();
    weird.kind = "quantum-router".to_string();

    let topo = topology("kinds", vec![("q", weird)], vec![]);
    let err = Engine::new(topo, runtime, options(&dir)).unwrap_err();
    assert!(err.is_config());
    assert_eq!(err.exit_code(), 2);
}
