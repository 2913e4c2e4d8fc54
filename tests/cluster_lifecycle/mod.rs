use std::sync::Arc;

use galera_qa::ClusterController;
use galera_qa::ClusterState;
use galera_qa::Error;
use galera_qa::LifecycleError;
use galera_qa::PortPlan;
use tokio_util::sync::CancellationToken;

use crate::common::fast_readiness;
use crate::common::read;
use crate::common::runner;
use crate::common::StubInstall;
use crate::common::StubRunner;

fn controller(
    install: &StubInstall,
    node_count: usize,
    base: u16,
) -> ClusterController<StubRunner> {
    ClusterController::new(
        Arc::new(install.spec(node_count)),
        fast_readiness(),
        runner(),
        CancellationToken::new(),
    )
    .with_port_plan(PortPlan::with_base(base))
}

/// Provision, initialize, start and tear down three stub nodes, checking
/// the artifacts each phase leaves behind
#[tokio::test]
async fn test_three_node_lifecycle_with_stub_tools() {
    let install = StubInstall::new();
    let mut cluster = controller(&install, 3, 4100);

    cluster.provision(None).await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Configured);
    for index in 1..=3 {
        let node = cluster.node(index).unwrap();
        let conf = read(&node.config_path);
        assert!(conf.starts_with("[mysqld]\nbinlog_format=ROW"));
        assert!(conf.contains(&format!("port={}", 4100 + 100 * index as u16)));
    }

    cluster.initialize().await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Initialized);
    for node in cluster.nodes() {
        assert!(node.data_dir.is_dir());
        assert!(read(&node.init_log).contains("installed"));
    }

    cluster.start(&[]).await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Running);
    assert!(cluster.nodes().iter().all(|n| n.process_id().is_some()));

    // only the first Galera node bootstraps, and never from a saved script
    let node1_log = read(&cluster.node(1).unwrap().log_path);
    assert!(node1_log.contains("--wsrep-new-cluster"));
    let node2_log = read(&cluster.node(2).unwrap().log_path);
    assert!(!node2_log.contains("--wsrep-new-cluster"));
    let script = read(&cluster.node(1).unwrap().startup_script);
    assert!(script.starts_with("#!/usr/bin/env bash\nexec "));
    assert!(!script.contains("--wsrep-new-cluster"));

    cluster.connection_check(2).await.unwrap();

    let failed = cluster.teardown().await.unwrap();
    assert!(failed.is_empty());
    assert_eq!(cluster.state(), ClusterState::Stopped);
    assert_eq!(read(&install.admin_log()).matches(" shutdown").count(), 3);
}

#[tokio::test]
async fn test_stop_and_restart_from_saved_script() {
    let install = StubInstall::new();
    let mut cluster = controller(&install, 2, 4200);
    cluster.provision(None).await.unwrap();
    cluster.initialize().await.unwrap();
    cluster.start(&[]).await.unwrap();

    cluster.stop_node(2).await.unwrap();
    assert_eq!(cluster.state(), ClusterState::PartiallyDown);
    assert!(!cluster.node(2).unwrap().is_ready());

    cluster.restart_node(2).await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Running);
    // the replayed start line appends a second banner to the node log
    assert_eq!(read(&cluster.node(2).unwrap().log_path).matches("mysqld --defaults-file").count(), 2);

    cluster.teardown().await.unwrap();
}

#[tokio::test]
async fn test_joiner_gets_seed_overlay() {
    let install = StubInstall::new();
    let mut cluster = controller(&install, 2, 4300);
    cluster.provision(None).await.unwrap();
    cluster.initialize().await.unwrap();
    cluster.start(&[]).await.unwrap();

    let index = cluster.add_joiner(2).await.unwrap();
    assert_eq!(index, 3);
    assert_eq!(cluster.state(), ClusterState::Running);

    let joiner = cluster.node(3).unwrap();
    assert!(read(&joiner.config_path).contains("joiner3.cnf"));
    let seed_group = cluster.node(2).unwrap().group_address();
    let overlay = read(&install.spec(2).conf_dir().join("joiner3.cnf"));
    assert!(overlay.contains(&seed_group));

    cluster.teardown().await.unwrap();
}

#[tokio::test]
async fn test_rejoin_refuses_a_stopped_seed() {
    let install = StubInstall::new();
    let mut cluster = controller(&install, 3, 4400);
    cluster.provision(None).await.unwrap();
    cluster.initialize().await.unwrap();
    cluster.start(&[]).await.unwrap();

    cluster.stop_node(1).await.unwrap();
    cluster.stop_node(3).await.unwrap();
    let err = cluster.rejoin(3, 1).await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle(LifecycleError::NodeNotRunning(1))));

    cluster.rejoin(3, 2).await.unwrap();
    assert!(cluster.node(3).unwrap().is_ready());
    assert_eq!(cluster.state(), ClusterState::PartiallyDown);

    cluster.teardown().await.unwrap();
}
