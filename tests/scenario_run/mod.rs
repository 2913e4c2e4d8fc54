use std::fs;

use galera_qa::run_scenario;
use galera_qa::Scenario;
use galera_qa::ScenarioContext;
use galera_qa::Settings;
use galera_qa::SettleConfig;
use galera_qa::Tally;
use galera_qa::ToolsConfig;
use tokio_util::sync::CancellationToken;

use crate::common::fast_readiness;
use crate::common::read;
use crate::common::runner;
use crate::common::StubInstall;

const RQG_MODULES: [&str; 7] = [
    "galera",
    "transactions",
    "partitioning",
    "optimizer",
    "mariadb",
    "runtime",
    "temporal",
];

fn settings(install: &StubInstall) -> Settings {
    let mut settings = Settings {
        cluster: install.spec(3),
        readiness: fast_readiness(),
        settle: SettleConfig {
            replication_secs: 0,
            ist_shutdown_secs: 0,
            flow_control_lock_secs: 1,
        },
        tools: ToolsConfig {
            randgen_dir: install.path("randgen"),
            perl: install.tool_path("perl"),
            ..ToolsConfig::default()
        },
        ..Settings::default()
    };
    settings.workload.sysbench_bin = install.tool_path("sysbench");
    settings.workload.lua_dir = install.path("lua");
    settings.workload.table_count = 2;
    settings.workload.run_time_secs = 1;
    settings
}

fn context(install: &StubInstall) -> ScenarioContext<crate::common::StubRunner> {
    ScenarioContext::new(settings(install), runner(), CancellationToken::new())
}

fn labels(tally: &Tally) -> Vec<&str> {
    tally.records().iter().map(|r| r.label.as_str()).collect()
}

#[tokio::test]
async fn test_cluster_interaction_against_stub_tools() {
    let install = StubInstall::new();
    let ctx = context(&install);
    let mut tally = Tally::quiet();

    run_scenario(Scenario::ClusterInteraction, &ctx, &mut tally)
        .await
        .unwrap();

    assert_eq!(tally.failed(), 0, "{:?}", tally.records());
    assert_eq!(tally.exit_code(), 0);
    let labels = labels(&tally);
    assert!(labels.contains(&"Flow control released on node3"));
    assert!(labels.contains(&"Node joining"));
    assert!(labels.contains(&"Checksum run for DB: test"));
    assert_eq!(labels.last(), Some(&"Cluster shutdown"));

    let log_dir = install.spec(3).log_dir();
    let prepare = read(&log_dir.join("sysbench_prepare.log"));
    assert!(prepare.contains("--tables=2"));
    assert!(prepare.trim_end().ends_with("prepare"));
    assert!(read(&log_dir.join("sysbench_background.log")).contains("--db-ps-mode=disable"));
    // a fourth node joined during the run
    assert!(install.spec(3).conf_dir().join("node4.cnf").is_file());
}

#[tokio::test]
async fn test_rqg_dataload_against_stub_tools() {
    let install = StubInstall::new();
    for module in RQG_MODULES {
        let dir = install.path("randgen").join("conf").join(module);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.zz", module)), "").unwrap();
    }
    fs::write(install.path("randgen").join("gendata.pl"), "").unwrap();
    let ctx = context(&install);
    let mut tally = Tally::quiet();

    run_scenario(Scenario::RqgDataload, &ctx, &mut tally).await.unwrap();

    assert_eq!(tally.failed(), 0, "{:?}", tally.records());
    let checksums = labels(&tally)
        .into_iter()
        .filter(|l| l.starts_with("Checksum run for DB: db_"))
        .count();
    assert_eq!(checksums, RQG_MODULES.len());

    let log = read(&install.spec(3).log_dir().join("rqg_galera.log"));
    assert!(log.contains("--dsn=dbi:mysql:host=127.0.0.1:port=3600:user=rqg_test:database=db_galera"));
    assert!(log.contains("galera.zz"));
}

#[tokio::test]
async fn test_rqg_dataload_without_checkout_fails_and_tears_down() {
    let install = StubInstall::new();
    let ctx = context(&install);
    let mut tally = Tally::quiet();

    let result = run_scenario(Scenario::RqgDataload, &ctx, &mut tally).await;

    assert!(result.is_err());
    assert_eq!(tally.exit_code(), 1);
    let labels = labels(&tally);
    assert!(labels.contains(&"RQG modules present"));
    assert_eq!(labels[labels.len() - 2], "Cluster shutdown");
    assert_eq!(labels.last(), Some(&"Scenario RqgDataload aborted"));
    assert_eq!(read(&install.admin_log()).matches(" shutdown").count(), 3);
}
