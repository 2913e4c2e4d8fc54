use std::fs;
use std::process::Command;
use std::sync::Arc;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use super::thread_pool::admin_options;
use super::thread_pool::thread_pool_matrix;
use crate::run_scenario;
use crate::test_utils::healthy_response;
use crate::test_utils::mentions;
use crate::test_utils::scripted_runner;
use crate::test_utils::CallLog;
use crate::test_utils::TestEnv;
use crate::CommandOutput;
use crate::CommandRunner;
use crate::Error;
use crate::Invocation;
use crate::MockCommandRunner;
use crate::ProcessHandle;
use crate::ProvisionError;
use crate::ReadinessPolicy;
use crate::Scenario;
use crate::ScenarioContext;
use crate::Settings;
use crate::SystemRunner;
use crate::Tally;
use crate::ToolsConfig;

/// Answers of a healthy, consistent cluster to the SQL client
fn cluster_response(inv: &Invocation) -> CommandOutput {
    if inv.program_name() != "mysql" {
        return healthy_response(inv);
    }
    let statement = inv.get_args().last().cloned().unwrap_or_default();
    if statement.starts_with("SHOW STATUS LIKE") {
        CommandOutput::with_stdout("wsrep_flow_control_status\tOFF\n")
    } else if statement.starts_with("SELECT table_name") {
        CommandOutput::with_stdout("sbtest1\n")
    } else if statement.starts_with("CHECKSUM TABLE") {
        CommandOutput::with_stdout("x.sbtest1\t42\n")
    } else if statement == "select @@port" {
        CommandOutput::with_stdout("3600\n")
    } else {
        CommandOutput::success()
    }
}

fn settings(env: &TestEnv) -> Settings {
    let mut settings = Settings {
        cluster: env.spec(3),
        readiness: ReadinessPolicy {
            max_attempts: 3,
            interval_ms: 100,
        },
        tools: ToolsConfig {
            randgen_dir: env.root.path().join("randgen"),
            ..ToolsConfig::default()
        },
        ..Settings::default()
    };
    settings.workload.table_count = 2;
    settings
}

fn context<F>(
    env: &TestEnv,
    respond: F,
) -> (ScenarioContext<MockCommandRunner>, CallLog)
where
    F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
{
    let (runner, log) = scripted_runner(respond);
    let ctx = ScenarioContext::new(settings(env), Arc::new(runner), CancellationToken::new());
    (ctx, log)
}

fn labels(tally: &Tally) -> Vec<String> {
    tally.records().iter().map(|r| r.label.clone()).collect()
}

#[test]
fn test_thread_pool_matrix() {
    let matrix = thread_pool_matrix();
    assert_eq!(matrix.len(), 18);
    assert_eq!(
        matrix[0],
        vec![
            "--thread_handling=pool-of-threads",
            "--thread_pool_size=2",
            "--thread_pool_max_threads=2"
        ]
    );
    assert_eq!(matrix[17][0], "--thread_handling=one-thread-per-connection");
    assert_eq!(admin_options(2), vec!["admin_address=127.0.0.1", "admin_port=33064"]);
}

#[tokio::test(start_paused = true)]
async fn test_cluster_interaction_passes_on_healthy_cluster() {
    let env = TestEnv::new();
    let (ctx, log) = context(&env, cluster_response);
    let mut tally = Tally::quiet();

    run_scenario(Scenario::ClusterInteraction, &ctx, &mut tally).await.unwrap();

    assert_eq!(tally.failed(), 0, "{:?}", tally.records());
    let labels = labels(&tally);
    for expected in [
        "Cluster startup",
        "Initiated sysbench oltp run",
        "Flow control released on node3",
        "Shutdown cluster node IST test",
        "Cluster restart is successful",
        "Node joining",
        "Checksum run for DB: test",
        "Cluster shutdown",
    ] {
        assert!(labels.iter().any(|l| l == expected), "missing {}", expected);
    }

    // provider options carry the gcache sizing
    let node1 = fs::read_to_string(env.workdir().join("conf").join("node1.cnf")).unwrap();
    assert!(node1.contains("gcache.size=1024M"));
    // the crashed node comes back from its saved script
    assert!(log.of("bash").iter().any(|i| mentions(i, "startup3.sh")));
    // one lock session per node
    let locks = log
        .of("mysql")
        .into_iter()
        .filter(|i| mentions(i, "FLUSH TABLE sbtest1 WITH READ LOCK"))
        .count();
    assert_eq!(locks, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cluster_interaction_reports_divergence() {
    let env = TestEnv::new();
    let (ctx, _log) = context(&env, |inv| {
        let checksum = inv
            .get_args()
            .last()
            .is_some_and(|s| s.starts_with("CHECKSUM TABLE"));
        if checksum && mentions(inv, "node2") {
            CommandOutput::with_stdout("x.sbtest1\t7\n")
        } else {
            cluster_response(inv)
        }
    });
    let mut tally = Tally::quiet();

    run_scenario(Scenario::ClusterInteraction, &ctx, &mut tally).await.unwrap();

    assert_eq!(tally.failed(), 1);
    assert_eq!(tally.exit_code(), 1);
    let failed: Vec<_> = tally.records().iter().filter(|r| !r.passed).collect();
    assert_eq!(failed[0].label, "Checksum run for DB: test");
}

#[tokio::test(start_paused = true)]
async fn test_thread_pool_runs_every_combination() {
    let env = TestEnv::new();
    let (ctx, log) = context(&env, |inv| {
        if inv.program_name() == "sysbench" && inv.has_arg("--mysql-port=33063") {
            CommandOutput::failure(1)
        } else {
            cluster_response(inv)
        }
    });
    let mut tally = Tally::quiet();

    run_scenario(Scenario::ThreadPool, &ctx, &mut tally).await.unwrap();

    let labels = labels(&tally);
    assert_eq!(labels.iter().filter(|l| *l == "Cluster shutdown").count(), 18);
    // every read/write run failed, nothing else did
    assert_eq!(tally.failed(), 18);

    let node3 = fs::read_to_string(env.workdir().join("conf").join("node3.cnf")).unwrap();
    assert!(node3.ends_with("admin_address=127.0.0.1\nadmin_port=33065\n"));
    let starts: Vec<_> = log
        .of("mysqld")
        .into_iter()
        .filter(|i| i.has_arg("--thread_handling=one-thread-per-connection"))
        .collect();
    assert_eq!(starts.len(), 9 * 3);
}

#[tokio::test(start_paused = true)]
async fn test_rqg_dataload_checks_every_module() {
    let env = TestEnv::new();
    for module in [
        "galera",
        "transactions",
        "partitioning",
        "optimizer",
        "mariadb",
        "runtime",
        "temporal",
    ] {
        let dir = env.root.path().join("randgen").join("conf").join(module);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.zz", module)), "").unwrap();
    }
    let (ctx, log) = context(&env, cluster_response);
    let mut tally = Tally::quiet();

    run_scenario(Scenario::RqgDataload, &ctx, &mut tally).await.unwrap();

    assert_eq!(tally.failed(), 0, "{:?}", tally.records());
    assert_eq!(log.of("perl").len(), 7);
    let checksums = labels(&tally)
        .into_iter()
        .filter(|l| l.starts_with("Checksum run for DB: db_"))
        .count();
    assert_eq!(checksums, 7);
}

#[tokio::test(start_paused = true)]
async fn test_rqg_dataload_aborts_on_missing_module() {
    let env = TestEnv::new();
    let (ctx, log) = context(&env, cluster_response);
    let mut tally = Tally::quiet();

    let err = run_scenario(Scenario::RqgDataload, &ctx, &mut tally)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provision(ProvisionError::Configuration { .. })));
    assert_eq!(tally.exit_code(), 1);
    assert!(log.of("perl").is_empty());
    // the cluster is still torn down, then the abort itself is recorded
    let labels = labels(&tally);
    assert_eq!(labels[labels.len() - 2], "Cluster shutdown");
    assert_eq!(labels.last().map(String::as_str), Some("Scenario RqgDataload aborted"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_server_binary_stops_thread_pool_matrix() {
    let env = TestEnv::bare();
    env.write_template("galera.cnf", "[mysqld]\n");
    env.write_template("custom.cnf", "");
    let (ctx, _log) = context(&env, cluster_response);
    let mut tally = Tally::quiet();

    let err = run_scenario(Scenario::ThreadPool, &ctx, &mut tally)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provision(ProvisionError::Precondition { .. })));
    // one note, the failed provisioning and the abort, no further combinations
    assert_eq!(tally.records().len(), 3);
}

fn create_modules(env: &TestEnv) {
    for module in [
        "galera",
        "transactions",
        "partitioning",
        "optimizer",
        "mariadb",
        "runtime",
        "temporal",
    ] {
        let dir = env.root.path().join("randgen").join("conf").join(module);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.zz", module)), "").unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_node_comparing_scenarios_reject_single_node() {
    let env = TestEnv::new();
    create_modules(&env);
    let (runner, log) = scripted_runner(cluster_response);
    let mut settings = settings(&env);
    settings.cluster.node_count = 1;
    let ctx = ScenarioContext::new(settings, Arc::new(runner), CancellationToken::new());

    for scenario in [Scenario::RqgDataload, Scenario::ClusterInteraction] {
        let mut tally = Tally::quiet();
        let err = run_scenario(scenario, &ctx, &mut tally).await.unwrap_err();

        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(tally.exit_code(), 1);
        assert_eq!(tally.records().len(), 1);
        assert_eq!(tally.records()[0].label, format!("Scenario {:?} aborted", scenario));
    }
    // nothing was provisioned
    assert!(log.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_abort_outside_required_steps_fails_the_run() {
    let env = TestEnv::new();
    create_modules(&env);
    let cancel = CancellationToken::new();
    let on_load = cancel.clone();
    let (runner, _log) = scripted_runner(move |inv| {
        // operator interrupt while the data specs are loading
        if inv.program_name() == "perl" {
            on_load.cancel();
        }
        cluster_response(inv)
    });
    let ctx = ScenarioContext::new(settings(&env), Arc::new(runner), cancel);
    let mut tally = Tally::quiet();

    let err = run_scenario(Scenario::RqgDataload, &ctx, &mut tally)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(tally.exit_code(), 1);
    let labels = labels(&tally);
    assert!(!labels.iter().any(|l| l.starts_with("Checksum run")));
    assert_eq!(labels.last().map(String::as_str), Some("Scenario RqgDataload aborted"));
}

fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_cancelled_cluster_interaction_kills_background_sysbench() {
    let env = TestEnv::new();
    let cancel = CancellationToken::new();
    let log = CallLog::default();
    let background_pid = Arc::new(Mutex::new(None));

    let mut runner = MockCommandRunner::new();
    let run_log = log.clone();
    let on_load = cancel.clone();
    runner.expect_run().returning(move |inv| {
        run_log.push(inv);
        // interrupt once the data is loaded, before flow control starts
        if inv.program_name() == "sysbench" && inv.has_arg("prepare") {
            on_load.cancel();
        }
        Ok(cluster_response(inv))
    });
    let pid_slot = background_pid.clone();
    runner.expect_spawn().returning(move |inv| {
        if inv.program_name() == "sysbench" {
            let handle = SystemRunner::new(false).spawn(&Invocation::new("sleep").arg("30"))?;
            *pid_slot.lock().unwrap() = handle.pid();
            return Ok(handle);
        }
        Ok(ProcessHandle::detached(inv.program_name(), Some(4000)))
    });
    let ctx = ScenarioContext::new(settings(&env), Arc::new(runner), cancel);
    let mut tally = Tally::quiet();

    let err = run_scenario(Scenario::ClusterInteraction, &ctx, &mut tally)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(_)));
    let pid = background_pid.lock().unwrap().expect("background run was spawned");
    assert!(!process_alive(pid), "sysbench pid {} outlived the scenario", pid);
    let terminate = tally
        .records()
        .iter()
        .find(|r| r.label == "Terminate sysbench run")
        .expect("terminate step recorded");
    assert!(terminate.passed);
    assert_eq!(tally.exit_code(), 1);
}
