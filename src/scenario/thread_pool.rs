//! Sysbench against every thread pool configuration of the matrix, each on
//! a freshly provisioned cluster reached through the admin port.

use tracing::warn;

use super::shutdown;
use super::ScenarioContext;
use super::Tally;
use crate::constants::ADMIN_PORT_BASE;
use crate::ClusterController;
use crate::CommandRunner;
use crate::Result;
use crate::WorkloadMode;
use crate::WorkloadRun;
use crate::WorkloadTarget;

const THREAD_HANDLING: [&str; 2] = ["pool-of-threads", "one-thread-per-connection"];
const POOL_SIZES: [usize; 3] = [2, 4, 8];
const POOL_MAX_THREADS: [usize; 3] = [2, 4, 8];

/// Server arguments for every combination, in run order
pub fn thread_pool_matrix() -> Vec<Vec<String>> {
    let mut matrix = Vec::new();
    for handling in THREAD_HANDLING {
        for size in POOL_SIZES {
            for max_threads in POOL_MAX_THREADS {
                matrix.push(vec![
                    format!("--thread_handling={}", handling),
                    format!("--thread_pool_size={}", size),
                    format!("--thread_pool_max_threads={}", max_threads),
                ]);
            }
        }
    }
    matrix
}

/// Admin interface lines appended to node `index`'s config file
pub fn admin_options(index: usize) -> Vec<String> {
    vec![
        "admin_address=127.0.0.1".to_string(),
        format!("admin_port={}", ADMIN_PORT_BASE + index as u16),
    ]
}

pub(crate) async fn run<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    tally: &mut Tally,
) -> Result<()> {
    for extra in thread_pool_matrix() {
        tally.note(format!("Thread pooling options : {}", extra.join(" ")));
        let mut cluster = ctx.controller();
        let result = iteration(ctx, &mut cluster, tally, &extra).await;
        shutdown(&mut cluster, tally).await;

        if let Err(e) = result {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("thread pool run {:?} ended early: {}", extra, e);
        }
    }
    Ok(())
}

async fn iteration<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    cluster: &mut ClusterController<R>,
    tally: &mut Tally,
    extra: &[String],
) -> Result<()> {
    tally.require("Configuration file creation", cluster.provision(None).await)?;
    tally.require("Initializing cluster", cluster.initialize().await)?;
    for index in 1..=cluster.nodes().len() {
        tally.require(
            format!("Admin interface for node{}", index),
            cluster.append_node_options(index, &admin_options(index)),
        )?;
    }
    tally.require("Cluster startup", cluster.start(extra).await)?;
    tally.check("Database connection", cluster.connection_check(1).await);

    let load = &ctx.settings.workload.thread_pool;
    let driver = ctx.driver(&cluster.node(1)?.socket_path);
    tally.require("Sysbench run sanity check", driver.sanity_check("test").await)?;
    tally.require(
        format!("Sysbench data load (threads : {})", load.threads),
        driver
            .load("test", load.table_count, load.threads, ctx.settings.workload.normal_table_size)
            .await,
    )?;

    // node 1 over its admin port
    let run = WorkloadRun {
        target: WorkloadTarget::local_port(ADMIN_PORT_BASE + 1),
        database: "test".to_string(),
        mode: WorkloadMode::ReadWriteForeground,
        table_count: load.table_count,
        threads: load.threads,
        table_size: ctx.settings.workload.normal_table_size,
        duration_secs: load.run_time_secs,
    };
    tally.check("Sysbench read write run", driver.run(&run).await);
    Ok(())
}
