//! Flow control, incremental state transfer and node join under load.

use tracing::debug;
use tracing::warn;

use super::shutdown;
use super::start_cluster;
use super::ScenarioContext;
use super::Tally;
use crate::poll::poll_until;
use crate::poll::settle;
use crate::poll::PollOutcome;
use crate::sbtest_tables;
use crate::tools;
use crate::BackgroundHandle;
use crate::ClusterController;
use crate::CommandRunner;
use crate::Error;
use crate::Result;
use crate::RunOutcome;
use crate::TableTransform;
use crate::WorkloadDriver;
use crate::WorkloadMode;

/// Gcache sizing for the IST part, so a briefly stopped node can catch up
/// incrementally instead of needing a full snapshot
const GCACHE_OPTIONS: &str = "gcache.keep_pages_size=5;gcache.page_size=1024M;gcache.size=1024M;";
const FLOW_CONTROL_STATUS: &str = "wsrep_flow_control_status";
const JOIN_DATABASES: [&str; 3] = ["test_one", "test_two", "test_three"];

pub(crate) async fn run<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    tally: &mut Tally,
) -> Result<()> {
    let mut cluster = ctx.controller();
    let mut background = None;
    let result = interact(ctx, &mut cluster, &mut background, tally).await;
    // still set only if the scenario ended before the IST part
    if let Some(mut handle) = background.take() {
        tally.check("Terminate sysbench run", handle.terminate().await);
    }
    shutdown(&mut cluster, tally).await;
    result
}

async fn interact<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    cluster: &mut ClusterController<R>,
    background: &mut Option<BackgroundHandle>,
    tally: &mut Tally,
) -> Result<()> {
    start_cluster(cluster, tally, Some(GCACHE_OPTIONS), &[]).await?;
    let driver = ctx.driver(&cluster.node(1)?.socket_path);

    *background = load_database(ctx, &driver, tally, "test", true).await?;

    tally.note("Initiating flow control test");
    for index in 1..=cluster.nodes().len() {
        flow_control(ctx, cluster, tally, index).await?;
    }

    tally.note("Initiating IST test");
    let last = cluster.nodes().len();
    tally.check("Shutdown cluster node IST test", cluster.stop_node(last).await);
    settle(ctx.settings.settle.ist_shutdown(), &ctx.cancel).await?;
    if let Some(mut handle) = background.take() {
        tally.check("Terminate sysbench run", handle.terminate().await);
    }
    tally.check("Cluster restart is successful", cluster.restart_node(last).await);

    tally.note("Initiating Node joining test");
    for database in JOIN_DATABASES {
        load_database(ctx, &driver, tally, database, false).await?;
    }
    let seed = cluster.nodes().len();
    tally.check("Node joining", cluster.add_joiner(seed).await);

    settle(ctx.settings.settle.replication(), &ctx.cancel).await?;
    let checker = ctx.checker(cluster);
    let verdict = checker.checksum("test", cluster.node(1)?, cluster.node(2)?).await;
    tally.verdict("Checksum run for DB: test", verdict);
    Ok(())
}

/// Sanity check and load one database, optionally leaving a read/write
/// run going in the background
async fn load_database<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    driver: &WorkloadDriver<R>,
    tally: &mut Tally,
    database: &str,
    background: bool,
) -> Result<Option<BackgroundHandle>> {
    let load = &ctx.settings.workload;
    tally.check(
        format!("Sysbench run sanity check (DB: {})", database),
        driver.sanity_check(database).await,
    );
    tally.check(
        format!("Sysbench data load (DB: {})", database),
        driver
            .load(database, load.table_count, load.threads, load.normal_table_size)
            .await,
    );

    if ctx.spec.encryption {
        let failed = driver
            .transform_tables(database, &sbtest_tables(load.table_count), TableTransform::Encrypt)
            .await?;
        tally.record(
            format!("Sysbench table encryption (DB: {})", database),
            failed.is_empty(),
            (!failed.is_empty()).then(|| format!("failed tables: {:?}", failed)),
        );
    }

    if !background {
        return Ok(None);
    }
    let run = driver.read_write(database, WorkloadMode::ReadWriteBackground);
    match tally.require("Initiated sysbench oltp run", driver.run(&run).await)? {
        RunOutcome::Background(handle) => Ok(Some(handle)),
        RunOutcome::Completed => Ok(None),
    }
}

/// Hold a read lock on node `index` to stall its applier, read the flow
/// control status, then release the lock and wait for flow control to
/// switch off again.
async fn flow_control<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    cluster: &ClusterController<R>,
    tally: &mut Tally,
    index: usize,
) -> Result<()> {
    let node = cluster.node(index)?;
    let supervisor = cluster.supervisor();
    let lock = tools::sql_in_db(
        &ctx.spec,
        &node.socket_path,
        "test",
        &format!(
            "FLUSH TABLE sbtest1 WITH READ LOCK;SELECT SLEEP({});UNLOCK TABLES",
            ctx.settings.settle.flow_control_lock_secs
        ),
    );
    let Some(mut session) = tally.check(format!("Table lock on node{}", index), ctx.runner.spawn(&lock)) else {
        return Ok(());
    };

    let status = async {
        settle(ctx.settings.readiness.interval(), &ctx.cancel).await?;
        supervisor.status_variable(node, FLOW_CONTROL_STATUS).await
    }
    .await;
    if let Err(e) = session.terminate().await {
        warn!("could not end the lock session on node{}: {}", index, e);
    }
    match status {
        Err(e @ Error::Cancelled(_)) => return Err(e),
        other => {
            let label = format!("Flow control status on node{}", index);
            if let Some(value) = tally.check(label, other) {
                debug!("node{} {} = {:?}", index, FLOW_CONTROL_STATUS, value);
            }
        }
    }

    let label = format!("Flow control released on node{}", index);
    let released = poll_until(
        ctx.settings.readiness,
        &ctx.cancel,
        &format!("flow control release on node{}", index),
        || {
            let supervisor = supervisor.clone();
            async move {
                let value = supervisor.status_variable(node, FLOW_CONTROL_STATUS).await?;
                Ok(value.as_deref() == Some("OFF"))
            }
        },
    )
    .await;
    match released {
        Ok(PollOutcome::Ready { .. }) => tally.note(label),
        Ok(PollOutcome::Exhausted { attempts, .. }) => tally.record(
            label,
            false,
            Some(format!("still engaged after {} attempts", attempts)),
        ),
        Err(e @ Error::Cancelled(_)) => return Err(e),
        Err(e) => tally.record(label, false, Some(e.to_string())),
    }
    Ok(())
}
