//! End-to-end QA scenarios composed from the cluster, workload and
//! consistency building blocks.
//!
//! Every step is recorded in a [`Tally`]. Steps the rest of a scenario
//! depends on go through [`Tally::require`] and abort the scenario; the
//! cluster is torn down either way.

mod cluster_interaction;
mod rqg_dataload;
mod tally;
mod thread_pool;

pub use tally::*;

#[cfg(test)]
mod scenario_test;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::ClusterController;
use crate::ClusterSpec;
use crate::CommandRunner;
use crate::ConsistencyChecker;
use crate::Error;
use crate::Result;
use crate::Settings;
use crate::WorkloadDriver;

/// The QA scenarios the harness can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Flow control, IST and node join under sysbench load
    ClusterInteraction,
    /// Sysbench against every thread pool configuration in the matrix
    ThreadPool,
    /// RQG data load followed by per-database consistency checks
    RqgDataload,
}

impl fmt::Display for Scenario {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let title = match self {
            Scenario::ClusterInteraction => "Cluster interaction QA using flow control test",
            Scenario::ThreadPool => "Galera Thread Pooling test",
            Scenario::RqgDataload => "RQG data load consistency test",
        };
        f.write_str(title)
    }
}

impl Scenario {
    /// Scenarios that compare node 1 against node 2 need both
    pub fn min_nodes(&self) -> usize {
        match self {
            Scenario::ClusterInteraction | Scenario::RqgDataload => 2,
            Scenario::ThreadPool => 1,
        }
    }
}

/// Everything a scenario needs besides its tally
pub struct ScenarioContext<R: CommandRunner> {
    pub settings: Settings,
    pub spec: Arc<ClusterSpec>,
    pub runner: Arc<R>,
    pub cancel: CancellationToken,
}

impl<R: CommandRunner> ScenarioContext<R> {
    pub fn new(
        settings: Settings,
        runner: Arc<R>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            spec: Arc::new(settings.cluster.clone()),
            settings,
            runner,
            cancel,
        }
    }

    /// Fresh controller on a new random port plan
    pub fn controller(&self) -> ClusterController<R> {
        ClusterController::new(
            self.spec.clone(),
            self.settings.readiness,
            self.runner.clone(),
            self.cancel.clone(),
        )
    }

    pub fn driver(
        &self,
        socket: &Path,
    ) -> WorkloadDriver<R> {
        WorkloadDriver::new(
            self.spec.clone(),
            self.settings.workload.clone(),
            self.runner.clone(),
            socket,
        )
    }

    pub fn checker(
        &self,
        cluster: &ClusterController<R>,
    ) -> ConsistencyChecker<R> {
        ConsistencyChecker::new(cluster.supervisor().clone())
    }
}

/// Run one scenario to completion, recording into `tally`.
///
/// A failed required step ends the scenario early. Any error that ends the
/// scenario is also recorded as a failed check, so an aborted run never
/// exits cleanly.
pub async fn run_scenario<R: CommandRunner>(
    scenario: Scenario,
    ctx: &ScenarioContext<R>,
    tally: &mut Tally,
) -> Result<()> {
    banner(&scenario.to_string());
    info!("running scenario: {}", scenario);

    let result = if ctx.spec.node_count < scenario.min_nodes() {
        Err(Error::InvalidConfig(format!(
            "{:?} needs at least {} nodes, node_count is {}",
            scenario,
            scenario.min_nodes(),
            ctx.spec.node_count
        )))
    } else {
        match scenario {
            Scenario::ClusterInteraction => cluster_interaction::run(ctx, tally).await,
            Scenario::ThreadPool => thread_pool::run(ctx, tally).await,
            Scenario::RqgDataload => rqg_dataload::run(ctx, tally).await,
        }
    };

    if let Err(e) = &result {
        error!("scenario {:?} aborted: {}", scenario, e);
        tally.record(format!("Scenario {:?} aborted", scenario), false, Some(e.to_string()));
    }
    info!("scenario {:?} finished: {}", scenario, tally.summary());
    result
}

/// Provision, initialize and start a cluster, then check a connection.
///
/// `provider_options` is passed through to every node's provider settings.
pub(crate) async fn start_cluster<R: CommandRunner>(
    cluster: &mut ClusterController<R>,
    tally: &mut Tally,
    provider_options: Option<&str>,
    extra: &[String],
) -> Result<()> {
    tally.require("Configuration file creation", cluster.provision(provider_options).await)?;
    tally.require("Initializing cluster", cluster.initialize().await)?;
    tally.require("Cluster startup", cluster.start(extra).await)?;
    tally.check("Database connection", cluster.connection_check(1).await);
    Ok(())
}

/// Best-effort teardown at the end of a scenario
pub(crate) async fn shutdown<R: CommandRunner>(
    cluster: &mut ClusterController<R>,
    tally: &mut Tally,
) {
    if !cluster.state().may_have_processes() {
        return;
    }
    match cluster.teardown().await {
        Ok(failed) if failed.is_empty() => tally.note("Cluster shutdown"),
        Ok(failed) => {
            warn!("nodes {:?} did not shut down cleanly", failed);
            tally.record("Cluster shutdown", false, Some(format!("nodes {:?} failed", failed)));
        }
        Err(e) => {
            tally.record("Cluster shutdown", false, Some(e.to_string()));
        }
    }
}

fn banner(title: &str) {
    let rule = "-".repeat(title.len().max(32));
    println!("{}\n{}\n{}", rule, title, rule);
}
