//! RQG data load into a running cluster, then a consistency check of every
//! loaded database between nodes 1 and 2.

use super::shutdown;
use super::start_cluster;
use super::ScenarioContext;
use super::Tally;
use crate::poll::settle;
use crate::ClusterController;
use crate::CommandRunner;
use crate::Result;
use crate::RqgDataGen;

pub(crate) async fn run<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    tally: &mut Tally,
) -> Result<()> {
    let mut cluster = ctx.controller();
    let result = dataload(ctx, &mut cluster, tally).await;
    shutdown(&mut cluster, tally).await;
    result
}

async fn dataload<R: CommandRunner>(
    ctx: &ScenarioContext<R>,
    cluster: &mut ClusterController<R>,
    tally: &mut Tally,
) -> Result<()> {
    start_cluster(cluster, tally, None, &[]).await?;
    let version = tally.require("Server version check", cluster.version().await)?;

    let rqg = RqgDataGen::new(ctx.spec.clone(), ctx.settings.tools.clone(), ctx.runner.clone());
    let modules = RqgDataGen::<R>::modules(version);
    tally.require("RQG modules present", rqg.check_modules(&modules))?;

    let socket = cluster.node(1)?.socket_path.clone();
    let mut loaded = Vec::new();
    for module in modules {
        let database = RqgDataGen::<R>::database_for(module);
        let Some(outcomes) = tally.check(
            format!("RQG schema setup (DB: {})", database),
            rqg.load_module(&socket, module).await,
        ) else {
            continue;
        };
        for outcome in &outcomes {
            let spec_name = outcome
                .spec
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tally.record(
                format!("RQG data load (DB: {}, spec: {})", database, spec_name),
                outcome.is_success(),
                (!outcome.is_success()).then(|| format!("exit status {:?}", outcome.status)),
            );
        }
        loaded.push(database);
    }

    settle(ctx.settings.settle.replication(), &ctx.cancel).await?;
    let checker = ctx.checker(cluster);
    for database in loaded {
        let verdict = checker
            .checksum(&database, cluster.node(1)?, cluster.node(2)?)
            .await;
        tally.verdict(format!("Checksum run for DB: {}", database), verdict);
    }
    Ok(())
}
