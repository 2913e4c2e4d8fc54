//! Starts, stops and polls individual node processes.
//!
//! The supervisor never keeps a [`NodeHandle`]; every call borrows the
//! handle from the cluster controller and updates its process state.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::file_io::write_atomically;
use crate::poll::poll_until;
use crate::poll::PollOutcome;
use crate::tools;
use crate::tools::AdminCommand;
use crate::ClusterSpec;
use crate::CommandRunner;
use crate::Invocation;
use crate::LifecycleError;
use crate::NodeHandle;
use crate::ProvisionError;
use crate::ReadinessPolicy;
use crate::Result;
use crate::ServerVersion;

/// pkill exits 1 when nothing matched
const PKILL_NO_MATCH: i32 = 1;

pub struct ProcessSupervisor<R: CommandRunner> {
    spec: Arc<ClusterSpec>,
    runner: Arc<R>,
}

impl<R: CommandRunner> Clone for ProcessSupervisor<R> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl<R: CommandRunner> ProcessSupervisor<R> {
    pub fn new(
        spec: Arc<ClusterSpec>,
        runner: Arc<R>,
    ) -> Self {
        Self { spec, runner }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Forcibly kill leftovers from earlier runs in this work directory.
    ///
    /// Matches by config path pattern, not by recorded process id.
    pub async fn kill_stale(&self) -> Result<()> {
        let pattern = format!("{}/conf/node[0-9]+.cnf", self.spec.workdir.display());
        let output = self.runner.run(&tools::kill_matching(&pattern)).await?;
        match output.status {
            Some(0) => info!("killed stale server processes matching {}", pattern),
            Some(PKILL_NO_MATCH) => debug!("no stale server processes matching {}", pattern),
            other => warn!("stale process cleanup exited with {:?}", other),
        }
        Ok(())
    }

    pub async fn version(&self) -> Result<ServerVersion> {
        let inv = tools::server_version(&self.spec);
        let output = self.runner.run(&inv).await?.check(&inv.program_name())?;
        ServerVersion::parse(&output.stdout)
    }

    /// Launch the node's server detached and record its process handle.
    ///
    /// The start line (minus the bootstrap flag) is saved next to the node
    /// log so the node can be brought back after a simulated crash.
    pub async fn start(
        &self,
        node: &mut NodeHandle,
        extra: &[String],
        bootstrap: bool,
    ) -> Result<()> {
        if node.process.is_some() {
            warn!("node{} already has a process handle, replacing it", node.index);
        }

        self.save_startup_script(node, &tools::start_server(&self.spec, node, extra, false))?;

        let inv = tools::start_server(&self.spec, node, extra, bootstrap);
        let handle = self.runner.spawn(&inv)?;
        info!(
            "started node{} (pid {:?}{})",
            node.index,
            handle.pid(),
            if bootstrap { ", bootstrap" } else { "" }
        );
        node.process = Some(handle);
        node.ready = false;
        Ok(())
    }

    /// Re-run the saved startup script for a node
    pub async fn replay_startup(
        &self,
        node: &mut NodeHandle,
    ) -> Result<()> {
        if !node.startup_script.exists() {
            return Err(LifecycleError::MissingStartupScript {
                node: node.index,
                path: node.startup_script.clone(),
            }
            .into());
        }

        let handle = self.runner.spawn(&tools::replay_script(&node.startup_script))?;
        info!("replayed startup script for node{} (pid {:?})", node.index, handle.pid());
        node.process = Some(handle);
        node.ready = false;
        Ok(())
    }

    /// Poll the node with the admin ping until it answers.
    ///
    /// Sleeps `policy.interval()` before each attempt and gives up with
    /// `StartupTimeout` after `policy.max_attempts` attempts.
    pub async fn wait_until_ready(
        &self,
        node: &mut NodeHandle,
        policy: ReadinessPolicy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ping = tools::admin(&self.spec, &node.socket_path, AdminCommand::Ping);
        let what = format!("node{}", node.index);

        let outcome = poll_until(policy, cancel, &what, || {
            let runner = self.runner.clone();
            let ping = ping.clone();
            async move { Ok(runner.run(&ping).await?.is_success()) }
        })
        .await?;

        match outcome {
            PollOutcome::Ready { attempts } => {
                info!("node{} is ready after {} attempts", node.index, attempts);
                node.ready = true;
                Ok(())
            }
            PollOutcome::Exhausted { attempts, elapsed } => {
                warn!("node{} did not answer ping after {} attempts", node.index, attempts);
                node.ready = false;
                Err(LifecycleError::StartupTimeout {
                    node: node.index,
                    attempts,
                    elapsed,
                }
                .into())
            }
        }
    }

    /// Graceful shutdown through the admin tool.
    ///
    /// Does not wait for the process to exit.
    pub async fn stop(
        &self,
        node: &mut NodeHandle,
    ) -> Result<()> {
        let inv = tools::admin(&self.spec, &node.socket_path, AdminCommand::Shutdown);
        self.runner.run(&inv).await?.check(&inv.program_name())?;
        info!("node{} shutdown issued", node.index);
        node.process = None;
        node.ready = false;
        Ok(())
    }

    /// Run a statement on the node and return trimmed stdout
    pub async fn query(
        &self,
        node: &NodeHandle,
        statement: &str,
    ) -> Result<String> {
        self.query_socket(&node.socket_path, statement).await
    }

    pub(crate) async fn query_socket(
        &self,
        socket: &Path,
        statement: &str,
    ) -> Result<String> {
        let inv = tools::sql(&self.spec, socket, statement);
        let output = self.runner.run(&inv).await?.check(&inv.program_name())?;
        Ok(output.stdout.trim().to_string())
    }

    /// Value of one `SHOW STATUS` variable, if the server reports it
    pub async fn status_variable(
        &self,
        node: &NodeHandle,
        name: &str,
    ) -> Result<Option<String>> {
        let out = self
            .query(node, &format!("SHOW STATUS LIKE '{}'", name.replace('\'', "")))
            .await?;
        Ok(out
            .lines()
            .filter_map(|l| l.split_once('\t'))
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string()))
    }

    pub async fn connection_check(
        &self,
        node: &NodeHandle,
    ) -> Result<()> {
        self.query(node, "SELECT 1").await.map(|_| ())
    }

    /// Drop anonymous users and recreate the `test` database without
    /// writing any of it to the binary log.
    pub async fn prepare_for_tests(
        &self,
        node: &NodeHandle,
    ) -> Result<()> {
        self.query(
            node,
            "SET SESSION sql_log_bin=0;DELETE FROM mysql.user WHERE user='';\
             SET SESSION sql_log_bin=1;DROP DATABASE IF EXISTS test;CREATE DATABASE test;",
        )
        .await
        .map(|_| ())
    }

    fn save_startup_script(
        &self,
        node: &NodeHandle,
        inv: &Invocation,
    ) -> Result<()> {
        let content = format!("#!/usr/bin/env bash\nexec {}\n", inv);
        write_atomically(&node.startup_script, &content)?;
        make_executable(&node.startup_script)?;
        debug!("saved startup script {:?}", node.startup_script);
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        ProvisionError::PathError {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
