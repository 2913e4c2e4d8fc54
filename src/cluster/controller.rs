//! Cluster lifecycle controller.
//!
//! ```text
//! UNPROVISIONED --provision--> CONFIGURED --initialize--> INITIALIZED
//! INITIALIZED/STOPPED --start--> RUNNING (or PARTIALLY_DOWN on failure)
//! RUNNING --stop_node--> PARTIALLY_DOWN --rejoin/restart_node--> RUNNING
//! RUNNING/PARTIALLY_DOWN --teardown--> STOPPED
//! ```
//!
//! All operations run sequentially; the only waiting is the supervisor's
//! readiness polling, which honours the controller's cancellation token.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::file_io::ensure_dir;
use crate::file_io::remove_dir_if_exists;
use crate::tools;
use crate::ClusterSpec;
use crate::ClusterState;
use crate::CommandRunner;
use crate::ConfigMaterializer;
use crate::Error;
use crate::LifecycleError;
use crate::NodeHandle;
use crate::PortPlan;
use crate::ProcessSupervisor;
use crate::ProvisionError;
use crate::ReadinessPolicy;
use crate::Result;
use crate::ServerVersion;
use crate::Topology;

pub struct ClusterController<R: CommandRunner> {
    spec: Arc<ClusterSpec>,
    readiness: ReadinessPolicy,
    supervisor: ProcessSupervisor<R>,
    materializer: ConfigMaterializer,
    ports: PortPlan,
    nodes: Vec<NodeHandle>,
    state: ClusterState,
    /// Extra wsrep provider options of the current layout
    provider_options: Option<String>,
    /// Server arguments of the last cluster start, reused on rejoin
    start_extra: Vec<String>,
    version: Option<ServerVersion>,
    cancel: CancellationToken,
}

impl<R: CommandRunner> ClusterController<R> {
    pub fn new(
        spec: Arc<ClusterSpec>,
        readiness: ReadinessPolicy,
        runner: Arc<R>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(spec.clone(), runner),
            materializer: ConfigMaterializer::new(spec.clone()),
            spec,
            readiness,
            ports: PortPlan::random(),
            nodes: Vec::new(),
            state: ClusterState::Unprovisioned,
            provider_options: None,
            start_extra: Vec::new(),
            version: None,
            cancel,
        }
    }

    /// Pin the port plan instead of drawing a random base
    pub fn with_port_plan(
        mut self,
        ports: PortPlan,
    ) -> Self {
        self.ports = ports;
        self
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<R> {
        &self.supervisor
    }

    pub fn materializer(&self) -> &ConfigMaterializer {
        &self.materializer
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn node(
        &self,
        index: usize,
    ) -> Result<&NodeHandle> {
        index
            .checked_sub(1)
            .and_then(|i| self.nodes.get(i))
            .ok_or_else(|| LifecycleError::UnknownNode(index).into())
    }

    fn node_mut(
        &mut self,
        index: usize,
    ) -> Result<&mut NodeHandle> {
        index
            .checked_sub(1)
            .and_then(|i| self.nodes.get_mut(i))
            .ok_or_else(|| LifecycleError::UnknownNode(index).into())
    }

    fn expect_state(
        &self,
        allowed: &[ClusterState],
        operation: &'static str,
    ) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state,
                operation,
            }
            .into())
        }
    }

    fn refresh_state(&mut self) {
        self.state = if self.nodes.iter().all(|n| n.is_ready()) {
            ClusterState::Running
        } else {
            ClusterState::PartiallyDown
        };
    }

    /// Server version, queried once per controller
    pub async fn version(&mut self) -> Result<ServerVersion> {
        if let Some(v) = self.version {
            return Ok(v);
        }
        let v = self.supervisor.version().await?;
        info!("server version {}.{}", v.major, v.minor);
        self.version = Some(v);
        Ok(v)
    }

    /// UNPROVISIONED → CONFIGURED.
    ///
    /// Kills leftovers of earlier runs, lays out the work directory, checks
    /// the server binary and writes every node config file.
    pub async fn provision(
        &mut self,
        provider_options: Option<&str>,
    ) -> Result<()> {
        self.expect_state(
            &[
                ClusterState::Unprovisioned,
                ClusterState::Configured,
                ClusterState::Initialized,
                ClusterState::Stopped,
            ],
            "provision",
        )?;

        self.supervisor.kill_stale().await?;
        ensure_dir(&self.spec.workdir)?;
        ensure_dir(&self.spec.log_dir())?;
        ensure_dir(&self.spec.conf_dir())?;

        let mysqld = self.spec.bin("mysqld");
        if !mysqld.is_file() {
            error!("{:?} does not exist", mysqld);
            return Err(ProvisionError::Precondition { path: mysqld }.into());
        }

        let nodes = self.materializer.layout(&self.ports, self.spec.node_count)?;
        self.materializer.materialize(&nodes, provider_options)?;

        self.nodes = nodes;
        self.provider_options = provider_options.map(str::to_string);
        self.state = ClusterState::Configured;
        info!(
            "cluster configured: {} nodes, ports from {}",
            self.nodes.len(),
            self.ports.base()
        );
        Ok(())
    }

    /// Layer an extra option file into the shared overlay
    pub fn add_custom_include(
        &self,
        config_file: &Path,
    ) -> Result<()> {
        self.expect_state(
            &[ClusterState::Configured, ClusterState::Initialized, ClusterState::Stopped],
            "add configuration",
        )?;
        self.materializer.add_custom_include(config_file)
    }

    /// Append option lines to one node's config file
    pub fn append_node_options(
        &self,
        index: usize,
        lines: &[String],
    ) -> Result<()> {
        self.expect_state(
            &[ClusterState::Configured, ClusterState::Initialized, ClusterState::Stopped],
            "append node options",
        )?;
        self.materializer.append_node_options(self.node(index)?, lines)
    }

    /// CONFIGURED → INITIALIZED.
    ///
    /// Bootstraps data directories in index order and stops at the first
    /// failing node.
    pub async fn initialize(&mut self) -> Result<()> {
        self.expect_state(&[ClusterState::Configured], "initialize")?;
        let version = self.version().await?;

        for i in 0..self.nodes.len() {
            self.initialize_node(i, version).await?;
        }

        self.state = ClusterState::Initialized;
        info!("cluster initialized");
        Ok(())
    }

    async fn initialize_node(
        &mut self,
        position: usize,
        version: ServerVersion,
    ) -> Result<()> {
        let node = &self.nodes[position];
        remove_dir_if_exists(&node.data_dir)?;
        if !node.config_path.is_file() {
            return Err(ProvisionError::Configuration {
                path: node.config_path.clone(),
                reason: format!("config file for node{} not found", node.index),
            }
            .into());
        }
        if !version.has_mariadb_install_db() {
            ensure_dir(&node.data_dir)?;
        }

        let inv = tools::install_db(&self.spec, node, version);
        let output = self.supervisor.runner().run(&inv).await?;
        if !output.is_success() {
            error!("node{} initialization failed: {:?}", node.index, output.status);
            return Err(LifecycleError::Initialization {
                node: node.index,
                status: output.status,
                log: node.init_log.clone(),
            }
            .into());
        }
        debug!("node{} data directory initialized", node.index);
        Ok(())
    }

    /// INITIALIZED/STOPPED → RUNNING.
    ///
    /// Node 1 goes first (as the bootstrap member for Galera), then the
    /// rest, each followed by a readiness poll. A node that does not come up
    /// is reported but nodes already running are left alone.
    pub async fn start(
        &mut self,
        extra: &[String],
    ) -> Result<()> {
        self.expect_state(&[ClusterState::Initialized, ClusterState::Stopped], "start")?;
        self.start_extra = extra.to_vec();

        let bootstrap_first = self.spec.topology.requires_bootstrap();
        let mut failed = Vec::new();
        for position in 0..self.nodes.len() {
            let bootstrap = position == 0 && bootstrap_first;
            match self.start_and_wait(position, bootstrap).await {
                Ok(()) => {}
                Err(e @ Error::Cancelled(_)) => {
                    self.refresh_state();
                    return Err(e);
                }
                Err(e) => {
                    error!("node{} failed to start: {}", position + 1, e);
                    failed.push(position + 1);
                }
            }
        }

        self.refresh_state();
        if failed.is_empty() {
            info!("cluster is running with {} nodes", self.nodes.len());
            Ok(())
        } else {
            Err(LifecycleError::Startup { nodes: failed }.into())
        }
    }

    async fn start_and_wait(
        &mut self,
        position: usize,
        bootstrap: bool,
    ) -> Result<()> {
        let supervisor = self.supervisor.clone();
        let readiness = self.readiness;
        let cancel = self.cancel.clone();
        let extra = self.start_extra.clone();
        let node = &mut self.nodes[position];

        supervisor.start(node, &extra, bootstrap).await?;
        supervisor.wait_until_ready(node, readiness, &cancel).await?;
        if let Err(e) = supervisor.prepare_for_tests(node).await {
            warn!("node{} post-start preparation failed: {}", node.index, e);
        }
        Ok(())
    }

    /// RUNNING → PARTIALLY_DOWN by stopping one node
    pub async fn stop_node(
        &mut self,
        index: usize,
    ) -> Result<()> {
        self.expect_state(&[ClusterState::Running, ClusterState::PartiallyDown], "stop node")?;
        let supervisor = self.supervisor.clone();
        let node = self.node_mut(index)?;
        supervisor.stop(node).await?;
        self.state = ClusterState::PartiallyDown;
        Ok(())
    }

    /// Bring a stopped node back through `seed`.
    ///
    /// For Galera the node gets a joiner overlay naming the seed's group
    /// endpoint before it is started.
    pub async fn rejoin(
        &mut self,
        index: usize,
        seed: usize,
    ) -> Result<()> {
        self.expect_state(&[ClusterState::Running, ClusterState::PartiallyDown], "rejoin node")?;
        if index == seed {
            return Err(Error::Fatal(format!("node{} cannot seed itself", index)));
        }
        let seed_node = self.node(seed)?;
        if !seed_node.is_ready() {
            return Err(LifecycleError::NodeNotRunning(seed).into());
        }
        let node = self.node(index)?;
        if node.is_started() {
            warn!("node{} still has a process handle, starting it again anyway", index);
        }

        if self.spec.topology == Topology::Galera {
            self.materializer.write_joiner_overlay(node, seed_node)?;
        }

        let result = self.start_and_wait(index - 1, false).await;
        self.refresh_state();
        result?;
        info!("node{} rejoined through node{}", index, seed);
        Ok(())
    }

    /// Replay the saved startup script of a node and wait for it
    pub async fn restart_node(
        &mut self,
        index: usize,
    ) -> Result<()> {
        self.expect_state(&[ClusterState::Running, ClusterState::PartiallyDown], "restart node")?;
        let supervisor = self.supervisor.clone();
        let readiness = self.readiness;
        let cancel = self.cancel.clone();
        let node = self.node_mut(index)?;

        let result = async {
            supervisor.replay_startup(node).await?;
            supervisor.wait_until_ready(node, readiness, &cancel).await
        }
        .await;
        self.refresh_state();
        result
    }

    /// Provision one more node and join it through `seed`.
    ///
    /// Returns the new node's index.
    pub async fn add_joiner(
        &mut self,
        seed: usize,
    ) -> Result<usize> {
        self.expect_state(&[ClusterState::Running, ClusterState::PartiallyDown], "add node")?;
        self.node(seed)?;
        let version = self.version().await?;

        let index = self.nodes.len() + 1;
        let joiner = NodeHandle::new(&self.spec, index, self.ports.port_for(index)?);
        {
            let mut peers: Vec<&NodeHandle> = self.nodes.iter().collect();
            peers.push(&joiner);
            self.materializer
                .materialize_node(&joiner, &peers, self.provider_options.as_deref())?;
        }
        self.nodes.push(joiner);

        if let Err(e) = self.initialize_node(index - 1, version).await {
            self.nodes.pop();
            return Err(e);
        }
        info!("node{} provisioned as joiner", index);

        // The new node is not ready yet, so the cluster is partially down
        // until the rejoin below succeeds.
        self.state = ClusterState::PartiallyDown;
        self.rejoin(index, seed).await?;
        Ok(index)
    }

    pub async fn connection_check(
        &self,
        index: usize,
    ) -> Result<()> {
        self.supervisor.connection_check(self.node(index)?).await
    }

    /// RUNNING/PARTIALLY_DOWN → STOPPED.
    ///
    /// Best effort: individual stop failures are logged and skipped.
    /// Returns the indexes of nodes whose shutdown failed.
    pub async fn teardown(&mut self) -> Result<Vec<usize>> {
        if self.state == ClusterState::Unprovisioned {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                operation: "teardown",
            }
            .into());
        }

        let supervisor = self.supervisor.clone();
        let mut failed = Vec::new();
        for node in self.nodes.iter_mut().filter(|n| n.is_started()) {
            if let Err(e) = supervisor.stop(node).await {
                warn!("node{} shutdown failed during teardown: {}", node.index, e);
                node.process = None;
                node.ready = false;
                failed.push(node.index);
            }
        }

        self.state = ClusterState::Stopped;
        info!("cluster stopped");
        Ok(failed)
    }
}
