//! Renders per-node server configuration files.
//!
//! Each node file is the topology's base template followed by the computed
//! per-node values and `!include` lines for the shared overlays. Node files
//! are rewritten from scratch on every run; overlays added later in a run
//! are appended.

mod ports;

pub use ports::*;


use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use crate::constants::CUSTOM_OVERLAY;
use crate::constants::ENCRYPTION_OVERLAY;
use crate::file_io::append_lines;
use crate::file_io::ensure_dir;
use crate::file_io::write_atomically;
use crate::ClusterSpec;
use crate::NodeHandle;
use crate::ProvisionError;
use crate::Result;
use crate::Topology;

pub struct ConfigMaterializer {
    spec: Arc<ClusterSpec>,
}

impl ConfigMaterializer {
    pub fn new(spec: Arc<ClusterSpec>) -> Self {
        Self { spec }
    }

    pub fn template_path(&self) -> PathBuf {
        self.spec.template_dir.join(self.spec.topology.template_name())
    }

    pub fn custom_overlay_path(&self) -> PathBuf {
        self.spec.conf_dir().join(CUSTOM_OVERLAY)
    }

    pub fn encryption_overlay_path(&self) -> PathBuf {
        self.spec.conf_dir().join(ENCRYPTION_OVERLAY)
    }

    /// Node handles for indexes `1..=count` on the given port plan
    pub fn layout(
        &self,
        ports: &PortPlan,
        count: usize,
    ) -> Result<Vec<NodeHandle>> {
        (1..=count)
            .map(|i| Ok(NodeHandle::new(&self.spec, i, ports.port_for(i)?)))
            .collect()
    }

    /// Write the shared overlays and one config file per node.
    ///
    /// Every template and overlay is checked before anything is written, so
    /// a missing file fails the whole call without touching node files.
    pub fn materialize(
        &self,
        nodes: &[NodeHandle],
        provider_options: Option<&str>,
    ) -> Result<()> {
        let template = self.template_path();
        require_file(&template, "base template is missing")?;
        let custom_src = self.spec.template_dir.join(CUSTOM_OVERLAY);
        require_file(&custom_src, "custom overlay is missing")?;
        let encryption_src = self.spec.template_dir.join(ENCRYPTION_OVERLAY);
        if self.spec.encryption {
            require_file(&encryption_src, "encryption overlay is missing")?;
        }

        ensure_dir(&self.spec.conf_dir())?;
        copy_file(&custom_src, &self.custom_overlay_path())?;
        if self.spec.encryption {
            copy_file(&encryption_src, &self.encryption_overlay_path())?;
        }

        let base = read_file(&template)?;
        for node in nodes {
            self.write_node(&base, node, nodes, provider_options)?;
        }
        info!("materialized {} node config files in {:?}", nodes.len(), self.spec.conf_dir());
        Ok(())
    }

    /// Write one node file against the current peer set.
    ///
    /// Used for nodes added after the initial materialization.
    pub fn materialize_node(
        &self,
        node: &NodeHandle,
        peers: &[&NodeHandle],
        provider_options: Option<&str>,
    ) -> Result<()> {
        let template = self.template_path();
        require_file(&template, "base template is missing")?;
        if !self.custom_overlay_path().is_file() {
            return Err(ProvisionError::Configuration {
                path: self.custom_overlay_path(),
                reason: "cluster was not materialized yet".to_string(),
            }
            .into());
        }
        let base = read_file(&template)?;
        let content = self.render_node(&base, node, peers.iter().copied(), provider_options);
        write_atomically(&node.config_path, &content)
    }

    fn write_node(
        &self,
        base: &str,
        node: &NodeHandle,
        peers: &[NodeHandle],
        provider_options: Option<&str>,
    ) -> Result<()> {
        let content = self.render_node(base, node, peers.iter(), provider_options);
        write_atomically(&node.config_path, &content)?;
        debug!("wrote {:?}", node.config_path);
        Ok(())
    }

    /// Full text of one node file
    pub fn render_node<'a>(
        &self,
        base: &str,
        node: &NodeHandle,
        peers: impl Iterator<Item = &'a NodeHandle>,
        provider_options: Option<&str>,
    ) -> String {
        let mut lines: Vec<String> = vec![
            format!("port={}", node.port),
            format!("socket={}", node.socket_path.display()),
            format!("server_id={}", node.server_id),
        ];

        if self.spec.topology == Topology::Galera {
            let members: Vec<String> = peers.map(|p| p.group_address()).collect();
            let mut provider = format!(
                "gmcast.listen_addr=tcp://{};ist.recv_addr=127.0.0.1:{}",
                node.group_address(),
                node.ist_port()
            );
            if let Some(extra) = provider_options.map(|o| o.trim().trim_end_matches(';')) {
                if !extra.is_empty() {
                    provider.push(';');
                    provider.push_str(extra);
                }
            }
            lines.push(format!("wsrep_cluster_address=gcomm://{}", members.join(",")));
            lines.push(format!("wsrep_provider_options=\"{}\"", provider));
            lines.push(format!("wsrep_sst_receive_address=127.0.0.1:{}", node.sst_port()));
            lines.push("wsrep_node_incoming_address=127.0.0.1".to_string());
            lines.push(format!("wsrep_node_address={}", node.group_address()));
        }

        lines.push(include_line(&self.custom_overlay_path()));
        if self.spec.encryption {
            lines.push(include_line(&self.encryption_overlay_path()));
        }

        let mut content = base.trim_end().to_string();
        content.push('\n');
        for line in lines {
            content.push_str(&line);
            content.push('\n');
        }
        content
    }

    /// Layer a user supplied option file into the shared overlay
    pub fn add_custom_include(
        &self,
        config_file: &Path,
    ) -> Result<()> {
        require_file(config_file, "custom config is missing")?;
        append_lines(&self.custom_overlay_path(), &[String::new(), include_line(config_file)])?;
        info!("included {:?} in {:?}", config_file, self.custom_overlay_path());
        Ok(())
    }

    /// Append raw option lines to one node file
    pub fn append_node_options(
        &self,
        node: &NodeHandle,
        lines: &[String],
    ) -> Result<()> {
        append_lines(&node.config_path, lines)
    }

    /// Point `node` at `seed`'s group endpoint through a joiner overlay.
    ///
    /// The overlay is rewritten every time; the include line is only added
    /// once per node file.
    pub fn write_joiner_overlay(
        &self,
        node: &NodeHandle,
        seed: &NodeHandle,
    ) -> Result<PathBuf> {
        let overlay = self.spec.conf_dir().join(format!("joiner{}.cnf", node.index));
        write_atomically(
            &overlay,
            &format!(
                "[mysqld]\nwsrep_cluster_address=gcomm://{}\n",
                seed.group_address()
            ),
        )?;

        let include = include_line(&overlay);
        let current = read_file(&node.config_path)?;
        if !current.lines().any(|l| l.trim() == include) {
            append_lines(&node.config_path, &[include])?;
        }
        debug!("node{} will join through node{} ({})", node.index, seed.index, seed.group_address());
        Ok(overlay)
    }
}

fn include_line(path: &Path) -> String {
    format!("!include {}", path.display())
}

fn require_file(
    path: &Path,
    reason: &str,
) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProvisionError::Configuration {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
        .into())
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| {
        ProvisionError::PathError {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn copy_file(
    from: &Path,
    to: &Path,
) -> Result<()> {
    fs::copy(from, to).map(|_| ()).map_err(|source| {
        ProvisionError::PathError {
            path: to.to_path_buf(),
            source,
        }
        .into()
    })
}
