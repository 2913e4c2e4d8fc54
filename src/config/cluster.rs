use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONF_DIR;
use crate::constants::LOG_DIR;
use crate::constants::ROOT_USER;
use crate::Error;
use crate::Result;
use crate::MAX_NODE_INDEX;

/// How the nodes of one cluster relate to each other
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Synchronously replicated Galera cluster; node 1 bootstraps the group
    #[default]
    Galera,
    /// Independent servers sharing a work directory
    Standalone,
}

impl Topology {
    /// Base template file name inside the template directory
    pub fn template_name(&self) -> &'static str {
        match self {
            Topology::Galera => "galera.cnf",
            Topology::Standalone => "md.cnf",
        }
    }

    /// Whether node 1 must be started as the primary component
    pub fn requires_bootstrap(&self) -> bool {
        matches!(self, Topology::Galera)
    }
}

/// Immutable description of the cluster under test
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterSpec {
    #[serde(default = "default_node_count")]
    pub node_count: usize,

    /// Install directory holding `bin/` and `scripts/`
    #[serde(default = "default_basedir")]
    pub basedir: PathBuf,

    /// Runtime artifacts: `conf/`, `log/` and node data directories
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Directory holding the base templates and overlays
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Account the admin tool and SQL client connect as
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub topology: Topology,

    /// Set from `--encryption-run`
    #[serde(default)]
    pub encryption: bool,

    /// Set from `--debug`; echoes every command line to stdout
    #[serde(default)]
    pub debug: bool,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            basedir: default_basedir(),
            workdir: default_workdir(),
            template_dir: default_template_dir(),
            user: default_user(),
            topology: Topology::default(),
            encryption: false,
            debug: false,
        }
    }
}

impl ClusterSpec {
    pub fn conf_dir(&self) -> PathBuf {
        self.workdir.join(CONF_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.workdir.join(LOG_DIR)
    }

    pub fn bin(
        &self,
        name: &str,
    ) -> PathBuf {
        self.basedir.join("bin").join(name)
    }

    pub fn script(
        &self,
        name: &str,
    ) -> PathBuf {
        self.basedir.join("scripts").join(name)
    }

    /// Validates the cluster settings
    /// # Errors
    /// Returns `Error::InvalidConfig` if any rule is violated
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(Error::InvalidConfig("node_count must be at least 1".into()));
        }
        // one index is kept free for a node joined during a run
        if self.node_count >= MAX_NODE_INDEX {
            return Err(Error::InvalidConfig(format!(
                "node_count must be below {} to fit the port range",
                MAX_NODE_INDEX
            )));
        }

        validate_path(&self.basedir, "basedir")?;
        validate_path(&self.workdir, "workdir")?;
        validate_path(&self.template_dir, "template_dir")?;

        if self.user.trim().is_empty() {
            return Err(Error::InvalidConfig("user cannot be empty".into()));
        }

        Ok(())
    }
}

fn validate_path(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidConfig(format!("{} path cannot be empty", name)));
    }
    Ok(())
}

fn default_node_count() -> usize {
    3
}
fn default_basedir() -> PathBuf {
    PathBuf::from("/opt/mariadb")
}
fn default_workdir() -> PathBuf {
    PathBuf::from("/tmp/galera-qa")
}
fn default_template_dir() -> PathBuf {
    PathBuf::from("conf")
}
fn default_user() -> String {
    ROOT_USER.to_string()
}
