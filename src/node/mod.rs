mod supervisor;
mod version;

pub use supervisor::*;
pub use version::*;


use std::path::PathBuf;

use crate::constants::GALERA_GROUP_PORT_OFFSET;
use crate::constants::GALERA_IST_PORT_OFFSET;
use crate::constants::GALERA_SST_PORT_OFFSET;
use crate::constants::LOG_DIR;
use crate::constants::NODE_PREFIX;
use crate::constants::SERVER_ID_BASE;
use crate::ClusterSpec;
use crate::ProcessHandle;

/// One database node of the cluster under test.
///
/// Created when the node is provisioned and owned by the cluster
/// controller; the supervisor only borrows it for the duration of a call.
#[derive(Debug)]
pub struct NodeHandle {
    /// 1-based position within the cluster
    pub index: usize,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub port: u16,
    /// Server error log, also receives stdout/stderr
    pub log_path: PathBuf,
    /// Output of the data directory bootstrap
    pub init_log: PathBuf,
    /// Saved startup line for crash-restart replay
    pub startup_script: PathBuf,
    pub server_id: u32,
    pub(crate) process: Option<ProcessHandle>,
    pub(crate) ready: bool,
}

impl NodeHandle {
    /// Lay out node `index` under the cluster work directory
    pub fn new(
        spec: &ClusterSpec,
        index: usize,
        port: u16,
    ) -> Self {
        let name = format!("{}{}", NODE_PREFIX, index);
        let data_dir = spec.workdir.join(&name);
        let log_dir = spec.workdir.join(LOG_DIR);
        Self {
            index,
            config_path: spec.conf_dir().join(format!("{}.cnf", name)),
            socket_path: data_dir.join("mysql.sock"),
            data_dir,
            port,
            log_path: log_dir.join(format!("{}.err", name)),
            init_log: log_dir.join(format!("startup{}.log", index)),
            startup_script: log_dir.join(format!("startup{}.sh", index)),
            server_id: SERVER_ID_BASE + index as u32,
            process: None,
            ready: false,
        }
    }

    /// Galera group communication port
    pub fn group_port(&self) -> u16 {
        self.port + GALERA_GROUP_PORT_OFFSET
    }

    /// Incremental state transfer receive port
    pub fn ist_port(&self) -> u16 {
        self.port + GALERA_IST_PORT_OFFSET
    }

    /// State snapshot transfer receive port
    pub fn sst_port(&self) -> u16 {
        self.port + GALERA_SST_PORT_OFFSET
    }

    pub fn group_address(&self) -> String {
        format!("127.0.0.1:{}", self.group_port())
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    pub fn is_started(&self) -> bool {
        self.process.is_some()
    }

    /// Readiness poll succeeded since the last (re)start
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}
