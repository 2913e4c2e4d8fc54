//! QA Harness Error Hierarchy
//!
//! Defines the error types for the cluster QA harness, categorized by the
//! lifecycle phase that produced them.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

use crate::cluster::ClusterState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid harness settings
    #[error("Invalid settings: {0}")]
    InvalidConfig(String),

    /// Binary, template and overlay problems found before anything runs
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Cluster bootstrap, startup and state machine failures
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Workload generator failures
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// External command invocation failures
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The operator aborted the run while an operation was waiting
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Unrecoverable failures requiring the run to stop
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// A required binary is missing from the install directory
    #[error("Precondition failed: {path} does not exist")]
    Precondition { path: PathBuf },

    /// A template or overlay file is missing
    #[error("Configuration error: {reason} ({path})")]
    Configuration { path: PathBuf, reason: String },

    /// Server version output could not be understood
    #[error("Unrecognized server version output: {0:?}")]
    UnknownVersion(String),

    /// Filesystem failures while laying out the work directory
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Data directory bootstrap failed (first failing node is reported)
    #[error("Initialization of node {node} failed with status {status:?}, see {log}")]
    Initialization {
        node: usize,
        status: Option<i32>,
        log: PathBuf,
    },

    /// Readiness polling exhausted its attempts
    #[error("Node {node} was not ready after {attempts} attempts ({elapsed:?})")]
    StartupTimeout {
        node: usize,
        attempts: usize,
        elapsed: Duration,
    },

    /// One or more nodes failed to come up; the others were left running
    #[error("Cluster startup failed for nodes {nodes:?}")]
    Startup { nodes: Vec<usize> },

    /// Operation not permitted from the current cluster state
    #[error("Cannot {operation} while cluster is {from:?}")]
    InvalidTransition {
        from: ClusterState,
        operation: &'static str,
    },

    /// Node index outside 1..=node_count
    #[error("Unknown node index {0}")]
    UnknownNode(usize),

    /// Operation requires a running node
    #[error("Node {0} is not running")]
    NodeNotRunning(usize),

    /// The saved startup script for a node is missing
    #[error("No saved startup script for node {node} at {path}")]
    MissingStartupScript { node: usize, path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// Generator exited with a nonzero status
    #[error("{tool} failed with status {status:?}, see {log}")]
    Failed {
        tool: &'static str,
        status: Option<i32>,
        log: PathBuf,
    },

    /// Names used to build SQL must be plain identifiers
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The program could not be started at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The program ran but reported failure
    #[error("{program} exited with status {status:?}: {stderr}")]
    NonZeroExit {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Output redirection or waiting failed
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Output from a helper tool could not be parsed
    #[error("Unexpected output from {program}: {output:?}")]
    UnexpectedOutput { program: String, output: String },
}

impl Error {
    /// Steps after which a scenario cannot meaningfully continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Provision(_) | Error::InvalidConfig(_) | Error::Cancelled(_) | Error::Fatal(_)
        )
    }
}

// ============== Conversion Implementations ============== //
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Command(CommandError::IoError(e))
    }
}
