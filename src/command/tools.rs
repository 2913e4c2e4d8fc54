//! Invocation builders, one per external tool.

use std::path::Path;

use crate::ClusterSpec;
use crate::Invocation;
use crate::NodeHandle;
use crate::ServerVersion;

/// Server flag that makes a Galera node form a new primary component
pub const BOOTSTRAP_FLAG: &str = "--wsrep-new-cluster";

/// Subcommands of the admin tool the harness relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Ping,
    Shutdown,
}

impl AdminCommand {
    fn as_str(&self) -> &'static str {
        match self {
            AdminCommand::Ping => "ping",
            AdminCommand::Shutdown => "shutdown",
        }
    }
}

/// `mysqld --version`
pub fn server_version(spec: &ClusterSpec) -> Invocation {
    Invocation::new(spec.bin("mysqld")).arg("--version")
}

/// Server start line for one node; output is appended to the node log.
pub fn start_server(
    spec: &ClusterSpec,
    node: &NodeHandle,
    extra: &[String],
    bootstrap: bool,
) -> Invocation {
    let mut inv = Invocation::new(spec.bin("mysqld"))
        .opt("defaults-file", node.config_path.display())
        .opt("datadir", node.data_dir.display())
        .opt("basedir", spec.basedir.display())
        .args(extra.iter().cloned());
    if bootstrap {
        inv = inv.arg(BOOTSTRAP_FLAG);
    }
    inv.opt("log-error", node.log_path.display())
        .append_to(&node.log_path)
}

/// Data directory bootstrap; the tool changed name in 10.4.
pub fn install_db(
    spec: &ClusterSpec,
    node: &NodeHandle,
    version: ServerVersion,
) -> Invocation {
    let inv = if version.has_mariadb_install_db() {
        Invocation::new(spec.script("mariadb-install-db"))
            .arg("--no-defaults")
            .arg("--force")
            .arg("--auth-root-authentication-method=normal")
    } else {
        Invocation::new(spec.script("mysql_install_db"))
            .arg("--no-defaults")
            .arg("--force")
    };
    inv.opt("basedir", spec.basedir.display())
        .opt("datadir", node.data_dir.display())
        .redirect_to(&node.init_log)
}

pub fn admin(
    spec: &ClusterSpec,
    socket: &Path,
    command: AdminCommand,
) -> Invocation {
    Invocation::new(spec.bin("mysqladmin"))
        .opt("user", &spec.user)
        .opt("socket", socket.display())
        .arg(command.as_str())
}

/// Batch-mode SQL client call: tab separated, no column names
pub fn sql(
    spec: &ClusterSpec,
    socket: &Path,
    statement: &str,
) -> Invocation {
    Invocation::new(spec.bin("mysql"))
        .opt("user", &spec.user)
        .opt("socket", socket.display())
        .arg("-Bse")
        .arg(statement)
}

/// Same as [`sql`] with a default database selected
pub fn sql_in_db(
    spec: &ClusterSpec,
    socket: &Path,
    database: &str,
    statement: &str,
) -> Invocation {
    Invocation::new(spec.bin("mysql"))
        .opt("user", &spec.user)
        .opt("socket", socket.display())
        .opt("database", database)
        .arg("-Bse")
        .arg(statement)
}

/// Coarse kill of every process whose command line matches `pattern`
pub fn kill_matching(pattern: &str) -> Invocation {
    Invocation::new("pkill").arg("-9").arg("-f").arg(pattern)
}

/// Replay a saved one-line startup script
pub fn replay_script(script: &Path) -> Invocation {
    Invocation::new("bash").arg(script.display().to_string())
}
