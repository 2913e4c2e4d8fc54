use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use galera_qa::ClusterSpec;
use galera_qa::CommandOutput;
use galera_qa::CommandRunner;
use galera_qa::Invocation;
use galera_qa::ProcessHandle;
use galera_qa::ReadinessPolicy;
use galera_qa::Result;
use galera_qa::SystemRunner;
use galera_qa::Topology;
use tempfile::TempDir;

pub const GALERA_TEMPLATE: &str = "[mysqld]\nbinlog_format=ROW\nwsrep_on=ON\n";

// Server stub: answers --version, otherwise logs its start line, creates
// the socket named in its config file and stays up for a few seconds
const MYSQLD_STUB: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mysqld  Ver 10.6.12-MariaDB-log for Linux on x86_64 (MariaDB Server)"
  exit 0
fi
echo "mysqld $*"
socket=$(sed -n 's/^socket=//p' "${1#--defaults-file=}")
touch "$socket"
exec sleep 3
"#;

// Admin stub: ping answers while the socket exists, shutdown removes it
const MYSQLADMIN_STUB: &str = r#"#!/bin/sh
echo "mysqladmin $*" >> "$(dirname "$0")/../admin.log"
for a; do
  case "$a" in
    --socket=*) socket="${a#--socket=}" ;;
  esac
done
for command; do :; done
case "$command" in
  ping) [ -e "$socket" ] ;;
  shutdown) rm -f "$socket" ;;
esac
"#;

// SQL client stub keyed on the statement, which is always the last argument
const MYSQL_STUB: &str = r#"#!/bin/sh
for statement; do :; done
case "$statement" in
  "select @@port") echo 3600 ;;
  "SHOW STATUS LIKE"*) printf 'wsrep_flow_control_status\tOFF\n' ;;
  "SELECT table_name"*) echo t1 ;;
  "CHECKSUM TABLE"*) printf 'db.t1\t42\n' ;;
esac
exit 0
"#;

const INSTALL_DB_STUB: &str = r#"#!/bin/sh
for a; do
  case "$a" in
    --datadir=*) mkdir -p "${a#--datadir=}" ;;
  esac
done
echo "installed"
"#;

// Echoes its arguments into whatever log the harness redirects it to
const ECHO_STUB: &str = "#!/bin/sh\necho \"$0 $*\"\nexit 0\n";

/// Real processes for everything except the stale process sweep, which
/// would otherwise reach outside the test's temp directory
#[derive(Debug, Default)]
pub struct StubRunner {
    inner: SystemRunner,
}

#[async_trait]
impl CommandRunner for StubRunner {
    async fn run(
        &self,
        invocation: &Invocation,
    ) -> Result<CommandOutput> {
        if invocation.program_name() == "pkill" {
            return Ok(CommandOutput::failure(1));
        }
        self.inner.run(invocation).await
    }

    fn spawn(
        &self,
        invocation: &Invocation,
    ) -> Result<ProcessHandle> {
        self.inner.spawn(invocation)
    }
}

/// A fake install tree of executable stub tools plus templates
pub struct StubInstall {
    pub root: TempDir,
}

impl StubInstall {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let install = Self { root };
        install.tool("bin/mysqld", MYSQLD_STUB);
        install.tool("bin/mysqladmin", MYSQLADMIN_STUB);
        install.tool("bin/mysql", MYSQL_STUB);
        install.tool("scripts/mariadb-install-db", INSTALL_DB_STUB);
        install.tool("tools/sysbench", ECHO_STUB);
        install.tool("tools/perl", ECHO_STUB);

        for (name, content) in [
            ("galera.cnf", GALERA_TEMPLATE),
            ("md.cnf", "[mysqld]\nlog_bin\n"),
            ("custom.cnf", "[mysqld]\n"),
            ("encryption.cnf", "[mysqld]\nfile_key_management\n"),
        ] {
            let path = install.template_dir().join(name);
            fs::create_dir_all(install.template_dir()).unwrap();
            fs::write(path, content).unwrap();
        }
        install
    }

    pub fn path(
        &self,
        relative: &str,
    ) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn basedir(&self) -> PathBuf {
        self.path("basedir")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.path("templates")
    }

    pub fn workdir(&self) -> PathBuf {
        self.path("work")
    }

    /// Directory of the non-server tools (sysbench, perl)
    pub fn tool_path(
        &self,
        name: &str,
    ) -> PathBuf {
        self.path("tools").join(name)
    }

    pub fn admin_log(&self) -> PathBuf {
        self.basedir().join("admin.log")
    }

    pub fn spec(
        &self,
        node_count: usize,
    ) -> ClusterSpec {
        ClusterSpec {
            node_count,
            basedir: self.basedir(),
            workdir: self.workdir(),
            template_dir: self.template_dir(),
            user: "root".to_string(),
            topology: Topology::Galera,
            encryption: false,
            debug: false,
        }
    }

    fn tool(
        &self,
        relative: &str,
        script: &str,
    ) {
        let path = match relative.split_once('/') {
            Some(("tools", name)) => self.tool_path(name),
            _ => self.basedir().join(relative),
        };
        write_executable(&path, script);
    }
}

pub fn write_executable(
    path: &Path,
    content: &str,
) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        max_attempts: 20,
        interval_ms: 50,
    }
}

pub fn runner() -> Arc<StubRunner> {
    Arc::new(StubRunner::default())
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {:?}: {}", path, e))
}
