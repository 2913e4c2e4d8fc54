//! Sysbench schema loads and read/write runs against a live node.
//!
//! Foreground runs block until sysbench exits. Background runs return a
//! [`BackgroundHandle`] that owns the spawned process; nothing reaps it
//! implicitly, the scenario terminates it when it is done.

mod rqg;

pub use rqg::*;


use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::tools;
use crate::ClusterSpec;
use crate::CommandRunner;
use crate::Invocation;
use crate::ProcessHandle;
use crate::Result;
use crate::WorkloadConfig;
use crate::WorkloadError;

const SYSBENCH: &str = "sysbench";
const LOAD_SCRIPT: &str = "oltp_insert.lua";
const READ_WRITE_SCRIPT: &str = "oltp_read_write.lua";

/// What a sysbench invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadMode {
    /// Create and populate the tables
    Load,
    /// Read/write run, caller waits for it
    ReadWriteForeground,
    /// Read/write run left going in the background
    ReadWriteBackground,
}

impl WorkloadMode {
    fn script(&self) -> &'static str {
        match self {
            WorkloadMode::Load => LOAD_SCRIPT,
            _ => READ_WRITE_SCRIPT,
        }
    }

    fn command(&self) -> &'static str {
        match self {
            WorkloadMode::Load => "prepare",
            _ => "run",
        }
    }

    fn log_name(&self) -> &'static str {
        match self {
            WorkloadMode::Load => "sysbench_prepare.log",
            WorkloadMode::ReadWriteForeground => "sysbench_read_write.log",
            WorkloadMode::ReadWriteBackground => "sysbench_background.log",
        }
    }
}

/// Where sysbench connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadTarget {
    Socket(PathBuf),
    Tcp { host: String, port: u16 },
}

impl WorkloadTarget {
    /// Loopback TCP endpoint, e.g. a node's admin port
    pub fn local_port(port: u16) -> Self {
        WorkloadTarget::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }
}

/// One sysbench invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRun {
    pub target: WorkloadTarget,
    pub database: String,
    pub mode: WorkloadMode,
    pub table_count: usize,
    pub threads: usize,
    pub table_size: usize,
    /// Ignored for loads
    pub duration_secs: u64,
}

/// Result of [`WorkloadDriver::run`]
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Background(BackgroundHandle),
}

/// A read/write run still going in the background
#[derive(Debug)]
pub struct BackgroundHandle {
    process: ProcessHandle,
    log: PathBuf,
}

impl BackgroundHandle {
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn log(&self) -> &Path {
        &self.log
    }

    /// Kill the generator. Returns whether it was still running.
    pub async fn terminate(&mut self) -> Result<bool> {
        let killed = self.process.terminate().await?;
        if killed {
            info!("terminated background sysbench (pid {:?})", self.pid());
        }
        Ok(killed)
    }
}

/// Post-load alteration applied table by table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableTransform {
    /// Turn on table-level encryption
    Encrypt,
}

impl TableTransform {
    fn alter_clause(&self) -> &'static str {
        match self {
            TableTransform::Encrypt => "ENCRYPTED=YES",
        }
    }
}

/// Names of the tables sysbench creates for `count` tables
pub fn sbtest_tables(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("sbtest{}", i)).collect()
}

/// Accept only plain identifiers for names that end up inside SQL text
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(WorkloadError::InvalidIdentifier(name.to_string()).into())
    }
}

pub struct WorkloadDriver<R: CommandRunner> {
    spec: Arc<ClusterSpec>,
    config: WorkloadConfig,
    runner: Arc<R>,
    /// Node used for setup statements and socket runs
    socket: PathBuf,
}

impl<R: CommandRunner> WorkloadDriver<R> {
    pub fn new(
        spec: Arc<ClusterSpec>,
        config: WorkloadConfig,
        runner: Arc<R>,
        socket: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spec,
            config,
            runner,
            socket: socket.into(),
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Sysbench answers, the database is recreated empty and the sysbench
    /// user exists with full privileges.
    pub async fn sanity_check(
        &self,
        database: &str,
    ) -> Result<()> {
        let database = validate_identifier(database)?;
        let user = validate_identifier(&self.config.user)?;

        let version = Invocation::new(&self.config.sysbench_bin).arg("--version");
        let out = self.runner.run(&version).await?.check(SYSBENCH)?;
        debug!("{}", out.stdout.trim());

        let password = self.config.password.replace('\'', "''");
        let statement = format!(
            "DROP DATABASE IF EXISTS {db};CREATE DATABASE {db};\
             CREATE USER IF NOT EXISTS '{user}'@'localhost' IDENTIFIED BY '{pw}';\
             GRANT ALL ON *.* TO '{user}'@'localhost';\
             CREATE USER IF NOT EXISTS '{user}'@'%' IDENTIFIED BY '{pw}';\
             GRANT ALL ON *.* TO '{user}'@'%';",
            db = database,
            user = user,
            pw = password,
        );
        let inv = tools::sql(&self.spec, &self.socket, &statement);
        self.runner.run(&inv).await?.check(&inv.program_name())?;
        info!("sysbench sanity check passed for database {}", database);
        Ok(())
    }

    /// Create and fill `table_count` tables over the driver's socket
    pub async fn load(
        &self,
        database: &str,
        table_count: usize,
        threads: usize,
        table_size: usize,
    ) -> Result<()> {
        let run = WorkloadRun {
            target: WorkloadTarget::Socket(self.socket.clone()),
            database: database.to_string(),
            mode: WorkloadMode::Load,
            table_count,
            threads,
            table_size,
            duration_secs: 0,
        };
        self.run(&run).await.map(|_| ())
    }

    /// Read/write run over the driver's socket, sized from the settings
    pub fn read_write(
        &self,
        database: &str,
        mode: WorkloadMode,
    ) -> WorkloadRun {
        WorkloadRun {
            target: WorkloadTarget::Socket(self.socket.clone()),
            database: database.to_string(),
            mode,
            table_count: self.config.table_count,
            threads: self.config.threads,
            table_size: self.config.normal_table_size,
            duration_secs: self.config.run_time_secs,
        }
    }

    pub async fn run(
        &self,
        run: &WorkloadRun,
    ) -> Result<RunOutcome> {
        validate_identifier(&run.database)?;
        let inv = self.invocation(run);

        if run.mode == WorkloadMode::ReadWriteBackground {
            let process = self.runner.spawn(&inv)?;
            info!(
                "sysbench running in background on {} (pid {:?})",
                run.database,
                process.pid()
            );
            return Ok(RunOutcome::Background(BackgroundHandle {
                process,
                log: self.log_path(run.mode),
            }));
        }

        let output = self.runner.run(&inv).await?;
        if !output.is_success() {
            return Err(WorkloadError::Failed {
                tool: SYSBENCH,
                status: output.status,
                log: self.log_path(run.mode),
            }
            .into());
        }
        info!("sysbench {} finished on {}", run.mode.command(), run.database);
        Ok(RunOutcome::Completed)
    }

    /// Apply `transform` to each table, carrying on past failures.
    ///
    /// Returns the tables that could not be altered.
    pub async fn transform_tables(
        &self,
        database: &str,
        tables: &[String],
        transform: TableTransform,
    ) -> Result<Vec<String>> {
        let database = validate_identifier(database)?;
        let mut failed = Vec::new();
        for table in tables {
            if let Err(e) = self.transform_table(database, table, transform).await {
                warn!("{:?} of {}.{} failed: {}", transform, database, table, e);
                failed.push(table.clone());
            }
        }
        Ok(failed)
    }

    async fn transform_table(
        &self,
        database: &str,
        table: &str,
        transform: TableTransform,
    ) -> Result<()> {
        let table = validate_identifier(table)?;
        let statement = format!("ALTER TABLE {}.{} {}", database, table, transform.alter_clause());
        let inv = tools::sql(&self.spec, &self.socket, &statement);
        self.runner.run(&inv).await?.check(&inv.program_name())?;
        Ok(())
    }

    fn log_path(
        &self,
        mode: WorkloadMode,
    ) -> PathBuf {
        self.spec.log_dir().join(mode.log_name())
    }

    fn invocation(
        &self,
        run: &WorkloadRun,
    ) -> Invocation {
        let mut inv = Invocation::new(&self.config.sysbench_bin)
            .arg(self.config.lua_dir.join(run.mode.script()).display().to_string())
            .opt("table-size", run.table_size)
            .opt("tables", run.table_count)
            .opt("threads", run.threads)
            .opt("mysql-db", &run.database)
            .opt("mysql-user", &self.config.user)
            .opt("mysql-password", &self.config.password)
            .opt("db-driver", "mysql");
        inv = match &run.target {
            WorkloadTarget::Socket(socket) => inv.opt("mysql-socket", socket.display()),
            WorkloadTarget::Tcp { host, port } => inv.opt("mysql-host", host).opt("mysql-port", port),
        };
        if run.mode != WorkloadMode::Load {
            inv = inv.opt("time", run.duration_secs).opt("db-ps-mode", "disable");
        }
        inv.arg(run.mode.command()).redirect_to(self.log_path(run.mode))
    }
}
