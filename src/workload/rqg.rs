//! Random query generator data loads.
//!
//! Each grammar module under `<randgen>/conf/<module>` gets its own
//! database `db_<module>`; every `.zz` data spec in the module directory is
//! fed to `gendata.pl` over TCP.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::file_io::create_file;
use crate::tools;
use crate::ClusterSpec;
use crate::CommandError;
use crate::CommandRunner;
use crate::Invocation;
use crate::ProvisionError;
use crate::Result;
use crate::ServerVersion;
use crate::ToolsConfig;

const BASE_MODULES: [&str; 6] = ["galera", "transactions", "optimizer", "mariadb", "runtime", "temporal"];
const PARTITIONING_MODULE: &str = "partitioning";

/// Exit status of one `gendata.pl` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutcome {
    pub spec: PathBuf,
    pub status: Option<i32>,
}

impl SpecOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }
}

pub struct RqgDataGen<R: CommandRunner> {
    spec: Arc<ClusterSpec>,
    tools: ToolsConfig,
    runner: Arc<R>,
}

impl<R: CommandRunner> RqgDataGen<R> {
    pub fn new(
        spec: Arc<ClusterSpec>,
        tools: ToolsConfig,
        runner: Arc<R>,
    ) -> Self {
        Self { spec, tools, runner }
    }

    /// Grammar modules exercised against `version`, in load order
    pub fn modules(version: ServerVersion) -> Vec<&'static str> {
        let mut modules = BASE_MODULES.to_vec();
        if version.supports_partitioning_rqg() {
            modules.insert(2, PARTITIONING_MODULE);
        }
        modules
    }

    pub fn database_for(module: &str) -> String {
        format!("db_{}", module)
    }

    pub fn module_dir(
        &self,
        module: &str,
    ) -> PathBuf {
        self.tools.randgen_dir.join("conf").join(module)
    }

    /// Fail with a configuration error unless every module directory exists
    pub fn check_modules(
        &self,
        modules: &[&str],
    ) -> Result<()> {
        for module in modules {
            let dir = self.module_dir(module);
            if !dir.is_dir() {
                return Err(ProvisionError::Configuration {
                    path: dir,
                    reason: format!("RQG module {} does not exist", module),
                }
                .into());
            }
        }
        Ok(())
    }

    /// `.zz` data specs of a module, sorted by name
    pub fn data_specs(
        &self,
        module: &str,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.module_dir(module);
        let entries = fs::read_dir(&dir).map_err(|source| ProvisionError::PathError {
            path: dir.clone(),
            source,
        })?;
        let mut specs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "zz"))
            .collect();
        specs.sort();
        Ok(specs)
    }

    /// Recreate the module database and run every data spec into it.
    ///
    /// A failing spec does not stop the remaining ones; the caller gets one
    /// outcome per spec.
    pub async fn load_module(
        &self,
        socket: &Path,
        module: &str,
    ) -> Result<Vec<SpecOutcome>> {
        self.check_modules(&[module])?;
        let database = Self::database_for(module);
        let port = self.server_port(socket).await?;
        self.prepare_schema(socket, &database).await?;

        let log = self.spec.log_dir().join(format!("rqg_{}.log", module));
        create_file(&log)?;

        // gendata.pl runs from the checkout root, so every path handed to
        // it must be absolute
        let root = fs::canonicalize(&self.tools.randgen_dir).map_err(|source| ProvisionError::PathError {
            path: self.tools.randgen_dir.clone(),
            source,
        })?;

        let mut outcomes = Vec::new();
        for data_spec in self.data_specs(module)? {
            let data_spec = root.join("conf").join(module).join(data_spec.file_name().unwrap_or_default());
            let inv = self.gendata(&root, port, &database, &data_spec, &log);
            let output = self.runner.run(&inv).await?;
            if !output.is_success() {
                warn!("gendata failed for {:?} with {:?}, see {:?}", data_spec, output.status, log);
            }
            outcomes.push(SpecOutcome {
                spec: data_spec,
                status: output.status,
            });
        }
        info!("RQG module {} loaded {} data specs into {}", module, outcomes.len(), database);
        Ok(outcomes)
    }

    async fn server_port(
        &self,
        socket: &Path,
    ) -> Result<u16> {
        let inv = tools::sql(&self.spec, socket, "select @@port");
        let output = self.runner.run(&inv).await?.check(&inv.program_name())?;
        output.stdout.trim().parse().map_err(|_| {
            CommandError::UnexpectedOutput {
                program: inv.program_name(),
                output: output.stdout.clone(),
            }
            .into()
        })
    }

    async fn prepare_schema(
        &self,
        socket: &Path,
        database: &str,
    ) -> Result<()> {
        let user = &self.tools.rqg_user;
        let statement = format!(
            "DROP DATABASE IF EXISTS {db};CREATE DATABASE {db};\
             CREATE USER IF NOT EXISTS '{user}'@'%' IDENTIFIED BY '';\
             GRANT ALL ON *.* TO '{user}'@'%';",
            db = database,
            user = user.replace('\'', ""),
        );
        let inv = tools::sql(&self.spec, socket, &statement);
        self.runner.run(&inv).await?.check(&inv.program_name())?;
        Ok(())
    }

    fn gendata(
        &self,
        root: &Path,
        port: u16,
        database: &str,
        data_spec: &Path,
        log: &Path,
    ) -> Invocation {
        let dsn = format!(
            "dbi:mysql:host=127.0.0.1:port={}:user={}:database={}",
            port, self.tools.rqg_user, database
        );
        Invocation::new(&self.tools.perl)
            .arg(root.join("gendata.pl").display().to_string())
            .opt("dsn", dsn)
            .opt("spec", data_spec.display())
            .current_dir(root)
            .append_to(log)
    }
}
