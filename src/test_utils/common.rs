use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::ClusterSpec;
use crate::Topology;

pub const GALERA_TEMPLATE: &str = "[mysqld]\nbinlog_format=ROW\nwsrep_on=ON\n";
pub const STANDALONE_TEMPLATE: &str = "[mysqld]\nlog_bin\n";

/// Temporary install, template and work directories for one test
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    /// Install tree with a `mysqld` binary and a full template directory
    pub fn new() -> Self {
        let env = Self::bare();
        env.touch_binary("mysqld");
        env.write_template("galera.cnf", GALERA_TEMPLATE);
        env.write_template("md.cnf", STANDALONE_TEMPLATE);
        env.write_template("custom.cnf", "[mysqld]\n");
        env.write_template("encryption.cnf", "[mysqld]\nfile_key_management\n");
        env
    }

    /// Empty directories only
    pub fn bare() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["basedir/bin", "basedir/scripts", "templates"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    pub fn basedir(&self) -> PathBuf {
        self.root.path().join("basedir")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.path().join("templates")
    }

    pub fn workdir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn touch_binary(
        &self,
        name: &str,
    ) -> PathBuf {
        let path = self.basedir().join("bin").join(name);
        fs::write(&path, "").unwrap();
        path
    }

    pub fn write_template(
        &self,
        name: &str,
        content: &str,
    ) -> PathBuf {
        let path = self.template_dir().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn remove_template(
        &self,
        name: &str,
    ) {
        fs::remove_file(self.template_dir().join(name)).unwrap();
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

    pub fn shared_spec(
        &self,
        node_count: usize,
    ) -> Arc<ClusterSpec> {
        Arc::new(self.spec(node_count))
    }
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
