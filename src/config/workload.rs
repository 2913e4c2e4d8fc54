use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Sysbench sizing and credentials shared by every scenario
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkloadConfig {
    #[serde(default = "default_sysbench_bin")]
    pub sysbench_bin: PathBuf,

    /// Directory holding `oltp_insert.lua` and `oltp_read_write.lua`
    #[serde(default = "default_lua_dir")]
    pub lua_dir: PathBuf,

    #[serde(default = "default_sysbench_user")]
    pub user: String,

    #[serde(default = "default_sysbench_password")]
    pub password: String,

    #[serde(default = "default_table_count")]
    pub table_count: usize,

    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Rows per table for normal runs
    #[serde(default = "default_normal_table_size")]
    pub normal_table_size: usize,

    /// Duration of read/write runs in seconds
    #[serde(default = "default_run_time")]
    pub run_time_secs: u64,

    /// Sizing of the thread pool matrix runs
    #[serde(default)]
    pub thread_pool: ThreadPoolLoad,
}

/// Heavier load used against each thread pool configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThreadPoolLoad {
    #[serde(default = "default_tp_tables")]
    pub table_count: usize,

    #[serde(default = "default_tp_threads")]
    pub threads: usize,

    /// Duration of the read/write run in seconds
    #[serde(default = "default_tp_run_time")]
    pub run_time_secs: u64,
}

impl Default for ThreadPoolLoad {
    fn default() -> Self {
        Self {
            table_count: default_tp_tables(),
            threads: default_tp_threads(),
            run_time_secs: default_tp_run_time(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            sysbench_bin: default_sysbench_bin(),
            lua_dir: default_lua_dir(),
            user: default_sysbench_user(),
            password: default_sysbench_password(),
            table_count: default_table_count(),
            threads: default_threads(),
            normal_table_size: default_normal_table_size(),
            run_time_secs: default_run_time(),
            thread_pool: ThreadPoolLoad::default(),
        }
    }
}

/// Secondary tool locations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Checkout of the random query generator
    #[serde(default = "default_randgen_dir")]
    pub randgen_dir: PathBuf,

    #[serde(default = "default_perl")]
    pub perl: PathBuf,

    /// User the generator connects as
    #[serde(default = "default_rqg_user")]
    pub rqg_user: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            randgen_dir: default_randgen_dir(),
            perl: default_perl(),
            rqg_user: default_rqg_user(),
        }
    }
}

fn default_sysbench_bin() -> PathBuf {
    PathBuf::from("sysbench")
}
fn default_lua_dir() -> PathBuf {
    PathBuf::from("/usr/share/sysbench")
}
fn default_sysbench_user() -> String {
    "sysbench".to_string()
}
fn default_sysbench_password() -> String {
    "test".to_string()
}
fn default_table_count() -> usize {
    10
}
fn default_threads() -> usize {
    10
}
fn default_normal_table_size() -> usize {
    1000
}
fn default_run_time() -> u64 {
    10
}
fn default_tp_tables() -> usize {
    50
}
fn default_tp_threads() -> usize {
    50
}
fn default_tp_run_time() -> u64 {
    300
}
fn default_randgen_dir() -> PathBuf {
    PathBuf::from("randgen")
}
fn default_perl() -> PathBuf {
    PathBuf::from("perl")
}
fn default_rqg_user() -> String {
    "rqg_test".to_string()
}
